use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use match_core::{config::AppConfig, init_logging, parse_log_format};
use match_daemon::ExitReason;
use match_server::app::{build_daemon, install_metrics_exporter, stop_and_join, BrokerKind};
use match_server::shutdown::wait_for_shutdown_signal;
use tracing::{error, info};

/// 等待守护进程退出的最长时间
const JOIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("match-server")
        .version("1.0.0")
        .about("匹配请求消费守护进程")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时搜索默认路径"),
        )
        .arg(
            Arg::new("stage")
                .short('s')
                .long("stage")
                .value_name("STAGE")
                .help("部署阶段，决定连接哪个RabbitMQ"),
        )
        .arg(
            Arg::new("broker")
                .long("broker")
                .value_name("BROKER")
                .help("消息代理类型")
                .value_parser(["rabbitmq", "memory"])
                .default_value("rabbitmq"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let stage = matches.get_one::<String>("stage");
    let broker: BrokerKind = matches
        .get_one::<String>("broker")
        .map(String::as_str)
        .unwrap_or("rabbitmq")
        .parse()?;

    // 加载配置
    let mut config = AppConfig::load(config_path.map(String::as_str)).with_context(|| {
        format!(
            "加载配置失败: {}",
            config_path.map(String::as_str).unwrap_or("默认路径")
        )
    })?;

    // 命令行指定的阶段覆盖配置
    if let Some(stage) = stage {
        config.rabbitmq.stage = stage.clone();
        config.validate().context("部署阶段无效")?;
    }

    // 初始化日志系统
    let log_level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.logging.level.clone());
    let log_format = match matches.get_one::<String>("log-format") {
        Some(format) => parse_log_format(format)?,
        None => config.logging.format,
    };
    init_logging(&log_level, log_format)?;

    info!("启动匹配守护进程");
    info!("部署阶段: {}", config.rabbitmq.stage);
    info!("队列: {} (交换机: {})", config.rabbitmq.queue, config.rabbitmq.exchange);

    install_metrics_exporter(&config.observability)?;

    let daemon = build_daemon(&config, broker).await?;
    daemon.start().await?;

    let report = tokio::select! {
        signal = wait_for_shutdown_signal() => {
            info!("收到关闭信号 {:?}，开始优雅关闭...", signal);
            stop_and_join(&daemon, JOIN_TIMEOUT).await?
        }
        report = daemon.join() => report?,
    };

    info!(
        "匹配守护进程已退出: {:?}, 共 {} 次轮询尝试",
        report.exit, report.attempts
    );

    if report.exit == ExitReason::RetryExhausted {
        error!("重试策略拒绝继续，守护进程永久退出");
        return Err(anyhow::anyhow!(
            "匹配守护进程在 {} 次尝试后永久退出",
            report.attempts
        ));
    }

    Ok(())
}
