//! 日志初始化
//!
//! `RUST_LOG` 环境变量优先于配置中的日志级别。

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

/// 初始化全局tracing订阅者
///
/// 同一进程内只能成功调用一次，重复调用返回错误。
pub fn init_logging(log_level: &str, log_format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        LogFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        LogFormat::Pretty => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
    }

    tracing::info!(
        "日志系统初始化完成: level={}, format={}",
        log_level,
        log_format.as_str()
    );
    Ok(())
}

/// 解析命令行传入的日志格式
pub fn parse_log_format(value: &str) -> Result<LogFormat> {
    match value {
        "json" => Ok(LogFormat::Json),
        "pretty" => Ok(LogFormat::Pretty),
        _ => Err(anyhow::anyhow!("不支持的日志格式: {value}")),
    }
}
