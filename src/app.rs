use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use match_core::{
    config::{AppConfig, AuditBackend, AuditConfig, HandlerConfig, ObservabilityConfig},
    traits::{AuditSink, ConnectionProvider, MatchHandler, OperatorAlert},
};
use match_daemon::{policy_from_config, DaemonReport, MatchDaemon};
use match_infrastructure::{
    DbAuditSink, InMemoryBroker, LogAlertChannel, RabbitMqConnectionProvider, TracingAuditSink,
};
use match_worker::{
    DefaultPollWorkerFactory, HttpMatchHandler, LoggingMatchHandler, PollWorkerSettings,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};

/// 消息代理类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerKind {
    /// 按部署阶段连接RabbitMQ
    RabbitMq,
    /// 进程内消息代理，用于本地运行
    Memory,
}

impl FromStr for BrokerKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "rabbitmq" => Ok(BrokerKind::RabbitMq),
            "memory" => Ok(BrokerKind::Memory),
            _ => Err(anyhow::anyhow!("不支持的消息代理类型: {value}")),
        }
    }
}

/// 按配置组装守护进程
pub async fn build_daemon(config: &AppConfig, broker: BrokerKind) -> Result<MatchDaemon> {
    let provider: Arc<dyn ConnectionProvider> = match broker {
        BrokerKind::RabbitMq => {
            let provider = RabbitMqConnectionProvider::from_config(&config.rabbitmq)
                .context("创建RabbitMQ连接提供者失败")?;
            info!(
                "消息代理: RabbitMQ ({}), 阶段: {}",
                provider.endpoint(),
                config.rabbitmq.stage
            );
            Arc::new(provider)
        }
        BrokerKind::Memory => {
            info!("消息代理: 进程内内存代理");
            Arc::new(InMemoryBroker::new().provider())
        }
    };

    let handler = build_handler(&config.handler)?;
    let audit = build_audit_sink(&config.audit).await?;

    Ok(build_daemon_with(
        config,
        provider,
        handler,
        audit,
        Arc::new(LogAlertChannel::new()),
    ))
}

/// 用给定的协作者组装守护进程
pub fn build_daemon_with(
    config: &AppConfig,
    provider: Arc<dyn ConnectionProvider>,
    handler: Arc<dyn MatchHandler>,
    audit: Arc<dyn AuditSink>,
    alert: Arc<dyn OperatorAlert>,
) -> MatchDaemon {
    let factory = DefaultPollWorkerFactory::new(
        PollWorkerSettings::from_config(config),
        provider,
        handler,
        Arc::clone(&audit),
    );

    MatchDaemon::new(
        Arc::new(factory),
        policy_from_config(&config.daemon),
        audit,
        alert,
        config.daemon.initial_backoff(),
    )
}

/// 请求停止并等待守护进程退出，超过 `limit` 视为失败
pub async fn stop_and_join(daemon: &MatchDaemon, limit: Duration) -> Result<DaemonReport> {
    daemon.stop().await;

    match tokio::time::timeout(limit, daemon.join()).await {
        Ok(report) => Ok(report?),
        Err(_) => {
            warn!("守护进程关闭超时，强制退出");
            Err(anyhow::anyhow!("匹配守护进程在 {:?} 内未能退出", limit))
        }
    }
}

/// 创建匹配处理器，未配置匹配服务时只记录日志
pub fn build_handler(config: &HandlerConfig) -> Result<Arc<dyn MatchHandler>> {
    match &config.endpoint {
        Some(endpoint) => {
            info!("匹配服务: {endpoint}");
            let handler = HttpMatchHandler::new(endpoint.clone(), config.request_timeout())
                .context("创建HTTP匹配处理器失败")?;
            Ok(Arc::new(handler))
        }
        None => {
            info!("未配置匹配服务, 匹配请求仅记录日志");
            Ok(Arc::new(LoggingMatchHandler::new()))
        }
    }
}

/// 创建审计日志
pub async fn build_audit_sink(config: &AuditConfig) -> Result<Arc<dyn AuditSink>> {
    match config.backend {
        AuditBackend::Log => Ok(Arc::new(TracingAuditSink::new())),
        AuditBackend::Database => {
            let sink = DbAuditSink::connect(config)
                .await
                .context("创建数据库审计日志失败")?;
            Ok(Arc::new(sink))
        }
    }
}

/// 配置了监听地址时安装Prometheus指标导出器
pub fn install_metrics_exporter(config: &ObservabilityConfig) -> Result<()> {
    let Some(address) = &config.metrics_bind_address else {
        return Ok(());
    };

    let address: SocketAddr = address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {address}"))?;

    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .context("安装Prometheus指标导出器失败")?;

    info!("Prometheus指标导出器已启动: {address}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broker_kind() {
        assert_eq!("rabbitmq".parse::<BrokerKind>().unwrap(), BrokerKind::RabbitMq);
        assert_eq!("memory".parse::<BrokerKind>().unwrap(), BrokerKind::Memory);
        assert!("kafka".parse::<BrokerKind>().is_err());
    }

    #[test]
    fn test_handler_selection() {
        assert!(build_handler(&HandlerConfig::default()).is_ok());

        let config = HandlerConfig {
            endpoint: Some("http://matcher.internal/match".to_string()),
            ..HandlerConfig::default()
        };
        assert!(build_handler(&config).is_ok());
    }

    #[test]
    fn test_metrics_exporter_disabled_by_default() {
        assert!(install_metrics_exporter(&ObservabilityConfig::default()).is_ok());
    }
}
