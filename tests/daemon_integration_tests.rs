use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use match_core::{
    config::AppConfig,
    traits::{AuditOperation, BrokerConnection, ConnectionProvider},
};
use match_daemon::{DaemonState, ExitReason};
use match_infrastructure::InMemoryBroker;
use match_server::app::{build_daemon, build_daemon_with, stop_and_join, BrokerKind};
use match_testing_utils::{
    fast_config, invalid_payload, FailingMatchHandler, MatchRequestBuilder, RecordingAlert,
    RecordingAuditSink, RecordingMatchHandler,
};
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn test_messages_flow_from_queue_to_handler() {
    let config = fast_config();
    let broker = InMemoryBroker::new();
    let handler = RecordingMatchHandler::new();
    let audit = RecordingAuditSink::new();
    let alert = RecordingAlert::new();

    let daemon = build_daemon_with(
        &config,
        Arc::new(broker.provider()),
        Arc::new(handler.clone()),
        Arc::new(audit.clone()),
        Arc::new(alert.clone()),
    );
    daemon.start().await.unwrap();

    // 守护进程建立连接后才发布到交换机
    while !broker.has_exchange(&config.rabbitmq.exchange).await {
        sleep(Duration::from_millis(50)).await;
    }
    let routed = broker
        .publish_to_exchange(
            &config.rabbitmq.exchange,
            &config.rabbitmq.queue,
            MatchRequestBuilder::new().with_subject("user-42").payload(),
        )
        .await;
    assert_eq!(routed, 1);
    broker
        .publish(&config.rabbitmq.queue, invalid_payload())
        .await;
    broker
        .publish(&config.rabbitmq.queue, MatchRequestBuilder::new().payload())
        .await;

    while handler.count() < 2 {
        sleep(Duration::from_millis(50)).await;
    }

    daemon.stop().await;
    let report = daemon.join().await.unwrap();

    assert_eq!(report.exit, ExitReason::Stopped);
    assert_eq!(report.attempts, 1);
    assert_eq!(daemon.state().await, DaemonState::Stopped);
    assert_eq!(handler.processed()[0].subject, "user-42");
    assert_eq!(broker.acked_count().await, 2);
    assert_eq!(audit.count(AuditOperation::Deserializing), 1);
    assert_eq!(audit.count(AuditOperation::MatchDaemon), 1);
    assert_eq!(alert.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_faulted_attempts_reconnect_until_stopped() {
    let config = fast_config();
    let broker = InMemoryBroker::new();
    for _ in 0..2 {
        broker
            .publish(&config.rabbitmq.queue, MatchRequestBuilder::new().payload())
            .await;
    }

    let handler = FailingMatchHandler::new();
    let audit = RecordingAuditSink::new();
    let daemon = build_daemon_with(
        &config,
        Arc::new(broker.provider()),
        Arc::new(handler.clone()),
        Arc::new(audit.clone()),
        Arc::new(RecordingAlert::new()),
    );
    daemon.start().await.unwrap();

    while handler.calls() < 2 {
        sleep(Duration::from_millis(50)).await;
    }
    daemon.stop().await;
    let report = daemon.join().await.unwrap();

    assert_eq!(report.exit, ExitReason::Stopped);
    assert!(report.attempts >= 2);
    assert!(broker.connections_opened().await >= 2);
    assert_eq!(broker.acked_count().await, 2);
    assert_eq!(audit.count(AuditOperation::ReadFromQueue), 2);
}

#[tokio::test(start_paused = true)]
async fn test_build_daemon_with_memory_broker() {
    let mut config = AppConfig::default();
    config.daemon.initial_backoff_ms = 100;

    let daemon = build_daemon(&config, BrokerKind::Memory).await.unwrap();
    assert_eq!(daemon.state().await, DaemonState::NotStarted);

    daemon.start().await.unwrap();
    sleep(Duration::from_millis(500)).await;

    let report = stop_and_join(&daemon, Duration::from_secs(30)).await.unwrap();
    assert_eq!(report.exit, ExitReason::Stopped);
    assert_eq!(report.attempts, 1);
}

/// 连接请求永不返回，也不响应停止信号
struct HangingProvider;

#[async_trait]
impl ConnectionProvider for HangingProvider {
    fn endpoint(&self) -> String {
        "host hanging at port 5672".to_string()
    }

    async fn acquire(&self) -> Option<Box<dyn BrokerConnection>> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_and_join_fails_when_daemon_hangs() {
    let config = fast_config();
    let daemon = build_daemon_with(
        &config,
        Arc::new(HangingProvider),
        Arc::new(RecordingMatchHandler::new()),
        Arc::new(RecordingAuditSink::new()),
        Arc::new(RecordingAlert::new()),
    );
    daemon.start().await.unwrap();
    sleep(Duration::from_millis(500)).await;

    let result = stop_and_join(&daemon, Duration::from_secs(1)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_database_audit_requires_url() {
    let mut config = AppConfig::default();
    config.audit.backend = match_core::config::AuditBackend::Database;

    assert!(build_daemon(&config, BrokerKind::Memory).await.is_err());
}
