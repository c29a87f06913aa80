pub mod app_config;
pub mod daemon;
pub mod message_queue;
pub mod observability;

// 重新导出主要类型
pub use app_config::AppConfig;
pub use daemon::{DaemonConfig, HandlerConfig, WorkerPoolConfig};
pub use message_queue::{BrokerEndpoint, RabbitMqConfig};
pub use observability::{AuditBackend, AuditConfig, LogFormat, LoggingConfig, ObservabilityConfig};
