pub mod alerting;
pub mod audit;
pub mod in_memory_broker;
pub mod rabbitmq;

pub use alerting::LogAlertChannel;
pub use audit::{DbAuditSink, TracingAuditSink};
pub use in_memory_broker::{InMemoryBroker, InMemoryConnectionProvider};
pub use rabbitmq::RabbitMqConnectionProvider;
