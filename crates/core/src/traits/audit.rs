use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 审计记录所属的集成类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    Rabbitmq,
    Match,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::Rabbitmq => "RABBITMQ",
            AuditCategory::Match => "MATCH",
        }
    }
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 审计记录对应的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOperation {
    ConnectToQueue,
    ReadFromQueue,
    Deserializing,
    MatchDaemon,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOperation::ConnectToQueue => "CONNECT_TO_Q",
            AuditOperation::ReadFromQueue => "READ_FROM_Q",
            AuditOperation::Deserializing => "DESERIALIZING",
            AuditOperation::MatchDaemon => "MATCH_DAEMON",
        }
    }
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一条审计记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub category: AuditCategory,
    pub operation: AuditOperation,
    pub source: String,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        category: AuditCategory,
        operation: AuditOperation,
        source: &str,
        message: &str,
    ) -> Self {
        Self {
            category,
            operation,
            source: source.to_string(),
            message: message.to_string(),
            recorded_at: Utc::now(),
        }
    }
}

/// 只追加的审计日志接口
///
/// 调用方式为发出即忘：实现内部的失败不会传播给调用方。
/// Supervisor 与 PollWorker 会从不同任务并发调用，实现必须是线程安全的。
#[async_trait]
pub trait AuditSink: Send + Sync {
    fn log(&self, category: AuditCategory, operation: AuditOperation, source: &str, message: &str);

    /// 至多等待 `grace`，直到已提交的记录写完
    ///
    /// 同步写入的实现无需覆盖。
    async fn flush(&self, _grace: Duration) {}
}
