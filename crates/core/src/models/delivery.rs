use std::fmt;

use serde::{Deserialize, Serialize};

/// 轮询尝试编号
///
/// 每创建一个 PollWorker 分配一个，只用于日志和审计记录的关联，从不复用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttemptId(u64);

impl AttemptId {
    pub const FIRST: AttemptId = AttemptId(1);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// 审计记录中使用的来源标识
    pub fn audit_source(&self) -> String {
        format!("(matcher-server {})", self.0)
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 从消息队列取出的原始消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// 投递标签，在通道生命周期内唯一
    pub delivery_tag: u64,
    /// 原始负载
    pub payload: Vec<u8>,
    /// 取出时队列中剩余的消息数
    pub message_count: u32,
    /// 是否为重新投递
    pub redelivered: bool,
}
