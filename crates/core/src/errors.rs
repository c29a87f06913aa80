use std::time::Duration;

use thiserror::Error;

/// 匹配守护进程错误类型定义
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("无法连接消息队列: {0}")]
    ConnectFailure(String),

    #[error("消息队列协议错误: {0}")]
    Protocol(String),

    #[error("反序列化错误: {0}")]
    Deserialization(String),

    #[error("匹配处理失败: {0}")]
    HandlerFault(String),

    #[error("操作超时 ({0:?})")]
    Timeout(Duration),

    #[error("收到停止信号")]
    Shutdown,

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("非法状态: {0}")]
    InvalidState(String),

    #[error("审计日志错误: {0}")]
    Audit(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl MatchError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn handler_fault(message: impl Into<String>) -> Self {
        Self::HandlerFault(message.into())
    }

    /// 是否为协作式停止（而非故障）
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}

impl From<serde_json::Error> for MatchError {
    fn from(e: serde_json::Error) -> Self {
        Self::Deserialization(e.to_string())
    }
}

/// 统一的Result类型
pub type MatchResult<T> = std::result::Result<T, MatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_is_not_a_fault() {
        assert!(MatchError::Shutdown.is_shutdown());
        assert!(!MatchError::protocol("channel closed").is_shutdown());
    }

    #[test]
    fn test_json_error_maps_to_deserialization() {
        let err: MatchError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert!(matches!(err, MatchError::Deserialization(_)));
        assert!(err.to_string().contains("反序列化错误"));
    }
}
