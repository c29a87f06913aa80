use async_trait::async_trait;

/// 运维告警通道
///
/// 只在守护进程因重试策略拒绝继续而永久退出、且策略要求告警时调用。
#[async_trait]
pub trait OperatorAlert: Send + Sync {
    async fn raise(&self, subject: &str, detail: &str);
}
