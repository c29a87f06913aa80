use async_trait::async_trait;
use match_core::traits::OperatorAlert;
use tracing::error;

/// 以错误日志形式发出的运维告警
///
/// 邮件等外部告警渠道由部署方接入，这里只保证告警可在日志中检索到。
#[derive(Debug, Clone, Default)]
pub struct LogAlertChannel;

impl LogAlertChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OperatorAlert for LogAlertChannel {
    async fn raise(&self, subject: &str, detail: &str) {
        error!(alert = true, subject = subject, "{detail}");
    }
}
