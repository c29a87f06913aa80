use std::time::Duration;

use async_trait::async_trait;
use match_core::{models::MatchRequest, traits::MatchHandler, MatchError, MatchResult};
use tracing::{debug, info, warn};

/// HTTP匹配处理器
///
/// 把匹配请求以JSON形式POST到业务匹配服务，非2xx响应或传输错误视为处理故障。
pub struct HttpMatchHandler {
    /// HTTP客户端
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMatchHandler {
    /// 创建新的HTTP匹配处理器
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> MatchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| MatchError::Configuration(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MatchHandler for HttpMatchHandler {
    async fn process(&self, request: MatchRequest) -> MatchResult<()> {
        info!("执行匹配请求: {}, url={}", request, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| MatchError::handler_fault(format!("HTTP请求失败: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("读取响应体失败: {e}"));
            warn!("匹配服务返回错误状态 {}: {}", status.as_u16(), body);
            return Err(MatchError::handler_fault(format!(
                "HTTP请求失败，状态码: {}",
                status.as_u16()
            )));
        }

        debug!("匹配请求 {} 处理完成", request.request_id);
        Ok(())
    }
}

/// 只记录日志的匹配处理器，未配置匹配服务时使用
#[derive(Debug, Clone, Default)]
pub struct LoggingMatchHandler;

impl LoggingMatchHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MatchHandler for LoggingMatchHandler {
    async fn process(&self, request: MatchRequest) -> MatchResult<()> {
        info!(
            request_id = %request.request_id,
            subject = %request.subject,
            "收到匹配请求, 未配置匹配服务, 仅记录"
        );
        Ok(())
    }
}
