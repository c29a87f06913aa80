use async_trait::async_trait;

use crate::{models::MatchRequest, MatchResult};

/// 业务匹配处理接口
///
/// 每条成功反序列化的请求都会在工作池中调用一次 `process`。
/// 返回错误（或任务 panic）视为处理故障，会结束当前轮询尝试。
#[async_trait]
pub trait MatchHandler: Send + Sync {
    async fn process(&self, request: MatchRequest) -> MatchResult<()>;
}
