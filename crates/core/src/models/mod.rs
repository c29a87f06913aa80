//! # 数据模型
//!
//! 匹配守护进程在各组件之间传递的核心数据结构。
//!
//! - [`RawMessage`] - 从消息队列取出的原始消息（字节负载 + 投递标签）
//! - [`MatchRequest`] - 由原始消息反序列化得到的匹配请求，分派后所有权转移给执行任务
//! - [`AttemptId`] - Supervisor 为每次轮询尝试分配的单调递增编号
//!
//! 原始消息仅在负载成功反序列化后才会被确认；未确认的消息仍归消息队列所有，
//! 在通道会话结束后可被重新投递。

pub mod delivery;
pub mod match_request;

pub use delivery::*;
pub use match_request::*;
