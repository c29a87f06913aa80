use std::time::Duration;

use async_trait::async_trait;

use crate::{models::RawMessage, MatchError, MatchResult};

/// 交换机类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Direct,
    Fanout,
    Topic,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Topic => "topic",
        }
    }
}

/// 队列声明选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
}

impl QueueOptions {
    /// 持久化、非独占、不自动删除
    pub fn durable() -> Self {
        Self {
            durable: true,
            exclusive: false,
            auto_delete: false,
        }
    }
}

/// 消息队列通道
///
/// 一个通道只被一个 PollWorker 独占使用。
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// 声明交换机
    async fn declare_exchange(
        &self,
        exchange: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> MatchResult<()>;

    /// 声明队列
    async fn declare_queue(&self, queue: &str, options: QueueOptions) -> MatchResult<()>;

    /// 按路由键将队列绑定到交换机
    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> MatchResult<()>;

    /// 将通道切换为事务模式
    async fn tx_select(&self) -> MatchResult<()>;

    /// 非阻塞地取出至多一条消息（需手动确认）
    async fn basic_get(&self, queue: &str) -> MatchResult<Option<RawMessage>>;

    /// 按投递标签确认消息
    async fn basic_ack(&self, delivery_tag: u64) -> MatchResult<()>;

    /// 提交当前事务
    async fn tx_commit(&self) -> MatchResult<()>;
}

/// 消息队列连接
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// 连接目标描述，用于日志和审计
    fn endpoint(&self) -> String;

    /// 空连接哨兵返回 false
    fn is_usable(&self) -> bool {
        true
    }

    async fn open_channel(&self) -> MatchResult<Box<dyn BrokerChannel>>;

    /// 在宽限期内关闭连接
    async fn close(&self, grace: Duration) -> MatchResult<()>;
}

/// 连接提供者
///
/// 没有可用连接时返回 `None` 或 [`NullConnection`]，从不因此报错。
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// 目标描述，连接失败时写入审计记录
    fn endpoint(&self) -> String;

    async fn acquire(&self) -> Option<Box<dyn BrokerConnection>>;
}

/// 可识别的空连接哨兵
#[derive(Debug, Clone)]
pub struct NullConnection {
    endpoint: String,
}

impl NullConnection {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl BrokerConnection for NullConnection {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    fn is_usable(&self) -> bool {
        false
    }

    async fn open_channel(&self) -> MatchResult<Box<dyn BrokerChannel>> {
        Err(MatchError::ConnectFailure(format!(
            "空连接无法创建通道: {}",
            self.endpoint
        )))
    }

    async fn close(&self, _grace: Duration) -> MatchResult<()> {
        Ok(())
    }
}
