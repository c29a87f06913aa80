use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use match_core::{
    models::RawMessage,
    traits::{BrokerChannel, BrokerConnection, ConnectionProvider, ExchangeKind, QueueOptions},
    MatchError, MatchResult,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// 内存消息队列实现
///
/// 进程内的消息代理，具备与RabbitMQ一致的手动确认与事务语义：
/// 事务模式下的确认只有在提交后才生效；连接关闭时未确认的消息重新入队并标记为重新投递；
/// 投递标签在单个通道内唯一。可切换为“不可达”以模拟连接失败。
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<StoredMessage>>,
    exchanges: HashMap<String, ExchangeKind>,
    /// (交换机, 路由键) -> 队列
    bindings: HashMap<(String, String), Vec<String>>,
    unreachable: bool,
    connections_opened: u64,
    acked_total: u64,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct ChannelState {
    next_tag: u64,
    transactional: bool,
    /// 投递标签 -> (队列, 消息)
    unacked: BTreeMap<u64, (String, StoredMessage)>,
    pending_acks: Vec<u64>,
}

impl InMemoryBroker {
    /// 创建新的内存消息代理
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接向队列发布一条消息，队列不存在时自动创建
    pub async fn publish(&self, queue: &str, payload: impl Into<Vec<u8>>) {
        let mut state = self.state.lock().await;
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(StoredMessage {
                payload: payload.into(),
                redelivered: false,
            });
    }

    /// 通过交换机按路由键发布消息，返回投递到的队列数
    pub async fn publish_to_exchange(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: impl Into<Vec<u8>>,
    ) -> usize {
        let payload = payload.into();
        let mut state = self.state.lock().await;
        let targets = state
            .bindings
            .get(&(exchange.to_string(), routing_key.to_string()))
            .cloned()
            .unwrap_or_default();

        for queue in &targets {
            state
                .queues
                .entry(queue.clone())
                .or_default()
                .push_back(StoredMessage {
                    payload: payload.clone(),
                    redelivered: false,
                });
        }
        targets.len()
    }

    /// 切换代理是否可达
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().await.unreachable = unreachable;
    }

    /// 队列中待投递的消息数
    pub async fn queue_depth(&self, queue: &str) -> usize {
        self.state
            .lock()
            .await
            .queues
            .get(queue)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// 已提交的确认总数
    pub async fn acked_count(&self) -> u64 {
        self.state.lock().await.acked_total
    }

    /// 成功建立的连接总数
    pub async fn connections_opened(&self) -> u64 {
        self.state.lock().await.connections_opened
    }

    pub async fn has_exchange(&self, exchange: &str) -> bool {
        self.state.lock().await.exchanges.contains_key(exchange)
    }

    /// 创建指向本代理的连接提供者
    pub fn provider(&self) -> InMemoryConnectionProvider {
        InMemoryConnectionProvider {
            broker: self.clone(),
        }
    }
}

/// 内存消息代理的连接提供者
#[derive(Debug, Clone)]
pub struct InMemoryConnectionProvider {
    broker: InMemoryBroker,
}

#[async_trait]
impl ConnectionProvider for InMemoryConnectionProvider {
    fn endpoint(&self) -> String {
        "in-memory broker".to_string()
    }

    async fn acquire(&self) -> Option<Box<dyn BrokerConnection>> {
        let mut state = self.broker.state.lock().await;
        if state.unreachable {
            debug!("内存消息代理不可达");
            return None;
        }
        state.connections_opened += 1;

        Some(Box::new(InMemoryConnection {
            broker: self.broker.clone(),
            channels: Arc::new(Mutex::new(Vec::new())),
        }))
    }
}

/// 内存消息代理连接
pub struct InMemoryConnection {
    broker: InMemoryBroker,
    channels: Arc<Mutex<Vec<Arc<Mutex<ChannelState>>>>>,
}

#[async_trait]
impl BrokerConnection for InMemoryConnection {
    fn endpoint(&self) -> String {
        "in-memory broker".to_string()
    }

    async fn open_channel(&self) -> MatchResult<Box<dyn BrokerChannel>> {
        if self.broker.state.lock().await.unreachable {
            return Err(MatchError::protocol("连接已断开"));
        }

        let channel_state = Arc::new(Mutex::new(ChannelState::default()));
        self.channels.lock().await.push(Arc::clone(&channel_state));

        Ok(Box::new(InMemoryChannel {
            broker: self.broker.clone(),
            state: channel_state,
        }))
    }

    async fn close(&self, _grace: Duration) -> MatchResult<()> {
        let channels = std::mem::take(&mut *self.channels.lock().await);
        let mut broker = self.broker.state.lock().await;
        let mut requeued = 0usize;

        for channel in channels {
            let mut channel = channel.lock().await;
            channel.pending_acks.clear();
            // 逆序插回队首，保持原有投递顺序
            let unacked = std::mem::take(&mut channel.unacked);
            for (_, (queue, mut message)) in unacked.into_iter().rev() {
                message.redelivered = true;
                broker.queues.entry(queue).or_default().push_front(message);
                requeued += 1;
            }
        }

        info!("内存消息代理连接已关闭, 重新入队 {} 条未确认消息", requeued);
        Ok(())
    }
}

/// 内存消息代理通道
pub struct InMemoryChannel {
    broker: InMemoryBroker,
    state: Arc<Mutex<ChannelState>>,
}

#[async_trait]
impl BrokerChannel for InMemoryChannel {
    async fn declare_exchange(
        &self,
        exchange: &str,
        kind: ExchangeKind,
        _durable: bool,
    ) -> MatchResult<()> {
        let mut broker = self.broker.state.lock().await;
        match broker.exchanges.get(exchange) {
            Some(existing) if *existing != kind => Err(MatchError::protocol(format!(
                "交换机 {exchange} 已以 {} 类型声明",
                existing.as_str()
            ))),
            _ => {
                broker.exchanges.insert(exchange.to_string(), kind);
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, queue: &str, _options: QueueOptions) -> MatchResult<()> {
        self.broker
            .state
            .lock()
            .await
            .queues
            .entry(queue.to_string())
            .or_default();
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> MatchResult<()> {
        let mut broker = self.broker.state.lock().await;
        if !broker.exchanges.contains_key(exchange) {
            return Err(MatchError::protocol(format!("交换机 {exchange} 不存在")));
        }
        if !broker.queues.contains_key(queue) {
            return Err(MatchError::protocol(format!("队列 {queue} 不存在")));
        }

        let bound = broker
            .bindings
            .entry((exchange.to_string(), routing_key.to_string()))
            .or_default();
        if !bound.iter().any(|q| q == queue) {
            bound.push(queue.to_string());
        }
        Ok(())
    }

    async fn tx_select(&self) -> MatchResult<()> {
        self.state.lock().await.transactional = true;
        Ok(())
    }

    async fn basic_get(&self, queue: &str) -> MatchResult<Option<RawMessage>> {
        let mut broker = self.broker.state.lock().await;
        let Some(messages) = broker.queues.get_mut(queue) else {
            return Err(MatchError::protocol(format!("队列 {queue} 不存在")));
        };

        let Some(message) = messages.pop_front() else {
            return Ok(None);
        };
        let message_count = messages.len() as u32;

        let mut channel = self.state.lock().await;
        channel.next_tag += 1;
        let delivery_tag = channel.next_tag;
        channel
            .unacked
            .insert(delivery_tag, (queue.to_string(), message.clone()));

        Ok(Some(RawMessage {
            delivery_tag,
            payload: message.payload,
            message_count,
            redelivered: message.redelivered,
        }))
    }

    async fn basic_ack(&self, delivery_tag: u64) -> MatchResult<()> {
        let mut channel = self.state.lock().await;
        if !channel.unacked.contains_key(&delivery_tag) {
            return Err(MatchError::protocol(format!(
                "未知的投递标签: {delivery_tag}"
            )));
        }

        if channel.transactional {
            channel.pending_acks.push(delivery_tag);
        } else {
            channel.unacked.remove(&delivery_tag);
            drop(channel);
            self.broker.state.lock().await.acked_total += 1;
        }
        Ok(())
    }

    async fn tx_commit(&self) -> MatchResult<()> {
        let mut channel = self.state.lock().await;
        if !channel.transactional {
            return Err(MatchError::protocol("通道未处于事务模式"));
        }

        let pending = std::mem::take(&mut channel.pending_acks);
        for tag in &pending {
            channel.unacked.remove(tag);
        }
        drop(channel);

        self.broker.state.lock().await.acked_total += pending.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open(broker: &InMemoryBroker) -> (Box<dyn BrokerConnection>, Box<dyn BrokerChannel>) {
        let connection = broker.provider().acquire().await.unwrap();
        let channel = connection.open_channel().await.unwrap();
        channel
            .declare_exchange("match", ExchangeKind::Direct, true)
            .await
            .unwrap();
        channel
            .declare_queue("requests", QueueOptions::durable())
            .await
            .unwrap();
        channel
            .bind_queue("requests", "match", "requests")
            .await
            .unwrap();
        (connection, channel)
    }

    #[tokio::test]
    async fn test_ack_only_visible_after_commit() {
        let broker = InMemoryBroker::new();
        let (_connection, channel) = open(&broker).await;
        broker.publish("requests", b"one".to_vec()).await;

        channel.tx_select().await.unwrap();
        let message = channel.basic_get("requests").await.unwrap().unwrap();
        channel.basic_ack(message.delivery_tag).await.unwrap();
        assert_eq!(broker.acked_count().await, 0);

        channel.tx_commit().await.unwrap();
        assert_eq!(broker.acked_count().await, 1);
    }

    #[tokio::test]
    async fn test_unacked_messages_requeued_on_close() {
        let broker = InMemoryBroker::new();
        let (connection, channel) = open(&broker).await;
        broker.publish("requests", b"first".to_vec()).await;
        broker.publish("requests", b"second".to_vec()).await;

        let first = channel.basic_get("requests").await.unwrap().unwrap();
        let second = channel.basic_get("requests").await.unwrap().unwrap();
        assert_ne!(first.delivery_tag, second.delivery_tag);
        assert_eq!(broker.queue_depth("requests").await, 0);

        connection.close(Duration::from_millis(10)).await.unwrap();
        assert_eq!(broker.queue_depth("requests").await, 2);

        let (_connection, channel) = open(&broker).await;
        let again = channel.basic_get("requests").await.unwrap().unwrap();
        assert_eq!(again.payload, b"first");
        assert!(again.redelivered);
    }

    #[tokio::test]
    async fn test_uncommitted_ack_is_discarded_on_close() {
        let broker = InMemoryBroker::new();
        let (connection, channel) = open(&broker).await;
        broker.publish("requests", b"one".to_vec()).await;

        channel.tx_select().await.unwrap();
        let message = channel.basic_get("requests").await.unwrap().unwrap();
        channel.basic_ack(message.delivery_tag).await.unwrap();
        connection.close(Duration::from_millis(10)).await.unwrap();

        assert_eq!(broker.acked_count().await, 0);
        assert_eq!(broker.queue_depth("requests").await, 1);
    }

    #[tokio::test]
    async fn test_exchange_routing() {
        let broker = InMemoryBroker::new();
        let (_connection, channel) = open(&broker).await;

        assert_eq!(broker.publish_to_exchange("match", "requests", b"x".to_vec()).await, 1);
        assert_eq!(broker.publish_to_exchange("match", "other", b"x".to_vec()).await, 0);
        assert_eq!(channel.basic_get("requests").await.unwrap().unwrap().payload, b"x");
        assert!(channel.basic_get("requests").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_broker_yields_no_connection() {
        let broker = InMemoryBroker::new();
        broker.set_unreachable(true).await;
        assert!(broker.provider().acquire().await.is_none());
        assert_eq!(broker.connections_opened().await, 0);

        broker.set_unreachable(false).await;
        assert!(broker.provider().acquire().await.is_some());
        assert_eq!(broker.connections_opened().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_delivery_tag_rejected() {
        let broker = InMemoryBroker::new();
        let (_connection, channel) = open(&broker).await;
        assert!(matches!(
            channel.basic_ack(42).await,
            Err(MatchError::Protocol(_))
        ));
    }
}
