use std::time::Duration;

use async_trait::async_trait;
use lapin::{options::*, types::FieldTable, Channel, Connection, ConnectionProperties};
use match_core::{
    config::{BrokerEndpoint, RabbitMqConfig},
    models::RawMessage,
    traits::{BrokerChannel, BrokerConnection, ConnectionProvider, ExchangeKind, QueueOptions},
    MatchError, MatchResult,
};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// 基于lapin的RabbitMQ连接提供者
///
/// 每次 `acquire` 都建立一条新连接，由当次轮询尝试独占。
pub struct RabbitMqConnectionProvider {
    endpoint: BrokerEndpoint,
    connect_timeout: Duration,
}

impl RabbitMqConnectionProvider {
    pub fn new(endpoint: BrokerEndpoint, connect_timeout: Duration) -> Self {
        Self {
            endpoint,
            connect_timeout,
        }
    }

    /// 按配置中的部署阶段选择连接目标
    pub fn from_config(config: &RabbitMqConfig) -> anyhow::Result<Self> {
        let endpoint = config.endpoint()?.clone();
        Ok(Self::new(endpoint, config.connection_timeout()))
    }
}

#[async_trait]
impl ConnectionProvider for RabbitMqConnectionProvider {
    fn endpoint(&self) -> String {
        self.endpoint.describe()
    }

    async fn acquire(&self) -> Option<Box<dyn BrokerConnection>> {
        let url = self.endpoint.build_url();
        let connecting = Connection::connect(&url, ConnectionProperties::default());

        match timeout(self.connect_timeout, connecting).await {
            Ok(Ok(connection)) => {
                info!("成功连接到RabbitMQ: {}", self.endpoint.describe());
                Some(Box::new(RabbitMqConnection {
                    connection,
                    endpoint: self.endpoint.describe(),
                }))
            }
            Ok(Err(e)) => {
                warn!("连接RabbitMQ失败 ({}): {e}", self.endpoint.describe());
                None
            }
            Err(_) => {
                warn!(
                    "连接RabbitMQ超时 ({}), 超时时间: {:?}",
                    self.endpoint.describe(),
                    self.connect_timeout
                );
                None
            }
        }
    }
}

/// 一条RabbitMQ连接
pub struct RabbitMqConnection {
    connection: Connection,
    endpoint: String,
}

#[async_trait]
impl BrokerConnection for RabbitMqConnection {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    fn is_usable(&self) -> bool {
        self.connection.status().connected()
    }

    async fn open_channel(&self) -> MatchResult<Box<dyn BrokerChannel>> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| MatchError::protocol(format!("创建通道失败: {e}")))?;

        Ok(Box::new(RabbitMqChannel { channel }))
    }

    async fn close(&self, grace: Duration) -> MatchResult<()> {
        match timeout(grace, self.connection.close(200, "正常关闭")).await {
            Ok(result) => {
                result.map_err(|e| MatchError::protocol(format!("关闭连接失败: {e}")))?;
                info!("RabbitMQ连接已关闭");
                Ok(())
            }
            Err(_) => Err(MatchError::Timeout(grace)),
        }
    }
}

/// lapin通道的包装
pub struct RabbitMqChannel {
    channel: Channel,
}

fn exchange_kind(kind: ExchangeKind) -> lapin::ExchangeKind {
    match kind {
        ExchangeKind::Direct => lapin::ExchangeKind::Direct,
        ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
        ExchangeKind::Topic => lapin::ExchangeKind::Topic,
    }
}

#[async_trait]
impl BrokerChannel for RabbitMqChannel {
    async fn declare_exchange(
        &self,
        exchange: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> MatchResult<()> {
        self.channel
            .exchange_declare(
                exchange,
                exchange_kind(kind),
                ExchangeDeclareOptions {
                    durable,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| MatchError::protocol(format!("声明交换机 {exchange} 失败: {e}")))?;

        debug!("交换机 {} 声明成功", exchange);
        Ok(())
    }

    async fn declare_queue(&self, queue: &str, options: QueueOptions) -> MatchResult<()> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: options.durable,
                    exclusive: options.exclusive,
                    auto_delete: options.auto_delete,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| MatchError::protocol(format!("声明队列 {queue} 失败: {e}")))?;

        debug!("队列 {} 声明成功", queue);
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> MatchResult<()> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                MatchError::protocol(format!("绑定队列 {queue} 到交换机 {exchange} 失败: {e}"))
            })?;

        Ok(())
    }

    async fn tx_select(&self) -> MatchResult<()> {
        self.channel
            .tx_select()
            .await
            .map_err(|e| MatchError::protocol(format!("开启事务模式失败: {e}")))
    }

    async fn basic_get(&self, queue: &str) -> MatchResult<Option<RawMessage>> {
        let message = self
            .channel
            .basic_get(queue, BasicGetOptions { no_ack: false })
            .await
            .map_err(|e| MatchError::protocol(format!("从队列 {queue} 获取消息失败: {e}")))?;

        Ok(message.map(|message| RawMessage {
            delivery_tag: message.delivery.delivery_tag,
            redelivered: message.delivery.redelivered,
            message_count: message.message_count,
            payload: message.delivery.data,
        }))
    }

    async fn basic_ack(&self, delivery_tag: u64) -> MatchResult<()> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| MatchError::protocol(format!("确认消息失败: {e}")))
    }

    async fn tx_commit(&self) -> MatchResult<()> {
        self.channel
            .tx_commit()
            .await
            .map_err(|e| MatchError::protocol(format!("提交事务失败: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_broker_yields_no_connection() {
        let endpoint = BrokerEndpoint {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..BrokerEndpoint::default()
        };
        let provider = RabbitMqConnectionProvider::new(endpoint, Duration::from_millis(500));

        assert!(provider.acquire().await.is_none());
        assert_eq!(provider.endpoint(), "host 127.0.0.1 at port 1");
    }
}
