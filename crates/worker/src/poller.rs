use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use match_core::{
    config::AppConfig,
    models::{AttemptId, MatchRequest},
    traits::{
        AuditCategory, AuditOperation, AuditSink, BrokerChannel, BrokerConnection,
        ConnectionProvider, ExchangeKind, MatchHandler, QueueOptions,
    },
    MatchError, MatchResult,
};
use metrics::counter;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::pool::WorkerPool;
use crate::timed_dispatcher::{DispatchOutcome, TimedDispatcher};

/// 单次轮询尝试的参数
#[derive(Debug, Clone)]
pub struct PollWorkerSettings {
    pub exchange: String,
    pub queue: String,
    pub poll_interval: Duration,
    pub pool_size: usize,
    pub dispatch_timeout: Duration,
    pub pool_shutdown_grace: Duration,
    pub connection_close_grace: Duration,
}

impl PollWorkerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            exchange: config.rabbitmq.exchange.clone(),
            queue: config.rabbitmq.queue.clone(),
            poll_interval: config.daemon.poll_interval(),
            pool_size: config.worker_pool.size,
            dispatch_timeout: config.daemon.dispatch_timeout(),
            pool_shutdown_grace: config.daemon.pool_shutdown_grace(),
            connection_close_grace: config.daemon.connection_close_grace(),
        }
    }
}

/// PollWorker生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Created,
    Connecting,
    Active,
    Draining,
    Terminated,
}

/// 一次轮询尝试的结束方式
#[derive(Debug)]
pub enum AttemptOutcome {
    /// 没有拿到可用连接
    ConnectFailed,
    /// 收到停止信号后正常结束
    Stopped,
    /// 协议错误或处理故障导致尝试结束
    Faulted(MatchError),
}

/// 轮询工作者
///
/// 在一次尝试内独占一条消息队列连接和一个工作池：
/// 逐条取出消息，反序列化成功则确认并提交事务，再交给 [`TimedDispatcher`] 执行。
/// 连接和工作池在任何退出路径上都会被释放。
pub struct PollWorker {
    runner: Arc<AttemptRunner>,
    handle: Option<JoinHandle<AttemptOutcome>>,
    started: bool,
}

struct AttemptRunner {
    attempt_id: AttemptId,
    settings: PollWorkerSettings,
    provider: Arc<dyn ConnectionProvider>,
    handler: Arc<dyn MatchHandler>,
    audit: Arc<dyn AuditSink>,
    shutdown: CancellationToken,
    state: RwLock<PollerState>,
}

impl PollWorker {
    pub fn new(
        attempt_id: AttemptId,
        settings: PollWorkerSettings,
        provider: Arc<dyn ConnectionProvider>,
        handler: Arc<dyn MatchHandler>,
        audit: Arc<dyn AuditSink>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            runner: Arc::new(AttemptRunner {
                attempt_id,
                settings,
                provider,
                handler,
                audit,
                shutdown,
                state: RwLock::new(PollerState::Created),
            }),
            handle: None,
            started: false,
        }
    }

    pub fn attempt_id(&self) -> AttemptId {
        self.runner.attempt_id
    }

    pub async fn state(&self) -> PollerState {
        *self.runner.state.read().await
    }

    /// 在独立任务中开始本次尝试，立即返回
    pub fn start(&mut self) -> MatchResult<()> {
        if self.started {
            return Err(MatchError::InvalidState(format!(
                "轮询尝试 {} 已经启动",
                self.runner.attempt_id
            )));
        }
        self.started = true;

        let runner = Arc::clone(&self.runner);
        let span = info_span!("poll_attempt", attempt_id = runner.attempt_id.value());
        self.handle = Some(tokio::spawn(runner.run().instrument(span)));
        Ok(())
    }

    /// 请求停止，可重复调用，对已结束的尝试无副作用
    pub fn stop(&self) {
        self.runner.shutdown.cancel();
    }

    /// 等待本次尝试结束
    pub async fn join(&mut self) -> MatchResult<AttemptOutcome> {
        let handle = self.handle.take().ok_or_else(|| {
            MatchError::InvalidState(format!(
                "轮询尝试 {} 尚未启动或已被等待",
                self.runner.attempt_id
            ))
        })?;

        handle
            .await
            .map_err(|e| MatchError::Internal(format!("轮询任务异常退出: {e}")))
    }
}

impl AttemptRunner {
    async fn set_state(&self, state: PollerState) {
        *self.state.write().await = state;
    }

    async fn run(self: Arc<Self>) -> AttemptOutcome {
        let source = self.attempt_id.audit_source();
        counter!("match_attempts_started_total").increment(1);
        self.set_state(PollerState::Connecting).await;

        let connection = match self.provider.acquire().await {
            Some(connection) if connection.is_usable() => connection,
            _ => {
                counter!("match_connect_failures_total").increment(1);
                error!("无法连接消息队列: {}", self.provider.endpoint());
                self.audit.log(
                    AuditCategory::Match,
                    AuditOperation::ConnectToQueue,
                    &source,
                    &format!("Cannot connect to queue on {}", self.provider.endpoint()),
                );
                self.finish(&source).await;
                return AttemptOutcome::ConnectFailed;
            }
        };

        let (ended_by, pool) = match self.prepare_channel(connection.as_ref()).await {
            Ok(channel) => {
                info!(
                    "已连接队列 '{}' ({})",
                    self.settings.queue,
                    connection.endpoint()
                );
                self.audit.log(
                    AuditCategory::Match,
                    AuditOperation::ConnectToQueue,
                    &source,
                    &format!(
                        "successfully connected to queue '{}' on {}",
                        self.settings.queue,
                        connection.endpoint()
                    ),
                );

                let pool = WorkerPool::new(self.settings.pool_size);
                self.set_state(PollerState::Active).await;
                let ended_by = match self.poll_loop(channel.as_ref(), &pool, &source).await {
                    Ok(never) => match never {},
                    Err(e) => e,
                };
                self.set_state(PollerState::Draining).await;
                (ended_by, Some(pool))
            }
            // 通道建立失败时直接从 Connecting 结束
            Err(e) => (e, None),
        };

        let outcome = if ended_by.is_shutdown() {
            AttemptOutcome::Stopped
        } else {
            if matches!(ended_by, MatchError::HandlerFault(_)) {
                counter!("match_handler_faults_total").increment(1);
            }
            error!("轮询尝试 {} 失败: {ended_by}", self.attempt_id);
            self.audit.log(
                AuditCategory::Match,
                AuditOperation::ReadFromQueue,
                &source,
                &format!("{ended_by:?}"),
            );
            AttemptOutcome::Faulted(ended_by)
        };

        self.teardown(connection, pool).await;
        self.finish(&source).await;
        outcome
    }

    /// 创建通道，声明直连交换机与持久化队列并绑定，然后开启事务模式
    async fn prepare_channel(
        &self,
        connection: &dyn BrokerConnection,
    ) -> MatchResult<Box<dyn BrokerChannel>> {
        let exchange = &self.settings.exchange;
        let queue = &self.settings.queue;

        let channel = connection.open_channel().await?;
        channel
            .declare_exchange(exchange, ExchangeKind::Direct, true)
            .await?;
        channel.declare_queue(queue, QueueOptions::durable()).await?;
        channel.bind_queue(queue, exchange, queue).await?;
        // 事务模式对通道持续有效，每次确认+提交仍是独立事务
        channel.tx_select().await?;

        Ok(channel)
    }

    /// 持续轮询直到出错，收到停止信号时返回 [`MatchError::Shutdown`]
    async fn poll_loop(
        &self,
        channel: &dyn BrokerChannel,
        pool: &WorkerPool,
        source: &str,
    ) -> MatchResult<Infallible> {
        let dispatcher = TimedDispatcher::new(self.settings.dispatch_timeout);

        while !self.shutdown.is_cancelled() {
            if let Some(message) = channel.basic_get(&self.settings.queue).await? {
                debug!(
                    "msgcount = {}, delivery_tag = {}",
                    message.message_count, message.delivery_tag
                );

                match MatchRequest::from_slice(&message.payload) {
                    Ok(request) => {
                        info!(
                            "收到匹配请求 {} (delivery_tag: {})",
                            request, message.delivery_tag
                        );
                        channel.basic_ack(message.delivery_tag).await?;
                        channel.tx_commit().await?;
                        counter!("match_messages_acked_total").increment(1);

                        let handler = Arc::clone(&self.handler);
                        let task = async move { handler.process(request).await };
                        match dispatcher.run(pool, task, &self.shutdown).await? {
                            DispatchOutcome::Completed => {}
                            DispatchOutcome::TimedOut => {
                                debug!("匹配任务超时, 继续轮询");
                            }
                            DispatchOutcome::Interrupted => break,
                        }
                    }
                    Err(e) => {
                        counter!("match_deserialization_errors_total").increment(1);
                        warn!(
                            "消息反序列化失败 (delivery_tag: {}): {e}",
                            message.delivery_tag
                        );
                        self.audit.log(
                            AuditCategory::Match,
                            AuditOperation::Deserializing,
                            source,
                            "Error deserializing body of queue message",
                        );
                    }
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = sleep(self.settings.poll_interval) => {}
            }
        }

        debug!("轮询尝试 {} 收到停止信号", self.attempt_id);
        Err(MatchError::Shutdown)
    }

    async fn teardown(&self, connection: Box<dyn BrokerConnection>, pool: Option<WorkerPool>) {
        info!("连接关闭中...");
        match connection
            .close(self.settings.connection_close_grace)
            .await
        {
            Ok(()) => info!("连接已关闭"),
            Err(e) => debug!("关闭连接出错, 已忽略: {e}"),
        }

        if let Some(pool) = pool {
            info!("尝试关闭工作池");
            pool.shutdown(self.settings.pool_shutdown_grace).await;
        }
    }

    async fn finish(&self, source: &str) {
        self.set_state(PollerState::Terminated).await;
        info!("{source} 已结束");
        self.audit.log(
            AuditCategory::Match,
            AuditOperation::ConnectToQueue,
            source,
            "dead",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_default_config() {
        let settings = PollWorkerSettings::from_config(&AppConfig::default());
        assert_eq!(settings.poll_interval, Duration::from_millis(2000));
        assert_eq!(settings.dispatch_timeout, Duration::from_secs(20));
        assert_eq!(settings.pool_shutdown_grace, Duration::from_secs(5));
        assert_eq!(settings.connection_close_grace, Duration::from_millis(500));
        assert_eq!(settings.pool_size, 10);
        assert_eq!(settings.exchange, "match");
    }
}
