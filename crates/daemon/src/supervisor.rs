use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use match_core::{
    models::AttemptId,
    traits::{AuditCategory, AuditOperation, AuditSink, OperatorAlert},
    MatchError, MatchResult,
};
use match_worker::{AttemptOutcome, PollWorkerFactory};
use tokio::sync::{watch, RwLock};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::retry_policy::RetryPolicy;

const DAEMON_SOURCE: &str = "matcher-server";
const DAEMON_DIED: &str = "Superdaemon for the matching process has died.";
/// 退出前等待审计记录落盘的最长时间
const AUDIT_FLUSH_GRACE: Duration = Duration::from_secs(5);

/// 守护进程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

/// 守护进程退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// 调用了 `stop()`
    Stopped,
    /// 重试策略拒绝继续
    RetryExhausted,
}

/// Supervisor循环结束后的汇总
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonReport {
    /// 创建的轮询尝试总数
    pub attempts: u64,
    /// 退出时的退避时间
    pub last_backoff: Duration,
    pub exit: ExitReason,
}

/// 匹配守护进程（Supervisor）
///
/// 在独立任务中依次创建 PollWorker：每次尝试前先按当前退避时间等待，
/// 尝试结束后询问重试策略，继续则按策略增长退避时间。任何时刻至多只有一个尝试在运行。
pub struct MatchDaemon {
    inner: Arc<DaemonInner>,
    started: AtomicBool,
    /// 随Supervisor任务移出；任务异常退出时发送端被丢弃，`join()` 随之返回错误
    report_tx: Mutex<Option<watch::Sender<Option<DaemonReport>>>>,
    report_rx: watch::Receiver<Option<DaemonReport>>,
}

struct DaemonInner {
    factory: Arc<dyn PollWorkerFactory>,
    policy: Arc<dyn RetryPolicy>,
    audit: Arc<dyn AuditSink>,
    alert: Arc<dyn OperatorAlert>,
    initial_backoff: Duration,
    state: RwLock<DaemonState>,
    shutdown: CancellationToken,
}

impl MatchDaemon {
    pub fn new(
        factory: Arc<dyn PollWorkerFactory>,
        policy: Arc<dyn RetryPolicy>,
        audit: Arc<dyn AuditSink>,
        alert: Arc<dyn OperatorAlert>,
        initial_backoff: Duration,
    ) -> Self {
        let (report_tx, report_rx) = watch::channel(None);
        Self {
            inner: Arc::new(DaemonInner {
                factory,
                policy,
                audit,
                alert,
                initial_backoff,
                state: RwLock::new(DaemonState::NotStarted),
                shutdown: CancellationToken::new(),
            }),
            started: AtomicBool::new(false),
            report_tx: Mutex::new(Some(report_tx)),
            report_rx,
        }
    }

    pub async fn state(&self) -> DaemonState {
        *self.inner.state.read().await
    }

    /// 在独立任务中启动Supervisor循环，立即返回
    pub async fn start(&self) -> MatchResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(MatchError::InvalidState("守护进程已经启动".to_string()));
        }

        {
            let mut state = self.inner.state.write().await;
            if *state == DaemonState::NotStarted {
                *state = DaemonState::Running;
            }
        }

        let report_tx = self
            .report_tx
            .lock()
            .map_err(|_| MatchError::Internal("守护进程状态锁已损坏".to_string()))?
            .take()
            .ok_or_else(|| MatchError::InvalidState("守护进程已经启动".to_string()))?;

        info!("启动匹配守护进程");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(
            async move {
                let supervisor = tokio::spawn(Arc::clone(&inner).supervise().in_current_span());
                match supervisor.await {
                    Ok(report) => {
                        report_tx.send_replace(Some(report));
                    }
                    Err(e) => {
                        error!("Supervisor任务异常退出: {e}");
                        inner.shutdown.cancel();
                        inner.write_died_record();
                        *inner.state.write().await = DaemonState::Stopped;
                    }
                }
            }
            .instrument(info_span!("match_daemon")),
        );
        Ok(())
    }

    /// 请求停止
    ///
    /// 打断退避等待并传递给当前尝试；在 `start()` 之前调用则之后不会创建任何尝试。
    pub async fn stop(&self) {
        {
            let mut state = self.inner.state.write().await;
            match *state {
                DaemonState::NotStarted => *state = DaemonState::Stopped,
                DaemonState::Running => *state = DaemonState::Stopping,
                DaemonState::Stopping | DaemonState::Stopped => {}
            }
        }
        info!("匹配守护进程收到停止请求");
        self.inner.shutdown.cancel();
    }

    /// 等待Supervisor循环退出，可重复调用
    pub async fn join(&self) -> MatchResult<DaemonReport> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(MatchError::InvalidState("守护进程尚未启动".to_string()));
        }

        let mut report_rx = self.report_rx.clone();
        let report = report_rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| MatchError::Internal("守护进程任务异常退出, 未留下运行汇总".to_string()))?;

        report
            .clone()
            .ok_or_else(|| MatchError::Internal("守护进程未留下运行汇总".to_string()))
    }
}

impl DaemonInner {
    fn write_died_record(&self) {
        self.audit.log(
            AuditCategory::Rabbitmq,
            AuditOperation::MatchDaemon,
            DAEMON_SOURCE,
            DAEMON_DIED,
        );
    }

    async fn supervise(self: Arc<Self>) -> DaemonReport {
        let mut backoff = self.initial_backoff;
        let mut attempts: u64 = 0;
        let mut attempt_id = AttemptId::FIRST;

        let exit = loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break ExitReason::Stopped,
                _ = sleep(backoff) => {}
            }

            attempts += 1;
            let mut worker = self.factory.create(attempt_id, self.shutdown.child_token());
            info!("开始第 {} 次轮询尝试", attempt_id);

            match worker.start() {
                Ok(()) => match worker.join().await {
                    Ok(AttemptOutcome::Stopped) => info!("轮询尝试 {} 已停止", attempt_id),
                    Ok(AttemptOutcome::ConnectFailed) => {
                        warn!("轮询尝试 {} 无法连接消息队列", attempt_id)
                    }
                    Ok(AttemptOutcome::Faulted(e)) => {
                        warn!("轮询尝试 {} 因故障结束: {e}", attempt_id)
                    }
                    Err(e) => error!("轮询尝试 {} 异常退出: {e}", attempt_id),
                },
                Err(e) => error!("轮询尝试 {} 启动失败: {e}", attempt_id),
            }
            worker.stop();
            attempt_id = attempt_id.next();

            if self.shutdown.is_cancelled() {
                break ExitReason::Stopped;
            }
            if !self.policy.should_retry(attempts) {
                break ExitReason::RetryExhausted;
            }

            backoff = self.policy.next_backoff(backoff);
            info!("{:?} 后开始下一次尝试", backoff);
        };

        if exit == ExitReason::RetryExhausted && self.policy.should_alert() {
            self.alert
                .raise(
                    DAEMON_SOURCE,
                    &format!("{DAEMON_DIED} 共进行了 {attempts} 次轮询尝试"),
                )
                .await;
        }

        match exit {
            ExitReason::Stopped => info!("匹配守护进程已停止, 共 {} 次尝试", attempts),
            ExitReason::RetryExhausted => {
                error!("重试策略拒绝继续, 匹配守护进程退出, 共 {} 次尝试", attempts)
            }
        }
        self.write_died_record();
        self.audit.flush(AUDIT_FLUSH_GRACE).await;
        *self.state.write().await = DaemonState::Stopped;

        DaemonReport {
            attempts,
            last_backoff: backoff,
            exit,
        }
    }
}
