use std::future::Future;
use std::time::Duration;

use match_core::{MatchError, MatchResult};
use metrics::{counter, histogram};
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::pool::WorkerPool;

/// 一次分派的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 任务在超时前正常完成
    Completed,
    /// 等待超时，任务已被请求取消
    TimedOut,
    /// 等待期间收到停止信号，任务留在工作池中由关闭宽限期收尾
    Interrupted,
}

/// 带超时的任务分派器
///
/// 向工作池提交一个任务并至多等待 `timeout`。超时不是错误；
/// 任务自身失败（返回错误或panic）时返回 [`MatchError::HandlerFault`]。
/// 不重试任务。只有超时的任务会被请求取消；停止信号打断等待时任务继续运行，
/// 其消息已确认，由 [`WorkerPool::shutdown`] 的宽限期等待它结束。
#[derive(Debug, Clone, Copy)]
pub struct TimedDispatcher {
    timeout: Duration,
}

impl TimedDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn run<F>(
        &self,
        pool: &WorkerPool,
        task: F,
        shutdown: &CancellationToken,
    ) -> MatchResult<DispatchOutcome>
    where
        F: Future<Output = MatchResult<()>> + Send + 'static,
    {
        let started = Instant::now();
        let mut handle = pool.spawn(task)?;

        let outcome = tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                debug!("分派等待被停止信号打断");
                Ok(DispatchOutcome::Interrupted)
            }
            joined = timeout(self.timeout, &mut handle) => match joined {
                Ok(Ok(Ok(()))) => Ok(DispatchOutcome::Completed),
                Ok(Ok(Err(MatchError::HandlerFault(message)))) => {
                    Err(MatchError::HandlerFault(message))
                }
                Ok(Ok(Err(e))) => Err(MatchError::handler_fault(e.to_string())),
                Ok(Err(join_error)) if join_error.is_panic() => {
                    Err(MatchError::handler_fault(format!("匹配任务panic: {join_error}")))
                }
                Ok(Err(join_error)) => {
                    Err(MatchError::handler_fault(format!("匹配任务被取消: {join_error}")))
                }
                Err(_) => {
                    warn!("匹配任务超过 {:?} 未完成, 请求取消", self.timeout);
                    counter!("match_dispatch_timeouts_total").increment(1);
                    // 尽力取消，在任务的下一个await点生效
                    handle.abort();
                    Ok(DispatchOutcome::TimedOut)
                }
            },
        };

        histogram!("match_dispatch_duration_ms").record(started.elapsed().as_millis() as f64);

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_completed_task() {
        let pool = WorkerPool::new(1);
        let dispatcher = TimedDispatcher::new(Duration::from_secs(20));
        let token = CancellationToken::new();

        let outcome = dispatcher
            .run(&pool, async { Ok::<(), MatchError>(()) }, &token)
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_not_an_error() {
        let pool = WorkerPool::new(1);
        let dispatcher = TimedDispatcher::new(Duration::from_secs(20));
        let token = CancellationToken::new();

        let started = Instant::now();
        let outcome = dispatcher
            .run(
                &pool,
                async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok::<(), MatchError>(())
                },
                &token,
            )
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(21));
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_error_becomes_handler_fault() {
        let pool = WorkerPool::new(1);
        let dispatcher = TimedDispatcher::new(Duration::from_secs(20));
        let token = CancellationToken::new();

        let result = dispatcher
            .run(
                &pool,
                async { Err::<(), _>(MatchError::Internal("boom".to_string())) },
                &token,
            )
            .await;
        assert!(matches!(result, Err(MatchError::HandlerFault(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_panic_becomes_handler_fault() {
        let pool = WorkerPool::new(1);
        let dispatcher = TimedDispatcher::new(Duration::from_secs(20));
        let token = CancellationToken::new();

        let result = dispatcher
            .run(
                &pool,
                async {
                    if true {
                        panic!("handler exploded");
                    }
                    Ok::<(), MatchError>(())
                },
                &token,
            )
            .await;
        assert!(matches!(result, Err(MatchError::HandlerFault(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_wait() {
        let pool = WorkerPool::new(1);
        let dispatcher = TimedDispatcher::new(Duration::from_secs(20));
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let outcome = dispatcher
            .run(
                &pool,
                async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok::<(), MatchError>(())
                },
                &token,
            )
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Interrupted);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_task_is_drained_by_pool_shutdown() {
        let pool = WorkerPool::new(1);
        let dispatcher = TimedDispatcher::new(Duration::from_secs(60));
        let token = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            canceller.cancel();
        });

        let flag = Arc::clone(&finished);
        let outcome = dispatcher
            .run(
                &pool,
                async move {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    flag.store(true, Ordering::SeqCst);
                    Ok::<(), MatchError>(())
                },
                &token,
            )
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Interrupted);
        assert!(!finished.load(Ordering::SeqCst));

        assert!(pool.shutdown(Duration::from_secs(5)).await);
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_task_is_cancelled() {
        let pool = WorkerPool::new(1);
        let dispatcher = TimedDispatcher::new(Duration::from_secs(1));
        let token = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&finished);
        let outcome = dispatcher
            .run(
                &pool,
                async move {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    flag.store(true, Ordering::SeqCst);
                    Ok::<(), MatchError>(())
                },
                &token,
            )
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::TimedOut);

        assert!(pool.shutdown(Duration::from_secs(5)).await);
        assert!(!finished.load(Ordering::SeqCst));
    }
}
