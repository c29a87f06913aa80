use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use match_core::{MatchError, MatchResult};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// 有界工作池
///
/// 每次轮询尝试新建一个，尝试结束时关闭，从不跨尝试共享。
/// 同时运行的任务数不超过 `size`，超出的任务在池内排队等待许可。
#[derive(Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            tracker: TaskTracker::new(),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// 尚未结束的任务数（含排队中的）
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.tracker.is_closed()
    }

    /// 提交一个任务，返回其句柄
    pub fn spawn<F>(&self, task: F) -> MatchResult<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(MatchError::InvalidState("工作池已关闭".to_string()));
        }

        let permits = Arc::clone(&self.permits);
        Ok(self.tracker.spawn(async move {
            let _permit = permits.acquire_owned().await;
            task.await
        }))
    }

    /// 关闭工作池并在宽限期内等待任务结束
    ///
    /// 宽限期后仍在运行的任务被放弃而不是中止。返回是否全部任务已结束。
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        debug!("工作池关闭中, 剩余任务: {}", self.tracker.len());

        match timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                info!("工作池已完全终止");
                true
            }
            Err(_) => {
                warn!(
                    "工作池在 {:?} 内未能终止, 放弃 {} 个仍在运行的任务",
                    grace,
                    self.tracker.len()
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_pool_bounds_concurrency() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                pool.spawn(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .unwrap()
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_short_tasks() {
        let pool = WorkerPool::new(1);
        pool.spawn(tokio::time::sleep(Duration::from_millis(200)))
            .unwrap();

        assert!(pool.shutdown(Duration::from_secs(1)).await);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_long_tasks() {
        let pool = WorkerPool::new(1);
        let finished = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&finished);
        pool.spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            flag.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let started = tokio::time::Instant::now();
        assert!(!pool.shutdown(Duration::from_secs(1)).await);
        assert!(started.elapsed() < Duration::from_secs(2));

        // 被放弃的任务不会被中止
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spawn_after_shutdown_rejected() {
        let pool = WorkerPool::new(1);
        pool.shutdown(Duration::from_millis(10)).await;
        assert!(pool.is_shutdown());
        assert!(matches!(
            pool.spawn(async {}),
            Err(MatchError::InvalidState(_))
        ));
    }
}
