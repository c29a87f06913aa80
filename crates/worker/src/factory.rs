use std::sync::Arc;

use match_core::{
    models::AttemptId,
    traits::{AuditSink, ConnectionProvider, MatchHandler},
};
use tokio_util::sync::CancellationToken;

use crate::poller::{PollWorker, PollWorkerSettings};

/// 为每次尝试创建新的 [`PollWorker`]
///
/// 共享的协作者（连接提供者、处理器、审计日志）在创建时显式传入。
pub trait PollWorkerFactory: Send + Sync {
    fn create(&self, attempt_id: AttemptId, shutdown: CancellationToken) -> PollWorker;
}

impl<F> PollWorkerFactory for F
where
    F: Fn(AttemptId, CancellationToken) -> PollWorker + Send + Sync,
{
    fn create(&self, attempt_id: AttemptId, shutdown: CancellationToken) -> PollWorker {
        self(attempt_id, shutdown)
    }
}

pub struct DefaultPollWorkerFactory {
    settings: PollWorkerSettings,
    provider: Arc<dyn ConnectionProvider>,
    handler: Arc<dyn MatchHandler>,
    audit: Arc<dyn AuditSink>,
}

impl DefaultPollWorkerFactory {
    pub fn new(
        settings: PollWorkerSettings,
        provider: Arc<dyn ConnectionProvider>,
        handler: Arc<dyn MatchHandler>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            settings,
            provider,
            handler,
            audit,
        }
    }
}

impl PollWorkerFactory for DefaultPollWorkerFactory {
    fn create(&self, attempt_id: AttemptId, shutdown: CancellationToken) -> PollWorker {
        PollWorker::new(
            attempt_id,
            self.settings.clone(),
            Arc::clone(&self.provider),
            Arc::clone(&self.handler),
            Arc::clone(&self.audit),
            shutdown,
        )
    }
}
