//! Test doubles for the collaborator traits
//!
//! All doubles are cheap to clone and share their recorded state,
//! so a test can keep one handle while the daemon owns another.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use match_core::{
    models::MatchRequest,
    traits::{
        AuditCategory, AuditOperation, AuditRecord, AuditSink, BrokerChannel, BrokerConnection,
        ConnectionProvider, MatchHandler, NullConnection, OperatorAlert,
    },
    MatchError, MatchResult,
};
use tokio::time::Instant;

/// Audit sink that keeps every record in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
    /// Number of records present at each flush
    flushed_at: Arc<Mutex<Vec<usize>>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn count(&self, operation: AuditOperation) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.operation == operation)
            .count()
    }

    pub fn messages(&self, operation: AuditOperation) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.operation == operation)
            .map(|r| r.message.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }

    /// Record count observed by each `flush` call, in call order
    pub fn flushes(&self) -> Vec<usize> {
        self.flushed_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    fn log(&self, category: AuditCategory, operation: AuditOperation, source: &str, message: &str) {
        self.records
            .lock()
            .unwrap()
            .push(AuditRecord::new(category, operation, source, message));
    }

    async fn flush(&self, _grace: Duration) {
        let recorded = self.records.lock().unwrap().len();
        self.flushed_at.lock().unwrap().push(recorded);
    }
}

/// Operator alert that remembers raised alerts
#[derive(Debug, Clone, Default)]
pub struct RecordingAlert {
    raised: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingAlert {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.raised.lock().unwrap().len()
    }

    pub fn raised(&self) -> Vec<(String, String)> {
        self.raised.lock().unwrap().clone()
    }
}

#[async_trait]
impl OperatorAlert for RecordingAlert {
    async fn raise(&self, subject: &str, detail: &str) {
        self.raised
            .lock()
            .unwrap()
            .push((subject.to_string(), detail.to_string()));
    }
}

/// Match handler that records processed requests
#[derive(Debug, Clone, Default)]
pub struct RecordingMatchHandler {
    processed: Arc<Mutex<Vec<MatchRequest>>>,
}

impl RecordingMatchHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processed(&self) -> Vec<MatchRequest> {
        self.processed.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.processed.lock().unwrap().len()
    }
}

#[async_trait]
impl MatchHandler for RecordingMatchHandler {
    async fn process(&self, request: MatchRequest) -> MatchResult<()> {
        self.processed.lock().unwrap().push(request);
        Ok(())
    }
}

/// Match handler that always returns an error
#[derive(Debug, Clone, Default)]
pub struct FailingMatchHandler {
    calls: Arc<AtomicUsize>,
}

impl FailingMatchHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MatchHandler for FailingMatchHandler {
    async fn process(&self, request: MatchRequest) -> MatchResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(MatchError::handler_fault(format!(
            "matching failed for {}",
            request.subject
        )))
    }
}

/// Match handler that panics
#[derive(Debug, Clone, Default)]
pub struct PanickingMatchHandler;

#[async_trait]
impl MatchHandler for PanickingMatchHandler {
    async fn process(&self, request: MatchRequest) -> MatchResult<()> {
        panic!("handler panicked on {}", request.subject);
    }
}

/// Match handler that sleeps before finishing
#[derive(Debug, Clone)]
pub struct SlowMatchHandler {
    delay: Duration,
    started: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
}

impl SlowMatchHandler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: Arc::new(AtomicUsize::new(0)),
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MatchHandler for SlowMatchHandler {
    async fn process(&self, _request: MatchRequest) -> MatchResult<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// How a scripted acquire should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFault {
    /// provider yields nothing
    Nothing,
    /// provider yields the null sentinel
    NullSentinel,
    /// connection is usable but opening a channel fails
    BrokenChannel,
}

/// Connection provider that plays back a script of faults,
/// then delegates to an optional fallback provider
#[derive(Clone)]
pub struct ScriptedConnectionProvider {
    script: Arc<Mutex<VecDeque<ConnectFault>>>,
    fallback: Option<Arc<dyn ConnectionProvider>>,
    acquired_at: Arc<Mutex<Vec<Instant>>>,
}

impl ScriptedConnectionProvider {
    /// Fail every acquire
    pub fn always_failing() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: None,
            acquired_at: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fail `failures` times with `fault`, then delegate to `fallback`
    pub fn failing_then(
        failures: usize,
        fault: ConnectFault,
        fallback: Arc<dyn ConnectionProvider>,
    ) -> Self {
        Self {
            script: Arc::new(Mutex::new(std::iter::repeat(fault).take(failures).collect())),
            fallback: Some(fallback),
            acquired_at: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Play back the given faults, then fail with `Nothing` forever
    pub fn with_script(script: Vec<ConnectFault>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            fallback: None,
            acquired_at: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn acquire_count(&self) -> usize {
        self.acquired_at.lock().unwrap().len()
    }

    /// Instants (tokio clock) at which acquire was called
    pub fn acquire_times(&self) -> Vec<Instant> {
        self.acquired_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionProvider for ScriptedConnectionProvider {
    fn endpoint(&self) -> String {
        "host scripted at port 5672".to_string()
    }

    async fn acquire(&self) -> Option<Box<dyn BrokerConnection>> {
        self.acquired_at.lock().unwrap().push(Instant::now());
        let next = self.script.lock().unwrap().pop_front();

        match (next, &self.fallback) {
            (Some(ConnectFault::Nothing), _) => None,
            (Some(ConnectFault::NullSentinel), _) => Some(Box::new(NullConnection::new(
                self.endpoint(),
            ))),
            (Some(ConnectFault::BrokenChannel), _) => Some(Box::new(BrokenChannelConnection)),
            (None, Some(fallback)) => fallback.acquire().await,
            (None, None) => None,
        }
    }
}

/// Usable connection whose channels can never be opened and whose close hangs
#[derive(Debug, Clone, Default)]
pub struct BrokenChannelConnection;

#[async_trait]
impl BrokerConnection for BrokenChannelConnection {
    fn endpoint(&self) -> String {
        "host broken at port 5672".to_string()
    }

    async fn open_channel(&self) -> MatchResult<Box<dyn BrokerChannel>> {
        Err(MatchError::protocol("channel.open refused"))
    }

    /// Uses up the whole grace period before failing, like an unresponsive broker
    async fn close(&self, grace: Duration) -> MatchResult<()> {
        tokio::time::sleep(grace).await;
        Err(MatchError::protocol("connection already closed"))
    }
}
