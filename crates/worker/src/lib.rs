pub mod executors;
pub mod factory;
pub mod poller;
pub mod pool;
pub mod timed_dispatcher;

pub use executors::{HttpMatchHandler, LoggingMatchHandler};
pub use factory::{DefaultPollWorkerFactory, PollWorkerFactory};
pub use poller::{AttemptOutcome, PollWorker, PollWorkerSettings, PollerState};
pub use pool::WorkerPool;
pub use timed_dispatcher::{DispatchOutcome, TimedDispatcher};
