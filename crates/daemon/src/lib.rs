pub mod retry_policy;
pub mod supervisor;

pub use retry_policy::{policy_from_config, BoundedRetryPolicy, DefaultRetryPolicy, RetryPolicy};
pub use supervisor::{DaemonReport, DaemonState, ExitReason, MatchDaemon};
