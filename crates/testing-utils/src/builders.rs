//! Test data builders
//!
//! Builders for request payloads and for configurations whose timings are
//! short enough to cycle several attempts inside one test.

use match_core::{config::AppConfig, models::MatchRequest};
use uuid::Uuid;

/// Builder for creating test MatchRequest payloads
pub struct MatchRequestBuilder {
    request: MatchRequest,
}

impl MatchRequestBuilder {
    pub fn new() -> Self {
        Self {
            request: MatchRequest::new("test-subject", serde_json::json!({})),
        }
    }

    pub fn with_id(mut self, request_id: Uuid) -> Self {
        self.request.request_id = request_id;
        self
    }

    pub fn with_subject(mut self, subject: &str) -> Self {
        self.request.subject = subject.to_string();
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.request.parameters = parameters;
        self
    }

    pub fn build(self) -> MatchRequest {
        self.request
    }

    /// Serialized JSON payload as it would sit on the queue
    pub fn payload(self) -> Vec<u8> {
        serde_json::to_vec(&self.request).unwrap()
    }
}

impl Default for MatchRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload that is not a match request
pub fn invalid_payload() -> Vec<u8> {
    b"\x00\x01 definitely not json".to_vec()
}

/// Configuration with short intervals for fast test cycles
pub fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.daemon.poll_interval_ms = 50;
    config.daemon.initial_backoff_ms = 100;
    config.daemon.backoff_max_ms = 400;
    config.daemon.dispatch_timeout_seconds = 1;
    config.daemon.pool_shutdown_grace_seconds = 1;
    config.daemon.connection_close_grace_ms = 50;
    config.worker_pool.size = 2;
    config.rabbitmq.queue = "match.test".to_string();
    config
}
