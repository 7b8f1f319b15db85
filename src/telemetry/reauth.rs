use std::time::SystemTime;

use tracing::{Level, event};
use uuid::Uuid;

use crate::errors::Error;

#[derive(Clone, Debug)]
pub enum ReauthOutcome {
    Refreshed,
    /// Another caller refreshed while this one waited for the lock.
    AlreadyRefreshed,
}

/// Structured events for one re-authentication attempt.
#[derive(Clone, Debug)]
pub struct ReauthTelemetry {
    attempt_id: Uuid,
    flow: &'static str,
}

impl ReauthTelemetry {
    pub fn new(flow: &'static str) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            flow,
        }
    }

    pub fn emit_start(&self, at: SystemTime) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            flow = self.flow,
            timestamp = ?at,
            "reauth.start"
        );
    }

    pub fn emit_success(&self, outcome: ReauthOutcome, token_len: usize, at: SystemTime) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            flow = self.flow,
            timestamp = ?at,
            outcome = ?outcome,
            token_len,
            "reauth.success"
        );
    }

    pub fn emit_skipped(&self, stale_generation: u64, generation: u64) {
        event!(
            Level::DEBUG,
            attempt_id = %self.attempt_id,
            flow = self.flow,
            stale_generation,
            generation,
            outcome = ?ReauthOutcome::AlreadyRefreshed,
            "reauth.skipped"
        );
    }

    pub fn emit_failure(&self, error: &Error, at: SystemTime) {
        event!(
            Level::ERROR,
            attempt_id = %self.attempt_id,
            flow = self.flow,
            timestamp = ?at,
            error = %error,
            "reauth.failure"
        );
    }
}
