use std::time::Duration;

use tracing::{Level, event};

use crate::request::Method;

/// Summary of one logical dispatch, logged once the call finishes.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub method: Method,
    pub path: String,
    pub attempts: u8,
    pub reauthenticated: bool,
    pub success: bool,
    pub elapsed: Duration,
}

impl DispatchOutcome {
    pub fn log(&self) {
        event!(
            Level::INFO,
            method = %self.method,
            path = %self.path,
            attempts = self.attempts,
            reauthenticated = self.reauthenticated,
            success = self.success,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "dispatch.outcome"
        );
    }
}
