//! Configuration for the sync orchestrator.

use std::time::Duration;

/// Configuration for sync passes.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Failed replay attempts after which an operation is dropped and
    /// reported as a permanent failure.
    pub retry_ceiling: u32,
    /// Optional per-remote-call timeout. `None` leaves timing to the
    /// remote store implementation.
    pub call_timeout: Option<Duration>,
}

impl SyncConfig {
    /// Creates a configuration with the default retry ceiling of 3.
    #[must_use]
    pub fn new() -> Self {
        Self {
            retry_ceiling: 3,
            call_timeout: None,
        }
    }

    /// Sets the retry ceiling.
    #[must_use]
    pub fn with_retry_ceiling(mut self, ceiling: u32) -> Self {
        self.retry_ceiling = ceiling;
        self
    }

    /// Sets a per-remote-call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
