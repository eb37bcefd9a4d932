//! Error types for the sync engine.

use caresync_queue::QueueError;
use thiserror::Error;
use uuid::Uuid;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during a sync pass.
///
/// The taxonomy mirrors how the orchestrator reacts:
/// - transport failures are retried up to the queue's retry ceiling;
/// - persistence failures abort only the record that hit them;
/// - mapping failures skip the record for the current pass and resolve
///   themselves on a later pass once the dependency exists.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A remote call did not complete (network, timeout, remote-side error).
    #[error("transport failure: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the call can be retried.
        retryable: bool,
    },

    /// The local persistent store failed a read or write.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// The durable queue failed a read or write.
    #[error("queue failure: {0}")]
    Queue(#[from] QueueError),

    /// A log entry's owning profile has no known remote identity yet.
    ///
    /// Resolves itself once the owner syncs; profiles always upload before
    /// their log entries.
    #[error("log entry {entry_id} references owner {owner_id} with no remote identity")]
    MissingOwnerReference {
        /// The log entry being mapped.
        entry_id: Uuid,
        /// The owner that is not yet known remotely.
        owner_id: Uuid,
    },

    /// A record was structurally unusable (missing or mistyped fields).
    #[error("malformed record in {collection}: {reason}")]
    MalformedRecord {
        /// Collection the record came from or was headed to.
        collection: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl SyncError {
    /// Creates a retryable transport failure.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport failure.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a persistence failure.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Creates a malformed-record failure.
    pub fn malformed(collection: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::MalformedRecord {
            collection: collection.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Persistence(_) | SyncError::Queue(_) => false,
            // Mapping failures resolve on a later pass, not by retrying now.
            SyncError::MissingOwnerReference { .. } | SyncError::MalformedRecord { .. } => false,
        }
    }

    /// Returns true for mapping failures (skip the record this pass).
    #[must_use]
    pub fn is_mapping(&self) -> bool {
        matches!(
            self,
            SyncError::MissingOwnerReference { .. } | SyncError::MalformedRecord { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_retryability() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("certificate rejected").is_retryable());
    }

    #[test]
    fn mapping_errors_are_not_retryable_now() {
        let err = SyncError::MissingOwnerReference {
            entry_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
        };
        assert!(err.is_mapping());
        assert!(!err.is_retryable());

        let err = SyncError::malformed("profiles", "missing field: name");
        assert!(err.is_mapping());
    }

    #[test]
    fn error_display() {
        let err = SyncError::persistence("disk full");
        assert_eq!(err.to_string(), "persistence failure: disk full");
    }
}
