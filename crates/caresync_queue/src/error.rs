//! Error types for the durable queue.

use thiserror::Error;
use uuid::Uuid;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur while persisting or replaying the queue.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Journal or lock file I/O failed.
    #[error("queue I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A journal payload could not be encoded or decoded.
    #[error("queue codec error: {0}")]
    Codec(#[from] caresync_codec::CodecError),

    /// Another process holds the queue lock.
    #[error("queue directory is locked by another process")]
    Locked,

    /// The journal contains an unreadable record.
    #[error("corrupt journal: {0}")]
    CorruptJournal(String),

    /// A retry bump referenced an operation that is not queued.
    #[error("unknown operation: {0}")]
    UnknownOperation(Uuid),
}

impl QueueError {
    /// Creates a corrupt-journal error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptJournal(message.into())
    }
}
