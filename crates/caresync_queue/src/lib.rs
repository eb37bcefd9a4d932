//! # caresync Queue
//!
//! Durable local operation queue: captures writes made while disconnected
//! and survives process restarts.
//!
//! ## Directory layout
//!
//! ```text
//! <queue_path>/
//! ├─ LOCK             # Advisory lock for single-writer
//! └─ queue.journal    # Append-only CBOR-framed journal
//! ```
//!
//! The LOCK file ensures only one process owns the queue at a time. The
//! journal records every enqueue, removal, and retry bump; opening the
//! queue replays the journal to rebuild the pending set.
//!
//! ## Invariants
//!
//! - An operation persists before `enqueue` returns.
//! - `drain` returns operations in `enqueued_at` order and removes nothing.
//! - A queued operation is immutable except for its retry count.
//! - Operations leave the queue only through explicit `remove`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod journal;
mod operation;
mod queue;

pub use error::{QueueError, QueueResult};
pub use operation::{Mutation, OperationKind, QueuedOperation};
pub use queue::DurableQueue;
