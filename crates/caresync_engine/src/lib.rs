//! # caresync Engine
//!
//! Sync orchestration for caresync: replays the durable operation queue
//! against a remote store, reconciles local and remote state per entity
//! kind, and resolves conflicts by last write wins.
//!
//! ## Sync pass
//!
//! A pass has two phases. Phase one drains the queue oldest-first and
//! applies each operation to the remote store; every application is an
//! idempotent upsert or delete, so replay after a partial pass is safe.
//! Phase two reconciles records modified since the per-kind cursor in
//! both directions, profiles before log entries so that owner references
//! always resolve.
//!
//! At most one pass runs at a time; triggers arriving mid-pass are
//! dropped. Passes run to completion even if connectivity is lost.
//!
//! ## Collaborators
//!
//! The engine drives the [`LocalStore`] and [`RemoteStore`] traits and
//! never touches a concrete database or backend. [`MemoryLocalStore`] and
//! [`MemoryRemoteStore`] are in-memory implementations with failure
//! injection for tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connectivity;
mod cursor;
mod error;
mod mapper;
mod orchestrator;
mod resolve;
mod store;

pub use config::SyncConfig;
pub use connectivity::watch_connectivity;
pub use cursor::CursorState;
pub use error::{SyncError, SyncResult};
pub use mapper::{kind_for_collection, record_identity, RecordMapper, RemoteRecord, RemoteReference};
pub use orchestrator::{PermanentFailure, SyncOrchestrator, SyncOutcome, SyncReport, SyncStats};
pub use resolve::{resolve, Winner};
pub use store::{LocalStore, MemoryLocalStore, MemoryRemoteStore, RemoteStore};
