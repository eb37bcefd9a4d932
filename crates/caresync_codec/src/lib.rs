//! # caresync Codec
//!
//! Entity codec for caresync: converts the application's typed records
//! (Profile, LogEntry, Settings) to and from a flat wire representation
//! suitable for queueing and remote transport.
//!
//! ## Wire representation
//!
//! A [`WireRecord`] is a flat field map keyed by string field name. Values
//! are restricted to the scalar [`FieldValue`] variants; nesting is not
//! supported because the remote store's record shape is flat.
//!
//! ## Snapshots
//!
//! Queue payloads are CBOR-encoded snapshots of a `WireRecord` taken at
//! enqueue time ([`to_snapshot_bytes`] / [`from_snapshot_bytes`]). A
//! snapshot never observes later mutations of the source record.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod error;
mod snapshot;
mod types;
mod value;

pub use entity::{LogEntry, Profile, Settings, SyncableRecord};
pub use error::{CodecError, CodecResult};
pub use snapshot::{from_snapshot_bytes, to_snapshot_bytes};
pub use types::{EntityKind, Timestamp};
pub use value::{FieldValue, WireRecord};
