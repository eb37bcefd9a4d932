//! CBOR snapshot bytes for queue payloads.

use crate::error::{CodecError, CodecResult};
use crate::value::WireRecord;

/// Encodes a wire record to CBOR snapshot bytes.
///
/// The result is a point-in-time copy suitable for durable queue storage;
/// mutating the source record afterwards does not affect the snapshot.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn to_snapshot_bytes(record: &WireRecord) -> CodecResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(record, &mut bytes).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Decodes CBOR snapshot bytes back into a wire record.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the bytes are not a valid snapshot.
pub fn from_snapshot_bytes(bytes: &[u8]) -> CodecResult<WireRecord> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}
