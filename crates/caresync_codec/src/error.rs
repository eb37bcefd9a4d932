//! Error types for the codec.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding records.
#[derive(Error, Debug)]
pub enum CodecError {
    /// A required field was absent from the wire record.
    #[error("missing field: {field}")]
    MissingField {
        /// Name of the missing field.
        field: String,
    },

    /// A field was present but had the wrong shape.
    #[error("field {field} has wrong type, expected {expected}")]
    WrongType {
        /// Name of the offending field.
        field: String,
        /// The expected value shape.
        expected: &'static str,
    },

    /// Snapshot bytes could not be encoded.
    #[error("snapshot encode failed: {0}")]
    Encode(String),

    /// Snapshot bytes could not be decoded.
    #[error("snapshot decode failed: {0}")]
    Decode(String),

    /// An entity kind code was not recognized.
    #[error("unknown entity kind: {0}")]
    UnknownEntityKind(String),
}

impl CodecError {
    /// Creates a missing-field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates a wrong-type error.
    pub fn wrong_type(field: impl Into<String>, expected: &'static str) -> Self {
        Self::WrongType {
            field: field.into(),
            expected,
        }
    }
}
