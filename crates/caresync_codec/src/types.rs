//! Core type definitions for caresync.

use crate::error::CodecError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A last-modified timestamp in milliseconds since the Unix epoch.
///
/// Timestamps order edits for conflict resolution and bound the
/// reconciliation window. Every local mutation of a syncable record must
/// bump its timestamp; the sync engine never generates timestamps on a
/// record's behalf.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// The epoch boundary; predates every real record.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Creates a timestamp from milliseconds since the Unix epoch.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the raw millisecond value.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns the current wall-clock time.
    ///
    /// Clocks across devices are not assumed to agree; see the conflict
    /// resolver for the accepted consequences.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));
        Self(millis)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ts:{}", self.0)
    }
}

/// The kind of entity being synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// A caregiver-managed profile (the owner of log entries).
    Profile,
    /// A single logged event, owned by a profile.
    LogEntry,
    /// Application settings shared across devices.
    Settings,
}

impl EntityKind {
    /// All entity kinds in upload order.
    ///
    /// Profiles come first so that a LogEntry's owner reference can always
    /// be resolved before the LogEntry itself is uploaded.
    pub const SYNC_ORDER: [EntityKind; 3] =
        [EntityKind::Profile, EntityKind::LogEntry, EntityKind::Settings];

    /// Returns the remote collection name for this kind.
    #[must_use]
    pub const fn collection_name(self) -> &'static str {
        match self {
            EntityKind::Profile => "profiles",
            EntityKind::LogEntry => "log_entries",
            EntityKind::Settings => "settings",
        }
    }

    /// Returns the stable string code for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Profile => "profile",
            EntityKind::LogEntry => "log_entry",
            EntityKind::Settings => "settings",
        }
    }

    /// Parses a stable string code.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownEntityKind`] for unrecognized codes.
    pub fn parse(code: &str) -> Result<Self, CodecError> {
        match code {
            "profile" => Ok(EntityKind::Profile),
            "log_entry" => Ok(EntityKind::LogEntry),
            "settings" => Ok(EntityKind::Settings),
            other => Err(CodecError::UnknownEntityKind(other.to_string())),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_ordering() {
        let t1 = Timestamp::from_millis(10);
        let t2 = Timestamp::from_millis(12);
        assert!(t1 < t2);
        assert!(Timestamp::ZERO < t1);
    }

    #[test]
    fn timestamp_now_is_positive() {
        assert!(Timestamp::now() > Timestamp::ZERO);
    }

    #[test]
    fn entity_kind_codes_roundtrip() {
        for kind in EntityKind::SYNC_ORDER {
            assert_eq!(EntityKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(EntityKind::parse("bogus").is_err());
    }

    #[test]
    fn sync_order_puts_profiles_first() {
        assert_eq!(EntityKind::SYNC_ORDER[0], EntityKind::Profile);
        assert_eq!(EntityKind::SYNC_ORDER[1], EntityKind::LogEntry);
    }

    #[test]
    fn collection_names() {
        assert_eq!(EntityKind::Profile.collection_name(), "profiles");
        assert_eq!(EntityKind::LogEntry.collection_name(), "log_entries");
        assert_eq!(EntityKind::Settings.collection_name(), "settings");
    }
}
