//! Typed domain entities and their wire codecs.

use crate::error::CodecResult;
use crate::types::{EntityKind, Timestamp};
use crate::value::WireRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A record that participates in synchronization.
///
/// Every syncable record carries a stable id and an `updated_at` timestamp
/// that each local mutation must bump via [`SyncableRecord::touch`].
/// `updated_at` is the sole signal the conflict resolver consults.
pub trait SyncableRecord: Sized {
    /// The entity kind of this record type.
    const KIND: EntityKind;

    /// Stable identifier, identical across devices.
    fn id(&self) -> Uuid;

    /// Last-modified timestamp.
    fn updated_at(&self) -> Timestamp;

    /// Bumps the last-modified timestamp after a local mutation.
    fn touch(&mut self, now: Timestamp);

    /// Flattens the record into its wire representation.
    fn to_wire(&self) -> WireRecord;

    /// Rebuilds the record from its wire representation.
    ///
    /// # Errors
    ///
    /// Fails if required fields are absent or of the wrong shape.
    fn from_wire(record: &WireRecord) -> CodecResult<Self>;
}

/// A caregiver-managed profile; the owner of log entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Stable identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Date of birth.
    pub date_of_birth: Timestamp,
    /// Optional sex marker.
    pub sex: Option<String>,
    /// IANA timezone name for local-time rendering.
    pub timezone: String,
    /// Creation time, set once.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
}

impl Profile {
    /// Creates a new profile with a fresh id and both timestamps set to `now`.
    #[must_use]
    pub fn new(name: impl Into<String>, date_of_birth: Timestamp, timezone: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            date_of_birth,
            sex: None,
            timezone: timezone.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl SyncableRecord for Profile {
    const KIND: EntityKind = EntityKind::Profile;

    fn id(&self) -> Uuid {
        self.id
    }

    fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    fn touch(&mut self, now: Timestamp) {
        self.updated_at = now;
    }

    fn to_wire(&self) -> WireRecord {
        let mut record = WireRecord::new();
        record
            .set("id", self.id)
            .set("name", self.name.clone())
            .set("date_of_birth", self.date_of_birth)
            .set("timezone", self.timezone.clone())
            .set("created_at", self.created_at)
            .set("updated_at", self.updated_at);
        record.set_opt("sex", self.sex.clone());
        record
    }

    fn from_wire(record: &WireRecord) -> CodecResult<Self> {
        Ok(Self {
            id: record.require_id("id")?,
            name: record.require_text("name")?.to_string(),
            date_of_birth: record.require_timestamp("date_of_birth")?,
            sex: record.text_opt("sex"),
            timezone: record.require_text("timezone")?.to_string(),
            created_at: record.require_timestamp("created_at")?,
            updated_at: record.require_timestamp("updated_at")?,
        })
    }
}

/// A single logged event (feed, sleep, diaper change, ...) owned by a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Stable identifier.
    pub id: Uuid,
    /// The owning profile's id.
    pub owner_id: Uuid,
    /// Event category, e.g. `"feed"` or `"sleep"`.
    pub kind: String,
    /// Optional category refinement, e.g. `"bottle"`.
    pub subtype: Option<String>,
    /// Measured amount, when the category has one.
    pub amount: Option<f64>,
    /// Unit of the amount, e.g. `"ml"`.
    pub unit: Option<String>,
    /// Event start.
    pub started_at: Timestamp,
    /// Event end, for events with duration.
    pub ended_at: Option<Timestamp>,
    /// Free-form caregiver note.
    pub note: Option<String>,
    /// Creation time, set once.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
}

impl LogEntry {
    /// Creates a new log entry for the given owner, starting now.
    #[must_use]
    pub fn new(owner_id: Uuid, kind: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            kind: kind.into(),
            subtype: None,
            amount: None,
            unit: None,
            started_at: now,
            ended_at: None,
            note: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl SyncableRecord for LogEntry {
    const KIND: EntityKind = EntityKind::LogEntry;

    fn id(&self) -> Uuid {
        self.id
    }

    fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    fn touch(&mut self, now: Timestamp) {
        self.updated_at = now;
    }

    fn to_wire(&self) -> WireRecord {
        let mut record = WireRecord::new();
        record
            .set("id", self.id)
            .set("owner_id", self.owner_id)
            .set("kind", self.kind.clone())
            .set("started_at", self.started_at)
            .set("created_at", self.created_at)
            .set("updated_at", self.updated_at);
        record.set_opt("subtype", self.subtype.clone());
        record.set_opt("amount", self.amount);
        record.set_opt("unit", self.unit.clone());
        record.set_opt("ended_at", self.ended_at);
        record.set_opt("note", self.note.clone());
        record
    }

    fn from_wire(record: &WireRecord) -> CodecResult<Self> {
        Ok(Self {
            id: record.require_id("id")?,
            owner_id: record.require_id("owner_id")?,
            kind: record.require_text("kind")?.to_string(),
            subtype: record.text_opt("subtype"),
            amount: record.float_opt("amount"),
            unit: record.text_opt("unit"),
            started_at: record.require_timestamp("started_at")?,
            ended_at: record.timestamp_opt("ended_at"),
            note: record.text_opt("note"),
            created_at: record.require_timestamp("created_at")?,
            updated_at: record.require_timestamp("updated_at")?,
        })
    }
}

/// Application settings shared across a caregiver group's devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Stable identifier (one record per caregiver group).
    pub id: Uuid,
    /// `"metric"` or `"imperial"`.
    pub unit_system: String,
    /// `"12h"` or `"24h"`.
    pub clock_format: String,
    /// Whether reminder notifications are enabled.
    pub notifications_enabled: bool,
    /// Creation time, set once.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
}

impl Settings {
    /// Creates settings with the given defaults and a fresh id.
    #[must_use]
    pub fn new(unit_system: impl Into<String>, clock_format: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            id: Uuid::new_v4(),
            unit_system: unit_system.into(),
            clock_format: clock_format.into(),
            notifications_enabled: true,
            created_at: now,
            updated_at: now,
        }
    }
}

impl SyncableRecord for Settings {
    const KIND: EntityKind = EntityKind::Settings;

    fn id(&self) -> Uuid {
        self.id
    }

    fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    fn touch(&mut self, now: Timestamp) {
        self.updated_at = now;
    }

    fn to_wire(&self) -> WireRecord {
        let mut record = WireRecord::new();
        record
            .set("id", self.id)
            .set("unit_system", self.unit_system.clone())
            .set("clock_format", self.clock_format.clone())
            .set("notifications_enabled", self.notifications_enabled)
            .set("created_at", self.created_at)
            .set("updated_at", self.updated_at);
        record
    }

    fn from_wire(record: &WireRecord) -> CodecResult<Self> {
        Ok(Self {
            id: record.require_id("id")?,
            unit_system: record.require_text("unit_system")?.to_string(),
            clock_format: record.require_text("clock_format")?.to_string(),
            notifications_enabled: record.require_bool("notifications_enabled")?,
            created_at: record.require_timestamp("created_at")?,
            updated_at: record.require_timestamp("updated_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    #[test]
    fn profile_wire_roundtrip() {
        let mut profile = Profile::new("Willow", Timestamp::from_millis(1_650_000_000_000), "Europe/London");
        profile.sex = Some("f".to_string());

        let decoded = Profile::from_wire(&profile.to_wire()).unwrap();
        assert_eq!(decoded, profile);
    }

    #[test]
    fn log_entry_wire_roundtrip() {
        let mut entry = LogEntry::new(Uuid::new_v4(), "feed");
        entry.subtype = Some("bottle".to_string());
        entry.amount = Some(120.0);
        entry.unit = Some("ml".to_string());
        entry.ended_at = Some(Timestamp::now());
        entry.note = Some("fussy before".to_string());

        let decoded = LogEntry::from_wire(&entry.to_wire()).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn log_entry_optional_fields_stay_absent() {
        let entry = LogEntry::new(Uuid::new_v4(), "sleep");
        let wire = entry.to_wire();

        assert!(!wire.contains("amount"));
        assert!(!wire.contains("note"));

        let decoded = LogEntry::from_wire(&wire).unwrap();
        assert_eq!(decoded.amount, None);
        assert_eq!(decoded.note, None);
    }

    #[test]
    fn settings_wire_roundtrip() {
        let settings = Settings::new("metric", "24h");
        let decoded = Settings::from_wire(&settings.to_wire()).unwrap();
        assert_eq!(decoded, settings);
    }

    #[test]
    fn from_wire_rejects_missing_owner() {
        let entry = LogEntry::new(Uuid::new_v4(), "feed");
        let mut wire = entry.to_wire();
        wire.remove("owner_id");

        let err = LogEntry::from_wire(&wire).unwrap_err();
        assert!(matches!(err, CodecError::MissingField { .. }));
    }

    #[test]
    fn touch_bumps_updated_at() {
        let mut profile = Profile::new("Willow", Timestamp::ZERO, "UTC");
        let later = Timestamp::from_millis(profile.updated_at.as_millis() + 500);
        profile.touch(later);
        assert_eq!(profile.updated_at, later);
    }
}
