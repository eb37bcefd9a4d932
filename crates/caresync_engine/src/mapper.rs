//! Translation between local wire records and remote-native records.

use crate::error::{SyncError, SyncResult};
use caresync_codec::{
    EntityKind, LogEntry, Profile, Settings, SyncableRecord, Timestamp, WireRecord,
};
use std::collections::HashSet;
use uuid::Uuid;

/// A typed pointer from one remote record to another.
///
/// The remote store's only linkage primitive: log entries reference their
/// owning profile through one of these rather than a plain id field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteReference {
    /// Collection the referenced record lives in.
    pub collection: String,
    /// Id of the referenced record.
    pub id: Uuid,
}

impl RemoteReference {
    /// Creates a reference into a profile's collection.
    #[must_use]
    pub fn to_profile(id: Uuid) -> Self {
        Self {
            collection: EntityKind::Profile.collection_name().to_string(),
            id,
        }
    }
}

/// A record in the remote store's native shape.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    /// Collection the record belongs to.
    pub collection: String,
    /// Record id, identical to the local record's id.
    pub id: Uuid,
    /// Flat field map, without the id or owner fields.
    pub fields: WireRecord,
    /// Owner linkage, present only for log entries.
    pub owner: Option<RemoteReference>,
}

/// Maps records between the local wire shape and the remote shape.
///
/// The mapper also tracks which profile ids are known to exist remotely
/// within the current pass. A log entry cannot be mapped outward until its
/// owner is in that set; the sync order (profiles before log entries) and
/// the orchestrator's owner probe keep the set populated.
#[derive(Debug, Default)]
pub struct RecordMapper {
    known_owners: HashSet<Uuid>,
}

impl RecordMapper {
    /// Creates a mapper with no known owners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a profile exists remotely.
    pub fn mark_owner_known(&mut self, id: Uuid) {
        self.known_owners.insert(id);
    }

    /// Returns true if the profile is known to exist remotely.
    #[must_use]
    pub fn owner_known(&self, id: Uuid) -> bool {
        self.known_owners.contains(&id)
    }

    /// Maps a local wire record into the remote shape.
    ///
    /// For log entries the `owner_id` field is lifted into a
    /// [`RemoteReference`].
    ///
    /// # Errors
    ///
    /// [`SyncError::MissingOwnerReference`] when a log entry's owner has no
    /// known remote identity yet, [`SyncError::MalformedRecord`] when the
    /// record lacks its id or timestamp.
    pub fn to_remote_record(
        &self,
        kind: EntityKind,
        record: &WireRecord,
    ) -> SyncResult<RemoteRecord> {
        let collection = kind.collection_name();
        let (id, _) = record_identity(record, collection)?;

        let mut fields = record.clone();
        fields.remove("id");

        let owner = if kind == EntityKind::LogEntry {
            let owner_id = fields
                .remove("owner_id")
                .and_then(|v| v.as_id())
                .ok_or_else(|| SyncError::malformed(collection, "missing field: owner_id"))?;
            if !self.owner_known(owner_id) {
                return Err(SyncError::MissingOwnerReference {
                    entry_id: id,
                    owner_id,
                });
            }
            Some(RemoteReference::to_profile(owner_id))
        } else {
            None
        };

        Ok(RemoteRecord {
            collection: collection.to_string(),
            id,
            fields,
            owner,
        })
    }

    /// Maps a remote record back into the local wire shape, restoring the
    /// id and owner fields and validating the result against the typed
    /// entity schema.
    ///
    /// # Errors
    ///
    /// [`SyncError::MalformedRecord`] when the collection is unknown or the
    /// record fails schema validation. Callers skip such records; they never
    /// abort a pass.
    pub fn from_remote_record(&self, record: &RemoteRecord) -> SyncResult<WireRecord> {
        let kind = kind_for_collection(&record.collection)
            .ok_or_else(|| SyncError::malformed(record.collection.as_str(), "unknown collection"))?;

        let mut wire = record.fields.clone();
        wire.set("id", record.id);
        if let Some(owner) = &record.owner {
            wire.set("owner_id", owner.id);
        }

        match kind {
            EntityKind::Profile => {
                Profile::from_wire(&wire)
                    .map_err(|e| SyncError::malformed(record.collection.as_str(), e))?;
            }
            EntityKind::LogEntry => {
                LogEntry::from_wire(&wire)
                    .map_err(|e| SyncError::malformed(record.collection.as_str(), e))?;
            }
            EntityKind::Settings => {
                Settings::from_wire(&wire)
                    .map_err(|e| SyncError::malformed(record.collection.as_str(), e))?;
            }
        }

        Ok(wire)
    }
}

/// Resolves a remote collection name to its entity kind.
#[must_use]
pub fn kind_for_collection(collection: &str) -> Option<EntityKind> {
    EntityKind::SYNC_ORDER
        .into_iter()
        .find(|kind| kind.collection_name() == collection)
}

/// Pulls the id and `updated_at` out of a wire record.
///
/// # Errors
///
/// [`SyncError::MalformedRecord`] when either field is absent or mistyped.
pub fn record_identity(record: &WireRecord, collection: &str) -> SyncResult<(Uuid, Timestamp)> {
    let id = record
        .require_id("id")
        .map_err(|e| SyncError::malformed(collection, e))?;
    let updated_at = record
        .require_timestamp("updated_at")
        .map_err(|e| SyncError::malformed(collection, e))?;
    Ok((id, updated_at))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_maps_without_owner() {
        let mapper = RecordMapper::new();
        let profile = Profile::new("Willow", Timestamp::ZERO, "UTC");

        let remote = mapper
            .to_remote_record(EntityKind::Profile, &profile.to_wire())
            .unwrap();
        assert_eq!(remote.collection, "profiles");
        assert_eq!(remote.id, profile.id);
        assert_eq!(remote.owner, None);
        assert!(!remote.fields.contains("id"));
    }

    #[test]
    fn log_entry_owner_becomes_reference() {
        let owner = Uuid::new_v4();
        let mut mapper = RecordMapper::new();
        mapper.mark_owner_known(owner);

        let entry = LogEntry::new(owner, "feed");
        let remote = mapper
            .to_remote_record(EntityKind::LogEntry, &entry.to_wire())
            .unwrap();

        assert_eq!(remote.owner, Some(RemoteReference::to_profile(owner)));
        assert!(!remote.fields.contains("owner_id"));
    }

    #[test]
    fn unknown_owner_is_rejected() {
        let mapper = RecordMapper::new();
        let entry = LogEntry::new(Uuid::new_v4(), "feed");

        let err = mapper
            .to_remote_record(EntityKind::LogEntry, &entry.to_wire())
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::MissingOwnerReference { entry_id, owner_id }
                if entry_id == entry.id && owner_id == entry.owner_id
        ));
    }

    #[test]
    fn remote_roundtrip_restores_owner_field() {
        let owner = Uuid::new_v4();
        let mut mapper = RecordMapper::new();
        mapper.mark_owner_known(owner);

        let entry = LogEntry::new(owner, "sleep");
        let remote = mapper
            .to_remote_record(EntityKind::LogEntry, &entry.to_wire())
            .unwrap();
        let wire = mapper.from_remote_record(&remote).unwrap();

        assert_eq!(LogEntry::from_wire(&wire).unwrap(), entry);
    }

    #[test]
    fn malformed_remote_record_is_rejected() {
        let mapper = RecordMapper::new();
        let remote = RemoteRecord {
            collection: "profiles".to_string(),
            id: Uuid::new_v4(),
            // No name, no timestamps.
            fields: WireRecord::new(),
            owner: None,
        };

        let err = mapper.from_remote_record(&remote).unwrap_err();
        assert!(matches!(err, SyncError::MalformedRecord { .. }));
    }

    #[test]
    fn unknown_collection_is_rejected() {
        let mapper = RecordMapper::new();
        let remote = RemoteRecord {
            collection: "mystery".to_string(),
            id: Uuid::new_v4(),
            fields: WireRecord::new(),
            owner: None,
        };

        let err = mapper.from_remote_record(&remote).unwrap_err();
        assert!(matches!(err, SyncError::MalformedRecord { .. }));
        assert_eq!(kind_for_collection("mystery"), None);
    }

    #[test]
    fn identity_requires_id_and_timestamp() {
        let mut record = WireRecord::new();
        record.set("id", Uuid::new_v4());

        let err = record_identity(&record, "profiles").unwrap_err();
        assert!(matches!(err, SyncError::MalformedRecord { .. }));
    }
}
