//! Queued operations.

use caresync_codec::{EntityKind, SyncableRecord, Timestamp, WireRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The mutation half of an operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    /// Create a record that the remote store has never seen.
    Create,
    /// Update an existing record.
    Update,
    /// Delete a record.
    Delete,
}

/// The kind of a queued operation: {create, update, delete} crossed with
/// the entity kind it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// Create a profile.
    CreateProfile,
    /// Update a profile.
    UpdateProfile,
    /// Delete a profile.
    DeleteProfile,
    /// Create a log entry.
    CreateLogEntry,
    /// Update a log entry.
    UpdateLogEntry,
    /// Delete a log entry.
    DeleteLogEntry,
    /// Create the settings record.
    CreateSettings,
    /// Update the settings record.
    UpdateSettings,
    /// Delete the settings record.
    DeleteSettings,
}

impl OperationKind {
    /// Builds the kind from its mutation and entity halves.
    #[must_use]
    pub const fn from_parts(mutation: Mutation, entity: EntityKind) -> Self {
        match (mutation, entity) {
            (Mutation::Create, EntityKind::Profile) => Self::CreateProfile,
            (Mutation::Update, EntityKind::Profile) => Self::UpdateProfile,
            (Mutation::Delete, EntityKind::Profile) => Self::DeleteProfile,
            (Mutation::Create, EntityKind::LogEntry) => Self::CreateLogEntry,
            (Mutation::Update, EntityKind::LogEntry) => Self::UpdateLogEntry,
            (Mutation::Delete, EntityKind::LogEntry) => Self::DeleteLogEntry,
            (Mutation::Create, EntityKind::Settings) => Self::CreateSettings,
            (Mutation::Update, EntityKind::Settings) => Self::UpdateSettings,
            (Mutation::Delete, EntityKind::Settings) => Self::DeleteSettings,
        }
    }

    /// Returns the mutation half.
    #[must_use]
    pub const fn mutation(self) -> Mutation {
        match self {
            Self::CreateProfile | Self::CreateLogEntry | Self::CreateSettings => Mutation::Create,
            Self::UpdateProfile | Self::UpdateLogEntry | Self::UpdateSettings => Mutation::Update,
            Self::DeleteProfile | Self::DeleteLogEntry | Self::DeleteSettings => Mutation::Delete,
        }
    }

    /// Returns the entity kind half.
    #[must_use]
    pub const fn entity_kind(self) -> EntityKind {
        match self {
            Self::CreateProfile | Self::UpdateProfile | Self::DeleteProfile => EntityKind::Profile,
            Self::CreateLogEntry | Self::UpdateLogEntry | Self::DeleteLogEntry => {
                EntityKind::LogEntry
            }
            Self::CreateSettings | Self::UpdateSettings | Self::DeleteSettings => {
                EntityKind::Settings
            }
        }
    }

    /// Converts to a stable numeric code for journal encoding.
    #[must_use]
    pub const fn to_code(self) -> u8 {
        match self {
            Self::CreateProfile => 1,
            Self::UpdateProfile => 2,
            Self::DeleteProfile => 3,
            Self::CreateLogEntry => 4,
            Self::UpdateLogEntry => 5,
            Self::DeleteLogEntry => 6,
            Self::CreateSettings => 7,
            Self::UpdateSettings => 8,
            Self::DeleteSettings => 9,
        }
    }

    /// Converts from a numeric code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::CreateProfile),
            2 => Some(Self::UpdateProfile),
            3 => Some(Self::DeleteProfile),
            4 => Some(Self::CreateLogEntry),
            5 => Some(Self::UpdateLogEntry),
            6 => Some(Self::DeleteLogEntry),
            7 => Some(Self::CreateSettings),
            8 => Some(Self::UpdateSettings),
            9 => Some(Self::DeleteSettings),
            _ => None,
        }
    }
}

/// One pending local mutation awaiting remote application.
///
/// The payload is a snapshot of the record's wire representation taken at
/// enqueue time; replay applies the state as of enqueue even if the record
/// was mutated again before the queue drained. Apart from `retry_count`, a
/// queued operation never changes after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedOperation {
    /// Unique operation id, assigned at enqueue time and never reused.
    pub id: Uuid,
    /// What the operation does and to which entity kind.
    pub kind: OperationKind,
    /// Id of the affected record, when the operation targets one.
    pub target_id: Option<Uuid>,
    /// Wire snapshot of the record at enqueue time.
    pub payload: WireRecord,
    /// Enqueue time; orders replay oldest-first. Never mutated.
    pub enqueued_at: Timestamp,
    /// Number of failed replay attempts so far.
    pub retry_count: u32,
}

impl QueuedOperation {
    /// Creates a new operation with a fresh id and a zero retry count.
    #[must_use]
    pub fn new(kind: OperationKind, target_id: Option<Uuid>, payload: WireRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            target_id,
            payload,
            enqueued_at: Timestamp::now(),
            retry_count: 0,
        }
    }

    /// Snapshots a typed record into an operation of the given mutation.
    #[must_use]
    pub fn capture<R: SyncableRecord>(mutation: Mutation, record: &R) -> Self {
        Self::new(
            OperationKind::from_parts(mutation, R::KIND),
            Some(record.id()),
            record.to_wire(),
        )
    }
}
