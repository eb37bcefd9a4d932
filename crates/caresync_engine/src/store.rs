//! Store traits and in-memory fakes.
//!
//! The engine never talks to a concrete database or backend service; it
//! drives these two traits. The memory fakes are exported (not test-gated)
//! so downstream crates can exercise the orchestrator without standing up
//! real storage.

use crate::error::{SyncError, SyncResult};
use crate::mapper::RemoteRecord;
use async_trait::async_trait;
use caresync_codec::{EntityKind, Timestamp, WireRecord};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use uuid::Uuid;

/// The device's persistent record store.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Fetches a record by id.
    async fn get(&self, kind: EntityKind, id: Uuid) -> SyncResult<Option<WireRecord>>;

    /// Inserts or replaces a record.
    async fn upsert(&self, kind: EntityKind, record: WireRecord) -> SyncResult<()>;

    /// Deletes a record. Deleting a missing id is a no-op.
    async fn delete(&self, kind: EntityKind, id: Uuid) -> SyncResult<()>;

    /// Records with `updated_at` strictly after the cursor.
    async fn modified_since(
        &self,
        kind: EntityKind,
        cursor: Timestamp,
    ) -> SyncResult<Vec<WireRecord>>;
}

/// The shared remote store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Establishes or verifies the session. Called once per pass, before
    /// any other remote call.
    async fn connect(&self) -> SyncResult<()>;

    /// Fetches a record by collection and id.
    async fn get(&self, collection: &str, id: Uuid) -> SyncResult<Option<RemoteRecord>>;

    /// Inserts or replaces a record by id.
    async fn upsert(&self, record: RemoteRecord) -> SyncResult<()>;

    /// Deletes a record. Deleting a missing id is a no-op.
    async fn delete(&self, collection: &str, id: Uuid) -> SyncResult<()>;

    /// Records with `updated_at` strictly after the cursor.
    async fn changed_since(
        &self,
        collection: &str,
        cursor: Timestamp,
    ) -> SyncResult<Vec<RemoteRecord>>;
}

/// In-memory [`LocalStore`] with per-record failure injection.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    inner: Mutex<LocalInner>,
}

#[derive(Debug, Default)]
struct LocalInner {
    records: HashMap<(EntityKind, Uuid), WireRecord>,
    failing: HashSet<Uuid>,
}

impl MemoryLocalStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record without going through the async surface.
    pub fn seed(&self, kind: EntityKind, record: WireRecord) {
        if let Some(id) = record.get("id").and_then(|v| v.as_id()) {
            self.inner.lock().records.insert((kind, id), record);
        }
    }

    /// Makes every operation touching the given id fail with a
    /// persistence error.
    pub fn fail_record(&self, id: Uuid) {
        self.inner.lock().failing.insert(id);
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.inner.lock().failing.clear();
    }

    /// Returns a stored record, if present.
    #[must_use]
    pub fn record(&self, kind: EntityKind, id: Uuid) -> Option<WireRecord> {
        self.inner.lock().records.get(&(kind, id)).cloned()
    }

    /// Number of stored records across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Returns true if no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self, id: Uuid) -> SyncResult<()> {
        if self.inner.lock().failing.contains(&id) {
            return Err(SyncError::persistence(format!("injected failure for {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get(&self, kind: EntityKind, id: Uuid) -> SyncResult<Option<WireRecord>> {
        self.check(id)?;
        Ok(self.inner.lock().records.get(&(kind, id)).cloned())
    }

    async fn upsert(&self, kind: EntityKind, record: WireRecord) -> SyncResult<()> {
        let id = record
            .require_id("id")
            .map_err(|e| SyncError::persistence(e.to_string()))?;
        self.check(id)?;
        self.inner.lock().records.insert((kind, id), record);
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, id: Uuid) -> SyncResult<()> {
        self.check(id)?;
        self.inner.lock().records.remove(&(kind, id));
        Ok(())
    }

    async fn modified_since(
        &self,
        kind: EntityKind,
        cursor: Timestamp,
    ) -> SyncResult<Vec<WireRecord>> {
        let inner = self.inner.lock();
        let mut records: Vec<WireRecord> = inner
            .records
            .iter()
            .filter(|((k, _), record)| {
                *k == kind && record.timestamp_opt("updated_at").is_some_and(|ts| ts > cursor)
            })
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by_key(|record| record.timestamp_opt("updated_at"));
        Ok(records)
    }
}

/// In-memory [`RemoteStore`] with connectivity and per-record failure
/// injection plus call counters.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    inner: Mutex<RemoteInner>,
}

#[derive(Debug, Default)]
struct RemoteInner {
    records: HashMap<(String, Uuid), RemoteRecord>,
    offline: bool,
    failing: HashSet<Uuid>,
    failing_fatal: HashSet<Uuid>,
    connect_latency: Option<Duration>,
    upserts: usize,
    deletes: usize,
}

impl MemoryRemoteStore {
    /// Creates an empty, reachable store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record without going through the async surface.
    pub fn seed(&self, record: RemoteRecord) {
        self.inner
            .lock()
            .records
            .insert((record.collection.clone(), record.id), record);
    }

    /// Makes every call fail with a retryable transport error until
    /// cleared.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    /// Makes calls touching the given id fail with a retryable transport
    /// error.
    pub fn fail_record(&self, id: Uuid) {
        self.inner.lock().failing.insert(id);
    }

    /// Makes calls touching the given id fail with a non-retryable
    /// transport error.
    pub fn fail_record_fatal(&self, id: Uuid) {
        self.inner.lock().failing_fatal.insert(id);
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        let mut inner = self.inner.lock();
        inner.offline = false;
        inner.failing.clear();
        inner.failing_fatal.clear();
    }

    /// Delays `connect` by the given duration, to widen the window in
    /// which a pass is observably in flight.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.inner.lock().connect_latency = Some(latency);
    }

    /// Returns a stored record, if present.
    #[must_use]
    pub fn record(&self, collection: &str, id: Uuid) -> Option<RemoteRecord> {
        self.inner
            .lock()
            .records
            .get(&(collection.to_string(), id))
            .cloned()
    }

    /// Number of stored records across all collections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Returns true if no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total upserts applied since creation.
    #[must_use]
    pub fn upsert_count(&self) -> usize {
        self.inner.lock().upserts
    }

    /// Total deletes applied since creation.
    #[must_use]
    pub fn delete_count(&self) -> usize {
        self.inner.lock().deletes
    }

    fn check(&self, id: Option<Uuid>) -> SyncResult<()> {
        let inner = self.inner.lock();
        if inner.offline {
            return Err(SyncError::transport_retryable("remote unreachable"));
        }
        if let Some(id) = id {
            if inner.failing_fatal.contains(&id) {
                return Err(SyncError::transport_fatal(format!(
                    "injected fatal failure for {id}"
                )));
            }
            if inner.failing.contains(&id) {
                return Err(SyncError::transport_retryable(format!(
                    "injected failure for {id}"
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn connect(&self) -> SyncResult<()> {
        let latency = self.inner.lock().connect_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.check(None)
    }

    async fn get(&self, collection: &str, id: Uuid) -> SyncResult<Option<RemoteRecord>> {
        self.check(Some(id))?;
        Ok(self
            .inner
            .lock()
            .records
            .get(&(collection.to_string(), id))
            .cloned())
    }

    async fn upsert(&self, record: RemoteRecord) -> SyncResult<()> {
        self.check(Some(record.id))?;
        let mut inner = self.inner.lock();
        inner.upserts += 1;
        inner
            .records
            .insert((record.collection.clone(), record.id), record);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: Uuid) -> SyncResult<()> {
        self.check(Some(id))?;
        let mut inner = self.inner.lock();
        inner.deletes += 1;
        inner.records.remove(&(collection.to_string(), id));
        Ok(())
    }

    async fn changed_since(
        &self,
        collection: &str,
        cursor: Timestamp,
    ) -> SyncResult<Vec<RemoteRecord>> {
        self.check(None)?;
        let inner = self.inner.lock();
        let mut records: Vec<RemoteRecord> = inner
            .records
            .iter()
            .filter(|((c, _), record)| {
                c == collection
                    && record
                        .fields
                        .timestamp_opt("updated_at")
                        .is_some_and(|ts| ts > cursor)
            })
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by_key(|record| record.fields.timestamp_opt("updated_at"));
        Ok(records)
    }
}
