//! The sync orchestrator: single-flight, two-phase sync passes.

use crate::config::SyncConfig;
use crate::cursor::CursorState;
use crate::error::{SyncError, SyncResult};
use crate::mapper::{record_identity, RecordMapper, RemoteRecord};
use crate::resolve::{resolve, Winner};
use crate::store::{LocalStore, RemoteStore};
use caresync_codec::{EntityKind, Timestamp, WireRecord};
use caresync_queue::{DurableQueue, Mutation, OperationKind, QueuedOperation};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// The result of a sync trigger.
#[derive(Debug)]
pub enum SyncOutcome {
    /// A pass ran to completion (successfully or not); here is its report.
    Completed(SyncReport),
    /// Another pass was already in flight; this trigger was dropped.
    AlreadySyncing,
}

impl SyncOutcome {
    /// Returns the pass report, if a pass ran.
    #[must_use]
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            SyncOutcome::AlreadySyncing => None,
        }
    }
}

/// A queued operation dropped after exhausting its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermanentFailure {
    /// The operation's id.
    pub op_id: Uuid,
    /// What the operation would have done.
    pub kind: OperationKind,
}

/// What one sync pass did.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Queued operations applied and removed.
    pub replayed: usize,
    /// Queued operations dropped at the retry ceiling.
    pub permanent_failures: Vec<PermanentFailure>,
    /// Records pushed to the remote store during reconciliation.
    pub uploaded: usize,
    /// Records pulled into the local store during reconciliation.
    pub downloaded: usize,
    /// Conflicts resolved in the local record's favor.
    pub conflicts_local_wins: usize,
    /// Conflicts resolved in the remote record's favor.
    pub conflicts_remote_wins: usize,
    /// Records skipped this pass (malformed, owner missing, per-record
    /// failures); they remain candidates next pass.
    pub skipped: usize,
    /// False when a fatal error cut the pass short; cursors do not advance.
    pub success: bool,
    /// The fatal error, when there was one.
    pub error: Option<String>,
    /// Wall-clock duration of the pass.
    pub duration: Duration,
}

impl SyncReport {
    fn new() -> Self {
        Self {
            replayed: 0,
            permanent_failures: Vec::new(),
            uploaded: 0,
            downloaded: 0,
            conflicts_local_wins: 0,
            conflicts_remote_wins: 0,
            skipped: 0,
            success: true,
            error: None,
            duration: Duration::ZERO,
        }
    }

    /// Total conflicts resolved, regardless of winner.
    #[must_use]
    pub fn conflicts(&self) -> usize {
        self.conflicts_local_wins + self.conflicts_remote_wins
    }

    fn fail(&mut self, err: &SyncError) {
        self.success = false;
        self.error = Some(err.to_string());
    }
}

/// Running totals across all passes of an orchestrator's lifetime.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Passes run (including unsuccessful ones).
    pub cycles: u64,
    /// Reconciliation uploads.
    pub uploads: u64,
    /// Reconciliation downloads.
    pub downloads: u64,
    /// Conflicts resolved.
    pub conflicts: u64,
    /// Operations dropped at the retry ceiling.
    pub permanent_failures: u64,
    /// Fatal error of the most recent unsuccessful pass.
    pub last_error: Option<String>,
    /// Completion time of the most recent successful pass.
    pub last_sync_time: Option<Timestamp>,
}

/// Drives sync passes against a local and a remote store.
///
/// At most one pass runs at a time. A trigger that arrives while a pass is
/// in flight is dropped, not queued; the caller sees
/// [`SyncOutcome::AlreadySyncing`]. A pass runs to completion once started,
/// even if connectivity is lost mid-pass; the resulting transport failures
/// are handled through the normal retry path.
///
/// Each pass has two phases. Phase one replays the durable queue against
/// the remote store, oldest operation first. Phase two reconciles both
/// stores per entity kind, profiles first so that log-entry owner
/// references always resolve.
pub struct SyncOrchestrator<L, R> {
    local: L,
    remote: R,
    queue: Arc<DurableQueue>,
    cursor: CursorState,
    config: SyncConfig,
    in_flight: AtomicBool,
    stats: Mutex<SyncStats>,
}

/// Clears the in-flight flag even if a pass panics.
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

fn is_pass_fatal(err: &SyncError) -> bool {
    matches!(err, SyncError::Transport { retryable: false, .. })
}

impl<L: LocalStore, R: RemoteStore> SyncOrchestrator<L, R> {
    /// Creates an orchestrator over the given stores and queue.
    pub fn new(local: L, remote: R, queue: Arc<DurableQueue>, config: SyncConfig) -> Self {
        Self {
            local,
            remote,
            queue,
            cursor: CursorState::new(),
            config,
            in_flight: AtomicBool::new(false),
            stats: Mutex::new(SyncStats::default()),
        }
    }

    /// The durable queue; enqueue local mutations through this.
    #[must_use]
    pub fn queue(&self) -> &DurableQueue {
        &self.queue
    }

    /// The local store.
    #[must_use]
    pub fn local(&self) -> &L {
        &self.local
    }

    /// The remote store.
    #[must_use]
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Number of queued operations awaiting replay.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.pending_count()
    }

    /// Completion time of the most recent successful pass.
    #[must_use]
    pub fn last_sync_time(&self) -> Option<Timestamp> {
        self.cursor.last_sync_time()
    }

    /// Running totals across all passes.
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        self.stats.lock().clone()
    }

    /// Runs a sync pass, unless one is already in flight.
    pub async fn sync(&self) -> SyncOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("sync pass already in flight, dropping trigger");
            return SyncOutcome::AlreadySyncing;
        }
        let _guard = FlightGuard {
            flag: &self.in_flight,
        };

        let report = self.run_pass().await;

        let mut stats = self.stats.lock();
        stats.cycles += 1;
        stats.uploads += report.uploaded as u64;
        stats.downloads += report.downloaded as u64;
        stats.conflicts += report.conflicts() as u64;
        stats.permanent_failures += report.permanent_failures.len() as u64;
        if !report.success {
            stats.last_error = report.error.clone();
        }
        stats.last_sync_time = self.cursor.last_sync_time();
        drop(stats);

        SyncOutcome::Completed(report)
    }

    async fn run_pass(&self) -> SyncReport {
        let started = Instant::now();
        let mut report = SyncReport::new();
        let mut mapper = RecordMapper::new();

        tracing::info!(pending = self.queue.pending_count(), "starting sync pass");

        if let Err(err) = self.call(self.remote.connect()).await {
            tracing::warn!(error = %err, "remote session unavailable, aborting pass");
            report.fail(&err);
            report.duration = started.elapsed();
            return report;
        }

        self.replay_queue(&mut mapper, &mut report).await;
        self.reconcile(&mut mapper, &mut report).await;

        if report.success {
            self.cursor.mark_completed(Timestamp::now());
        }
        report.duration = started.elapsed();
        tracing::info!(
            replayed = report.replayed,
            uploaded = report.uploaded,
            downloaded = report.downloaded,
            conflicts = report.conflicts(),
            skipped = report.skipped,
            success = report.success,
            "finished sync pass"
        );
        report
    }

    /// Applies an optional timeout to a remote call.
    async fn call<T>(&self, fut: impl Future<Output = SyncResult<T>>) -> SyncResult<T> {
        match self.config.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::transport_retryable("remote call timed out")),
            },
            None => fut.await,
        }
    }

    /// Phase one: replay the durable queue, oldest operation first.
    ///
    /// A [`QueueError`](caresync_queue::QueueError) from `remove` or
    /// `increment_retry` ends the pass: the journal could not persist the
    /// bookkeeping, so retry counts can no longer be trusted and the queue's
    /// no-silent-loss guarantee takes priority. Remote applies already made
    /// are idempotent and replay safely next pass. This is stricter than
    /// the per-record handling given to local store failures.
    async fn replay_queue(&self, mapper: &mut RecordMapper, report: &mut SyncReport) {
        let ops = match self.queue.drain() {
            Ok(ops) => ops,
            Err(err) => {
                let err = SyncError::Queue(err);
                tracing::error!(error = %err, "queue drain failed");
                report.fail(&err);
                return;
            }
        };

        for op in ops {
            match self.apply_operation(mapper, &op).await {
                Ok(()) => {
                    if let Err(err) = self.queue.remove(op.id) {
                        report.fail(&SyncError::Queue(err));
                        return;
                    }
                    report.replayed += 1;
                    tracing::debug!(op = %op.id, kind = ?op.kind, "replayed queued operation");
                }
                Err(err) => {
                    let fatal = is_pass_fatal(&err);
                    if fatal {
                        report.fail(&err);
                    }
                    match self.queue.increment_retry(op.id) {
                        Ok(count) if count >= self.config.retry_ceiling => {
                            tracing::warn!(
                                op = %op.id,
                                kind = ?op.kind,
                                retries = count,
                                error = %err,
                                "dropping operation at retry ceiling"
                            );
                            if let Err(remove_err) = self.queue.remove(op.id) {
                                report.fail(&SyncError::Queue(remove_err));
                                return;
                            }
                            report.permanent_failures.push(PermanentFailure {
                                op_id: op.id,
                                kind: op.kind,
                            });
                        }
                        Ok(count) => {
                            tracing::debug!(
                                op = %op.id,
                                retries = count,
                                error = %err,
                                "operation stays queued"
                            );
                        }
                        Err(queue_err) => {
                            report.fail(&SyncError::Queue(queue_err));
                            return;
                        }
                    }
                    if fatal {
                        return;
                    }
                }
            }
        }
    }

    /// Applies one queued operation to the remote store.
    ///
    /// Creates and updates are upserts by id, so replaying an operation
    /// the remote already saw changes nothing. Deleting an already-absent
    /// record is likewise a no-op.
    async fn apply_operation(
        &self,
        mapper: &mut RecordMapper,
        op: &QueuedOperation,
    ) -> SyncResult<()> {
        let kind = op.kind.entity_kind();
        match op.kind.mutation() {
            Mutation::Create | Mutation::Update => self.upload(mapper, kind, &op.payload).await,
            Mutation::Delete => {
                if let Some(id) = op.target_id {
                    self.call(self.remote.delete(kind.collection_name(), id))
                        .await?;
                }
                Ok(())
            }
        }
    }

    /// Maps a local record outward and upserts it remotely.
    async fn upload(
        &self,
        mapper: &mut RecordMapper,
        kind: EntityKind,
        record: &WireRecord,
    ) -> SyncResult<()> {
        if kind == EntityKind::LogEntry {
            self.probe_owner(mapper, record).await?;
        }

        let remote_record = mapper.to_remote_record(kind, record)?;
        let id = remote_record.id;
        self.call(self.remote.upsert(remote_record)).await?;

        if kind == EntityKind::Profile {
            mapper.mark_owner_known(id);
        }
        Ok(())
    }

    /// Checks the remote store for a log entry's owner when the mapper
    /// has not seen it yet this pass.
    async fn probe_owner(&self, mapper: &mut RecordMapper, record: &WireRecord) -> SyncResult<()> {
        let Some(owner_id) = record.get("owner_id").and_then(|v| v.as_id()) else {
            return Ok(());
        };
        if mapper.owner_known(owner_id) {
            return Ok(());
        }

        let collection = EntityKind::Profile.collection_name();
        if self.call(self.remote.get(collection, owner_id)).await?.is_some() {
            mapper.mark_owner_known(owner_id);
        }
        Ok(())
    }

    /// Phase two: reconcile both stores, one entity kind at a time.
    async fn reconcile(&self, mapper: &mut RecordMapper, report: &mut SyncReport) {
        if !report.success {
            return;
        }

        let mut advances = Vec::new();
        for kind in EntityKind::SYNC_ORDER {
            let cursor = self.cursor.get(kind);
            match self.reconcile_kind(mapper, report, kind, cursor).await {
                Ok(Some(next)) => advances.push((kind, next)),
                Ok(None) => {}
                Err(err) => {
                    tracing::error!(%kind, error = %err, "reconciliation aborted");
                    report.fail(&err);
                    return;
                }
            }
        }

        // All kinds completed without a fatal error.
        for (kind, next) in advances {
            self.cursor.advance(kind, next);
        }
    }

    /// Reconciles one entity kind. Returns the cursor boundary the pass
    /// earned for it, or `None` when nothing moved it forward.
    ///
    /// Per-record failures skip the record and cap the boundary below the
    /// record's timestamp, so it stays a candidate next pass. A fatal
    /// transport failure propagates and aborts the pass.
    async fn reconcile_kind(
        &self,
        mapper: &mut RecordMapper,
        report: &mut SyncReport,
        kind: EntityKind,
        cursor: Timestamp,
    ) -> SyncResult<Option<Timestamp>> {
        let collection = kind.collection_name();
        let local_changed = self.local.modified_since(kind, cursor).await?;
        let remote_changed = self
            .call(self.remote.changed_since(collection, cursor))
            .await?;

        if kind == EntityKind::Profile {
            for record in &remote_changed {
                mapper.mark_owner_known(record.id);
            }
        }

        let mut high_water = cursor;
        let mut failed_floor: Option<Timestamp> = None;
        let mut seen: HashSet<Uuid> = HashSet::new();

        for local_record in &local_changed {
            let (id, local_ts) = match record_identity(local_record, collection) {
                Ok(identity) => identity,
                Err(err) => {
                    tracing::warn!(%kind, error = %err, "skipping malformed local record");
                    report.skipped += 1;
                    continue;
                }
            };
            seen.insert(id);

            match self
                .reconcile_local(mapper, report, kind, local_record, id, local_ts, &remote_changed)
                .await
            {
                Ok(applied) => high_water = high_water.max(applied),
                Err(err) if is_pass_fatal(&err) => return Err(err),
                Err(err) => {
                    tracing::warn!(%kind, record = %id, error = %err, "skipping record this pass");
                    report.skipped += 1;
                    failed_floor = Some(failed_floor.map_or(local_ts, |f| f.min(local_ts)));
                }
            }
        }

        for remote_record in &remote_changed {
            if seen.contains(&remote_record.id) {
                continue;
            }
            let remote_ts = remote_record
                .fields
                .timestamp_opt("updated_at")
                .unwrap_or(Timestamp::ZERO);

            match self.reconcile_remote(mapper, report, kind, remote_record).await {
                Ok(applied) => high_water = high_water.max(applied),
                Err(err) if is_pass_fatal(&err) => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        %kind,
                        record = %remote_record.id,
                        error = %err,
                        "skipping record this pass"
                    );
                    report.skipped += 1;
                    failed_floor = Some(failed_floor.map_or(remote_ts, |f| f.min(remote_ts)));
                }
            }
        }

        let candidate = match failed_floor {
            // Hold the boundary below the oldest failure so it is
            // revisited next pass.
            Some(floor) => high_water.min(Timestamp::from_millis(floor.as_millis() - 1)),
            None => high_water,
        };
        Ok((candidate > cursor).then_some(candidate))
    }

    /// Reconciles one locally-modified record against its remote
    /// counterpart, if any. Returns the timestamp the winning side carried.
    #[allow(clippy::too_many_arguments)]
    async fn reconcile_local(
        &self,
        mapper: &mut RecordMapper,
        report: &mut SyncReport,
        kind: EntityKind,
        local_record: &WireRecord,
        id: Uuid,
        local_ts: Timestamp,
        remote_changed: &[RemoteRecord],
    ) -> SyncResult<Timestamp> {
        let collection = kind.collection_name();
        let remote = match remote_changed.iter().find(|r| r.id == id) {
            Some(record) => Some(record.clone()),
            None => self.call(self.remote.get(collection, id)).await?,
        };

        let Some(remote_record) = remote else {
            self.upload(mapper, kind, local_record).await?;
            report.uploaded += 1;
            return Ok(local_ts);
        };

        let remote_wire = mapper.from_remote_record(&remote_record)?;
        let (_, remote_ts) = record_identity(&remote_wire, collection)?;

        match resolve(local_ts, remote_ts) {
            Winner::Local => {
                self.upload(mapper, kind, local_record).await?;
                report.conflicts_local_wins += 1;
                report.uploaded += 1;
                Ok(local_ts)
            }
            Winner::Remote => {
                self.local.upsert(kind, remote_wire).await?;
                report.conflicts_remote_wins += 1;
                report.downloaded += 1;
                Ok(remote_ts)
            }
        }
    }

    /// Reconciles one remotely-changed record with no locally-modified
    /// counterpart. Returns the timestamp the winning side carried.
    async fn reconcile_remote(
        &self,
        mapper: &mut RecordMapper,
        report: &mut SyncReport,
        kind: EntityKind,
        remote_record: &RemoteRecord,
    ) -> SyncResult<Timestamp> {
        let collection = kind.collection_name();
        let wire = mapper.from_remote_record(remote_record)?;
        let (id, remote_ts) = record_identity(&wire, collection)?;

        let Some(local_record) = self.local.get(kind, id).await? else {
            self.local.upsert(kind, wire).await?;
            report.downloaded += 1;
            return Ok(remote_ts);
        };

        let local_ts = local_record
            .timestamp_opt("updated_at")
            .unwrap_or(Timestamp::ZERO);

        match resolve(local_ts, remote_ts) {
            Winner::Local => {
                self.upload(mapper, kind, &local_record).await?;
                report.conflicts_local_wins += 1;
                report.uploaded += 1;
                Ok(local_ts)
            }
            Winner::Remote => {
                self.local.upsert(kind, wire).await?;
                report.conflicts_remote_wins += 1;
                report.downloaded += 1;
                Ok(remote_ts)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryLocalStore, MemoryRemoteStore};
    use caresync_codec::Profile;
    use tempfile::tempdir;

    fn orchestrator(
        dir: &std::path::Path,
    ) -> SyncOrchestrator<MemoryLocalStore, MemoryRemoteStore> {
        let queue = Arc::new(DurableQueue::open(dir).unwrap());
        SyncOrchestrator::new(
            MemoryLocalStore::new(),
            MemoryRemoteStore::new(),
            queue,
            SyncConfig::new(),
        )
    }

    #[tokio::test]
    async fn empty_pass_succeeds() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path());

        let outcome = orch.sync().await;
        let report = outcome.report().unwrap();
        assert!(report.success);
        assert_eq!(report.replayed, 0);
        assert_eq!(report.uploaded, 0);
        assert!(orch.last_sync_time().is_some());
        assert_eq!(orch.stats().last_sync_time, orch.last_sync_time());
    }

    #[tokio::test]
    async fn connect_failure_aborts_before_cursor() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path());
        orch.remote().set_offline(true);

        let outcome = orch.sync().await;
        let report = outcome.report().unwrap();
        assert!(!report.success);
        assert!(orch.last_sync_time().is_none());
        assert_eq!(orch.stats().cycles, 1);
        assert_eq!(orch.stats().last_sync_time, None);
    }

    #[tokio::test]
    async fn replay_pushes_queued_creates() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path());

        let profile = Profile::new("Willow", Timestamp::ZERO, "UTC");
        orch.queue()
            .enqueue(QueuedOperation::capture(Mutation::Create, &profile))
            .unwrap();

        let outcome = orch.sync().await;
        let report = outcome.report().unwrap();
        assert_eq!(report.replayed, 1);
        assert_eq!(orch.pending_count(), 0);
        assert!(orch.remote().record("profiles", profile.id).is_some());
    }

    #[tokio::test]
    async fn delete_of_missing_remote_record_is_a_noop() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path());

        let profile = Profile::new("Willow", Timestamp::ZERO, "UTC");
        orch.queue()
            .enqueue(QueuedOperation::capture(Mutation::Delete, &profile))
            .unwrap();

        let outcome = orch.sync().await;
        let report = outcome.report().unwrap();
        assert!(report.success);
        assert_eq!(report.replayed, 1);
        assert_eq!(orch.pending_count(), 0);
    }
}
