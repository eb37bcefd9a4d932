//! Integration tests for the sync engine.

use caresync_codec::{EntityKind, LogEntry, Profile, SyncableRecord, Timestamp, WireRecord};
use caresync_engine::{
    MemoryLocalStore, MemoryRemoteStore, RecordMapper, RemoteRecord, SyncConfig, SyncOrchestrator,
    SyncOutcome,
};
use caresync_queue::{DurableQueue, Mutation, QueuedOperation};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use uuid::Uuid;

type Orchestrator = SyncOrchestrator<MemoryLocalStore, MemoryRemoteStore>;

fn orchestrator() -> (Orchestrator, TempDir) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = tempdir().unwrap();
    let queue = Arc::new(DurableQueue::open(dir.path()).unwrap());
    let orch = SyncOrchestrator::new(
        MemoryLocalStore::new(),
        MemoryRemoteStore::new(),
        queue,
        SyncConfig::new(),
    );
    (orch, dir)
}

fn profile_at(name: &str, updated_at: i64) -> Profile {
    let mut profile = Profile::new(name, Timestamp::ZERO, "UTC");
    profile.created_at = Timestamp::from_millis(updated_at);
    profile.updated_at = Timestamp::from_millis(updated_at);
    profile
}

fn remote_profile(profile: &Profile) -> RemoteRecord {
    RecordMapper::new()
        .to_remote_record(EntityKind::Profile, &profile.to_wire())
        .unwrap()
}

async fn run(orch: &Orchestrator) -> caresync_engine::SyncReport {
    match orch.sync().await {
        SyncOutcome::Completed(report) => report,
        SyncOutcome::AlreadySyncing => panic!("pass unexpectedly in flight"),
    }
}

#[tokio::test]
async fn replaying_the_same_operation_twice_is_idempotent() {
    let (orch, _dir) = orchestrator();
    let profile = profile_at("Willow", 100);

    let op = QueuedOperation::capture(Mutation::Create, &profile);
    orch.queue().enqueue(op.clone()).unwrap();
    run(&orch).await;

    // The same snapshot applied again, as after a pass that crashed
    // between remote apply and queue removal.
    orch.queue()
        .enqueue(QueuedOperation::new(op.kind, op.target_id, op.payload))
        .unwrap();
    let report = run(&orch).await;

    assert!(report.success);
    assert_eq!(orch.remote().len(), 1);
    let stored = orch.remote().record("profiles", profile.id).unwrap();
    assert_eq!(stored.fields.require_text("name").unwrap(), "Willow");
}

#[tokio::test]
async fn operations_on_the_same_record_apply_in_enqueue_order() {
    let (orch, _dir) = orchestrator();
    let mut profile = profile_at("Willow", 100);

    let mut create = QueuedOperation::capture(Mutation::Create, &profile);
    create.enqueued_at = Timestamp::from_millis(1);

    profile.name = "Wren".to_string();
    profile.touch(Timestamp::from_millis(200));
    let mut update = QueuedOperation::capture(Mutation::Update, &profile);
    update.enqueued_at = Timestamp::from_millis(2);

    // Enqueue out of order; replay must still apply the create first.
    orch.queue().enqueue(update).unwrap();
    orch.queue().enqueue(create).unwrap();

    let report = run(&orch).await;
    assert_eq!(report.replayed, 2);

    let stored = orch.remote().record("profiles", profile.id).unwrap();
    assert_eq!(stored.fields.require_text("name").unwrap(), "Wren");
}

#[tokio::test]
async fn timestamp_tie_keeps_the_local_record() {
    let (orch, _dir) = orchestrator();

    let local = profile_at("Local Willow", 500);
    orch.local().seed(EntityKind::Profile, local.to_wire());

    let mut remote = local.clone();
    remote.name = "Remote Willow".to_string();
    orch.remote().seed(remote_profile(&remote));

    let report = run(&orch).await;
    assert_eq!(report.conflicts_local_wins, 1);
    assert_eq!(report.conflicts_remote_wins, 0);

    let stored = orch.remote().record("profiles", local.id).unwrap();
    assert_eq!(stored.fields.require_text("name").unwrap(), "Local Willow");
    let kept = orch.local().record(EntityKind::Profile, local.id).unwrap();
    assert_eq!(kept.require_text("name").unwrap(), "Local Willow");
}

#[tokio::test]
async fn newer_remote_profile_overwrites_local() {
    let (orch, _dir) = orchestrator();

    let local = profile_at("Stale", 100);
    orch.local().seed(EntityKind::Profile, local.to_wire());

    let mut remote = local.clone();
    remote.name = "Fresh".to_string();
    remote.touch(Timestamp::from_millis(200));
    orch.remote().seed(remote_profile(&remote));

    let report = run(&orch).await;
    assert_eq!(report.downloaded, 1);
    assert_eq!(report.conflicts_remote_wins, 1);

    let kept = orch.local().record(EntityKind::Profile, local.id).unwrap();
    assert_eq!(kept.require_text("name").unwrap(), "Fresh");
}

#[tokio::test]
async fn reconciliation_reaches_a_fixed_point() {
    let (orch, _dir) = orchestrator();

    // Divergent state: one record on each side, one conflicting pair.
    let local_only = profile_at("Local Only", 100);
    orch.local().seed(EntityKind::Profile, local_only.to_wire());

    let remote_only = profile_at("Remote Only", 150);
    orch.remote().seed(remote_profile(&remote_only));

    let conflicted = profile_at("Mine", 300);
    orch.local().seed(EntityKind::Profile, conflicted.to_wire());
    let mut theirs = conflicted.clone();
    theirs.name = "Theirs".to_string();
    theirs.touch(Timestamp::from_millis(400));
    orch.remote().seed(remote_profile(&theirs));

    let first = run(&orch).await;
    assert!(first.success);
    assert_eq!(first.uploaded, 1);
    assert_eq!(first.downloaded, 2);
    assert_eq!(first.conflicts(), 1);

    // Second pass over converged state moves nothing.
    let second = run(&orch).await;
    assert!(second.success);
    assert_eq!(second.uploaded, 0);
    assert_eq!(second.downloaded, 0);
    assert_eq!(second.conflicts(), 0);
    assert_eq!(second.skipped, 0);

    assert_eq!(orch.local().len(), 3);
    assert_eq!(orch.remote().len(), 3);
}

#[tokio::test]
async fn operation_is_dropped_at_the_retry_ceiling() {
    let (orch, _dir) = orchestrator();

    let profile = profile_at("Willow", 100);
    let op = QueuedOperation::capture(Mutation::Create, &profile);
    let op_id = op.id;
    orch.queue().enqueue(op).unwrap();
    orch.remote().fail_record(profile.id);

    // Two failed passes leave the operation queued.
    for expected_retries in 1..=2u32 {
        let report = run(&orch).await;
        assert!(report.permanent_failures.is_empty());
        assert_eq!(orch.pending_count(), 1);
        let queued = orch.queue().drain().unwrap();
        assert_eq!(queued[0].retry_count, expected_retries);
    }

    // The third failure hits the ceiling: removed and reported.
    let report = run(&orch).await;
    assert_eq!(report.permanent_failures.len(), 1);
    assert_eq!(report.permanent_failures[0].op_id, op_id);
    assert_eq!(orch.pending_count(), 0);
    assert_eq!(orch.stats().permanent_failures, 1);
}

#[tokio::test]
async fn log_entry_waits_for_its_owner() {
    let (orch, _dir) = orchestrator();

    let owner = profile_at("Willow", 100);
    let entry = LogEntry::new(owner.id, "feed");
    orch.queue()
        .enqueue(QueuedOperation::capture(Mutation::Create, &entry))
        .unwrap();

    // Owner unknown everywhere: the entry stays queued with one retry.
    let report = run(&orch).await;
    assert!(report.success);
    assert_eq!(orch.pending_count(), 1);
    assert_eq!(orch.queue().drain().unwrap()[0].retry_count, 1);
    assert!(orch.remote().record("log_entries", entry.id).is_none());

    // Once the owner exists remotely the next pass applies the entry.
    orch.remote().seed(remote_profile(&owner));
    let report = run(&orch).await;
    assert_eq!(report.replayed, 1);
    assert_eq!(orch.pending_count(), 0);

    let stored = orch.remote().record("log_entries", entry.id).unwrap();
    let owner_ref = stored.owner.unwrap();
    assert_eq!(owner_ref.collection, "profiles");
    assert_eq!(owner_ref.id, owner.id);
}

#[tokio::test]
async fn local_profile_upload_unblocks_its_log_entries() {
    let (orch, _dir) = orchestrator();

    // Profiles reconcile before log entries, so a locally-created owner
    // reaches the remote store in the same pass as its entries.
    let owner = profile_at("Willow", 100);
    orch.local().seed(EntityKind::Profile, owner.to_wire());

    let mut entry = LogEntry::new(owner.id, "sleep");
    entry.touch(Timestamp::from_millis(150));
    orch.local().seed(EntityKind::LogEntry, entry.to_wire());

    let report = run(&orch).await;
    assert!(report.success);
    assert_eq!(report.uploaded, 2);
    assert_eq!(report.skipped, 0);
    assert!(orch.remote().record("log_entries", entry.id).is_some());
}

#[tokio::test]
async fn concurrent_triggers_run_a_single_pass() {
    let (orch, _dir) = orchestrator();
    orch.remote().set_connect_latency(Duration::from_millis(50));

    let (first, second) = tokio::join!(orch.sync(), orch.sync());

    let ran: Vec<bool> = [&first, &second]
        .iter()
        .map(|outcome| outcome.report().is_some())
        .collect();
    assert_eq!(ran.iter().filter(|ran| **ran).count(), 1);
    assert_eq!(orch.stats().cycles, 1);
}

#[tokio::test]
async fn malformed_remote_record_is_skipped_not_fatal() {
    let (orch, _dir) = orchestrator();

    let mut fields = WireRecord::new();
    fields.set("updated_at", Timestamp::from_millis(100));
    orch.remote().seed(RemoteRecord {
        collection: "profiles".to_string(),
        id: Uuid::new_v4(),
        // No name, no timezone: fails profile validation.
        fields,
        owner: None,
    });

    let healthy = profile_at("Willow", 200);
    orch.remote().seed(remote_profile(&healthy));

    let report = run(&orch).await;
    assert!(report.success);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.downloaded, 1);
    assert!(orch.local().record(EntityKind::Profile, healthy.id).is_some());
}

#[tokio::test]
async fn fatal_transport_error_holds_the_cursor() {
    let (orch, _dir) = orchestrator();

    let profile = profile_at("Willow", 100);
    orch.local().seed(EntityKind::Profile, profile.to_wire());
    orch.remote().fail_record_fatal(profile.id);

    let report = run(&orch).await;
    assert!(!report.success);
    assert!(orch.last_sync_time().is_none());
    assert!(orch.remote().record("profiles", profile.id).is_none());

    // With the failure gone the held-back record uploads on the next pass.
    orch.remote().clear_failures();
    let report = run(&orch).await;
    assert!(report.success);
    assert_eq!(report.uploaded, 1);
    assert!(orch.remote().record("profiles", profile.id).is_some());
}

#[tokio::test]
async fn skipped_record_stays_a_candidate_for_the_next_pass() {
    let (orch, _dir) = orchestrator();

    let steady = profile_at("Steady", 50);
    orch.local().seed(EntityKind::Profile, steady.to_wire());
    let flaky = profile_at("Flaky", 100);
    orch.local().seed(EntityKind::Profile, flaky.to_wire());
    orch.remote().fail_record(flaky.id);

    let report = run(&orch).await;
    assert!(report.success);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.uploaded, 1);

    // The pass succeeded, but the cursor stayed behind the failed record.
    orch.remote().clear_failures();
    let report = run(&orch).await;
    assert_eq!(report.uploaded, 1);
    assert!(orch.remote().record("profiles", flaky.id).is_some());
}

#[tokio::test]
async fn queue_contents_survive_a_restart_between_passes() {
    let dir = tempdir().unwrap();
    let profile = profile_at("Willow", 100);

    {
        let queue = Arc::new(DurableQueue::open(dir.path()).unwrap());
        queue
            .enqueue(QueuedOperation::capture(Mutation::Create, &profile))
            .unwrap();
    }

    let queue = Arc::new(DurableQueue::open(dir.path()).unwrap());
    let orch = SyncOrchestrator::new(
        MemoryLocalStore::new(),
        MemoryRemoteStore::new(),
        queue,
        SyncConfig::new(),
    );

    assert_eq!(orch.pending_count(), 1);
    let report = run(&orch).await;
    assert_eq!(report.replayed, 1);
    assert!(orch.remote().record("profiles", profile.id).is_some());
}
