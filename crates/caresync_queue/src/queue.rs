//! The durable queue itself.

use crate::error::{QueueError, QueueResult};
use crate::journal::{Journal, JournalRecord};
use crate::operation::QueuedOperation;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::path::Path;
use uuid::Uuid;

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "queue.journal";

/// Journal entries beyond this many dead records trigger a compacting
/// rewrite on the next removal.
const COMPACT_SLACK: usize = 64;

/// A durable, restart-surviving queue of pending local mutations.
///
/// All methods persist their effect before returning; a journal I/O error
/// is reported to the caller, never swallowed. The queue never loses an
/// operation except through an explicit [`DurableQueue::remove`].
///
/// The queue is safe to share across threads; interior locking keeps the
/// journal and the in-memory pending set consistent.
#[derive(Debug)]
pub struct DurableQueue {
    inner: Mutex<Inner>,
    /// Held for the queue's lifetime; releases the advisory lock on drop.
    _lock_file: File,
}

#[derive(Debug)]
struct Inner {
    journal: Journal,
    ops: Vec<QueuedOperation>,
    /// Total journal entries since the last rewrite, for compaction.
    journal_entries: usize,
}

impl DurableQueue {
    /// Opens or creates a queue directory, acquiring its exclusive lock
    /// and replaying the journal.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Locked`] if another process owns the
    /// directory, or an I/O / corruption error from journal replay.
    pub fn open(path: &Path) -> QueueResult<Self> {
        std::fs::create_dir_all(path)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(QueueError::Locked);
        }

        let (journal, records) = Journal::open(&path.join(JOURNAL_FILE))?;
        let journal_entries = records.len();

        let mut ops: Vec<QueuedOperation> = Vec::new();
        for record in records {
            match record {
                JournalRecord::Enqueue { .. } => ops.push(record.into_operation()?),
                JournalRecord::Remove { id } => ops.retain(|op| op.id != id),
                JournalRecord::Retry { id } => {
                    if let Some(op) = ops.iter_mut().find(|op| op.id == id) {
                        op.retry_count += 1;
                    }
                }
            }
        }

        tracing::info!(pending = ops.len(), path = %path.display(), "opened queue");

        Ok(Self {
            inner: Mutex::new(Inner {
                journal,
                ops,
                journal_entries,
            }),
            _lock_file: lock_file,
        })
    }

    /// Appends an operation, persisting it before returning.
    pub fn enqueue(&self, op: QueuedOperation) -> QueueResult<()> {
        let mut inner = self.inner.lock();
        inner.journal.append(&JournalRecord::enqueue(&op)?)?;
        inner.journal_entries += 1;
        tracing::debug!(id = %op.id, kind = ?op.kind, "enqueued operation");
        inner.ops.push(op);
        Ok(())
    }

    /// Returns all pending operations ordered by enqueue time, oldest
    /// first. Removes nothing.
    pub fn drain(&self) -> QueueResult<Vec<QueuedOperation>> {
        let inner = self.inner.lock();
        let mut ops = inner.ops.clone();
        // Stable: ties keep insertion order.
        ops.sort_by_key(|op| op.enqueued_at);
        Ok(ops)
    }

    /// Deletes an operation. Removing a missing id is a no-op.
    pub fn remove(&self, id: Uuid) -> QueueResult<()> {
        let mut inner = self.inner.lock();
        if !inner.ops.iter().any(|op| op.id == id) {
            return Ok(());
        }

        inner.journal.append(&JournalRecord::Remove { id })?;
        inner.journal_entries += 1;
        inner.ops.retain(|op| op.id != id);
        tracing::debug!(id = %id, "removed operation");

        self.maybe_compact(&mut inner)?;
        Ok(())
    }

    /// Persists a retry-count bump for the operation, returning the new
    /// count.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::UnknownOperation`] if the id is not queued.
    pub fn increment_retry(&self, id: Uuid) -> QueueResult<u32> {
        let mut inner = self.inner.lock();
        let index = inner
            .ops
            .iter()
            .position(|op| op.id == id)
            .ok_or(QueueError::UnknownOperation(id))?;

        inner.journal.append(&JournalRecord::Retry { id })?;
        inner.journal_entries += 1;

        inner.ops[index].retry_count += 1;
        Ok(inner.ops[index].retry_count)
    }

    /// Number of operations currently pending.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().ops.len()
    }

    /// Rewrites the journal when dead entries dominate it.
    fn maybe_compact(&self, inner: &mut Inner) -> QueueResult<()> {
        if inner.journal_entries <= inner.ops.len() * 2 + COMPACT_SLACK {
            return Ok(());
        }

        let mut records = Vec::with_capacity(inner.ops.len());
        for op in &inner.ops {
            records.push(JournalRecord::enqueue(op)?);
        }
        inner.journal.rewrite(&records)?;
        inner.journal_entries = records.len();
        tracing::info!(live = records.len(), "compacted queue journal");
        Ok(())
    }
}
