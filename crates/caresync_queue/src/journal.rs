//! Append-only journal backing the durable queue.
//!
//! Each journal frame is a little-endian `u32` length followed by that many
//! CBOR bytes. Three record types exist: an enqueue (carrying the full
//! operation with its payload snapshot), a removal, and a retry bump.
//! Replaying the journal front to back reproduces the pending set.

use crate::error::{QueueError, QueueResult};
use crate::operation::{OperationKind, QueuedOperation};
use caresync_codec::{from_snapshot_bytes, to_snapshot_bytes, Timestamp};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Temporary file used for atomic journal rewrites.
const JOURNAL_TEMP_SUFFIX: &str = "tmp";

/// A single journal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum JournalRecord {
    /// An operation entered the queue.
    Enqueue {
        /// Operation id.
        id: Uuid,
        /// Operation kind code (see [`OperationKind::to_code`]).
        kind: u8,
        /// Target record id, when present.
        target_id: Option<Uuid>,
        /// CBOR snapshot bytes of the payload.
        payload: Vec<u8>,
        /// Enqueue time.
        enqueued_at: Timestamp,
        /// Retry count at write time (non-zero only in rewritten journals).
        retry_count: u32,
    },
    /// An operation left the queue.
    Remove {
        /// Operation id.
        id: Uuid,
    },
    /// An operation's retry count was bumped by one.
    Retry {
        /// Operation id.
        id: Uuid,
    },
}

impl JournalRecord {
    /// Builds an enqueue record from an operation.
    pub(crate) fn enqueue(op: &QueuedOperation) -> QueueResult<Self> {
        Ok(Self::Enqueue {
            id: op.id,
            kind: op.kind.to_code(),
            target_id: op.target_id,
            payload: to_snapshot_bytes(&op.payload)?,
            enqueued_at: op.enqueued_at,
            retry_count: op.retry_count,
        })
    }

    /// Converts an enqueue record back into an operation.
    pub(crate) fn into_operation(self) -> QueueResult<QueuedOperation> {
        match self {
            Self::Enqueue {
                id,
                kind,
                target_id,
                payload,
                enqueued_at,
                retry_count,
            } => Ok(QueuedOperation {
                id,
                kind: OperationKind::from_code(kind)
                    .ok_or_else(|| QueueError::corrupt(format!("unknown kind code {kind}")))?,
                target_id,
                payload: from_snapshot_bytes(&payload)?,
                enqueued_at,
                retry_count,
            }),
            other => Err(QueueError::corrupt(format!(
                "expected enqueue record, found {other:?}"
            ))),
        }
    }
}

/// The journal file handle.
#[derive(Debug)]
pub(crate) struct Journal {
    path: PathBuf,
    file: File,
}

impl Journal {
    /// Opens (or creates) the journal and replays its records.
    ///
    /// A torn final frame (crash mid-append) is tolerated: replay stops at
    /// the last complete frame and the tail is dropped on the next rewrite.
    pub(crate) fn open(path: &Path) -> QueueResult<(Self, Vec<JournalRecord>)> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let records = replay(&bytes)?;

        Ok((
            Self {
                path: path.to_path_buf(),
                file,
            },
            records,
        ))
    }

    /// Appends one record and syncs it to disk before returning.
    pub(crate) fn append(&mut self, record: &JournalRecord) -> QueueResult<()> {
        let frame = encode_frame(record)?;
        self.file.write_all(&frame)?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Atomically rewrites the journal with the given records.
    ///
    /// Writes a sibling temp file, syncs it, and renames it over the
    /// journal so a crash never leaves a half-written journal behind.
    pub(crate) fn rewrite(&mut self, records: &[JournalRecord]) -> QueueResult<()> {
        let temp_path = self.path.with_extension(JOURNAL_TEMP_SUFFIX);

        {
            let mut temp = File::create(&temp_path)?;
            for record in records {
                temp.write_all(&encode_frame(record)?)?;
            }
            temp.sync_all()?;
        }

        std::fs::rename(&temp_path, &self.path)?;

        self.file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        Ok(())
    }
}

fn encode_frame(record: &JournalRecord) -> QueueResult<Vec<u8>> {
    let mut body = Vec::new();
    ciborium::into_writer(record, &mut body)
        .map_err(|e| QueueError::corrupt(format!("encode failed: {e}")))?;

    let len = u32::try_from(body.len())
        .map_err(|_| QueueError::corrupt("journal record exceeds frame size"))?;

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

fn replay(bytes: &[u8]) -> QueueResult<Vec<JournalRecord>> {
    let mut records = Vec::new();
    let mut cursor = std::io::Cursor::new(bytes);

    loop {
        let mut len_buf = [0u8; 4];
        match cursor.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        match cursor.read_exact(&mut body) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                // Torn tail from a crash mid-append; everything before it
                // is intact.
                tracing::warn!(frame_len = len, "dropping torn journal tail");
                break;
            }
            Err(e) => return Err(e.into()),
        }

        let record = ciborium::from_reader(body.as_slice())
            .map_err(|e| QueueError::corrupt(format!("decode failed: {e}")))?;
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Mutation;
    use caresync_codec::{Profile, Timestamp};
    use tempfile::tempdir;

    fn sample_op() -> QueuedOperation {
        let profile = Profile::new("Willow", Timestamp::ZERO, "UTC");
        QueuedOperation::capture(Mutation::Create, &profile)
    }

    #[test]
    fn append_then_replay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.journal");

        let op = sample_op();
        {
            let (mut journal, records) = Journal::open(&path).unwrap();
            assert!(records.is_empty());
            journal.append(&JournalRecord::enqueue(&op).unwrap()).unwrap();
            journal.append(&JournalRecord::Retry { id: op.id }).unwrap();
        }

        let (_, records) = Journal::open(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], JournalRecord::Retry { id: op.id });

        let replayed = records.into_iter().next().unwrap().into_operation().unwrap();
        assert_eq!(replayed, op);
    }

    #[test]
    fn torn_tail_is_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.journal");

        let op = sample_op();
        {
            let (mut journal, _) = Journal::open(&path).unwrap();
            journal.append(&JournalRecord::enqueue(&op).unwrap()).unwrap();
        }

        // Simulate a crash mid-append: a frame header promising more bytes
        // than were written.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&100u32.to_le_bytes()).unwrap();
            file.write_all(&[1, 2, 3]).unwrap();
        }

        let (_, records) = Journal::open(&path).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn rewrite_replaces_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.journal");

        let keep = sample_op();
        let gone = sample_op();
        {
            let (mut journal, _) = Journal::open(&path).unwrap();
            journal.append(&JournalRecord::enqueue(&gone).unwrap()).unwrap();
            journal.append(&JournalRecord::enqueue(&keep).unwrap()).unwrap();
            journal.append(&JournalRecord::Remove { id: gone.id }).unwrap();

            journal
                .rewrite(&[JournalRecord::enqueue(&keep).unwrap()])
                .unwrap();
        }

        let (_, records) = Journal::open(&path).unwrap();
        assert_eq!(records.len(), 1);
        let replayed = records.into_iter().next().unwrap().into_operation().unwrap();
        assert_eq!(replayed.id, keep.id);
    }

    #[test]
    fn mid_file_corruption_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.journal");

        {
            let mut file = File::create(&path).unwrap();
            // Complete frame with garbage CBOR.
            file.write_all(&3u32.to_le_bytes()).unwrap();
            file.write_all(&[0xff, 0xff, 0xff]).unwrap();
        }

        let result = Journal::open(&path);
        assert!(matches!(result, Err(QueueError::CorruptJournal(_))));
    }
}
