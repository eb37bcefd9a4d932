//! Per-entity-kind sync cursors.

use caresync_codec::{EntityKind, Timestamp};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Shared cursor state for the orchestrator.
///
/// Each entity kind carries its own boundary timestamp; reconciliation only
/// considers records modified strictly after it. Cursors move forward only,
/// and only after a pass finishes without a fatal error, so a record that
/// failed mid-pass stays ahead of the boundary and is retried next pass.
///
/// Cursors are process state. A fresh process starts from
/// [`Timestamp::ZERO`] and re-reconciles everything, which is safe because
/// every application step is an idempotent upsert.
#[derive(Debug, Default)]
pub struct CursorState {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cursors: HashMap<EntityKind, Timestamp>,
    last_sync: Option<Timestamp>,
}

impl CursorState {
    /// Creates cursor state with every kind at [`Timestamp::ZERO`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the boundary for a kind.
    #[must_use]
    pub fn get(&self, kind: EntityKind) -> Timestamp {
        self.inner
            .read()
            .cursors
            .get(&kind)
            .copied()
            .unwrap_or(Timestamp::ZERO)
    }

    /// Moves a kind's boundary forward. A target at or behind the current
    /// boundary is ignored.
    pub fn advance(&self, kind: EntityKind, to: Timestamp) {
        let mut inner = self.inner.write();
        let current = inner.cursors.get(&kind).copied().unwrap_or(Timestamp::ZERO);
        if to > current {
            inner.cursors.insert(kind, to);
            tracing::debug!(%kind, cursor = %to, "advanced sync cursor");
        }
    }

    /// Records the completion time of a successful pass.
    pub fn mark_completed(&self, now: Timestamp) {
        self.inner.write().last_sync = Some(now);
    }

    /// Completion time of the most recent successful pass, if any.
    #[must_use]
    pub fn last_sync_time(&self) -> Option<Timestamp> {
        self.inner.read().last_sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let cursors = CursorState::new();
        for kind in EntityKind::SYNC_ORDER {
            assert_eq!(cursors.get(kind), Timestamp::ZERO);
        }
        assert_eq!(cursors.last_sync_time(), None);
    }

    #[test]
    fn advance_is_monotonic() {
        let cursors = CursorState::new();
        cursors.advance(EntityKind::Profile, Timestamp::from_millis(100));
        cursors.advance(EntityKind::Profile, Timestamp::from_millis(50));
        assert_eq!(cursors.get(EntityKind::Profile), Timestamp::from_millis(100));

        cursors.advance(EntityKind::Profile, Timestamp::from_millis(150));
        assert_eq!(cursors.get(EntityKind::Profile), Timestamp::from_millis(150));
    }

    #[test]
    fn kinds_are_independent() {
        let cursors = CursorState::new();
        cursors.advance(EntityKind::LogEntry, Timestamp::from_millis(42));
        assert_eq!(cursors.get(EntityKind::Profile), Timestamp::ZERO);
        assert_eq!(cursors.get(EntityKind::LogEntry), Timestamp::from_millis(42));
    }

    #[test]
    fn mark_completed_sets_last_sync() {
        let cursors = CursorState::new();
        cursors.mark_completed(Timestamp::from_millis(9000));
        assert_eq!(cursors.last_sync_time(), Some(Timestamp::from_millis(9000)));
    }
}
