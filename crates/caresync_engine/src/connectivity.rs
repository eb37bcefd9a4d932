//! Connectivity-driven sync triggering.

use crate::orchestrator::SyncOrchestrator;
use crate::store::{LocalStore, RemoteStore};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Spawns a task that triggers a sync pass whenever connectivity comes
/// back while operations are queued.
///
/// The task consumes transitions from the watch channel: a change to
/// `true` from an observed `false` triggers a pass when `pending_count`
/// is non-zero. Missed intermediate flips are tolerated; only the latest
/// value matters. The task ends when every sender is dropped.
///
/// Triggers landing while a pass is in flight are dropped by the
/// orchestrator's single-flight guard; connectivity loss never cancels a
/// running pass.
pub fn watch_connectivity<L, R>(
    orchestrator: Arc<SyncOrchestrator<L, R>>,
    mut connected: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    L: LocalStore + 'static,
    R: RemoteStore + 'static,
{
    // Baseline is read at subscription time, not at first poll. A flip
    // that lands before the task runs is then an unseen version on the
    // receiver and still surfaces through `changed()`.
    let mut was_connected = *connected.borrow();
    tokio::spawn(async move {
        while connected.changed().await.is_ok() {
            let is_connected = *connected.borrow_and_update();
            let came_online = is_connected && !was_connected;
            was_connected = is_connected;

            if !came_online {
                continue;
            }
            if orchestrator.pending_count() == 0 {
                tracing::debug!("connectivity restored, queue empty, no sync");
                continue;
            }

            tracing::info!(
                pending = orchestrator.pending_count(),
                "connectivity restored, triggering sync"
            );
            orchestrator.sync().await;
        }
    })
}
