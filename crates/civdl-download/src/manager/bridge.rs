//! Progress bridge.
//!
//! Subscribes to an executor's watch channel and writes smoothed progress to
//! the store at a fixed cadence, so executors never touch the store on their
//! hot path.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use civdl_core::download::{ProgressTracker, TaskId, TaskUpdate};

use crate::executor::ProgressUpdate;
use crate::store::TaskStore;

fn commit(store: &TaskStore, id: TaskId, tracker: &mut ProgressTracker, current: &ProgressUpdate) {
    let sample = tracker.observe(Instant::now(), current.downloaded, current.total, current.rate);
    let update = TaskUpdate::Progress {
        bytes_downloaded: sample.bytes_downloaded,
        bytes_total: sample.bytes_total,
        speed: sample.speed,
        eta: sample.eta,
    };
    if let Err(e) = store.update(id, update) {
        tracing::debug!(target: "civdl.download", %id, error = %e, "Dropped progress update");
    }
}

/// Spawn the bridge; it exits when the sender is dropped or on cancel.
pub fn spawn_progress_bridge(
    store: TaskStore,
    id: TaskId,
    mut rx: watch::Receiver<ProgressUpdate>,
    cancel: CancellationToken,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut tracker = ProgressTracker::new();
        let mut last_seq = 0u64;

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    // The cancelled status is final; no trailing progress.
                    break;
                }

                result = rx.changed() => {
                    if result.is_err() {
                        // Sender dropped (job finished), commit final and exit
                        let current = rx.borrow().clone();
                        if current.seq > last_seq {
                            commit(&store, id, &mut tracker, &current);
                        }
                        break;
                    }
                    // Progress changed, will be picked up on next tick
                }

                _ = tick.tick() => {
                    let current = rx.borrow().clone();
                    if current.seq > last_seq {
                        commit(&store, id, &mut tracker, &current);
                        last_seq = current.seq;
                    }
                }
            }
        }
    })
}
