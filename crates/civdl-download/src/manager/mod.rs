//! Queue manager implementation.
//!
//! Owns the task store, the admission queue and every in-flight transfer.
//! A single long-lived runner admits queued tasks whenever a slot frees up;
//! each admitted task runs on its own tokio task through a
//! [`TransferExecutor`], with a progress bridge writing smoothed readings to
//! the store.
//!
//! # Concurrency Model
//!
//! - `Notify` wakes the runner on enqueue and on every finalize
//! - Lease tokens prevent stale finalize commits
//! - Lock order: queue → active → store (consistent everywhere)
//! - The terminal store update happens before the slot is released, so the
//!   number of running tasks never exceeds the configured capacity

mod bridge;
mod config;
mod paths;
pub(crate) mod worker;


use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use civdl_core::download::{
    DownloadError, DownloadRequest, DownloadResult, Task, TaskId, TaskSpec, TaskUpdate, TaskView,
};
use civdl_core::ports::{CatalogPort, SettingsProvider};

use crate::executor::{
    ProgressReporter, ProgressUpdate, TransferExecutor, TransferJob, TransferOutcome, TransferPlan,
};
use crate::queue::{AdmissionQueue, Lane, LaneCounts, QueuedItem};
use crate::store::{TaskStore, display_order};

pub use config::QueueConfig;
pub use paths::{DownloadDestination, sanitize_filename};

/// Lease ID for tracking active transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LeaseId(u64);

/// State for an admitted task.
struct ActiveJob {
    lease: LeaseId,
    /// Cancels the transfer.
    cancel: CancellationToken,
    /// Fires once the task has been finalized and its slot released.
    finished: CancellationToken,
    lane: Lane,
}

/// Collaborators handed to [`QueueManager::init`].
pub struct QueueManagerDeps {
    pub catalog: Arc<dyn CatalogPort>,
    pub settings: Arc<dyn SettingsProvider>,
    /// Always available fallback.
    pub direct: Arc<dyn TransferExecutor>,
    /// Used for tasks planned with a delegate endpoint.
    pub delegated: Option<Arc<dyn TransferExecutor>>,
    pub config: QueueConfig,
}

/// How [`QueueManager::drain`] treats in-flight transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
    /// Let running transfers finish, cancelling whatever is left after `timeout`.
    Await { timeout: Duration },
    /// Cancel running transfers right away.
    Cancel,
}

/// Result of the cheap activity query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCount {
    /// Non-terminal tasks, queued ones included.
    pub active: usize,
    /// Tasks currently holding a concurrency slot.
    pub running: usize,
}

/// The download queue: task store, FIFO scheduler and executor dispatch.
pub struct QueueManager {
    store: TaskStore,
    catalog: Arc<dyn CatalogPort>,
    settings: Arc<dyn SettingsProvider>,
    direct: Arc<dyn TransferExecutor>,
    delegated: Option<Arc<dyn TransferExecutor>>,
    config: QueueConfig,
    queue: Mutex<AdmissionQueue>,
    active: Mutex<HashMap<TaskId, ActiveJob>>,
    lease_counter: AtomicU64,
    queue_notify: Notify,
    accepting: AtomicBool,
    /// Delegation is skipped until this instant after the delegate went away.
    delegate_down_until: std::sync::Mutex<Option<Instant>>,
    jobs: TaskTracker,
    shutdown: CancellationToken,
}

impl QueueManager {
    /// Build the manager and start its runner.
    ///
    /// Must be called from within a tokio runtime, once per process.
    pub fn init(deps: QueueManagerDeps) -> Arc<Self> {
        let manager = Arc::new(Self {
            store: TaskStore::new(deps.config.history_limit),
            catalog: deps.catalog,
            settings: deps.settings,
            direct: deps.direct,
            delegated: deps.delegated,
            config: deps.config,
            queue: Mutex::new(AdmissionQueue::new()),
            active: Mutex::new(HashMap::new()),
            lease_counter: AtomicU64::new(0),
            queue_notify: Notify::new(),
            accepting: AtomicBool::new(true),
            delegate_down_until: std::sync::Mutex::new(None),
            jobs: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        });

        tracing::info!(
            target: "civdl.download",
            max_concurrent = manager.config.max_concurrent,
            test_lane_slots = manager.config.test_lane_slots,
            delegation = manager.delegated.is_some(),
            "Queue manager started"
        );

        tokio::spawn(Arc::clone(&manager).run_loop());
        manager
    }

    pub const fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Whether new tasks are still accepted.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Resolve a request against the catalog and enqueue a new task.
    ///
    /// Unresolvable identifiers are rejected with a validation error and no
    /// task is created. Identical requests produce independent tasks.
    pub async fn create(&self, request: DownloadRequest) -> DownloadResult<TaskView> {
        if !self.is_accepting() {
            return Err(DownloadError::ShuttingDown);
        }

        let settings = self.settings.current();
        let resolved = self.catalog.resolve(request.artifact()).await?;
        let destination = DownloadDestination::plan(
            &settings.model_dir,
            request.subfolder.as_deref(),
            &resolved.filename,
        )?;
        let plan = TransferPlan::from_settings(&settings, resolved.download_url, destination);

        let task = {
            let mut queue = self.queue.lock().await;
            if !self.is_accepting() {
                return Err(DownloadError::ShuttingDown);
            }
            let task = self.store.create(TaskSpec {
                model_id: resolved.model_id,
                version_id: resolved.version_id,
                file_id: resolved.file_id,
                model_name: resolved.model_name,
                model_type: resolved.model_type,
                filename: plan.destination.filename.clone(),
                file_path: plan.destination.final_path(),
                is_test: request.is_test,
            });
            queue.enqueue(QueuedItem::new(task.id, Lane::for_task(task.is_test), plan));
            task
        };

        tracing::info!(
            target: "civdl.download",
            id = %task.id,
            model_id = task.model_id,
            file = %task.filename,
            is_test = task.is_test,
            "Download queued"
        );
        self.queue_notify.notify_one();
        Ok(self.view(&task))
    }

    /// Snapshot of one task.
    pub fn get(&self, id: TaskId) -> DownloadResult<TaskView> {
        self.store.get(id).map(|task| self.view(&task))
    }

    /// All tasks, running first, then queued, then finished newest first.
    pub fn list(&self) -> Vec<TaskView> {
        let now = Utc::now();
        let window = self.config.recent_window_chrono();
        display_order(self.store.list())
            .iter()
            .map(|task| task.view(now, window))
            .collect()
    }

    /// Cancel a task.
    ///
    /// A queued task becomes `cancelled` without ever starting. A running
    /// task is signalled and awaited for up to `cancel_timeout`. Cancelling a
    /// terminal task returns it unchanged.
    pub async fn cancel(&self, id: TaskId) -> DownloadResult<TaskView> {
        let finished = {
            let mut queue = self.queue.lock().await;
            if queue.remove(id).is_some() {
                drop(queue);
                let task = self.store.update(id, TaskUpdate::Cancelled)?;
                tracing::info!(target: "civdl.download", %id, "Queued download cancelled");
                return Ok(self.view(&task));
            }

            let active = self.active.lock().await;
            active.get(&id).map(|job| {
                job.cancel.cancel();
                job.finished.clone()
            })
        };

        if let Some(finished) = finished {
            tracing::info!(target: "civdl.download", %id, "Cancelling running download");
            if tokio::time::timeout(self.config.cancel_timeout, finished.cancelled())
                .await
                .is_err()
            {
                tracing::warn!(
                    target: "civdl.download",
                    %id,
                    timeout = ?self.config.cancel_timeout,
                    "Transfer did not stop in time"
                );
            }
        }

        self.get(id)
    }

    /// Remove a task, cancelling it first if it is still in flight.
    pub async fn delete(&self, id: TaskId) -> DownloadResult<()> {
        let task = self.store.get(id)?;
        if !task.status.is_terminal() {
            self.cancel(id).await?;
        }
        self.store.delete(id)?;
        tracing::info!(target: "civdl.download", %id, "Download removed");
        Ok(())
    }

    /// Drop every finished task; returns how many were removed.
    pub fn clear_history(&self) -> usize {
        let removed = self.store.clear_history();
        tracing::info!(target: "civdl.download", removed, "History cleared");
        removed
    }

    /// Cheap count of non-terminal and running tasks.
    pub async fn active_count(&self) -> ActiveCount {
        ActiveCount {
            active: self.store.active_count(),
            running: self.active.lock().await.len(),
        }
    }

    /// Stop admission, cancel queued tasks and settle in-flight transfers.
    ///
    /// Later calls to [`Self::create`] fail with `ShuttingDown`.
    pub async fn drain(&self, mode: DrainMode) {
        self.accepting.store(false, Ordering::Release);

        let pending = self.queue.lock().await.drain_all();
        for item in &pending {
            if let Err(e) = self.store.update(item.id, TaskUpdate::Cancelled) {
                tracing::debug!(target: "civdl.download", id = %item.id, error = %e, "Skipped pending task");
            }
        }
        tracing::info!(
            target: "civdl.download",
            cancelled = pending.len(),
            mode = ?mode,
            "Draining download queue"
        );

        self.jobs.close();
        match mode {
            DrainMode::Cancel => self.cancel_running().await,
            DrainMode::Await { timeout } => {
                if tokio::time::timeout(timeout, self.jobs.wait()).await.is_err() {
                    tracing::warn!(
                        target: "civdl.download",
                        ?timeout,
                        "Transfers still running after drain timeout, cancelling"
                    );
                    self.cancel_running().await;
                }
            }
        }
        self.jobs.wait().await;
        self.shutdown.cancel();
        tracing::info!(target: "civdl.download", "Download queue drained");
    }

    // =========================================================================
    // Runner
    // =========================================================================

    async fn run_loop(self: Arc<Self>) {
        loop {
            self.admit_ready().await;

            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break,
                () = self.queue_notify.notified() => {}
            }
        }
        tracing::debug!(target: "civdl.download", "Runner stopped");
    }

    /// Admit queued tasks while their lane has a free slot.
    ///
    /// Lock order: queue → active.
    async fn admit_ready(self: &Arc<Self>) {
        let mut queue = self.queue.lock().await;
        let mut active = self.active.lock().await;
        let capacity = LaneCounts {
            main: self.config.max_concurrent,
            test: self.config.test_lane_slots,
        };

        loop {
            let running = active.values().fold(LaneCounts::default(), |mut counts, job| {
                match job.lane {
                    Lane::Main => counts.main += 1,
                    Lane::Test => counts.test += 1,
                }
                counts
            });
            let Some(item) = queue.next_admissible(running, capacity) else {
                break;
            };

            if let Err(e) = self.store.update(item.id, TaskUpdate::Admitted) {
                tracing::warn!(target: "civdl.download", id = %item.id, error = %e, "Dropping unadmittable task");
                continue;
            }

            let lease = LeaseId(self.lease_counter.fetch_add(1, Ordering::Relaxed));
            let cancel = CancellationToken::new();
            active.insert(
                item.id,
                ActiveJob {
                    lease,
                    cancel: cancel.clone(),
                    finished: CancellationToken::new(),
                    lane: item.lane,
                },
            );

            tracing::debug!(
                target: "civdl.download",
                id = %item.id,
                lane = ?item.lane,
                waited = ?item.queued_at.elapsed(),
                "Download admitted"
            );
            self.jobs.spawn(Arc::clone(self).execute(item, lease, cancel));
        }
    }

    /// Run one admitted task end to end.
    async fn execute(self: Arc<Self>, item: QueuedItem, lease: LeaseId, cancel: CancellationToken) {
        let executor = self.select_executor(&item.plan);
        let job = TransferJob {
            id: item.id,
            plan: item.plan,
        };

        let (progress_tx, progress_rx) = watch::channel(ProgressUpdate::default());
        let bridge = bridge::spawn_progress_bridge(
            self.store.clone(),
            job.id,
            progress_rx,
            cancel.clone(),
            self.config.progress_interval,
        );
        let reporter = ProgressReporter::new(job.id, self.store.clone(), progress_tx);

        tracing::info!(
            target: "civdl.download",
            id = %job.id,
            method = %executor.method().as_str(),
            path = %job.plan.destination.final_path().display(),
            "Download started"
        );
        let result = worker::run_job(&job, executor.as_ref(), &reporter, &cancel).await;

        // Closing the channel lets the bridge commit its final reading.
        drop(reporter);
        if let Err(e) = bridge.await {
            tracing::debug!(target: "civdl.download", id = %job.id, error = %e, "Progress bridge ended abnormally");
        }

        self.finalize(job.id, lease, result).await;
    }

    fn select_executor(&self, plan: &TransferPlan) -> Arc<dyn TransferExecutor> {
        match (&plan.delegate, &self.delegated) {
            (Some(_), Some(delegated)) if !self.delegate_cooling_down() => Arc::clone(delegated),
            _ => Arc::clone(&self.direct),
        }
    }

    fn delegate_cooling_down(&self) -> bool {
        let mut until = self
            .delegate_down_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match *until {
            Some(deadline) if Instant::now() < deadline => true,
            Some(_) => {
                *until = None;
                tracing::info!(target: "civdl.download", "Retrying delegated downloads");
                false
            }
            None => false,
        }
    }

    fn mark_delegate_down(&self) {
        let mut until = self
            .delegate_down_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *until = Some(Instant::now() + self.config.delegate_cooldown);
        tracing::warn!(
            target: "civdl.download",
            cooldown = ?self.config.delegate_cooldown,
            "Delegate unavailable, continuing with direct downloads"
        );
    }

    /// Commit the terminal state and release the slot.
    ///
    /// Verifies the lease to prevent stale commits.
    async fn finalize(&self, id: TaskId, lease: LeaseId, result: DownloadResult<TransferOutcome>) {
        let mut active = self.active.lock().await;
        if !active.get(&id).is_some_and(|job| job.lease == lease) {
            tracing::debug!(target: "civdl.download", %id, "Ignoring stale finalize (lease mismatch)");
            return;
        }

        let update = match result {
            Ok(outcome) => {
                tracing::info!(
                    target: "civdl.download",
                    %id,
                    bytes = outcome.bytes,
                    already_present = outcome.already_present,
                    "Download completed"
                );
                TaskUpdate::Completed
            }
            Err(DownloadError::Cancelled) => {
                tracing::info!(target: "civdl.download", %id, "Download cancelled");
                TaskUpdate::Cancelled
            }
            Err(e) => {
                if e.is_delegate_unavailable() {
                    self.mark_delegate_down();
                }
                tracing::warn!(target: "civdl.download", %id, error = %e, "Download failed");
                TaskUpdate::Failed {
                    error: e.to_string(),
                }
            }
        };
        if let Err(e) = self.store.update(id, update) {
            // The task was deleted while its transfer wound down.
            tracing::debug!(target: "civdl.download", %id, error = %e, "Terminal update skipped");
        }

        if let Some(job) = active.remove(&id) {
            job.finished.cancel();
        }
        drop(active);
        self.queue_notify.notify_one();
    }

    /// Signal every running transfer to stop.
    async fn cancel_running(&self) {
        for job in self.active.lock().await.values() {
            job.cancel.cancel();
        }
    }

    fn view(&self, task: &Task) -> TaskView {
        task.view(Utc::now(), self.config.recent_window_chrono())
    }
}
