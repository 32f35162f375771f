//! Transfer executors.
//!
//! The scheduler hands each admitted task to one [`TransferExecutor`] and
//! stays agnostic of how the bytes move. Executors publish raw counters
//! through a [`ProgressReporter`]; smoothing and store writes happen in the
//! manager's progress bridge.
//!
//! - `direct` - streams over HTTP into a `.downloading` file
//! - `aria2` - delegates to an aria2 daemon over JSON-RPC

pub mod aria2;
pub mod direct;

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use civdl_core::Settings;
use civdl_core::download::{
    DownloadMethod, DownloadResult, TaskId, TaskStatus, TaskUpdate,
};

use crate::manager::DownloadDestination;
use crate::store::TaskStore;

pub use aria2::{
    Aria2Config, Aria2Daemon, Aria2Endpoint, Aria2Executor, Aria2Rpc, DaemonError, DaemonOptions,
    JsonRpcAria2, RpcError, ensure_daemon,
};
pub use direct::DirectExecutor;

/// Everything an executor needs, captured from settings at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    /// Direct URL of the artifact.
    pub url: String,
    pub destination: DownloadDestination,
    /// Bearer credential for the download host.
    pub api_key: Option<String>,
    /// Proxy URL for direct transfers.
    pub proxy: Option<String>,
    /// Connect timeout, and the longest a stream may stay silent.
    pub timeout: Duration,
    /// Set when delegation was enabled for this task.
    pub delegate: Option<Aria2Endpoint>,
}

impl TransferPlan {
    pub fn from_settings(
        settings: &Settings,
        url: impl Into<String>,
        destination: DownloadDestination,
    ) -> Self {
        Self {
            url: url.into(),
            destination,
            api_key: settings.api_key.clone(),
            proxy: settings.effective_proxy().map(str::to_string),
            timeout: Duration::from_secs(settings.timeout_secs.max(1)),
            delegate: settings.use_aria2.then(|| Aria2Endpoint {
                url: settings.aria2_url.clone(),
                secret: settings.aria2_secret.clone(),
            }),
        }
    }
}

/// A task handed to an executor.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub id: TaskId,
    pub plan: TransferPlan,
}

/// Result of a successful transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub path: PathBuf,
    pub bytes: u64,
    /// The artifact was already on disk and nothing was transferred.
    pub already_present: bool,
}

/// Raw counters sent through the watch channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    /// Bytes downloaded so far.
    pub downloaded: u64,
    /// Total bytes, once known.
    pub total: Option<u64>,
    /// Rate measured by the transfer itself, if it reports one.
    pub rate: Option<f64>,
    /// Monotonically increasing sequence number for change detection.
    pub seq: u64,
}

/// Executor-side handle for reporting progress and ownership details.
pub struct ProgressReporter {
    id: TaskId,
    store: TaskStore,
    tx: watch::Sender<ProgressUpdate>,
    delegate_job_id: OnceLock<String>,
}

impl ProgressReporter {
    pub fn new(id: TaskId, store: TaskStore, tx: watch::Sender<ProgressUpdate>) -> Self {
        Self {
            id,
            store,
            tx,
            delegate_job_id: OnceLock::new(),
        }
    }

    /// Publish byte counters.
    pub fn bytes(&self, downloaded: u64, total: Option<u64>) {
        self.publish(downloaded, total, None);
    }

    /// Publish byte counters with a transfer-measured rate.
    pub fn bytes_with_rate(&self, downloaded: u64, total: Option<u64>, rate: f64) {
        self.publish(downloaded, total, Some(rate));
    }

    fn publish(&self, downloaded: u64, total: Option<u64>, rate: Option<f64>) {
        // send_modify avoids clone and is infallible
        self.tx.send_modify(|state| {
            state.downloaded = downloaded;
            state.total = total;
            state.rate = rate;
            state.seq += 1;
        });
    }

    /// Record the external downloader's job id on the task.
    pub fn delegated(&self, job_id: &str) -> DownloadResult<()> {
        self.store.update(
            self.id,
            TaskUpdate::Delegated {
                job_id: job_id.to_string(),
            },
        )?;
        let _ = self.delegate_job_id.set(job_id.to_string());
        Ok(())
    }

    /// Job id recorded by [`Self::delegated`], if any.
    pub fn delegate_job_id(&self) -> Option<&str> {
        self.delegate_job_id.get().map(String::as_str)
    }

    /// Refine the running status (`downloading` / `active`).
    pub fn status(&self, status: TaskStatus) -> DownloadResult<()> {
        self.store.update(self.id, TaskUpdate::Status(status))?;
        Ok(())
    }
}

/// Polymorphic transfer strategy.
#[async_trait]
pub trait TransferExecutor: Send + Sync {
    /// Strategy recorded on tasks this executor owns.
    fn method(&self) -> DownloadMethod;

    /// Perform the transfer. The returned future is dropped on cancellation,
    /// so any state that must be undone belongs in [`Self::cancel`].
    async fn start(
        &self,
        job: &TransferJob,
        progress: &ProgressReporter,
    ) -> DownloadResult<TransferOutcome>;

    /// Abort the transfer and discard partial output.
    async fn cancel(&self, job: &TransferJob, progress: &ProgressReporter);
}

#[cfg(test)]
pub mod testing {
    //! Scripted executors for scheduler tests.

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Semaphore;

    use civdl_core::download::DownloadError;

    use super::*;

    /// Executor that reports one reading then blocks until released.
    #[derive(Clone)]
    pub struct GatedExecutor {
        pub gate: Arc<Semaphore>,
        pub started: Arc<AtomicUsize>,
        pub cancelled: Arc<AtomicUsize>,
        pub fail_with: Option<DownloadError>,
    }

    impl GatedExecutor {
        pub fn new() -> Self {
            Self {
                gate: Arc::new(Semaphore::new(0)),
                started: Arc::new(AtomicUsize::new(0)),
                cancelled: Arc::new(AtomicUsize::new(0)),
                fail_with: None,
            }
        }
    }

    #[async_trait]
    impl TransferExecutor for GatedExecutor {
        fn method(&self) -> DownloadMethod {
            DownloadMethod::Direct
        }

        async fn start(
            &self,
            job: &TransferJob,
            progress: &ProgressReporter,
        ) -> DownloadResult<TransferOutcome> {
            self.started.fetch_add(1, Ordering::SeqCst);
            progress.bytes(10, Some(100));
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| DownloadError::other(e.to_string()))?;
            permit.forget();
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            progress.bytes(100, Some(100));
            Ok(TransferOutcome {
                path: job.plan.destination.final_path(),
                bytes: 100,
                already_present: false,
            })
        }

        async fn cancel(&self, _job: &TransferJob, _progress: &ProgressReporter) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }
}
