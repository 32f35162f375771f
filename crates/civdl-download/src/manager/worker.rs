//! Transfer worker.
//!
//! Runs one admitted task through its executor, isolated from the manager's
//! queue locks. The worker only talks to the executor and the progress
//! reporter; terminal store updates are left to the manager.

use tokio_util::sync::CancellationToken;

use civdl_core::download::{DownloadError, DownloadResult};

use crate::executor::{ProgressReporter, TransferExecutor, TransferJob, TransferOutcome};

/// Run a job to completion or cancellation.
///
/// # Cancellation
///
/// When `cancel` fires, the in-flight executor future is dropped at its next
/// await point, the executor's own cleanup runs, and this returns
/// `Err(DownloadError::Cancelled)`.
pub async fn run_job(
    job: &TransferJob,
    executor: &dyn TransferExecutor,
    progress: &ProgressReporter,
    cancel: &CancellationToken,
) -> DownloadResult<TransferOutcome> {
    job.plan.destination.ensure_dir().await?;

    if let Some(len) = job.plan.destination.existing_len().await {
        tracing::info!(
            target: "civdl.download",
            id = %job.id,
            path = %job.plan.destination.final_path().display(),
            "File already present, skipping transfer"
        );
        progress.bytes(len, Some(len));
        return Ok(TransferOutcome {
            path: job.plan.destination.final_path(),
            bytes: len,
            already_present: true,
        });
    }

    let result = tokio::select! {
        biased;

        () = cancel.cancelled() => Err(DownloadError::Cancelled),
        result = executor.start(job, progress) => result,
    };

    if matches!(result, Err(DownloadError::Cancelled)) {
        executor.cancel(job, progress).await;
    }
    result
}
