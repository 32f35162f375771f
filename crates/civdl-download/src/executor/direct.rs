//! Direct HTTP streaming executor.

use std::path::Path;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use civdl_core::download::{DownloadError, DownloadMethod, DownloadResult};

use super::{ProgressReporter, TransferExecutor, TransferJob, TransferOutcome, TransferPlan};
use crate::progress::PublishGate;

const USER_AGENT: &str = concat!("civdl/", env!("CARGO_PKG_VERSION"));

/// Streams artifacts over HTTP into `<file>.downloading`, renaming on success.
#[derive(Debug, Clone, Default)]
pub struct DirectExecutor;

impl DirectExecutor {
    pub const fn new() -> Self {
        Self
    }

    fn build_client(plan: &TransferPlan) -> DownloadResult<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(plan.timeout);
        if let Some(proxy) = &plan.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| DownloadError::transfer(format!("invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| DownloadError::transfer(format!("failed to build HTTP client: {e}")))
    }

    async fn stream_to_file(
        response: reqwest::Response,
        partial: &Path,
        total: Option<u64>,
        plan: &TransferPlan,
        progress: &ProgressReporter,
    ) -> DownloadResult<u64> {
        let mut file = tokio::fs::File::create(partial)
            .await
            .map_err(|e| DownloadError::from_io_error(&e))?;
        let mut stream = response.bytes_stream();
        let mut gate = PublishGate::default();
        let mut downloaded: u64 = 0;

        // reqwest 0.11 has no per-read timeout; bound each chunk instead.
        loop {
            let next = tokio::time::timeout(plan.timeout, stream.next())
                .await
                .map_err(|_| {
                    DownloadError::transfer(format!(
                        "no data received for {}s after {downloaded} bytes",
                        plan.timeout.as_secs()
                    ))
                })?;
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| {
                DownloadError::transfer(format!("stream interrupted after {downloaded} bytes: {e}"))
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::from_io_error(&e))?;
            downloaded += chunk.len() as u64;

            if gate.admit(downloaded, total) {
                progress.bytes(downloaded, total);
            }
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::from_io_error(&e))?;
        progress.bytes(downloaded, total);
        Ok(downloaded)
    }
}

/// A stream that ended early without an error still failed.
fn check_complete(downloaded: u64, total: Option<u64>) -> DownloadResult<()> {
    match total {
        Some(expected) if downloaded < expected => Err(DownloadError::transfer(format!(
            "connection closed after {downloaded} of {expected} bytes"
        ))),
        _ => Ok(()),
    }
}

async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(target: "civdl.executor", path = %path.display(), "Removed partial file");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(target: "civdl.executor", path = %path.display(), error = %e, "Failed to remove partial file");
        }
    }
}

#[async_trait]
impl TransferExecutor for DirectExecutor {
    fn method(&self) -> DownloadMethod {
        DownloadMethod::Direct
    }

    async fn start(
        &self,
        job: &TransferJob,
        progress: &ProgressReporter,
    ) -> DownloadResult<TransferOutcome> {
        let plan = &job.plan;
        let client = Self::build_client(plan)?;

        let mut request = client.get(&plan.url);
        if let Some(key) = &plan.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::transfer(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::transfer_with_status(
                format!("server responded with {status}"),
                status.as_u16(),
            ));
        }

        let total = response.content_length();
        progress.bytes(0, total);
        tracing::debug!(target: "civdl.executor", id = %job.id, ?total, "Streaming direct download");

        let partial = plan.destination.partial_path();
        let downloaded = match Self::stream_to_file(response, &partial, total, plan, progress).await
        {
            Ok(n) => n,
            Err(e) => {
                remove_if_exists(&partial).await;
                return Err(e);
            }
        };

        if let Err(e) = check_complete(downloaded, total) {
            remove_if_exists(&partial).await;
            return Err(e);
        }

        let final_path = plan.destination.final_path();
        if let Err(e) = tokio::fs::rename(&partial, &final_path).await {
            remove_if_exists(&partial).await;
            return Err(DownloadError::from_io_error(&e));
        }

        Ok(TransferOutcome {
            path: final_path,
            bytes: downloaded,
            already_present: false,
        })
    }

    async fn cancel(&self, job: &TransferJob, _progress: &ProgressReporter) {
        remove_if_exists(&job.plan.destination.partial_path()).await;
    }
}
