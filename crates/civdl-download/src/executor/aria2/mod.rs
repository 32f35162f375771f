//! Delegated executor backed by an aria2 daemon.
//!
//! The transfer is submitted with `aria2.addUri` under a GID chosen here, and
//! then observed by polling `aria2.tellStatus` at the progress cadence. aria2
//! writes straight to the final path, so cancellation and failure both remove
//! the job along with the output and its `.aria2` control file.

mod daemon;
mod rpc;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval, timeout};
use uuid::Uuid;

use civdl_core::download::{DownloadError, DownloadMethod, DownloadResult, TaskId, TaskStatus};

use super::{ProgressReporter, TransferExecutor, TransferJob, TransferOutcome};

pub use daemon::{Aria2Daemon, DaemonError, DaemonOptions, ensure_daemon};
pub use rpc::{AddUriOptions, Aria2Endpoint, Aria2Rpc, Aria2State, Aria2Status, JsonRpcAria2, RpcError};

#[cfg(test)]
pub use rpc::MockAria2Rpc;

const REFERER: &str = "https://civitai.com/";
const USER_AGENT: &str = concat!("civdl/", env!("CARGO_PKG_VERSION"));

/// Tuning for the delegated executor.
#[derive(Debug, Clone)]
pub struct Aria2Config {
    /// How often `aria2.tellStatus` is polled.
    pub poll_interval: Duration,
    /// Consecutive failed polls before the task is failed.
    pub max_poll_failures: u32,
    /// Upper bound on the remove call during cancellation.
    pub cancel_timeout: Duration,
    /// How long cancellation waits for an in-flight `addUri` to settle.
    pub submit_wait: Duration,
}

impl Default for Aria2Config {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(300),
            max_poll_failures: 3,
            cancel_timeout: Duration::from_millis(1200),
            submit_wait: Duration::from_secs(5),
        }
    }
}

impl Aria2Config {
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_max_poll_failures(mut self, failures: u32) -> Self {
        self.max_poll_failures = failures;
        self
    }
}

/// What a polled aria2 state means for the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Observed {
    Running,
    /// Still waiting inside aria2. The task is already admitted, so this
    /// never moves it back to `queued`.
    Waiting,
    Complete,
    Failed,
    Removed,
}

const fn observe(state: Aria2State) -> Observed {
    match state {
        Aria2State::Active | Aria2State::Paused => Observed::Running,
        Aria2State::Waiting => Observed::Waiting,
        Aria2State::Complete => Observed::Complete,
        Aria2State::Error => Observed::Failed,
        Aria2State::Removed => Observed::Removed,
    }
}

/// A fresh GID in aria2's format.
fn new_gid() -> String {
    let mut gid = Uuid::new_v4().simple().to_string();
    gid.truncate(16);
    gid
}

/// A daemon that answered and refused the job is a failed task; anything
/// else means the daemon could not be used.
fn submit_error(err: RpcError) -> DownloadError {
    match err {
        RpcError::Remote { code, message } => {
            DownloadError::delegate_failed(message, Some(code.to_string()))
        }
        other => DownloadError::delegate_unavailable(other.to_string()),
    }
}

/// Hands transfers to aria2 and mirrors its progress.
pub struct Aria2Executor {
    rpc: Arc<dyn Aria2Rpc>,
    config: Aria2Config,
    /// `addUri` calls still in flight, flipped to `true` once answered.
    submissions: Mutex<HashMap<TaskId, watch::Receiver<bool>>>,
}

impl Aria2Executor {
    pub fn new(rpc: Arc<dyn Aria2Rpc>, config: Aria2Config) -> Self {
        Self {
            rpc,
            config,
            submissions: Mutex::new(HashMap::new()),
        }
    }

    fn options(job: &TransferJob, gid: &str) -> AddUriOptions {
        let mut headers = vec![
            format!("Referer: {REFERER}"),
            format!("User-Agent: {USER_AGENT}"),
        ];
        if let Some(key) = &job.plan.api_key {
            headers.push(format!("Authorization: Bearer {key}"));
        }
        AddUriOptions {
            gid: gid.to_string(),
            dir: job.plan.destination.dir.to_string_lossy().into_owned(),
            out: job.plan.destination.filename.clone(),
            headers,
        }
    }

    fn endpoint(job: &TransferJob) -> DownloadResult<&Aria2Endpoint> {
        job.plan
            .delegate
            .as_ref()
            .ok_or_else(|| DownloadError::other("task was not planned for delegation"))
    }

    fn submissions(&self) -> MutexGuard<'_, HashMap<TaskId, watch::Receiver<bool>>> {
        self.submissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `addUri` on its own task so that dropping the caller cannot cut
    /// the request off after aria2 has accepted it.
    async fn submit(
        &self,
        job: &TransferJob,
        endpoint: &Aria2Endpoint,
        gid: &str,
    ) -> DownloadResult<String> {
        let (settled_tx, settled_rx) = watch::channel(false);
        self.submissions().insert(job.id, settled_rx);

        let rpc = Arc::clone(&self.rpc);
        let endpoint = endpoint.clone();
        let uri = job.plan.url.clone();
        let options = Self::options(job, gid);
        let handle = tokio::spawn(async move {
            let result = rpc.add_uri(&endpoint, &uri, &options).await;
            settled_tx.send_replace(true);
            result
        });

        let joined = handle.await;
        self.submissions().remove(&job.id);
        joined
            .map_err(|e| DownloadError::other(format!("aria2 submission aborted: {e}")))?
            .map_err(submit_error)
    }

    /// Wait for a submission interrupted by cancellation to be answered.
    async fn settle_submission(&self, id: TaskId) {
        let Some(mut settled) = self.submissions().remove(&id) else {
            return;
        };
        let answered = timeout(self.config.submit_wait, settled.wait_for(|done| *done))
            .await
            .is_ok();
        if !answered {
            tracing::warn!(target: "civdl.aria2", %id, "aria2 submission still unanswered, removing anyway");
        }
    }

    /// Force-remove the job, if any, and delete everything it wrote.
    async fn discard(&self, job: &TransferJob, gid: Option<&str>) {
        if let (Ok(endpoint), Some(gid)) = (Self::endpoint(job), gid) {
            match timeout(self.config.cancel_timeout, self.rpc.remove(endpoint, gid, true)).await {
                Ok(Ok(())) => {
                    tracing::info!(target: "civdl.aria2", id = %job.id, %gid, "Removed aria2 job");
                }
                Ok(Err(e)) => {
                    tracing::warn!(target: "civdl.aria2", id = %job.id, %gid, error = %e, "aria2 remove failed");
                }
                Err(_) => {
                    tracing::warn!(target: "civdl.aria2", id = %job.id, %gid, "aria2 remove timed out");
                }
            }
        }
        remove_file_quietly(&job.plan.destination.final_path()).await;
        remove_file_quietly(&job.plan.destination.control_path()).await;
    }
}

async fn remove_file_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(target: "civdl.aria2", path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}

#[async_trait]
impl TransferExecutor for Aria2Executor {
    fn method(&self) -> DownloadMethod {
        DownloadMethod::Delegated
    }

    async fn start(
        &self,
        job: &TransferJob,
        progress: &ProgressReporter,
    ) -> DownloadResult<TransferOutcome> {
        let endpoint = Self::endpoint(job)?;

        // Recorded before submitting so that cleanup can always reach the job.
        let gid = new_gid();
        progress.delegated(&gid)?;
        let accepted = self.submit(job, endpoint, &gid).await?;
        if accepted != gid {
            tracing::debug!(target: "civdl.aria2", id = %job.id, %gid, %accepted, "aria2 answered with a different GID");
        }
        tracing::info!(target: "civdl.aria2", id = %job.id, %gid, "Delegated download to aria2");

        let mut tick = interval(self.config.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut failures = 0u32;
        let mut reported_active = false;

        loop {
            tick.tick().await;

            let status = match self.rpc.tell_status(endpoint, &gid).await {
                Ok(status) => {
                    failures = 0;
                    status
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(target: "civdl.aria2", id = %job.id, %gid, failures, error = %e, "aria2 status poll failed");
                    if failures >= self.config.max_poll_failures {
                        self.discard(job, Some(&gid)).await;
                        return Err(DownloadError::delegate_unavailable(format!(
                            "lost contact with aria2 after {failures} failed polls: {e}"
                        )));
                    }
                    continue;
                }
            };

            let total = (status.total_length > 0).then_some(status.total_length);
            #[allow(clippy::cast_precision_loss)]
            progress.bytes_with_rate(
                status.completed_length,
                total,
                status.download_speed as f64,
            );

            match observe(status.status) {
                Observed::Running => {
                    if !reported_active {
                        if let Err(e) = progress.status(TaskStatus::Active) {
                            tracing::debug!(target: "civdl.aria2", id = %job.id, error = %e, "Status refinement rejected");
                        }
                        reported_active = true;
                    }
                }
                Observed::Waiting => {}
                Observed::Complete => {
                    return Ok(TransferOutcome {
                        path: job.plan.destination.final_path(),
                        bytes: status.completed_length,
                        already_present: false,
                    });
                }
                Observed::Failed => {
                    let message = status
                        .error_message
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| "aria2 reported an error".to_string());
                    self.discard(job, Some(&gid)).await;
                    return Err(DownloadError::delegate_failed(message, status.error_code));
                }
                Observed::Removed => {
                    tracing::info!(target: "civdl.aria2", id = %job.id, %gid, "aria2 job removed externally");
                    return Err(DownloadError::Cancelled);
                }
            }
        }
    }

    async fn cancel(&self, job: &TransferJob, progress: &ProgressReporter) {
        self.settle_submission(job.id).await;
        self.discard(job, progress.delegate_job_id()).await;
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeAria2, status};
    use super::*;

    use mockall::predicate::{always, eq};
    use tokio_util::sync::CancellationToken;

    use civdl_core::download::{DownloadMethod, TaskSpec, TaskUpdate};

    use crate::executor::{ProgressUpdate, TransferPlan};
    use crate::manager::DownloadDestination;
    use crate::manager::worker::run_job;
    use crate::store::TaskStore;

    struct Harness {
        store: TaskStore,
        job: TransferJob,
        reporter: ProgressReporter,
        rx: watch::Receiver<ProgressUpdate>,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn seed_partial_files(&self) {
            std::fs::write(self.job.plan.destination.final_path(), b"part").unwrap();
            std::fs::write(self.job.plan.destination.control_path(), b"ctl").unwrap();
        }

        fn files_left(&self) -> (bool, bool) {
            (
                self.job.plan.destination.final_path().exists(),
                self.job.plan.destination.control_path().exists(),
            )
        }
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let destination = DownloadDestination::plan(dir.path(), None, "lora.safetensors").unwrap();
        let store = TaskStore::default();
        let task = store.create(TaskSpec {
            model_id: 1,
            version_id: 2,
            file_id: 3,
            model_name: "m".to_string(),
            model_type: "LORA".to_string(),
            filename: "lora.safetensors".to_string(),
            file_path: destination.final_path(),
            is_test: false,
        });
        store.update(task.id, TaskUpdate::Admitted).unwrap();
        let (tx, rx) = watch::channel(ProgressUpdate::default());
        let plan = TransferPlan {
            url: "https://civitai.com/api/download/models/3".to_string(),
            destination,
            api_key: Some("key".to_string()),
            proxy: None,
            timeout: Duration::from_secs(5),
            delegate: Some(Aria2Endpoint {
                url: "http://localhost:6800/jsonrpc".to_string(),
                secret: None,
            }),
        };
        Harness {
            reporter: ProgressReporter::new(task.id, store.clone(), tx),
            store,
            job: TransferJob { id: task.id, plan },
            rx,
            _dir: dir,
        }
    }

    fn executor(rpc: Arc<dyn Aria2Rpc>) -> Aria2Executor {
        Aria2Executor::new(
            rpc,
            Aria2Config::default().with_poll_interval(Duration::from_millis(5)),
        )
    }

    #[test]
    fn state_mapping() {
        assert_eq!(observe(Aria2State::Active), Observed::Running);
        assert_eq!(observe(Aria2State::Paused), Observed::Running);
        assert_eq!(observe(Aria2State::Waiting), Observed::Waiting);
        assert_eq!(observe(Aria2State::Error), Observed::Failed);
        assert_eq!(observe(Aria2State::Complete), Observed::Complete);
        assert_eq!(observe(Aria2State::Removed), Observed::Removed);
    }

    #[test]
    fn options_carry_headers_and_destination() {
        let h = harness();
        let opts = Aria2Executor::options(&h.job, "00000000000000ff");
        assert_eq!(opts.gid, "00000000000000ff");
        assert_eq!(opts.out, "lora.safetensors");
        assert!(opts.headers.contains(&"Authorization: Bearer key".to_string()));
        assert!(opts.headers.contains(&"Referer: https://civitai.com/".to_string()));
    }

    #[test]
    fn generated_gids_are_sixteen_hex_digits() {
        let gid = new_gid();
        assert_eq!(gid.len(), 16);
        assert!(gid.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(gid, new_gid());
    }

    #[tokio::test]
    async fn completes_once_and_records_job_id() {
        let h = harness();
        let fake = Arc::new(FakeAria2::new(vec![
            Ok(status(Aria2State::Waiting, 0, 0, 0)),
            Ok(status(Aria2State::Active, 500, 1000, 250)),
            Ok(status(Aria2State::Complete, 1000, 1000, 0)),
            Ok(status(Aria2State::Complete, 1000, 1000, 0)),
        ]));

        let outcome = executor(fake.clone()).start(&h.job, &h.reporter).await.unwrap();

        assert_eq!(outcome.bytes, 1000);
        assert_eq!(*fake.poll_count.lock().unwrap(), 3);
        let task = h.store.get(h.job.id).unwrap();
        assert_eq!(task.download_method, DownloadMethod::Delegated);
        assert_eq!(task.delegate_job_id, Some(fake.submitted_gid()));
        assert_eq!(task.status, TaskStatus::Active);
        assert_eq!(h.rx.borrow().downloaded, 1000);
    }

    #[tokio::test]
    async fn submit_failure_is_delegate_unavailable() {
        let h = harness();
        let fake = Arc::new(FakeAria2::unreachable());

        let err = executor(fake).start(&h.job, &h.reporter).await.unwrap_err();

        assert!(err.is_delegate_unavailable());
        let task = h.store.get(h.job.id).unwrap();
        assert_eq!(task.download_method, DownloadMethod::Delegated);
        assert_eq!(task.delegate_job_id.as_deref(), h.reporter.delegate_job_id());
        assert!(task.delegate_job_id.is_some());
    }

    #[tokio::test]
    async fn rejected_submit_is_a_task_failure() {
        let h = harness();
        let fake = Arc::new(FakeAria2::rejecting(RpcError::Remote {
            code: 1,
            message: "No URI to download.".to_string(),
        }));

        let err = executor(fake).start(&h.job, &h.reporter).await.unwrap_err();

        assert!(!err.is_delegate_unavailable());
        assert_eq!(
            err,
            DownloadError::delegate_failed("No URI to download.", Some("1".to_string()))
        );
    }

    #[tokio::test]
    async fn submit_timeout_is_delegate_unavailable() {
        let h = harness();
        let fake = Arc::new(FakeAria2::rejecting(RpcError::Timeout(Duration::from_secs(5))));

        let err = executor(fake).start(&h.job, &h.reporter).await.unwrap_err();
        assert!(err.is_delegate_unavailable());
    }

    #[tokio::test]
    async fn isolated_poll_failure_is_retried() {
        let h = harness();
        let fake = Arc::new(FakeAria2::new(vec![
            Err(RpcError::Timeout(Duration::from_secs(5))),
            Err(RpcError::Transport("reset".to_string())),
            Ok(status(Aria2State::Complete, 10, 10, 0)),
        ]));

        assert!(executor(fake).start(&h.job, &h.reporter).await.is_ok());
    }

    #[tokio::test]
    async fn persistent_poll_failure_removes_job_and_files() {
        let h = harness();
        h.seed_partial_files();
        let fake = Arc::new(FakeAria2::new(vec![
            Ok(status(Aria2State::Active, 1, 10, 1)),
            Err(RpcError::Transport("refused".to_string())),
            Err(RpcError::Transport("refused".to_string())),
            Err(RpcError::Transport("refused".to_string())),
        ]));

        let err = executor(fake.clone()).start(&h.job, &h.reporter).await.unwrap_err();

        assert!(err.is_delegate_unavailable());
        assert_eq!(
            *fake.removed.lock().unwrap(),
            vec![(fake.submitted_gid(), true)]
        );
        assert_eq!(h.files_left(), (false, false));
    }

    #[tokio::test]
    async fn delegate_error_is_reported_verbatim_and_cleaned_up() {
        let h = harness();
        h.seed_partial_files();
        let mut failed = status(Aria2State::Error, 0, 100, 0);
        failed.error_code = Some("3".to_string());
        failed.error_message = Some("Resource not found".to_string());
        let fake = Arc::new(FakeAria2::new(vec![Ok(failed)]));

        let err = executor(fake.clone()).start(&h.job, &h.reporter).await.unwrap_err();

        assert_eq!(
            err,
            DownloadError::delegate_failed("Resource not found", Some("3".to_string()))
        );
        assert_eq!(fake.removed.lock().unwrap().len(), 1);
        assert_eq!(h.files_left(), (false, false));
    }

    #[tokio::test]
    async fn external_removal_is_cancellation() {
        let h = harness();
        let fake = Arc::new(FakeAria2::new(vec![Ok(status(Aria2State::Removed, 0, 0, 0))]));

        let err = executor(fake).start(&h.job, &h.reporter).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_during_submit_removes_accepted_job() {
        let h = harness();
        let mut fake = FakeAria2::new(vec![Ok(status(Aria2State::Active, 0, 100, 0))]);
        fake.submit_delay = Duration::from_millis(100);
        let fake = Arc::new(fake);
        let executor = executor(fake.clone());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let err = run_job(&h.job, &executor, &h.reporter, &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(
            *fake.removed.lock().unwrap(),
            vec![(fake.submitted_gid(), true)]
        );
        assert!(executor.submissions().is_empty());
    }

    #[tokio::test]
    async fn cancel_force_removes_and_cleans_files() {
        let h = harness();
        h.reporter.delegated("abc123").unwrap();
        h.seed_partial_files();

        let mut rpc = MockAria2Rpc::new();
        rpc.expect_remove()
            .with(always(), eq("abc123"), eq(true))
            .times(1)
            .returning(|_, _, _| Ok(()));

        executor(Arc::new(rpc)).cancel(&h.job, &h.reporter).await;

        assert_eq!(h.files_left(), (false, false));
    }

    #[tokio::test]
    async fn cancel_before_submit_skips_rpc() {
        let h = harness();
        let mut rpc = MockAria2Rpc::new();
        rpc.expect_remove().times(0);

        executor(Arc::new(rpc)).cancel(&h.job, &h.reporter).await;
    }
}
