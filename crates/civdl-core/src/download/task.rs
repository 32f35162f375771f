//! Download task model and its state machine.
//!
//! A [`Task`] is one requested download. All mutations go through
//! [`Task::apply`] with a [`TaskUpdate`] so the forward-only lifecycle is
//! enforced in one place regardless of which component issues the update.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{DownloadError, DownloadResult};
use super::progress::percent;

/// Unique, immutable identifier for a download task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Status of a download task.
///
/// `Downloading` and `Active` are both running states: `Downloading` is set on
/// admission, `Active` is reported by the external downloader once it has
/// picked the job up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for a concurrency slot.
    Queued,
    /// Admitted and transferring.
    Downloading,
    /// Transferring, as reported by the external downloader.
    Active,
    /// Completed successfully.
    Completed,
    /// Failed with an error.
    Failed,
    /// Cancelled by user or shutdown.
    Cancelled,
}

impl TaskStatus {
    /// Convert to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "downloading" => Some(Self::Downloading),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// `completed`, `failed` and `cancelled` admit no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether an executor currently owns the task.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Downloading | Self::Active)
    }

    /// Forward-only transition table.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Queued => matches!(
                next,
                Self::Downloading | Self::Active | Self::Failed | Self::Cancelled
            ),
            Self::Downloading | Self::Active => !matches!(next, Self::Queued),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transfer strategy that owns a task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadMethod {
    /// Streamed by this process over HTTP.
    #[default]
    Direct,
    /// Handed to the external RPC downloader.
    Delegated,
}

impl DownloadMethod {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Delegated => "delegated",
        }
    }
}

impl fmt::Display for DownloadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to create a task once the catalog lookup succeeded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub model_id: u64,
    pub version_id: u64,
    pub file_id: u64,
    pub model_name: String,
    pub model_type: String,
    pub filename: String,
    /// Final destination of the artifact.
    pub file_path: PathBuf,
    #[serde(default)]
    pub is_test: bool,
}

/// One requested download and its tracked lifecycle state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub model_id: u64,
    pub version_id: u64,
    pub file_id: u64,
    pub model_name: String,
    pub model_type: String,
    pub filename: String,
    pub file_path: PathBuf,
    pub status: TaskStatus,
    /// Percentage in `[0, 100]`.
    pub progress: f64,
    pub bytes_downloaded: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_total: Option<u64>,
    /// Smoothed transfer rate in bytes per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_speed: Option<f64>,
    /// Seconds remaining.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<u64>,
    pub download_method: DownloadMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegate_job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub is_test: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// An authorized delta applied to a task.
#[derive(Clone, Debug, PartialEq)]
pub enum TaskUpdate {
    /// The scheduler granted a concurrency slot.
    Admitted,
    /// The external downloader accepted the job.
    Delegated { job_id: String },
    /// Running-state refinement reported by an executor.
    Status(TaskStatus),
    /// Byte counters and derived rate.
    Progress {
        bytes_downloaded: u64,
        bytes_total: Option<u64>,
        speed: Option<f64>,
        eta: Option<u64>,
    },
    Completed,
    Failed { error: String },
    Cancelled,
}

impl Task {
    /// Create a queued task from a spec.
    #[must_use]
    pub fn new(spec: TaskSpec, now: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::new(),
            model_id: spec.model_id,
            version_id: spec.version_id,
            file_id: spec.file_id,
            model_name: spec.model_name,
            model_type: spec.model_type,
            filename: spec.filename,
            file_path: spec.file_path,
            status: TaskStatus::Queued,
            progress: 0.0,
            bytes_downloaded: 0,
            bytes_total: None,
            download_speed: None,
            eta: None,
            download_method: DownloadMethod::Direct,
            delegate_job_id: None,
            error: None,
            is_test: spec.is_test,
            created_at: now,
            completed_at: None,
        }
    }

    /// Apply an update, rejecting anything that would break the lifecycle.
    ///
    /// On error the task is left untouched.
    pub fn apply(&mut self, update: TaskUpdate, now: DateTime<Utc>) -> DownloadResult<()> {
        match update {
            TaskUpdate::Admitted => {
                if self.status != TaskStatus::Queued {
                    return Err(DownloadError::invalid_transition(
                        self.status,
                        TaskStatus::Downloading,
                    ));
                }
                self.status = TaskStatus::Downloading;
            }
            TaskUpdate::Delegated { job_id } => {
                self.require_running("delegated")?;
                self.download_method = DownloadMethod::Delegated;
                self.delegate_job_id = Some(job_id);
            }
            TaskUpdate::Status(next) => {
                if !next.is_running() || !self.status.is_running() {
                    return Err(DownloadError::invalid_transition(self.status, next));
                }
                self.status = next;
            }
            TaskUpdate::Progress {
                bytes_downloaded,
                bytes_total,
                speed,
                eta,
            } => {
                self.require_running("progress")?;
                self.bytes_downloaded = self.bytes_downloaded.max(bytes_downloaded);
                if bytes_total.is_some() {
                    self.bytes_total = bytes_total;
                }
                if let Some(total) = self.bytes_total {
                    self.progress = self.progress.max(percent(self.bytes_downloaded, total));
                }
                self.download_speed = speed;
                self.eta = eta;
            }
            TaskUpdate::Completed => {
                self.transition(TaskStatus::Completed, now)?;
                self.progress = 100.0;
                match self.bytes_total {
                    Some(total) => self.bytes_downloaded = self.bytes_downloaded.max(total),
                    None => self.bytes_total = Some(self.bytes_downloaded),
                }
            }
            TaskUpdate::Failed { error } => {
                self.transition(TaskStatus::Failed, now)?;
                self.error = Some(error);
            }
            TaskUpdate::Cancelled => {
                self.transition(TaskStatus::Cancelled, now)?;
            }
        }
        Ok(())
    }

    fn require_running(&self, what: &str) -> DownloadResult<()> {
        if self.status.is_running() {
            Ok(())
        } else {
            Err(DownloadError::invalid_transition(self.status, what))
        }
    }

    fn transition(&mut self, next: TaskStatus, now: DateTime<Utc>) -> DownloadResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DownloadError::invalid_transition(self.status, next));
        }
        self.status = next;
        self.download_speed = None;
        self.eta = None;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Whether the task finished successfully within `window` of `now`.
    #[must_use]
    pub fn is_recent(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.status == TaskStatus::Completed
            && self.completed_at.is_some_and(|at| now - at <= window)
    }

    /// Snapshot for presentation, with the derived `is_recent` flag.
    #[must_use]
    pub fn view(&self, now: DateTime<Utc>, window: Duration) -> TaskView {
        TaskView {
            is_recent: self.is_recent(now, window),
            task: self.clone(),
        }
    }
}

/// Task as rendered to pollers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub is_recent: bool,
}
