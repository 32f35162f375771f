//! Download domain types, errors, and progress math.
//!
//! No I/O, networking, or runtime dependencies allowed.
//!
//! # Structure
//!
//! - `task` - Task model, status machine and authorized updates
//! - `progress` - Percentage, smoothed speed and ETA
//! - `errors` - Error types for download operations
//! - `request` - Creation request DTO

pub mod errors;
pub mod progress;
pub mod request;
pub mod task;

pub use errors::{DownloadError, DownloadResult};
pub use request::DownloadRequest;
pub use progress::{ProgressSample, ProgressTracker, eta_seconds, percent};
pub use task::{DownloadMethod, Task, TaskId, TaskSpec, TaskStatus, TaskUpdate, TaskView};
