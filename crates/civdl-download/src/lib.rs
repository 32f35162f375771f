//! Download queue for civdl.
//!
//! # Structure
//!
//! - `store` - In-memory task registry with per-task locking
//! - `queue` - FIFO admission queue with a separate test lane
//! - `executor` - Direct HTTP and aria2-delegated transfer strategies
//! - `progress` - Gating of raw progress readings
//! - `manager` - [`QueueManager`]: scheduler, lifecycle and public operations

// Re-export core types for convenience
pub use civdl_core::download::{
    DownloadError, DownloadMethod, DownloadRequest, DownloadResult, Task, TaskId, TaskStatus,
    TaskView,
};

pub mod executor;
pub(crate) mod progress;
pub(crate) mod queue;
pub mod store;

mod manager;

pub use executor::{
    Aria2Config, Aria2Daemon, Aria2Endpoint, Aria2Executor, DaemonOptions, DirectExecutor,
    JsonRpcAria2, TransferExecutor, ensure_daemon,
};
pub use manager::{
    ActiveCount, DownloadDestination, DrainMode, QueueConfig, QueueManager, QueueManagerDeps,
    sanitize_filename,
};
pub use store::{TaskStore, display_order};
