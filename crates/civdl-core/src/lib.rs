//! Core domain types and ports for the civdl download queue.
#![deny(unused_crate_dependencies)]

pub mod download;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use download::{
    DownloadError, DownloadMethod, DownloadRequest, DownloadResult, ProgressSample, ProgressTracker, Task, TaskId,
    TaskSpec, TaskStatus, TaskUpdate, TaskView, eta_seconds, percent,
};
pub use ports::{
    ArtifactRef, CatalogError, CatalogPort, ResolvedArtifact, SettingsProvider, SharedSettings,
};
pub use settings::{
    DEFAULT_ARIA2_URL, DEFAULT_CATALOG_BASE_URL, DEFAULT_CONFIG_PATH, Settings, SettingsError,
    validate_settings,
};

