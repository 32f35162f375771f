//! HTTP adapter for the civdl download queue.
//!
//! Handlers are thin wrappers around [`civdl_download::QueueManager`]; the
//! [`bootstrap`] module is the composition root that wires the catalog
//! client, executors and settings together.
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Dev-dependencies used only by the integration tests under tests/
#[cfg(test)]
use async_trait as _;
#[cfg(test)]
use http_body_util as _;
#[cfg(test)]
use tempfile as _;
#[cfg(test)]
use tower as _;

pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use bootstrap::{
    AxumContext, CorsConfig, ServerConfig, bootstrap, launch_aria2, load_settings, start_server,
};
pub use error::HttpError;
pub use routes::create_router;
pub use state::AppState;
