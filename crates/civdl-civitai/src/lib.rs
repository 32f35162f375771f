//! Civitai REST catalog client.
//!
//! Resolves `(model, version?, file?)` identifiers to a single downloadable
//! file and exposes the result through [`civdl_core::CatalogPort`].
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]
// DefaultCivitaiClient is meant to be used through the CatalogPort trait,
// not its internal generic structure
#![allow(private_interfaces)]

mod client;
mod config;
mod error;
mod http;
mod models;
mod port;

// ============================================================================
// Public API
// ============================================================================

// Client
pub use client::DefaultCivitaiClient;

// Configuration
pub use config::CivitaiClientConfig;

// Error type returned by client construction
pub use error::CivitaiError;
