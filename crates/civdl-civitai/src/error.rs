//! Internal error types for Civitai operations.
//!
//! Mapped to [`civdl_core::CatalogError`] at the port boundary.

use thiserror::Error;

pub type CivitaiResult<T> = Result<T, CivitaiError>;

/// Errors related to Civitai API operations.
#[derive(Debug, Error)]
pub enum CivitaiError {
    /// API request failed with an HTTP error status.
    #[error("Civitai API request failed with status {status}: {url}")]
    ApiRequestFailed { status: u16, url: String },

    /// API returned an invalid or unexpected response.
    #[error("Invalid response from Civitai API: {message}")]
    InvalidResponse { message: String },

    /// Network or HTTP client error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),
}
