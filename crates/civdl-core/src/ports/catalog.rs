//! Read-only model catalog lookup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::download::DownloadError;

/// Identifiers a download request names.
///
/// `version_id` defaults to the latest version, `file_id` to the primary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub model_id: u64,
    #[serde(default)]
    pub version_id: Option<u64>,
    #[serde(default)]
    pub file_id: Option<u64>,
}

/// A catalog entry resolved down to one downloadable file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedArtifact {
    pub model_id: u64,
    pub version_id: u64,
    pub file_id: u64,
    pub model_name: String,
    /// Catalog model type (e.g. `Checkpoint`, `LORA`).
    pub model_type: String,
    /// File name as published by the catalog.
    pub filename: String,
    pub download_url: String,
    /// Size advertised by the catalog, if any.
    pub size_bytes: Option<u64>,
}

/// Errors from catalog lookups.
///
/// Implementation-specific errors (HTTP, JSON) are mapped to these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Model {model_id} not found")]
    ModelNotFound { model_id: u64 },

    #[error("Version {version_id} not found for model {model_id}")]
    VersionNotFound { model_id: u64, version_id: u64 },

    #[error("File {file_id} not found for version {version_id}")]
    FileNotFound { version_id: u64, file_id: u64 },

    #[error("Model {model_id} has no downloadable files")]
    NoFiles { model_id: u64 },

    #[error("Catalog unavailable: {message}")]
    Unavailable { message: String },

    #[error("Invalid catalog response: {message}")]
    InvalidResponse { message: String },
}

impl CatalogError {
    /// Whether the identifiers themselves were unresolvable.
    #[must_use]
    pub const fn is_unresolvable(&self) -> bool {
        matches!(
            self,
            Self::ModelNotFound { .. }
                | Self::VersionNotFound { .. }
                | Self::FileNotFound { .. }
                | Self::NoFiles { .. }
        )
    }
}

impl From<CatalogError> for DownloadError {
    fn from(err: CatalogError) -> Self {
        if err.is_unresolvable() {
            Self::validation(err.to_string())
        } else {
            Self::catalog(err.to_string())
        }
    }
}

/// Resolves catalog identifiers into a concrete file.
#[async_trait]
pub trait CatalogPort: Send + Sync {
    async fn resolve(&self, artifact: ArtifactRef) -> Result<ResolvedArtifact, CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolvable_maps_to_validation() {
        let err: DownloadError = CatalogError::VersionNotFound {
            model_id: 7,
            version_id: 9,
        }
        .into();
        assert_eq!(
            err,
            DownloadError::validation("Version 9 not found for model 7")
        );
    }

    #[test]
    fn test_unavailable_maps_to_catalog() {
        let err: DownloadError = CatalogError::Unavailable {
            message: "timed out".to_string(),
        }
        .into();
        assert!(matches!(err, DownloadError::Catalog { .. }));
    }

    #[test]
    fn test_artifact_ref_optional_fields() {
        let r: ArtifactRef = serde_json::from_str(r#"{"model_id": 4201}"#).unwrap();
        assert_eq!(r.version_id, None);
        assert_eq!(r.file_id, None);
    }
}
