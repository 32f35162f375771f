//! `CatalogPort` implementation for `CivitaiClient`.
//!
//! Applies the resolution defaults (latest version, primary file) and maps
//! internal errors to core `CatalogError`s.

use async_trait::async_trait;
use civdl_core::ports::{ArtifactRef, CatalogError, CatalogPort, ResolvedArtifact};

use crate::client::CivitaiClient;
use crate::error::CivitaiError;
use crate::http::HttpBackend;
use crate::models::CivitaiModel;

// ============================================================================
// Error Mapping
// ============================================================================

fn map_error(err: CivitaiError, model_id: u64) -> CatalogError {
    match err {
        CivitaiError::ApiRequestFailed { status: 404, .. } => CatalogError::ModelNotFound { model_id },
        CivitaiError::ApiRequestFailed { status, url } => CatalogError::Unavailable {
            message: format!("API request failed with status {status}: {url}"),
        },
        CivitaiError::Network(e) => CatalogError::Unavailable {
            message: e.to_string(),
        },
        CivitaiError::InvalidUrl(e) => CatalogError::Unavailable {
            message: format!("invalid catalog URL: {e}"),
        },
        CivitaiError::InvalidResponse { message } => CatalogError::InvalidResponse { message },
        CivitaiError::JsonParse(e) => CatalogError::InvalidResponse {
            message: e.to_string(),
        },
    }
}

/// Narrow a model down to one file.
fn select(model: &CivitaiModel, artifact: ArtifactRef) -> Result<ResolvedArtifact, CatalogError> {
    let version = model
        .version(artifact.version_id)
        .ok_or(match artifact.version_id {
            Some(version_id) => CatalogError::VersionNotFound {
                model_id: model.id,
                version_id,
            },
            None => CatalogError::NoFiles { model_id: model.id },
        })?;

    let file = version.file(artifact.file_id).ok_or(match artifact.file_id {
        Some(file_id) => CatalogError::FileNotFound {
            version_id: version.id,
            file_id,
        },
        None => CatalogError::NoFiles { model_id: model.id },
    })?;

    let download_url = file
        .download_url
        .clone()
        .ok_or_else(|| CatalogError::InvalidResponse {
            message: format!("file {} has no download URL", file.id),
        })?;

    Ok(ResolvedArtifact {
        model_id: model.id,
        version_id: version.id,
        file_id: file.id,
        model_name: model.name.clone(),
        model_type: model.model_type.clone(),
        filename: file.name.clone(),
        download_url,
        size_bytes: file.size_bytes(),
    })
}

// ============================================================================
// Port Implementation
// ============================================================================

#[async_trait]
impl<B: HttpBackend + Send + Sync> CatalogPort for CivitaiClient<B> {
    async fn resolve(&self, artifact: ArtifactRef) -> Result<ResolvedArtifact, CatalogError> {
        let model = self
            .get_model(artifact.model_id)
            .await
            .map_err(|e| map_error(e, artifact.model_id))?;

        let resolved = select(&model, artifact)?;
        tracing::debug!(
            target: "civdl.catalog",
            model_id = resolved.model_id,
            version_id = resolved.version_id,
            file_id = resolved.file_id,
            file = %resolved.filename,
            "Resolved catalog artifact"
        );
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::FakeBackend;
    use serde_json::json;

    fn client() -> CivitaiClient<FakeBackend> {
        let backend = FakeBackend::new()
            .with_json(
                "/models/4201",
                json!({
                    "id": 4201,
                    "name": "Realistic Vision",
                    "type": "Checkpoint",
                    "modelVersions": [
                        {
                            "id": 130_072,
                            "name": "V6.0",
                            "files": [
                                {"id": 1, "name": "rv-pruned.safetensors", "downloadUrl": "https://civitai.com/api/download/models/130072?type=Pruned"},
                                {"id": 2, "name": "rv.safetensors", "sizeKB": 4, "primary": true, "downloadUrl": "https://civitai.com/api/download/models/130072"}
                            ]
                        },
                        {"id": 125_411, "name": "V5.1", "files": []}
                    ]
                }),
            )
            .with_json(
                "/models/5",
                json!({"id": 5, "name": "Empty", "type": "LORA", "modelVersions": []}),
            )
            .with_status("/models/500", 502);
        CivitaiClient::with_backend("https://civitai.com/api/v1", backend)
    }

    fn artifact(model_id: u64, version_id: Option<u64>, file_id: Option<u64>) -> ArtifactRef {
        ArtifactRef {
            model_id,
            version_id,
            file_id,
        }
    }

    #[test]
    fn test_defaults_to_latest_version_primary_file() {
        let resolved = tokio_test::block_on(client().resolve(artifact(4201, None, None))).unwrap();
        assert_eq!(resolved.version_id, 130_072);
        assert_eq!(resolved.file_id, 2);
        assert_eq!(resolved.filename, "rv.safetensors");
        assert_eq!(resolved.model_type, "Checkpoint");
        assert_eq!(resolved.size_bytes, Some(4096));
        assert_eq!(
            resolved.download_url,
            "https://civitai.com/api/download/models/130072"
        );
    }

    #[test]
    fn test_explicit_file() {
        let resolved =
            tokio_test::block_on(client().resolve(artifact(4201, Some(130_072), Some(1)))).unwrap();
        assert_eq!(resolved.filename, "rv-pruned.safetensors");
        assert_eq!(resolved.size_bytes, None);
    }

    #[test]
    fn test_unknown_model() {
        let err = tokio_test::block_on(client().resolve(artifact(99, None, None))).unwrap_err();
        assert_eq!(err, CatalogError::ModelNotFound { model_id: 99 });
        assert_eq!(err.to_string(), "Model 99 not found");
    }

    #[test]
    fn test_unknown_version_and_file() {
        let err = tokio_test::block_on(client().resolve(artifact(4201, Some(1), None))).unwrap_err();
        assert_eq!(err.to_string(), "Version 1 not found for model 4201");

        let err =
            tokio_test::block_on(client().resolve(artifact(4201, Some(130_072), Some(3)))).unwrap_err();
        assert_eq!(err.to_string(), "File 3 not found for version 130072");
        assert!(err.is_unresolvable());
    }

    #[test]
    fn test_version_without_files() {
        let err =
            tokio_test::block_on(client().resolve(artifact(4201, Some(125_411), None))).unwrap_err();
        assert_eq!(err, CatalogError::NoFiles { model_id: 4201 });

        let err = tokio_test::block_on(client().resolve(artifact(5, None, None))).unwrap_err();
        assert_eq!(err, CatalogError::NoFiles { model_id: 5 });
    }

    #[test]
    fn test_server_error_is_unavailable() {
        let err = tokio_test::block_on(client().resolve(artifact(500, None, None))).unwrap_err();
        assert!(matches!(err, CatalogError::Unavailable { .. }));
        assert!(!err.is_unresolvable());
    }
}
