//! Download request DTO.

use serde::{Deserialize, Serialize};

use crate::ports::ArtifactRef;

/// Request to create a download task.
///
/// Identifiers are resolved through the catalog before a task exists; an
/// unresolvable request never produces a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub model_id: u64,
    #[serde(default)]
    pub version_id: Option<u64>,
    #[serde(default)]
    pub file_id: Option<u64>,
    /// Relative folder under the model directory.
    #[serde(default)]
    pub subfolder: Option<String>,
    /// Route through the segregated test lane.
    #[serde(default)]
    pub is_test: bool,
}

impl DownloadRequest {
    /// Create a request for a model's latest version and primary file.
    pub const fn new(model_id: u64) -> Self {
        Self {
            model_id,
            version_id: None,
            file_id: None,
            subfolder: None,
            is_test: false,
        }
    }

    #[must_use]
    pub const fn with_version(mut self, version_id: u64) -> Self {
        self.version_id = Some(version_id);
        self
    }

    #[must_use]
    pub const fn with_file(mut self, file_id: u64) -> Self {
        self.file_id = Some(file_id);
        self
    }

    #[must_use]
    pub fn with_subfolder(mut self, subfolder: impl Into<String>) -> Self {
        self.subfolder = Some(subfolder.into());
        self
    }

    #[must_use]
    pub const fn with_test(mut self, is_test: bool) -> Self {
        self.is_test = is_test;
        self
    }

    /// Catalog identifiers named by this request.
    pub const fn artifact(&self) -> ArtifactRef {
        ArtifactRef {
            model_id: self.model_id,
            version_id: self.version_id,
            file_id: self.file_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_request_deserializes() {
        let req: DownloadRequest = serde_json::from_str(r#"{"model_id": 4201}"#).unwrap();
        assert_eq!(req, DownloadRequest::new(4201));
    }

    #[test]
    fn test_builder_sets_artifact() {
        let req = DownloadRequest::new(1).with_version(2).with_file(3).with_test(true);
        assert_eq!(
            req.artifact(),
            ArtifactRef {
                model_id: 1,
                version_id: Some(2),
                file_id: Some(3)
            }
        );
        assert!(req.is_test);
    }
}
