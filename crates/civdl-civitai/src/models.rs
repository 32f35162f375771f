//! Wire types of the Civitai REST API.
//!
//! Only the fields needed to resolve a downloadable file are kept; unknown
//! fields are ignored.

use serde::Deserialize;

/// `GET /models/{id}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CivitaiModel {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub model_type: String,
    /// Newest first.
    #[serde(default)]
    pub model_versions: Vec<CivitaiVersion>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CivitaiVersion {
    pub id: u64,
    #[serde(default)]
    pub files: Vec<CivitaiFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CivitaiFile {
    pub id: u64,
    pub name: String,
    #[serde(rename = "sizeKB", default)]
    pub size_kb: Option<f64>,
    #[serde(default)]
    pub primary: Option<bool>,
    #[serde(default)]
    pub download_url: Option<String>,
}

impl CivitaiModel {
    /// The requested version, or the latest one.
    pub fn version(&self, version_id: Option<u64>) -> Option<&CivitaiVersion> {
        match version_id {
            Some(id) => self.model_versions.iter().find(|v| v.id == id),
            None => self.model_versions.first(),
        }
    }
}

impl CivitaiVersion {
    /// The requested file, or the primary one, or the first listed.
    pub fn file(&self, file_id: Option<u64>) -> Option<&CivitaiFile> {
        match file_id {
            Some(id) => self.files.iter().find(|f| f.id == id),
            None => self
                .files
                .iter()
                .find(|f| f.primary == Some(true))
                .or_else(|| self.files.first()),
        }
    }
}

impl CivitaiFile {
    /// Advertised size in bytes.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn size_bytes(&self) -> Option<u64> {
        self.size_kb
            .filter(|kb| kb.is_finite() && *kb >= 0.0)
            .map(|kb| (kb * 1024.0).round() as u64)
    }
}
