//! Civitai client for fetching model metadata.

use url::Url;

use crate::config::CivitaiClientConfig;
use crate::error::CivitaiResult;
use crate::http::{HttpBackend, ReqwestBackend};
use crate::models::CivitaiModel;

/// Default Civitai client using the reqwest HTTP backend.
pub type DefaultCivitaiClient = CivitaiClient<ReqwestBackend>;

/// Client for the Civitai REST API.
///
/// Generic over an HTTP backend so tests can inject canned responses. Use
/// [`DefaultCivitaiClient`] in production code.
pub struct CivitaiClient<B: HttpBackend> {
    pub(crate) backend: B,
    pub(crate) base_url: Url,
}

impl DefaultCivitaiClient {
    /// Create a client; fails on a malformed base URL or proxy.
    pub fn new(config: &CivitaiClientConfig) -> CivitaiResult<Self> {
        Ok(Self {
            backend: ReqwestBackend::new(config)?,
            base_url: Url::parse(&config.base_url)?,
        })
    }
}

impl<B: HttpBackend> CivitaiClient<B> {
    #[cfg(test)]
    pub(crate) fn with_backend(base_url: &str, backend: B) -> Self {
        Self {
            backend,
            base_url: Url::parse(base_url).unwrap(),
        }
    }

    pub(crate) fn model_url(&self, model_id: u64) -> CivitaiResult<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/models/{model_id}"))?)
    }

    /// `GET /models/{id}`
    pub(crate) async fn get_model(&self, model_id: u64) -> CivitaiResult<CivitaiModel> {
        let url = self.model_url(model_id)?;
        tracing::debug!(target: "civdl.catalog", %url, "Fetching model");
        self.backend.get_json(&url).await
    }
}
