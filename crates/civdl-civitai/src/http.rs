//! HTTP backend abstraction for the Civitai API.
//!
//! The production implementation uses reqwest with automatic retry for
//! transient errors; tests swap in a canned backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::CivitaiClientConfig;
use crate::error::{CivitaiError, CivitaiResult};

// ============================================================================
// HTTP Backend Trait
// ============================================================================

/// Fetches JSON documents.
///
/// This is an implementation detail - external code should use the
/// `CatalogPort` trait.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn get_json<T: DeserializeOwned + Send>(&self, url: &Url) -> CivitaiResult<T>;
}

// ============================================================================
// Reqwest Backend
// ============================================================================

/// Production HTTP backend using reqwest with retry logic.
///
/// Server errors (5xx) and network errors are retried with exponential
/// backoff; client errors fail immediately.
pub struct ReqwestBackend {
    client: reqwest::Client,
    max_retries: u8,
    retry_base_delay: Duration,
    auth_token: Option<String>,
}

impl ReqwestBackend {
    pub fn new(config: &CivitaiClientConfig) -> CivitaiResult<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone());
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
            auth_token: config.token.clone(),
        })
    }

    fn build_request(&self, url: &Url) -> reqwest::RequestBuilder {
        let request = self.client.get(url.as_str());
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Fetch a URL with automatic retry for transient errors.
    async fn fetch_with_retry(&self, url: &Url) -> CivitaiResult<reqwest::Response> {
        let mut attempt = 0u8;
        loop {
            if attempt > 0 {
                let delay = self.retry_base_delay * 2u32.pow(u32::from(attempt) - 1);
                tokio::time::sleep(delay).await;
            }

            let error = match self.build_request(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    let error = CivitaiError::ApiRequestFailed {
                        status: status.as_u16(),
                        url: url.to_string(),
                    };
                    // 4xx errors fail immediately
                    if !status.is_server_error() {
                        return Err(error);
                    }
                    error
                }
                Err(e) => e.into(),
            };

            if attempt >= self.max_retries {
                return Err(error);
            }
            attempt += 1;
            tracing::warn!(
                target: "civdl.catalog",
                %url,
                attempt,
                error = %error,
                "Catalog request failed, retrying"
            );
        }
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn get_json<T: DeserializeOwned + Send>(&self, url: &Url) -> CivitaiResult<T> {
        let response = self.fetch_with_retry(url).await?;
        let data: T = response.json().await?;
        Ok(data)
    }
}

// ============================================================================
// Fake Backend for Testing
// ============================================================================

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Canned response for the fake backend.
    #[derive(Clone)]
    pub enum CannedResponse {
        Json(serde_json::Value),
        Status(u16),
    }

    /// A fake HTTP backend that returns canned responses by URL suffix.
    #[derive(Default)]
    pub struct FakeBackend {
        responses: Mutex<HashMap<String, CannedResponse>>,
        pub requests: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_json(self, url_suffix: &str, json: serde_json::Value) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(url_suffix.to_string(), CannedResponse::Json(json));
            self
        }

        pub fn with_status(self, url_suffix: &str, status: u16) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(url_suffix.to_string(), CannedResponse::Status(status));
            self
        }
    }

    #[async_trait]
    impl HttpBackend for FakeBackend {
        async fn get_json<T: DeserializeOwned + Send>(&self, url: &Url) -> CivitaiResult<T> {
            self.requests.lock().unwrap().push(url.to_string());
            let response = self
                .responses
                .lock()
                .unwrap()
                .iter()
                .find(|(suffix, _)| url.path().ends_with(suffix.as_str()))
                .map(|(_, response)| response.clone());

            match response {
                Some(CannedResponse::Json(json)) => serde_json::from_value(json).map_err(Into::into),
                Some(CannedResponse::Status(status)) => Err(CivitaiError::ApiRequestFailed {
                    status,
                    url: url.to_string(),
                }),
                None => Err(CivitaiError::ApiRequestFailed {
                    status: 404,
                    url: url.to_string(),
                }),
            }
        }
    }
}
