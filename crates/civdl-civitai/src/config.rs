//! Public configuration for the Civitai client.

use std::time::Duration;

use civdl_core::{DEFAULT_CATALOG_BASE_URL, Settings};

/// Configuration for the Civitai client.
///
/// # Example
///
/// ```
/// use civdl_civitai::CivitaiClientConfig;
/// use std::time::Duration;
///
/// let config = CivitaiClientConfig::new()
///     .with_timeout(Duration::from_secs(60))
///     .with_token("secret");
/// ```
#[derive(Debug, Clone)]
pub struct CivitaiClientConfig {
    /// Base URL of the REST API (`.../api/v1`)
    pub(crate) base_url: String,
    pub(crate) user_agent: String,
    /// Request timeout
    pub(crate) timeout: Duration,
    /// API key sent as a bearer credential
    pub(crate) token: Option<String>,
    /// Proxy for all catalog requests
    pub(crate) proxy: Option<String>,
    /// Maximum number of retry attempts for transient errors
    pub(crate) max_retries: u8,
    /// Base delay for exponential backoff
    pub(crate) retry_base_delay: Duration,
}

impl Default for CivitaiClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CATALOG_BASE_URL.to_string(),
            user_agent: concat!("civdl-civitai/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(30),
            token: None,
            proxy: None,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl CivitaiClientConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Base URL, credential, timeout and proxy taken from settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new()
            .with_base_url(settings.catalog_base_url.clone())
            .with_optional_token(settings.api_key.clone())
            .with_timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .with_proxy(settings.effective_proxy().map(str::to_string))
    }

    /// Defaults to `https://civitai.com/api/v1`.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Defaults to 30 seconds.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_optional_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Defaults to 3 retries.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    /// Defaults to 500ms.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }
}
