//! Settings domain types and validation.
//!
//! Pure data plus layering rules: defaults, then a JSON document, then
//! `CIVITAI_*` environment overrides. Reading files is left to the caller.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default JSON-RPC endpoint of a local aria2 daemon.
pub const DEFAULT_ARIA2_URL: &str = "http://localhost:6800/jsonrpc";

/// Default catalog REST base.
pub const DEFAULT_CATALOG_BASE_URL: &str = "https://civitai.com/api/v1";

/// Default settings file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/settings.json";

/// Application settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Bearer token sent to the catalog and download hosts.
    pub api_key: Option<String>,

    /// Root directory for downloaded artifacts.
    pub model_dir: PathBuf,

    /// Hand transfers to aria2 when it is reachable.
    pub use_aria2: bool,

    /// aria2 JSON-RPC endpoint.
    pub aria2_url: String,

    /// aria2 `--rpc-secret`.
    pub aria2_secret: Option<String>,

    /// Start a local `aria2c` when the endpoint does not answer at startup.
    pub aria2_autostart: bool,

    /// Extra `aria2c` command-line flags, whitespace separated.
    pub aria2_flags: Option<String>,

    pub use_proxy: bool,
    pub proxy_url: Option<String>,

    /// Connect/read timeout for HTTP requests, in seconds.
    pub timeout_secs: u64,

    /// Maximum concurrent transfers in the main lane.
    pub max_concurrent_downloads: usize,

    pub catalog_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Settings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            api_key: None,
            model_dir: PathBuf::from("./models"),
            use_aria2: true,
            aria2_url: DEFAULT_ARIA2_URL.to_string(),
            aria2_secret: None,
            aria2_autostart: true,
            aria2_flags: None,
            use_proxy: false,
            proxy_url: None,
            timeout_secs: 30,
            max_concurrent_downloads: 2,
            catalog_base_url: DEFAULT_CATALOG_BASE_URL.to_string(),
        }
    }

    /// Parse a JSON settings document; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        serde_json::from_str(json).map_err(|e| SettingsError::Parse(e.to_string()))
    }

    /// Apply `CIVITAI_*` overrides from `lookup` (usually `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CIVITAI_API_KEY") {
            self.api_key = non_empty(v);
        }
        if let Some(v) = lookup("CIVITAI_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("CIVITAI_USE_ARIA2") {
            self.use_aria2 = parse_bool(&v);
        }
        if let Some(v) = lookup("CIVITAI_ARIA2_URL") {
            self.aria2_url = v;
        }
        if let Some(v) = lookup("CIVITAI_ARIA2_SECRET") {
            self.aria2_secret = non_empty(v);
        }
        if let Some(v) = lookup("CIVITAI_ARIA2_AUTOSTART") {
            self.aria2_autostart = parse_bool(&v);
        }
        if let Some(v) = lookup("CIVITAI_ARIA2_FLAGS") {
            self.aria2_flags = non_empty(v);
        }
        if let Some(v) = lookup("CIVITAI_USE_PROXY") {
            self.use_proxy = parse_bool(&v);
        }
        if let Some(v) = lookup("CIVITAI_PROXY_URL") {
            self.proxy_url = non_empty(v);
        }
        if let Some(v) = lookup("CIVITAI_TIMEOUT") {
            self.timeout_secs = parse_number("CIVITAI_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("CIVITAI_MAX_CONCURRENT") {
            self.max_concurrent_downloads = parse_number("CIVITAI_MAX_CONCURRENT", &v)?;
        }
        Ok(())
    }

    /// `aria2_flags` split into individual arguments.
    #[must_use]
    pub fn aria2_flag_list(&self) -> Vec<String> {
        self.aria2_flags
            .as_deref()
            .map(|flags| flags.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Proxy URL to route through, if the proxy is enabled.
    #[must_use]
    pub fn effective_proxy(&self) -> Option<&str> {
        if self.use_proxy {
            self.proxy_url.as_deref()
        } else {
            None
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Accepts `true`, `yes`, `1` and `y` in any case.
fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "1" | "y"
    )
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SettingsError> {
    value
        .trim()
        .parse()
        .map_err(|_| SettingsError::InvalidEnv {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Errors that can occur during settings operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Max concurrent downloads must be between 1 and 16, got {0}")]
    InvalidConcurrency(usize),

    #[error("Timeout must be at least one second")]
    InvalidTimeout,

    #[error("Model directory cannot be empty")]
    EmptyModelDir,

    #[error("Proxy is enabled but no proxy URL is configured")]
    MissingProxyUrl,

    #[error("Invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },

    #[error("Invalid settings file: {0}")]
    Parse(String),
}

/// Validate settings values.
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    if !(1..=16).contains(&settings.max_concurrent_downloads) {
        return Err(SettingsError::InvalidConcurrency(
            settings.max_concurrent_downloads,
        ));
    }

    if settings.timeout_secs == 0 {
        return Err(SettingsError::InvalidTimeout);
    }

    if settings.model_dir.as_os_str().is_empty() {
        return Err(SettingsError::EmptyModelDir);
    }

    if settings.use_proxy && settings.proxy_url.is_none() {
        return Err(SettingsError::MissingProxyUrl);
    }

    Ok(())
}
