//! Minimal aria2 JSON-RPC client.
//!
//! Only the calls the executor needs: `aria2.addUri`, `aria2.tellStatus`,
//! `aria2.remove` / `aria2.forceRemove`, plus `aria2.getVersion` as a
//! liveness probe.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Where to reach an aria2 daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aria2Endpoint {
    pub url: String,
    /// `--rpc-secret`, sent as the `token:` parameter.
    pub secret: Option<String>,
}

/// Errors from aria2 RPC calls.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("aria2 RPC request failed: {0}")]
    Transport(String),

    #[error("aria2 RPC timed out after {0:?}")]
    Timeout(Duration),

    #[error("aria2 error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("invalid aria2 response: {0}")]
    InvalidResponse(String),
}

/// Job state vocabulary of `aria2.tellStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aria2State {
    Active,
    Waiting,
    Paused,
    Error,
    Complete,
    Removed,
}

/// Subset of the `aria2.tellStatus` result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aria2Status {
    pub status: Aria2State,
    #[serde(deserialize_with = "de_u64_string")]
    pub completed_length: u64,
    #[serde(deserialize_with = "de_u64_string")]
    pub total_length: u64,
    #[serde(deserialize_with = "de_u64_string")]
    pub download_speed: u64,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// aria2 encodes every integer as a decimal string.
fn de_u64_string<'de, D: Deserializer<'de>>(de: D) -> Result<u64, D::Error> {
    let raw = String::deserialize(de)?;
    raw.parse().map_err(serde::de::Error::custom)
}

/// Per-download options passed to `aria2.addUri`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddUriOptions {
    /// Job id chosen by the caller, 16 hex digits.
    pub gid: String,
    /// Output directory.
    pub dir: String,
    /// Output file name.
    pub out: String,
    /// Extra request headers, `Name: value`.
    pub headers: Vec<String>,
}

impl AddUriOptions {
    fn to_json(&self) -> Value {
        json!({
            "gid": self.gid,
            "dir": self.dir,
            "out": self.out,
            "header": self.headers,
            "max-connection-per-server": "5",
            "split": "5",
            "min-split-size": "1M",
            "continue": "false",
            "auto-file-renaming": "false",
            "allow-overwrite": "true",
            "file-allocation": "none",
        })
    }
}

/// aria2 RPC surface used by the delegated executor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Aria2Rpc: Send + Sync {
    /// Submit a download under `options.gid`; returns the GID aria2 assigned.
    async fn add_uri(
        &self,
        endpoint: &Aria2Endpoint,
        uri: &str,
        options: &AddUriOptions,
    ) -> Result<String, RpcError>;

    async fn tell_status(&self, endpoint: &Aria2Endpoint, gid: &str)
    -> Result<Aria2Status, RpcError>;

    /// `aria2.forceRemove` when `force`, else `aria2.remove`.
    async fn remove(&self, endpoint: &Aria2Endpoint, gid: &str, force: bool)
    -> Result<(), RpcError>;

    /// `aria2.getVersion`.
    async fn get_version(&self, endpoint: &Aria2Endpoint) -> Result<String, RpcError>;
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC over HTTP with a bounded per-call timeout.
pub struct JsonRpcAria2 {
    client: reqwest::Client,
    timeout: Duration,
    next_id: AtomicU64,
}

impl JsonRpcAria2 {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    async fn call(
        &self,
        endpoint: &Aria2Endpoint,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value, RpcError> {
        let mut all_params = Vec::with_capacity(params.len() + 1);
        if let Some(secret) = &endpoint.secret {
            all_params.push(Value::String(format!("token:{secret}")));
        }
        all_params.extend(params);

        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed).to_string(),
            "method": method,
            "params": all_params,
        });

        let request = async {
            let response = self
                .client
                .post(&endpoint.url)
                .json(&body)
                .send()
                .await
                .map_err(|e| RpcError::Transport(e.to_string()))?;
            response
                .json::<RpcResponse>()
                .await
                .map_err(|e| RpcError::InvalidResponse(e.to_string()))
        };

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| RpcError::Timeout(self.timeout))??;

        if let Some(err) = response.error {
            return Err(RpcError::Remote {
                code: err.code,
                message: err.message,
            });
        }
        response
            .result
            .ok_or_else(|| RpcError::InvalidResponse(format!("{method} returned no result")))
    }
}

#[async_trait]
impl Aria2Rpc for JsonRpcAria2 {
    async fn add_uri(
        &self,
        endpoint: &Aria2Endpoint,
        uri: &str,
        options: &AddUriOptions,
    ) -> Result<String, RpcError> {
        let result = self
            .call(endpoint, "aria2.addUri", vec![json!([uri]), options.to_json()])
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RpcError::InvalidResponse(format!("unexpected GID: {result}")))
    }

    async fn tell_status(
        &self,
        endpoint: &Aria2Endpoint,
        gid: &str,
    ) -> Result<Aria2Status, RpcError> {
        let keys = json!([
            "status",
            "completedLength",
            "totalLength",
            "downloadSpeed",
            "errorCode",
            "errorMessage"
        ]);
        let result = self
            .call(endpoint, "aria2.tellStatus", vec![json!(gid), keys])
            .await?;
        serde_json::from_value(result).map_err(|e| RpcError::InvalidResponse(e.to_string()))
    }

    async fn remove(
        &self,
        endpoint: &Aria2Endpoint,
        gid: &str,
        force: bool,
    ) -> Result<(), RpcError> {
        let method = if force {
            "aria2.forceRemove"
        } else {
            "aria2.remove"
        };
        self.call(endpoint, method, vec![json!(gid)]).await?;
        Ok(())
    }

    async fn get_version(&self, endpoint: &Aria2Endpoint) -> Result<String, RpcError> {
        let result = self.call(endpoint, "aria2.getVersion", vec![]).await?;
        result["version"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RpcError::InvalidResponse(format!("unexpected version: {result}")))
    }
}
