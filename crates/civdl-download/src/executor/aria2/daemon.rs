//! Local `aria2c` started on demand.
//!
//! When delegation is enabled and nothing answers at a loopback endpoint, a
//! daemon is spawned with RPC enabled on that port and polled until it
//! responds. Remote endpoints are never launched.

use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, Command};

use super::{Aria2Endpoint, Aria2Rpc, RpcError};

/// Why no daemon could be made available.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("aria2 endpoint {0} is not on this machine")]
    NotLocal(String),

    #[error("invalid aria2 endpoint {url}: {message}")]
    InvalidEndpoint { url: String, message: String },

    #[error("failed to start {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("aria2 did not answer after {attempts} attempts")]
    NotReady { attempts: u32 },
}

/// How to launch the daemon.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    /// Executable, looked up on `PATH` when not absolute.
    pub program: String,
    /// Appended after the built-in flags.
    pub extra_flags: Vec<String>,
    pub startup_attempts: u32,
    pub startup_interval: Duration,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            program: "aria2c".to_string(),
            extra_flags: Vec::new(),
            startup_attempts: 5,
            startup_interval: Duration::from_secs(1),
        }
    }
}

impl DaemonOptions {
    #[must_use]
    pub fn with_extra_flags(mut self, flags: Vec<String>) -> Self {
        self.extra_flags = flags;
        self
    }
}

/// A daemon spawned by this process. Killed on [`Self::stop`] or drop.
#[derive(Debug)]
pub struct Aria2Daemon {
    child: Child,
}

impl Aria2Daemon {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub async fn stop(mut self) {
        match self.child.kill().await {
            Ok(()) => tracing::info!(target: "civdl.aria2", "Stopped aria2 daemon"),
            Err(e) => {
                tracing::warn!(target: "civdl.aria2", error = %e, "Failed to stop aria2 daemon");
            }
        }
    }
}

/// Make sure an aria2 daemon answers at `endpoint`.
///
/// Returns `Ok(None)` when one is already running, otherwise the daemon
/// started here.
pub async fn ensure_daemon(
    rpc: &dyn Aria2Rpc,
    endpoint: &Aria2Endpoint,
    options: &DaemonOptions,
) -> Result<Option<Aria2Daemon>, DaemonError> {
    if answers(rpc, endpoint).await {
        tracing::debug!(target: "civdl.aria2", url = %endpoint.url, "aria2 already running");
        return Ok(None);
    }

    let port = local_port(&endpoint.url)?;
    let args = launch_args(port, endpoint.secret.as_deref(), &options.extra_flags);
    tracing::info!(target: "civdl.aria2", program = %options.program, port, "Starting aria2 daemon");

    let mut child = Command::new(&options.program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DaemonError::Spawn {
            program: options.program.clone(),
            message: e.to_string(),
        })?;

    for attempt in 1..=options.startup_attempts {
        tokio::time::sleep(options.startup_interval).await;

        if let Ok(Some(status)) = child.try_wait() {
            return Err(DaemonError::Spawn {
                program: options.program.clone(),
                message: format!("exited during startup with {status}"),
            });
        }
        if answers(rpc, endpoint).await {
            tracing::info!(target: "civdl.aria2", attempt, pid = ?child.id(), "aria2 daemon ready");
            return Ok(Some(Aria2Daemon { child }));
        }
        tracing::debug!(target: "civdl.aria2", attempt, "Waiting for aria2 daemon");
    }

    if let Err(e) = child.kill().await {
        tracing::debug!(target: "civdl.aria2", error = %e, "Failed to kill unresponsive aria2");
    }
    Err(DaemonError::NotReady {
        attempts: options.startup_attempts,
    })
}

/// An error reply still proves something is listening.
async fn answers(rpc: &dyn Aria2Rpc, endpoint: &Aria2Endpoint) -> bool {
    matches!(
        rpc.get_version(endpoint).await,
        Ok(_) | Err(RpcError::Remote { .. })
    )
}

fn local_port(url: &str) -> Result<u16, DaemonError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| DaemonError::InvalidEndpoint {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    match parsed.host_str() {
        Some("localhost" | "127.0.0.1" | "[::1]") => {}
        _ => return Err(DaemonError::NotLocal(url.to_string())),
    }
    parsed
        .port_or_known_default()
        .ok_or_else(|| DaemonError::InvalidEndpoint {
            url: url.to_string(),
            message: "no port".to_string(),
        })
}

fn launch_args(port: u16, secret: Option<&str>, extra: &[String]) -> Vec<String> {
    let mut args = vec![
        "--enable-rpc".to_string(),
        format!("--rpc-listen-port={port}"),
        "--file-allocation=none".to_string(),
        "--auto-file-renaming=false".to_string(),
    ];
    if let Some(secret) = secret {
        args.push(format!("--rpc-secret={secret}"));
    }
    args.extend(extra.iter().cloned());
    args
}

#[cfg(test)]
mod tests {
    use super::super::testing::FakeAria2;
    use super::*;

    fn endpoint(url: &str) -> Aria2Endpoint {
        Aria2Endpoint {
            url: url.to_string(),
            secret: Some("s3cret".to_string()),
        }
    }

    fn options(program: &str) -> DaemonOptions {
        DaemonOptions {
            program: program.to_string(),
            startup_attempts: 3,
            startup_interval: Duration::from_millis(10),
            ..DaemonOptions::default()
        }
    }

    fn offline() -> FakeAria2 {
        let mut fake = FakeAria2::new(vec![]);
        fake.online = false;
        fake
    }

    #[test]
    fn launch_args_carry_port_secret_and_extra_flags() {
        let args = launch_args(6801, Some("s3cret"), &["--log-level=warn".to_string()]);
        assert_eq!(args[0], "--enable-rpc");
        assert!(args.contains(&"--rpc-listen-port=6801".to_string()));
        assert!(args.contains(&"--rpc-secret=s3cret".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--log-level=warn"));
        assert!(!launch_args(6800, None, &[]).iter().any(|a| a.starts_with("--rpc-secret")));
    }

    #[test]
    fn only_loopback_endpoints_are_launchable() {
        assert_eq!(local_port("http://localhost:6800/jsonrpc").unwrap(), 6800);
        assert_eq!(local_port("http://127.0.0.1/jsonrpc").unwrap(), 80);
        assert!(matches!(
            local_port("http://nas.lan:6800/jsonrpc"),
            Err(DaemonError::NotLocal(_))
        ));
        assert!(matches!(
            local_port("not a url"),
            Err(DaemonError::InvalidEndpoint { .. })
        ));
    }

    #[tokio::test]
    async fn running_daemon_is_left_alone() {
        let fake = FakeAria2::new(vec![]);
        let daemon = ensure_daemon(
            &fake,
            &endpoint("http://localhost:6800/jsonrpc"),
            &options("/nonexistent/aria2c"),
        )
        .await
        .unwrap();
        assert!(daemon.is_none());
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let err = ensure_daemon(
            &offline(),
            &endpoint("http://localhost:6800/jsonrpc"),
            &options("/nonexistent/civdl-aria2c"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DaemonError::Spawn { .. }));
    }

    #[tokio::test]
    async fn remote_endpoint_is_not_launched() {
        let err = ensure_daemon(
            &offline(),
            &endpoint("http://nas.lan:6800/jsonrpc"),
            &options("/nonexistent/aria2c"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DaemonError::NotLocal(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_that_never_answers_is_given_up() {
        let err = ensure_daemon(
            &offline(),
            &endpoint("http://localhost:6800/jsonrpc"),
            &options("true"),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            DaemonError::Spawn { .. } | DaemonError::NotReady { attempts: 3 }
        ));
    }
}
