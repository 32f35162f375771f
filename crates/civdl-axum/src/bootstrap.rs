//! Axum server bootstrap - the composition root.
//!
//! This module is the ONLY place where infrastructure is wired together
//! for the web adapter. All concrete implementations are instantiated here.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use civdl_civitai::{CivitaiClientConfig, DefaultCivitaiClient};
use civdl_core::ports::{CatalogPort, SettingsProvider, SharedSettings};
use civdl_core::{DEFAULT_CONFIG_PATH, Settings, validate_settings};
use civdl_download::{
    Aria2Config, Aria2Daemon, Aria2Endpoint, Aria2Executor, DaemonOptions, DirectExecutor,
    DrainMode, JsonRpcAria2, QueueConfig, QueueManager, QueueManagerDeps, TransferExecutor,
    ensure_daemon,
};

/// Environment variable naming the settings file.
pub const CONFIG_PATH_ENV: &str = "CIVITAI_CONFIG_PATH";

/// Bound on a single aria2 JSON-RPC call.
const RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// CORS configuration for the web server.
#[derive(Debug, Clone, Default)]
pub enum CorsConfig {
    /// Allow all origins (development mode).
    #[default]
    AllowAll,
    /// Allow specific origins (production mode).
    AllowOrigins(Vec<String>),
}

/// Server configuration for the Axum adapter.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port for the HTTP server.
    pub port: u16,
    /// How long shutdown waits for running transfers before cancelling them.
    pub drain_timeout: Duration,
    /// CORS configuration.
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ServerConfig {
    /// Localhost on port 9887.
    pub fn with_defaults() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9887,
            drain_timeout: Duration::from_secs(30),
            cors: CorsConfig::default(),
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set CORS to allow specific origins.
    #[must_use]
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.cors = CorsConfig::AllowOrigins(origins);
        self
    }

    fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Application context for the Axum adapter.
pub struct AxumContext {
    /// The download queue.
    pub manager: Arc<QueueManager>,
    /// Settings snapshot source, read at task creation.
    pub settings: Arc<SharedSettings>,
}

/// Load settings: defaults, then the JSON file, then `CIVITAI_*` overrides.
///
/// The file is taken from `path`, else `$CIVITAI_CONFIG_PATH`, else
/// `config/settings.json`. A missing file is not an error.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let path = path.map_or_else(
        || {
            std::env::var(CONFIG_PATH_ENV)
                .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
        },
        Path::to_path_buf,
    );

    let mut settings = if path.exists() {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        tracing::info!(target: "civdl.config", path = %path.display(), "Loaded settings file");
        Settings::from_json(&raw)?
    } else {
        tracing::info!(
            target: "civdl.config",
            path = %path.display(),
            "No settings file, using defaults"
        );
        Settings::with_defaults()
    };

    settings.apply_env(|key| std::env::var(key).ok())?;
    validate_settings(&settings)?;
    Ok(settings)
}

/// Wire the catalog client, executors and queue manager.
///
/// Must be called from within a tokio runtime; the queue runner starts
/// immediately.
pub fn bootstrap(settings: Settings) -> Result<AxumContext> {
    tracing::info!(
        target: "civdl.config",
        model_dir = %settings.model_dir.display(),
        use_aria2 = settings.use_aria2,
        aria2_url = %settings.aria2_url,
        max_concurrent = settings.max_concurrent_downloads,
        proxy = settings.effective_proxy().is_some(),
        "Bootstrapping download service"
    );

    let catalog: Arc<dyn CatalogPort> = Arc::new(
        DefaultCivitaiClient::new(&CivitaiClientConfig::from_settings(&settings))
            .context("failed to build catalog client")?,
    );

    // Delegation is decided per task from the settings snapshot, so the
    // delegated executor always exists.
    let delegated: Arc<dyn TransferExecutor> = Arc::new(Aria2Executor::new(
        Arc::new(JsonRpcAria2::new(RPC_TIMEOUT)),
        Aria2Config::default(),
    ));

    let config = QueueConfig::from_settings(&settings);
    let settings = Arc::new(SharedSettings::new(settings));

    let manager = QueueManager::init(QueueManagerDeps {
        catalog,
        settings: Arc::clone(&settings) as Arc<dyn SettingsProvider>,
        direct: Arc::new(DirectExecutor::new()),
        delegated: Some(delegated),
        config,
    });

    Ok(AxumContext { manager, settings })
}

/// Start a local aria2 daemon when delegation is on and nothing answers.
///
/// Failures are only logged; delegated tasks then fall back to direct
/// transfers once the first submission fails.
pub async fn launch_aria2(settings: &Settings) -> Option<Aria2Daemon> {
    if !settings.use_aria2 || !settings.aria2_autostart {
        return None;
    }
    let endpoint = Aria2Endpoint {
        url: settings.aria2_url.clone(),
        secret: settings.aria2_secret.clone(),
    };
    let options = DaemonOptions::default().with_extra_flags(settings.aria2_flag_list());

    match ensure_daemon(&JsonRpcAria2::new(RPC_TIMEOUT), &endpoint, &options).await {
        Ok(daemon) => daemon,
        Err(e) => {
            tracing::warn!(target: "civdl.config", error = %e, "aria2 is not available");
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(target: "civdl.http", error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!(target: "civdl.http", "Shutdown requested");
}

/// Start the web server and serve until ctrl-c, then drain the queue.
pub async fn start_server(config: ServerConfig, settings: Settings) -> Result<()> {
    use tokio::net::TcpListener;

    let daemon = launch_aria2(&settings).await;
    let ctx = bootstrap(settings)?;
    let manager = Arc::clone(&ctx.manager);
    let app = crate::routes::create_router(ctx, &config.cors);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(target: "civdl.http", "civdl API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    manager
        .drain(DrainMode::Await {
            timeout: config.drain_timeout,
        })
        .await;
    tracing::info!(target: "civdl.http", "Download queue drained");

    if let Some(daemon) = daemon {
        daemon.stop().await;
    }
    Ok(())
}
