//! Status command handler.
//!
//! Polls a running server. In watch mode the refresh cadence follows the
//! active-count endpoint: fast while anything is unfinished, slow otherwise.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use civdl_core::TaskView;
use civdl_download::ActiveCount;

use crate::presentation::render_tasks;

const ACTIVE_REFRESH: Duration = Duration::from_secs(1);
const IDLE_REFRESH: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin client for the download API.
pub struct StatusClient {
    client: reqwest::Client,
    base: String,
}

impl StatusClient {
    pub fn new(server: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base: server.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("cannot reach {url}"))?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    pub async fn tasks(&self) -> Result<Vec<TaskView>> {
        self.get_json("/api/downloads").await
    }

    pub async fn active_count(&self) -> Result<ActiveCount> {
        self.get_json("/api/downloads/active-count").await
    }
}

/// How long to wait before the next refresh.
pub const fn refresh_interval(count: ActiveCount) -> Duration {
    if count.active > 0 {
        ACTIVE_REFRESH
    } else {
        IDLE_REFRESH
    }
}

/// Print the task table once, or keep refreshing until ctrl-c.
pub async fn execute(server: &str, watch: bool) -> Result<()> {
    let client = StatusClient::new(server)?;

    if !watch {
        print!("{}", render_tasks(&client.tasks().await?));
        return Ok(());
    }

    loop {
        let tasks = client.tasks().await?;
        let count = client.active_count().await?;

        // Clear screen and home the cursor
        print!("\x1b[2J\x1b[H");
        println!(
            "{server}  active: {}  running: {}\n",
            count.active, count.running
        );
        print!("{}", render_tasks(&tasks));
        std::io::stdout().flush()?;

        tokio::select! {
            () = tokio::time::sleep(refresh_interval(count)) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("status watch interrupted");
                return Ok(());
            }
        }
    }
}
