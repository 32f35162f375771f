//! Available subcommands.

use std::path::PathBuf;

use clap::Subcommand;

/// Default address of a local `civdl serve`.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:9887";

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the download queue and its HTTP API
    Serve {
        /// Interface to bind
        #[arg(long, env = "CIVDL_HOST", default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(short, long, env = "CIVDL_PORT", default_value_t = 9887)]
        port: u16,
        /// Settings file (defaults to $CIVITAI_CONFIG_PATH or config/settings.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the model directory
        #[arg(long = "model-dir")]
        model_dir: Option<PathBuf>,
        /// Restrict CORS to these origins (repeatable); all origins when omitted
        #[arg(long = "allow-origin")]
        allowed_origins: Vec<String>,
    },

    /// Show downloads on a running server
    Status {
        /// Keep refreshing: every second while downloads are active, every
        /// five seconds otherwise
        #[arg(short, long)]
        watch: bool,
        /// Base URL of the server
        #[arg(long, env = "CIVDL_SERVER", default_value = DEFAULT_SERVER_URL)]
        server: String,
    },
}
