//! CLI entry point - the composition root.

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use civdl_cli::handlers::serve::ServeArgs;
use civdl_cli::{Cli, Commands, handlers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before parsing so env-backed flags pick it up
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.default_log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Serve {
            host,
            port,
            config,
            model_dir,
            allowed_origins,
        } => {
            handlers::serve::execute(ServeArgs {
                host,
                port,
                config,
                model_dir,
                allowed_origins,
            })
            .await?;
        }
        Commands::Status { watch, server } => {
            handlers::status::execute(&server, watch).await?;
        }
    }

    Ok(())
}
