//! Main CLI parser and top-level argument handling.

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface for the Civitai download queue.
#[derive(Parser)]
#[command(name = "civdl")]
#[command(about = "Queue and monitor Civitai model downloads")]
#[command(version)]
pub struct Cli {
    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Log filter used when `RUST_LOG` is unset.
    pub const fn default_log_filter(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::parse_from(["civdl", "status", "--verbose"]);
        assert!(cli.verbose);
        assert_eq!(cli.default_log_filter(), "debug");
    }

    #[test]
    fn test_no_command() {
        let cli = Cli::parse_from(["civdl"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.default_log_filter(), "info");
    }
}
