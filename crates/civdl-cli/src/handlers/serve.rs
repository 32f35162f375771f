//! Serve command handler.

use std::path::PathBuf;

use anyhow::Result;
use civdl_axum::{ServerConfig, load_settings, start_server};

/// Options for `civdl serve`.
#[derive(Debug, Clone)]
pub struct ServeArgs {
    pub host: String,
    pub port: u16,
    pub config: Option<PathBuf>,
    pub model_dir: Option<PathBuf>,
    pub allowed_origins: Vec<String>,
}

impl ServeArgs {
    fn server_config(&self) -> ServerConfig {
        let config = ServerConfig::with_defaults()
            .with_host(self.host.clone())
            .with_port(self.port);
        if self.allowed_origins.is_empty() {
            config
        } else {
            config.with_allowed_origins(self.allowed_origins.clone())
        }
    }
}

/// Load settings, apply command-line overrides and run until ctrl-c.
pub async fn execute(args: ServeArgs) -> Result<()> {
    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(dir) = &args.model_dir {
        settings.model_dir.clone_from(dir);
    }
    civdl_core::validate_settings(&settings)?;

    println!("Models directory: {}", settings.model_dir.display());
    if settings.use_aria2 {
        println!("Delegating transfers to aria2 at {}", settings.aria2_url);
    }

    start_server(args.server_config(), settings).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use civdl_axum::CorsConfig;

    fn args(origins: Vec<String>) -> ServeArgs {
        ServeArgs {
            host: "0.0.0.0".to_string(),
            port: 8080,
            config: None,
            model_dir: None,
            allowed_origins: origins,
        }
    }

    #[test]
    fn server_config_from_args() {
        let config = args(vec![]).server_config();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert!(matches!(config.cors, CorsConfig::AllowAll));
    }

    #[test]
    fn origins_restrict_cors() {
        let config = args(vec!["http://localhost:3000".to_string()]).server_config();
        assert!(matches!(config.cors, CorsConfig::AllowOrigins(ref o) if o.len() == 1));
    }
}
