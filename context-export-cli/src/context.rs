//! CLI execution context

use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;
use context_export_core::{ExporterConfig, Profile};
use context_export_sdk::{AuthConfig, ClientConfig, ResilientClient};
use tracing::warn;

use crate::output::OutputWriter;
use crate::Cli;

/// Service endpoints and credentials shared by the commands that talk to
/// the services.
#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// Wiki base URL
    #[arg(long, env = "WIKI_URL")]
    pub wiki_url: Option<String>,

    /// Tracker base URL
    #[arg(long, env = "TRACKER_URL")]
    pub tracker_url: Option<String>,

    /// Account used for both services
    #[arg(long, env = "EXPORT_USERNAME")]
    pub username: Option<String>,

    /// API token for the account
    #[arg(long, env = "EXPORT_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,
}

impl ConnectionArgs {
    /// Basic auth with the API token as password when both halves are set
    pub fn auth(&self) -> AuthConfig {
        match (&self.username, &self.api_token) {
            (Some(username), Some(token)) => AuthConfig::Basic {
                username: username.clone(),
                password: token.clone(),
            },
            (None, None) => AuthConfig::None,
            _ => {
                warn!("Both a username and an API token are needed; sending unauthenticated requests");
                AuthConfig::None
            }
        }
    }
}

/// Execution context for CLI commands
pub struct Context {
    /// Resolved exporter configuration (profile, file, environment)
    pub config: ExporterConfig,

    /// Output writer
    pub output: OutputWriter,
}

impl Context {
    pub fn new(cli: &Cli, config: ExporterConfig) -> Self {
        Self {
            config,
            output: OutputWriter::new(cli.output, cli.no_color),
        }
    }

    pub fn profile(&self) -> Profile {
        self.config.profile
    }

    /// A resilient client for one service, tuned by the active profile.
    /// Each service caches under its own subdirectory.
    pub fn create_client(&self, name: &str, base_url: &str, auth: AuthConfig) -> Result<Arc<ResilientClient>> {
        let mut config = ClientConfig::from_exporter(base_url, &self.config).with_auth(auth);
        config.cache.cache_dir = config.cache.cache_dir.join(name);
        let client = ResilientClient::new(name, config)
            .with_context(|| format!("Failed to create {name} client for {base_url}"))?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(username: Option<&str>, token: Option<&str>) -> ConnectionArgs {
        ConnectionArgs {
            wiki_url: None,
            tracker_url: None,
            username: username.map(str::to_string),
            api_token: token.map(str::to_string),
        }
    }

    #[test]
    fn test_auth_needs_both_halves() {
        assert!(matches!(
            args(Some("dana"), Some("t0ken")).auth(),
            AuthConfig::Basic { ref username, .. } if username == "dana"
        ));
        assert!(!args(Some("dana"), None).auth().is_configured());
        assert!(!args(None, None).auth().is_configured());
    }
}
