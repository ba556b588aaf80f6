//! Controller configuration
//!
//! Values come from defaults, then an optional TOML file, then command-line
//! flags, each layer overriding the one before.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::{CliError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Address of the device bridge
    pub endpoint: String,

    /// How long to wait for the RESPONSE to a command
    pub response_timeout_ms: u64,

    /// How long to keep printing events after the RESPONSE
    pub follow_ms: u64,

    /// Enable verbose logging output
    pub verbose: bool,

    /// Print frames as JSON lines instead of text
    pub json: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:7878".to_string(),
            response_timeout_ms: 10_000,
            follow_ms: 0,
            verbose: false,
            json: false,
        }
    }
}

impl CliConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the effective configuration for one invocation
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load_from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path))?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        config.validate().context("Invalid configuration after applying flags")?;
        Ok(config)
    }

    /// Apply command-line flags on top of the loaded values
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(endpoint) = &cli.endpoint {
            self.endpoint = endpoint.clone();
        }
        if let Some(timeout) = cli.timeout_ms {
            self.response_timeout_ms = timeout;
        }
        if let Some(follow) = cli.follow_ms {
            self.follow_ms = follow;
        }
        self.verbose |= cli.verbose;
        self.json |= cli.json;
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(CliError::Config("endpoint must not be empty".to_string()));
        }
        if self.response_timeout_ms == 0 {
            return Err(CliError::Config("response_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn follow(&self) -> Duration {
        Duration::from_millis(self.follow_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = CliConfig::from_toml("endpoint = \"10.0.0.2:9000\"\njson = true").unwrap();
        assert_eq!(config.endpoint, "10.0.0.2:9000");
        assert!(config.json);
        assert_eq!(config.response_timeout_ms, CliConfig::default().response_timeout_ms);
    }

    #[test]
    fn test_invalid_file() {
        assert!(matches!(
            CliConfig::from_toml("response_timeout_ms = 0"),
            Err(CliError::Config(_))
        ));
        assert!(matches!(
            CliConfig::from_toml("follow_ms = \"soon\""),
            Err(CliError::TomlParsing(_))
        ));
    }

    #[test]
    fn test_flags_override_file() {
        let mut config = CliConfig::from_toml("endpoint = \"a:1\"\nfollow_ms = 500").unwrap();
        let cli = Cli::parse_from(["bassist", "--endpoint", "b:2", "--verbose", "stop-scan"]);
        config.apply_cli(&cli);

        assert_eq!(config.endpoint, "b:2");
        assert_eq!(config.follow(), Duration::from_millis(500));
        assert!(config.verbose);
        assert!(!config.json);
    }

    #[test]
    fn test_resolve_reports_missing_file() {
        let cli = Cli::parse_from(["bassist", "--config", "/nonexistent/bassist.toml", "stop-scan"]);
        let err = CliConfig::resolve(&cli).unwrap_err();

        assert!(err.to_string().contains("/nonexistent/bassist.toml"));
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::Io(_))));
    }

    #[test]
    fn test_resolve_rejects_flag_overrides() {
        let cli = Cli::parse_from(["bassist", "--timeout-ms", "0", "stop-scan"]);
        let err = CliConfig::resolve(&cli).unwrap_err();

        assert!(format!("{:#}", err).contains("response_timeout_ms must be positive"));
    }

    #[test]
    fn test_resolve_without_file() {
        let cli = Cli::parse_from(["bassist", "--json", "stop-scan"]);
        let config = CliConfig::resolve(&cli).unwrap();
        assert_eq!(config.endpoint, CliConfig::default().endpoint);
        assert!(config.json);
    }
}
