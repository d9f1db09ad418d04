//! Client configuration
//!
//! Optional TOML file under the user config dir, overridden by CLI flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use sonar_core::PollConfig;

const DEFAULT_SERVER: &str = "http://localhost:8080";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Marketplace base URL
    pub server: String,
    /// Bearer token sent on every request
    pub api_key: Option<String>,
    /// Order polling knobs
    pub poll: PollConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            api_key: None,
            poll: PollConfig::default(),
        }
    }
}

impl CliConfig {
    /// Load the config file (if any) and apply overrides
    ///
    /// Precedence for the key: `--api-key` flag, then `SONAR_API_KEY`, then
    /// the config file.
    pub fn load(server: Option<String>, api_key: Option<String>) -> Result<Self> {
        let mut config = match config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        if let Some(server) = server {
            config.server = server;
        }
        if let Some(key) = api_key.or_else(|| std::env::var("SONAR_API_KEY").ok()) {
            config.api_key = Some(key);
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sonar").join("config.toml"))
}
