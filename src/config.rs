//! Configuration management for the toolbox server

use std::fs;
use std::path::Path;

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::{DEFAULT_PORT, MAX_LINE_LENGTH};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Challenge settings
    #[serde(default)]
    pub challenge: ChallengeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host name or address to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeConfig {
    /// Secret revealed through the debug menu
    #[serde(default = "default_flag")]
    pub flag: String,

    /// Longest line accepted from a client
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { DEFAULT_PORT }
fn default_flag() -> String { "AFNOM{}".to_string() }
fn default_max_line_length() -> usize { MAX_LINE_LENGTH }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            flag: default_flag(),
            max_line_length: default_max_line_length(),
        }
    }
}

impl Config {
    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.server.host.is_empty(), "server.host must not be empty");
        ensure!(
            self.challenge.max_line_length > 0,
            "challenge.max_line_length must be positive"
        );
        Ok(())
    }
}

/// Load configuration from a file
pub fn load(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)?;

    let config: Config = if path.extension().map_or(false, |ext| ext == "json") {
        serde_json::from_str(&content)?
    } else {
        // Assume TOML if not JSON
        toml::from_str(&content)?
    };

    config.validate()?;
    Ok(config)
}

/// Save configuration to a file
pub fn save(config: &Config, path: &Path) -> Result<()> {
    let content = if path.extension().map_or(false, |ext| ext == "json") {
        serde_json::to_string_pretty(config)?
    } else {
        toml::to_string_pretty(config)?
    };

    fs::write(path, content)?;
    Ok(())
}

/// Generate a sample configuration file
pub fn generate_sample() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_default()
}
