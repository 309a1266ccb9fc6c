//! Configuration file support for breeders-room
//!
//! Reads from .breeders-room/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Lineage workflow settings
    #[serde(default)]
    pub lineage: LineageConfig,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Interface to bind
    /// Default: "127.0.0.1"
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    /// Default: 3000
    #[serde(default = "default_port")]
    pub port: u16,

    /// Worker threads pulling requests off the listener
    /// Default: 4
    #[serde(default = "default_workers")]
    pub workers: usize,
}

/// Who may approve or reject a pending parent request
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApproverPolicy {
    /// The owner of the pet on the side of the edge the requester did not claim from
    #[default]
    Counterpart,
    /// The user who created the request
    Requester,
}

/// Lineage workflow configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LineageConfig {
    /// Default: counterpart
    #[serde(default)]
    pub approver: ApproverPolicy,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogConfig {
    /// tracing filter directive, overridden by RUST_LOG
    /// Default: "info"
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_workers() -> usize {
    4
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

/// Written by `breeders-room init`
pub const DEFAULT_CONFIG_TOML: &str = r#"[server]
host = "127.0.0.1"
port = 3000
workers = 4

[lineage]
# Who approves or rejects a parent request:
#   "counterpart" - owner of the pet the requester does not own (default)
#   "requester"   - the user who sent the request
approver = "counterpart"

[log]
filter = "info"
"#;

impl Config {
    /// Load config from .breeders-room/config.toml
    /// Returns default config if file doesn't exist
    pub fn load() -> Self {
        if let Some(path) = Self::find_config_path() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "invalid config, using defaults"),
                },
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "unreadable config, using defaults"),
            }
        }
        Self::default()
    }

    /// Find config.toml by walking up directory tree
    fn find_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut dir = current_dir.as_path();

        loop {
            let config_path = dir.join(".breeders-room").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
        None
    }

    /// Address the HTTP server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
