use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Errors while loading the desk configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration, usually read from `termdesk.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskConfig {
    /// API bind address.
    pub bind: String,
    pub retry: RetryConfig,
    /// Bridge to real terminals. When absent, terminals are simulated.
    pub bridge: Option<BridgeConfig>,
    /// Terminals registered at startup.
    pub terminals: Vec<TerminalEntry>,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            retry: RetryConfig::default(),
            bridge: None,
            terminals: Vec::new(),
        }
    }
}

impl DeskConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }
}

/// Business-operation retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts made for an action body, including the last one.
    pub retry_times_on_error: u32,
    /// Pause between attempts, in milliseconds.
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_times_on_error: 3,
            backoff_ms: 500,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Where the terminal bridge sidecar listens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Host address (e.g. "127.0.0.1").
    pub host: String,
    pub port: u16,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5556,
            connect_timeout_secs: 10,
        }
    }
}

/// A terminal executable serving one broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalEntry {
    pub broker: String,
    pub path: String,
}
