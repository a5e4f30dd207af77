//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Default idle threshold after which a session record is discarded.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 1800;

/// Root configuration for voice-relay
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Language model configuration
    #[serde(default)]
    pub model: ModelConfig,
    /// Session storage configuration
    #[serde(default)]
    pub sessions: SessionsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Language model (Gemini) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// API key, usually supplied through `GEMINI_API_KEY`
    #[serde(default)]
    pub api_key: String,
    /// Override for the API base URL
    #[serde(default)]
    pub api_base: Option<String>,
    /// Model name
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum output tokens per reply
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Optional bound on a single model call; unset means no timeout
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_temperature() -> f32 {
    0.5
}

fn default_max_output_tokens() -> u32 {
    500
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            model: default_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: None,
        }
    }
}

impl ModelConfig {
    /// Whether an API key has been configured
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Session storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Directory holding one record per user; empty means the system temp dir
    #[serde(default)]
    pub dir: String,
    /// Idle seconds after which a record is discarded
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Seconds between background sweeps of expired records (0 disables)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_idle_timeout_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            dir: String::new(),
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl SessionsConfig {
    /// Resolve the session directory
    pub fn resolved_dir(&self) -> PathBuf {
        if self.dir.trim().is_empty() {
            std::env::temp_dir().join("voice-relay-sessions")
        } else {
            crate::utils::expand_home(&self.dir)
        }
    }
}
