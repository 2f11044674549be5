// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::Level;

const fn default_max_requests() -> usize {
    120
}

const fn default_window_seconds() -> u64 {
    60
}

const fn default_max_body_size() -> usize {
    // Default to 100MB for multipart audio uploads
    100 * 1024 * 1024
}

/// Log level for filtering messages.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Log file format options.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text format (faster, lower CPU overhead)
    #[default]
    Text,
    /// JSON format (structured, better for log aggregation)
    Json,
}

/// Logging configuration for console and file output.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct LogConfig {
    #[serde(default)]
    pub console_enable: bool,
    #[serde(default)]
    pub file_enable: bool,
    #[serde(default)]
    pub console_level: LogLevel,
    #[serde(default)]
    pub file_level: LogLevel,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub file_format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enable: true,
            file_enable: false,
            console_level: LogLevel::default(),
            file_level: LogLevel::Info,
            file_path: "./voxgw.log".to_string(),
            file_format: LogFormat::default(),
        }
    }
}

/// HTTP server configuration.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ServerConfig {
    /// TCP address the HTTP/1.1 surface binds to.
    pub address: String,
    /// Maximum request body size in bytes for uploads (default: 100MB)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { address: "0.0.0.0:8000".to_string(), max_body_size: default_max_body_size() }
    }
}

/// Sliding-window rate limit parameters, keyed per peer.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct LimitsConfig {
    /// Requests allowed per peer within the window.
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    /// Window length in seconds.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { max_requests: default_max_requests(), window_seconds: default_window_seconds() }
    }
}

/// Root configuration for the gateway process.
#[derive(Deserialize, Serialize, Default, Debug, Clone, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// Data root holding models, voices, and the audio archive.
    #[serde(default)]
    pub data_dir: Option<String>,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    pub fn data_dir(&self) -> String {
        self.data_dir.clone().unwrap_or_else(|| "./data".to_string())
    }
}

#[derive(Debug)]
pub struct ConfigLoadResult {
    pub config: Config,
    pub file_missing: Option<String>,
}

/// Loads configuration from defaults, a TOML file, and `VOX_` environment
/// variables.
///
/// # Errors
///
/// Returns an error if the file exists but is invalid, or if environment
/// overrides fail to parse.
pub fn load(config_path: &str) -> Result<ConfigLoadResult, Box<figment::Error>> {
    let mut figment =
        Figment::new().merge(figment::providers::Serialized::defaults(Config::default()));

    let mut file_missing = None;

    if std::path::Path::new(config_path).exists() {
        figment = figment.merge(Toml::file(config_path));
    } else {
        file_missing = Some(config_path.to_string());
    }

    let config: Config =
        figment.merge(Env::prefixed("VOX_").split("__")).extract().map_err(Box::new)?;

    Ok(ConfigLoadResult { config, file_missing })
}

/// Generates the default configuration as a pretty-printed TOML string.
///
/// # Errors
///
/// Returns an error if the default configuration cannot be serialized.
pub fn generate_default() -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&Config::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_defaults() {
        let config = Config::default();
        assert_eq!(config.limits.max_requests, 120);
        assert_eq!(config.limits.window_seconds, 60);
    }
}
