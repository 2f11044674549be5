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

const fn default_cache_capacity() -> usize {
    2
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
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enable: true,
            file_enable: false,
            console_level: LogLevel::default(),
            file_level: LogLevel::Info,
            file_path: "./voxengine.log".to_string(),
        }
    }
}

/// QUIC server configuration.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ServerConfig {
    /// UDP address the HTTP/3 endpoint binds to.
    pub address: String,
    /// PEM certificate chain presented to gateways.
    pub cert_path: String,
    /// PEM private key for the certificate.
    pub key_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:9443".to_string(),
            cert_path: "./quic_cert.pem".to_string(),
            key_path: "./quic_key.pem".to_string(),
        }
    }
}

/// Loaded-model cache configuration.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct CacheConfig {
    /// Resident model handles kept in memory before LRU eviction.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: default_cache_capacity() }
    }
}

/// Root configuration for the engine process.
#[derive(Deserialize, Serialize, Default, Debug, Clone, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// Data root holding models, voices, and the audio archive.
    #[serde(default)]
    pub data_dir: Option<String>,

    #[serde(default)]
    pub cache: CacheConfig,

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

    // The config file is optional; defaults plus environment are enough.
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
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.address, "0.0.0.0:9443");
        assert_eq!(config.cache.capacity, 2);
        assert_eq!(config.data_dir(), "./data");
    }

    #[test]
    fn test_default_toml_round_trips() {
        let rendered = generate_default().expect("serialize defaults");
        let parsed: Config = toml::from_str(&rendered).expect("parse defaults");
        assert_eq!(parsed.cache.capacity, 2);
    }
}
