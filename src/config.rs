//! Configuration file handling for scan-relay.
//!
//! Loads configuration from `~/.config/scan-relay/config.toml` or a custom path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::{API_KEY_ENV, DEFAULT_API_URL};
use crate::controller::{ScanOptions, DEFAULT_LOCK_MISSES};
use crate::engine::FormatSet;

/// Configuration file structure for scan-relay.
/// Loaded from ~/.config/scan-relay/config.toml (or custom path via --config).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Log filter, e.g. "info" or "scan_relay=debug"
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub camera: CameraConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Local database file (default: data dir)
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Falls back to the SCAN_RELAY_API_KEY environment variable
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            api_url: default_api_url(),
            api_key: None,
        }
    }
}

impl EngineConfig {
    /// The configured database path, or the default one.
    pub fn db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(default_db_path)
    }

    /// The configured API key, or the one from the environment.
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    /// Comma-separated barcode formats, or "none"
    #[serde(default = "default_formats")]
    pub formats: String,
    #[serde(default = "default_lock_misses")]
    pub lock_misses: u32,
    #[serde(default = "default_result_hold_ms")]
    pub result_hold_ms: u64,
    /// Scan every frame offline instead of waiting for a capture
    #[serde(default = "default_true")]
    pub auto: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            formats: default_formats(),
            lock_misses: default_lock_misses(),
            result_hold_ms: default_result_hold_ms(),
            auto: true,
        }
    }
}

impl ScanConfig {
    /// Controller options from this section.
    pub fn options(&self) -> Result<ScanOptions, ConfigError> {
        let formats: FormatSet = self
            .formats
            .parse()
            .map_err(|message: String| ConfigError::Invalid {
                field: "scan.formats",
                message,
            })?;
        Ok(ScanOptions {
            formats,
            lock_misses: self.lock_misses,
            result_hold: Duration::from_millis(self.result_hold_ms),
            auto: self.auto,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraConfig {
    /// Directory of images replayed as camera frames
    #[serde(default)]
    pub source: Option<PathBuf>,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: None,
            fps: default_fps(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_formats() -> String {
    "ean13,qrcode".to_string()
}

fn default_lock_misses() -> u32 {
    DEFAULT_LOCK_MISSES
}

fn default_result_hold_ms() -> u64 {
    1500
}

fn default_fps() -> u32 {
    10
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
                path: path.clone(),
                source: e,
            })?;
            let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.clone(),
                source: e,
            })?;
            Ok(config)
        } else {
            log::debug!("No config file at {}, using defaults", path.display());
            Ok(Config::default())
        }
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            field: "config",
            message: e.to_string(),
        })
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Invalid { field, message } => {
                write!(f, "Invalid value for '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("scan-relay").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/scan-relay/config.toml")
        })
}

/// Get the default database path.
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("scan-relay").join("scan.db"))
        .unwrap_or_else(|| PathBuf::from("scan.db"))
}
