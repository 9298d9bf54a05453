//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the
//! havvarsel-config.toml file. It covers the API connection, logging, and the
//! list of stations (locations) to poll.
//!
//! Station coordinates are only checked when a station is set up, so a file
//! with a typo in one station still loads and the bad station fails loudly on
//! its own.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::{HavvarselError, Location};

/// Default configuration file name, looked up in the working directory
pub const CONFIG_FILE: &str = "havvarsel-config.toml";

/// Application configuration loaded from havvarsel-config.toml
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Locations to poll, each becoming an independent coordinator
    #[serde(default = "default_stations")]
    pub stations: Vec<StationConfig>,
}

/// Havvarsel API connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the v2 API, without trailing slash
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// User-Agent header sent with every request
    pub user_agent: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter (e.g. "info", "havvarsel_lib=debug").
    /// RUST_LOG takes precedence when set.
    pub level: String,
}

/// One configured location and the variables to expose as sensors
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StationConfig {
    /// Human-readable name, also used to derive sensor ids
    pub name: String,
    pub longitude: f64,
    pub latitude: f64,
    /// Depth in meters below the surface
    #[serde(default)]
    pub depth: f64,
    /// Variables to create sensors for (e.g. "temperature", "salinity")
    #[serde(default = "default_variables")]
    pub variables: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: "https://api.havvarsel.no/apis/duapi/havvarsel/v2".to_string(),
            timeout_secs: 10,
            user_agent: "havvarsel-sensor".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl StationConfig {
    /// Validate the coordinates and depth.
    pub fn location(&self) -> Result<Location, HavvarselError> {
        Location::new(self.longitude, self.latitude, self.depth).map_err(|err| match err {
            HavvarselError::Configuration(msg) => {
                HavvarselError::Configuration(format!("station '{}': {}", self.name, msg))
            }
            other => other,
        })
    }
}

fn default_variables() -> Vec<String> {
    vec!["temperature".to_string()]
}

fn default_stations() -> Vec<StationConfig> {
    vec![StationConfig {
        name: "Nordnes".to_string(),
        longitude: 5.303883,
        latitude: 60.400485,
        depth: 0.0,
        variables: default_variables(),
    }]
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
            stations: default_stations(),
        }
    }
}

impl Config {
    /// Read havvarsel-config.toml from the working directory.
    pub fn read() -> Result<Option<Self>, HavvarselError> {
        Self::read_from_path(CONFIG_FILE)
    }

    /// Read configuration from `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist and a
    /// [`HavvarselError::Configuration`] when it cannot be read or parsed.
    pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Option<Self>, HavvarselError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(HavvarselError::Configuration(format!(
                    "reading {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        toml::from_str(&contents).map(Some).map_err(|e| {
            HavvarselError::Configuration(format!("parsing {}: {}", path.display(), e))
        })
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::read_from_path(path) {
            Ok(Some(config)) => {
                info!(stations = config.stations.len(), "Loaded configuration");
                config
            }
            Ok(None) => {
                info!("No config file found, using default configuration (Nordnes, Bergen)");
                Self::default()
            }
            Err(e) => {
                warn!(error = %e, "Using default configuration (Nordnes, Bergen)");
                Self::default()
            }
        }
    }

    /// Save current configuration to the given path
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }

    /// Save current configuration to havvarsel-config.toml
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to_path(CONFIG_FILE)
    }
}
