// src/config.rs v3
//! Configuration management
//!
//! Stored as JSON under `$HOME/.config/gps-mapper/config.json`. Loaded once at
//! startup; the core never mutates it afterwards.

use crate::error::{ConfigError, GpsError, Result};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Age thresholds for the status colour tiers, in seconds.
///
/// Tunable: receivers that report slower than 1 Hz want a larger `fresh_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusThresholds {
    /// Data at most this old (and connected, valid) is fresh.
    pub fresh_secs: f64,
    /// Data older than this is lost regardless of connection state.
    pub stale_secs: f64,
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            fresh_secs: 2.0,
            stale_secs: 10.0,
        }
    }
}

/// Capped exponential wait between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 1_000,
            max_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    pub device: PathBuf,
    pub baud_rate: u32,
    pub web_port: u16,
    pub simulate: bool,
    /// Upper bound on a single line read; also bounds stop latency.
    pub read_timeout_ms: u64,
    /// Consecutive corrupt lines tolerated before the link counts as failed.
    pub max_consecutive_parse_errors: u32,
    pub simulation_interval_ms: u64,
    pub backoff: BackoffConfig,
    pub status: StatusThresholds,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            // L76X HAT and most Pi GPS boards sit on the primary UART
            device: PathBuf::from("/dev/ttyAMA0"),
            baud_rate: 9600,
            web_port: 8080,
            simulate: false,
            read_timeout_ms: 2_000,
            max_consecutive_parse_errors: 10,
            simulation_interval_ms: 1_000,
            backoff: BackoffConfig::default(),
            status: StatusThresholds::default(),
        }
    }
}

impl GpsConfig {
    /// Load configuration from the default location, or defaults if absent
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    /// Load from a specific file; a missing file yields defaults
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| GpsError::Other(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| GpsError::Other(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| GpsError::Other(format!("Failed to create config directory: {}", e)))?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, contents)
            .map_err(|e| GpsError::Other(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Get config file path
    pub fn get_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| GpsError::Other("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home).join(".config").join("gps-mapper").join("config.json"))
    }

    /// Check everything `start()` relies on. Nothing may start if this fails.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !self.simulate && self.device.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDevice);
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::InvalidBaudRate);
        }
        if self.web_port == 0 {
            return Err(ConfigError::InvalidPort(self.web_port));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::InvalidReadTimeout);
        }
        if self.simulation_interval_ms == 0 {
            return Err(ConfigError::InvalidSimulationInterval);
        }

        let StatusThresholds { fresh_secs, stale_secs } = self.status;
        if !(fresh_secs >= 0.0 && fresh_secs <= stale_secs && stale_secs.is_finite()) {
            return Err(ConfigError::InvalidThresholds {
                fresh: fresh_secs,
                stale: stale_secs,
            });
        }

        let backoff = self.backoff;
        if backoff.initial_ms == 0 || backoff.max_ms < backoff.initial_ms || !(backoff.multiplier >= 1.0) {
            return Err(ConfigError::InvalidBackoff);
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn simulation_interval(&self) -> Duration {
        Duration::from_millis(self.simulation_interval_ms)
    }

    /// Update serial port settings
    pub fn update_serial(&mut self, device: impl Into<PathBuf>, baud_rate: u32) {
        self.simulate = false;
        self.device = device.into();
        self.baud_rate = baud_rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GpsConfig::default();
        assert_eq!(config.device, PathBuf::from("/dev/ttyAMA0"));
        assert_eq!(config.baud_rate, 9600);
        assert!(!config.simulate);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_update_serial() {
        let mut config = GpsConfig {
            simulate: true,
            ..GpsConfig::default()
        };
        config.update_serial("/dev/ttyUSB0", 115200);
        assert!(!config.simulate);
        assert_eq!(config.device, PathBuf::from("/dev/ttyUSB0"));
        assert_eq!(config.baud_rate, 115200);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let empty = GpsConfig {
            device: PathBuf::new(),
            ..GpsConfig::default()
        };
        assert_eq!(empty.validate(), Err(ConfigError::EmptyDevice));

        // The device is irrelevant when simulating
        let simulated = GpsConfig { simulate: true, ..empty };
        assert_eq!(simulated.validate(), Ok(()));

        let port = GpsConfig {
            web_port: 0,
            ..GpsConfig::default()
        };
        assert_eq!(port.validate(), Err(ConfigError::InvalidPort(0)));

        let baud = GpsConfig {
            baud_rate: 0,
            ..GpsConfig::default()
        };
        assert_eq!(baud.validate(), Err(ConfigError::InvalidBaudRate));

        let read_timeout = GpsConfig {
            read_timeout_ms: 0,
            ..GpsConfig::default()
        };
        assert_eq!(read_timeout.validate(), Err(ConfigError::InvalidReadTimeout));

        let interval = GpsConfig {
            simulate: true,
            simulation_interval_ms: 0,
            ..GpsConfig::default()
        };
        assert_eq!(interval.validate(), Err(ConfigError::InvalidSimulationInterval));

        let thresholds = GpsConfig {
            status: StatusThresholds {
                fresh_secs: 20.0,
                stale_secs: 10.0,
            },
            ..GpsConfig::default()
        };
        assert!(matches!(thresholds.validate(), Err(ConfigError::InvalidThresholds { .. })));

        let backoff = GpsConfig {
            backoff: BackoffConfig {
                multiplier: 0.5,
                ..BackoffConfig::default()
            },
            ..GpsConfig::default()
        };
        assert_eq!(backoff.validate(), Err(ConfigError::InvalidBackoff));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = GpsConfig {
            device: PathBuf::from("/dev/serial0"),
            web_port: 9000,
            ..GpsConfig::default()
        };
        config.save_to(&path).unwrap();

        let loaded = GpsConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = GpsConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, GpsConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"simulate": true, "status": {"fresh_secs": 3.0}}"#).unwrap();

        let loaded = GpsConfig::load_from(&path).unwrap();
        assert!(loaded.simulate);
        assert_eq!(loaded.status.fresh_secs, 3.0);
        assert_eq!(loaded.status.stale_secs, 10.0);
        assert_eq!(loaded.baud_rate, 9600);
    }
}
