//! Adaptor configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use bedwatch_core::{Backend, PollOptions, SessionConfig};
use bedwatch_types::DeviceIdentity;
use bedwatch_types::uuid::DEFAULT_ON_CODE;

/// Adaptor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Adaptor identity on the bus.
    pub adaptor: AdaptorConfig,
    /// The device to drive.
    pub device: DeviceConfig,
    /// Polling cadence and session timeouts.
    pub poll: PollConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - The device address is present
    /// - The backend name is known
    /// - The poll interval and timeouts are sane
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.device.address.is_empty() {
            errors.push(ValidationError {
                field: "device.address".to_string(),
                message: "device address cannot be empty".to_string(),
            });
        }

        if self.device.backend.parse::<Backend>().is_err() {
            errors.push(ValidationError {
                field: "device.backend".to_string(),
                message: format!(
                    "unknown backend '{}': expected 'ble' or 'gatttool'",
                    self.device.backend
                ),
            });
        }

        // NaN and infinity must fail here; they would otherwise panic
        // later in Duration::from_secs_f64.
        if self.poll.interval_secs < 0.1 || !self.poll.interval_secs.is_finite() {
            errors.push(ValidationError {
                field: "poll.interval_secs".to_string(),
                message: "poll interval must be a finite number of at least 0.1 seconds"
                    .to_string(),
            });
        }

        if self.poll.read_timeout_secs == 0 || self.poll.init_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "poll".to_string(),
                message: "timeouts must be non-zero".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// The device identity this config points at.
    pub fn identity(&self) -> DeviceIdentity {
        match &self.device.adapter {
            Some(adapter) => DeviceIdentity::with_adapter(&self.device.address, adapter),
            None => DeviceIdentity::new(&self.device.address),
        }
    }

    /// Session timeouts derived from this config.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new()
            .init_timeout(Duration::from_secs(self.poll.init_timeout_secs))
            .read_timeout(Duration::from_secs(self.poll.read_timeout_secs))
            .cool_down(Duration::from_secs(self.poll.cool_down_secs))
    }

    /// Poll loop options derived from this config.
    pub fn poll_options(&self) -> PollOptions {
        PollOptions::new()
            .period(Duration::from_secs_f64(self.poll.interval_secs))
            .on_code(self.device.on_code)
    }

    /// Session backend derived from this config.
    ///
    /// Call [`Self::validate`] first; an unknown name falls back to the
    /// native backend here.
    pub fn backend(&self) -> Backend {
        self.device.backend.parse().unwrap_or_default()
    }
}

/// Identity of the adaptor itself on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptorConfig {
    /// Bus id of this adaptor instance.
    pub id: String,
    /// Human-readable name announced to subscribers.
    pub name: String,
}

impl Default for AdaptorConfig {
    fn default() -> Self {
        Self {
            id: "bedwatch".to_string(),
            name: "Bed occupancy sensor".to_string(),
        }
    }
}

/// The device to connect to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device address (MAC, or CoreBluetooth UUID on macOS).
    pub address: String,
    /// Local adapter/interface (e.g. "hci0"), if pinned.
    pub adapter: Option<String>,
    /// Session backend: "ble" or "gatttool".
    pub backend: String,
    /// Raw byte the firmware reports for "occupied".
    pub on_code: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            adapter: None,
            backend: "ble".to_string(),
            on_code: DEFAULT_ON_CODE,
        }
    }
}

/// Polling cadence and session timeouts, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Fixed poll period.
    pub interval_secs: f64,
    /// Deadline for a single characteristic read.
    pub read_timeout_secs: u64,
    /// Deadline for session open and the soft reconnect handshake.
    pub init_timeout_secs: u64,
    /// Delay after a forced teardown before reconnecting.
    pub cool_down_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3.0,
            read_timeout_secs: 3,
            init_timeout_secs: 16,
            cool_down_secs: 2,
        }
    }
}

/// Default configuration file location.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/bedwatch/adaptor.toml")
}

/// A single validation problem.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to write config to {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("invalid configuration: {}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bedwatch_core::Backend;

    #[test]
    fn test_default_config_fails_validation_without_address() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_minimal_config_parses() {
        let config: Config = toml::from_str(
            r#"
            [device]
            address = "AA:BB:CC:DD:EE:FF"
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.device.address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(config.device.on_code, 1);
        assert_eq!(config.poll.interval_secs, 3.0);
        assert_eq!(config.backend(), Backend::Ble);
    }

    #[test]
    fn test_full_config_round_trip() {
        let mut config = Config::default();
        config.device.address = "AA:BB:CC:DD:EE:FF".to_string();
        config.device.adapter = Some("hci1".to_string());
        config.device.backend = "gatttool".to_string();
        config.poll.interval_secs = 5.0;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adaptor.toml");
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        loaded.validate().unwrap();
        assert_eq!(loaded.device.adapter.as_deref(), Some("hci1"));
        assert_eq!(loaded.backend(), Backend::Gatttool);
        assert_eq!(loaded.identity().to_string(), "AA:BB:CC:DD:EE:FF (via hci1)");
        assert_eq!(
            loaded.poll_options().period,
            std::time::Duration::from_secs(5)
        );
    }

    #[test]
    fn test_bad_backend_and_interval_rejected() {
        let mut config = Config::default();
        config.device.address = "AA:BB:CC:DD:EE:FF".to_string();
        config.device.backend = "serial".to_string();
        config.poll.interval_secs = 0.0;

        let err = config.validate().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("device.backend"));
        assert!(text.contains("poll.interval_secs"));
    }

    #[test]
    fn test_non_finite_interval_rejected() {
        let config: Config = toml::from_str(
            r#"
            [device]
            address = "AA:BB:CC:DD:EE:FF"

            [poll]
            interval_secs = nan
            "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("poll.interval_secs"));

        let mut config = Config::default();
        config.device.address = "AA:BB:CC:DD:EE:FF".to_string();
        config.poll.interval_secs = f64::INFINITY;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("poll.interval_secs"));
    }

    #[test]
    fn test_session_config_derivation() {
        let mut config = Config::default();
        config.poll.init_timeout_secs = 8;
        let session = config.session_config();
        assert_eq!(session.init_timeout, Duration::from_secs(8));
        assert_eq!(session.read_timeout, Duration::from_secs(3));
        assert_eq!(session.cool_down, Duration::from_secs(2));
    }
}
