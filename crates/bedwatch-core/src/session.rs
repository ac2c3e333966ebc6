//! The peripheral session capability.
//!
//! A session is one connect/read/disconnect cycle against the remote sensor.
//! Two interchangeable backends implement it: a native BLE client
//! ([`crate::ble::BleSession`]) and a spawned interactive command tool
//! ([`crate::gatttool::ToolSession`]). All recovery policy lives above the
//! session, in the supervisor and the poll loop; a session only performs
//! bounded individual operations and reports typed failures.

use std::time::Duration;

use async_trait::async_trait;

use bedwatch_types::DeviceIdentity;

use crate::ble::BleSessionFactory;
use crate::error::Result;
use crate::gatttool::ToolSessionFactory;

/// Default timeout for session bring-up and the soft reconnect handshake.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(16);

/// Default timeout for a single characteristic read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Default cool-down after a forced teardown, before the next connect.
pub const DEFAULT_COOL_DOWN: Duration = Duration::from_secs(2);

/// Timeouts governing a session's bounded operations.
///
/// The cool-down is not enforced by sessions themselves; the supervisor
/// sleeps it after a forced teardown so a recovering device is not hammered.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for session open and the in-place reconnect handshake.
    pub init_timeout: Duration,
    /// Deadline for a single characteristic read.
    pub read_timeout: Duration,
    /// Delay after a forced teardown before the caller may reconnect.
    pub cool_down: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            init_timeout: DEFAULT_INIT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            cool_down: DEFAULT_COOL_DOWN,
        }
    }
}

impl SessionConfig {
    /// Create a session config with default timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the init/reconnect timeout.
    #[must_use]
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the cool-down delay.
    #[must_use]
    pub fn cool_down(mut self, delay: Duration) -> Self {
        self.cool_down = delay;
        self
    }
}

/// A live connect/read/disconnect cycle against one remote device.
///
/// No retry logic lives here; every method performs one bounded attempt and
/// returns a typed failure.
#[async_trait]
pub trait PeripheralSession: Send {
    /// Read the occupancy switch characteristic once, bounded by the read
    /// timeout. Returns the raw payload as received.
    async fn read_switch(&mut self) -> Result<Vec<u8>>;

    /// Attempt an in-place reconnect handshake on this session, without
    /// destroying and recreating it. Bounded by the init timeout.
    async fn reconnect(&mut self) -> Result<()>;

    /// Best-effort teardown. Callers log failures and never propagate them.
    async fn close(&mut self) -> Result<()>;

    /// The identity this session was opened against.
    fn identity(&self) -> &DeviceIdentity;
}

/// Opens peripheral sessions. Implemented by both production backends and
/// the test mock, so the supervisor is written once against the interface.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Establish a session, bounded by the init timeout. Must not block
    /// indefinitely.
    async fn open(&self, identity: &DeviceIdentity) -> Result<Box<dyn PeripheralSession>>;
}

/// Which session backend to drive the sensor with.
///
/// Selected at construction time; the supervisor and poll loop are agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Native BLE client session (btleplug).
    #[default]
    Ble,
    /// Spawned interactive `gatttool` session.
    Gatttool,
}

impl Backend {
    /// Build the session factory for this backend.
    pub fn factory(self, config: SessionConfig) -> Box<dyn SessionFactory> {
        match self {
            Backend::Ble => Box::new(BleSessionFactory::new(config)),
            Backend::Gatttool => Box::new(ToolSessionFactory::new(config)),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ble" => Ok(Backend::Ble),
            "gatttool" => Ok(Backend::Gatttool),
            other => Err(crate::error::Error::invalid_config(format!(
                "unknown backend '{other}': expected 'ble' or 'gatttool'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.init_timeout, Duration::from_secs(16));
        assert_eq!(config.read_timeout, Duration::from_secs(3));
        assert_eq!(config.cool_down, Duration::from_secs(2));
    }

    #[test]
    fn test_session_config_builders() {
        let config = SessionConfig::new()
            .init_timeout(Duration::from_secs(5))
            .read_timeout(Duration::from_secs(1))
            .cool_down(Duration::from_millis(500));
        assert_eq!(config.init_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(1));
        assert_eq!(config.cool_down, Duration::from_millis(500));
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("ble".parse::<Backend>().unwrap(), Backend::Ble);
        assert_eq!("gatttool".parse::<Backend>().unwrap(), Backend::Gatttool);
        assert!("serial".parse::<Backend>().is_err());
    }
}
