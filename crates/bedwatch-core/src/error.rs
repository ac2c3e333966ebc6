//! Error types for bedwatch-core.
//!
//! Every failure here is recoverable: session errors surface to
//! the connection supervisor as typed results, supervisor failures surface
//! to the poll loop the same way, and the poll loop converts persistent
//! failure into connected-status telemetry only. Nothing in this taxonomy
//! terminates the process.
//!
//! # Recovery
//!
//! | Error | Handled by |
//! |-------|------------|
//! | [`Error::NoConnect`] | Poll loop waits one period and retries |
//! | [`Error::Timeout`] | Soft retry, then hard reinit |
//! | [`Error::Protocol`] / [`Error::Parse`] | Same path as a timeout |
//! | [`Error::NotConnected`] | Fresh connect on the next cycle |
//! | [`Error::UnsupportedCommand`] | Logged and ignored at the facade |

use std::time::Duration;

use thiserror::Error;

use bedwatch_types::ParseError;

/// Errors that can occur while driving the sensor session.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error from the native backend.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Initial session open failed.
    #[error("could not connect to {identity}: {reason}")]
    NoConnect {
        /// Address of the device that failed to connect.
        identity: String,
        /// What went wrong during bring-up.
        reason: String,
    },

    /// Operation attempted without a live session.
    #[error("not connected to device")]
    NotConnected,

    /// Bounded I/O exceeded its deadline.
    #[error("operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline that was exceeded.
        duration: Duration,
    },

    /// Malformed or unexpected response from the device.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Payload decoding failed; routed to recovery like a protocol error.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Inbound command the device cannot act on (it is read-only).
    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),

    /// I/O error (spawned-tool backend pipes).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Invalid configuration provided.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation was cancelled by a cooperative stop.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a connect failure for a device identity.
    pub fn no_connect(identity: impl Into<String>, reason: impl ToString) -> Self {
        Self::NoConnect {
            identity: identity.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether this failure should be routed through the two-stage recovery
    /// protocol (soft retry, then hard reinit).
    ///
    /// A malformed payload is treated the same as a protocol error, never
    /// as a crash.
    pub fn needs_recovery(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. }
                | Error::Protocol(_)
                | Error::Parse(_)
                | Error::Bluetooth(_)
                | Error::Io(_)
                | Error::NotConnected
        )
    }
}

/// Result type alias using bedwatch-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::no_connect("AA:BB:CC:DD:EE:FF", "open failed");
        assert!(err.to_string().contains("AA:BB:CC:DD:EE:FF"));

        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "not connected to device");

        let err = Error::timeout("read_switch", Duration::from_secs(3));
        assert!(err.to_string().contains("read_switch"));
        assert!(err.to_string().contains("3s"));

        let err = Error::protocol("unexpected reply");
        assert_eq!(err.to_string(), "protocol error: unexpected reply");
    }

    #[test]
    fn test_needs_recovery_classification() {
        assert!(Error::timeout("read", Duration::from_secs(3)).needs_recovery());
        assert!(Error::protocol("garbage").needs_recovery());
        assert!(Error::Parse(ParseError::EmptyPayload).needs_recovery());
        assert!(Error::NotConnected.needs_recovery());

        assert!(!Error::Cancelled.needs_recovery());
        assert!(!Error::invalid_config("bad").needs_recovery());
        assert!(!Error::UnsupportedCommand("switch_on".into()).needs_recovery());
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = ParseError::EmptyPayload.into();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("pipe closed"));
    }
}
