//! Core types for the bed-occupancy sensor adaptor.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ParseError;

/// Address of the remote sensor plus the local interface used to reach it.
///
/// Set once at construction and never mutated. The adapter field names the
/// local Bluetooth interface (e.g. `hci0`); `None` means the platform
/// default.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceIdentity {
    /// Device address (MAC on Linux/Windows, CoreBluetooth UUID on macOS).
    pub address: String,
    /// Local adapter/interface identifier, if pinned.
    pub adapter: Option<String>,
}

impl DeviceIdentity {
    /// Create an identity for a device address on the default adapter.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            adapter: None,
        }
    }

    /// Create an identity pinned to a specific local adapter.
    pub fn with_adapter(address: impl Into<String>, adapter: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            adapter: Some(adapter.into()),
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.adapter {
            Some(adapter) => write!(f, "{} (via {})", self.address, adapter),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Identity of a subscriber application on the message bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SubscriberId(pub String);

impl SubscriberId {
    /// Create a new subscriber identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriberId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Externally observable lifecycle state of the adaptor.
///
/// Owned solely by the adaptor facade; exactly one value is current at any
/// time. Transitions are announced on the bus as state-change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LifecycleState {
    /// Not yet configured.
    #[default]
    Stopped,
    /// Configuration received, session bring-up in progress.
    Starting,
    /// At least one subscriber has been acknowledged.
    Running,
    /// An internal fault was signalled; cleared only by an explicit action.
    Error,
}

impl LifecycleState {
    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Error => "error",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event channel a subscriber can register interest in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Channel {
    /// The occupancy switch state.
    BinarySensor,
    /// Link status telemetry.
    Connected,
}

impl Channel {
    /// Wire name of the channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::BinarySensor => "binary_sensor",
            Channel::Connected => "connected",
        }
    }

    /// All channels the adaptor publishes.
    pub const ALL: [Channel; 2] = [Channel::BinarySensor, Channel::Connected];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary_sensor" => Ok(Channel::BinarySensor),
            "connected" => Ok(Channel::Connected),
            other => Err(ParseError::InvalidValue(format!(
                "unknown channel '{other}'"
            ))),
        }
    }
}

/// Semantic state of the occupancy switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BinaryState {
    /// Switch closed: bed occupied.
    On,
    /// Switch open.
    Off,
}

impl BinaryState {
    /// Decode a raw characteristic payload.
    ///
    /// The only assumption made about the encoding is that one designated
    /// byte value means "on" and everything else means "off"; this tolerates
    /// sensor firmware variance. Trailing bytes are ignored. An empty
    /// payload is a parse error so the caller can route it to recovery.
    pub fn decode(raw: &[u8], on_code: u8) -> Result<Self, ParseError> {
        match raw.first() {
            Some(&b) if b == on_code => Ok(BinaryState::On),
            Some(_) => Ok(BinaryState::Off),
            None => Err(ParseError::EmptyPayload),
        }
    }

    /// Wire representation (`"on"` / `"off"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryState::On => "on",
            BinaryState::Off => "off",
        }
    }

    /// Whether the switch is on.
    pub fn is_on(&self) -> bool {
        matches!(self, BinaryState::On)
    }
}

impl fmt::Display for BinaryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value carried by a [`SampleEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum SampleValue {
    /// Occupancy switch state (`binary_sensor` channel).
    Binary(BinaryState),
    /// Link status (`connected` channel).
    Connected(bool),
}

/// One normalized sample emitted by the polling engine.
///
/// Ephemeral: constructed, dispatched, discarded. Never persisted.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SampleEvent {
    /// Channel the sample belongs to.
    pub channel: Channel,
    /// Sampled value.
    pub value: SampleValue,
    /// When the sample was taken.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
}

impl SampleEvent {
    /// Create a `binary_sensor` sample stamped with the current time.
    pub fn binary(state: BinaryState) -> Self {
        Self {
            channel: Channel::BinarySensor,
            value: SampleValue::Binary(state),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Create a `connected` status sample stamped with the current time.
    pub fn connected(up: bool) -> Self {
        Self {
            channel: Channel::Connected,
            value: SampleValue::Connected(up),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Timestamp as fractional UNIX seconds, the bus wire format.
    pub fn unix_timestamp(&self) -> f64 {
        self.timestamp.unix_timestamp_nanos() as f64 / 1e9
    }
}
