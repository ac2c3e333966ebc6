//! Bed occupancy sensor adaptor.
//!
//! Bridges a BLE pressure-mat switch onto a newline-delimited JSON message
//! bus. The polling engine lives in `bedwatch-core`; this crate adds the
//! control plane around it: configuration, the lifecycle state machine,
//! subscriber bookkeeping, and the bus transport.

pub mod bus;
pub mod config;
pub mod facade;
pub mod messages;
pub mod subscriptions;

pub use config::{Config, ConfigError};
pub use facade::{AdaptorFacade, EngineCommand, EventFanOut, HealthSignal, watch_link_health};
pub use messages::{BusMessage, ControlMessage};
pub use subscriptions::SubscriptionTable;
