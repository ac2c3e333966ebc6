//! Platform-agnostic types for the bedwatch occupancy sensor adaptor.
//!
//! This crate provides the shared vocabulary used by the polling engine
//! (bedwatch-core) and the bus-facing adaptor process (bedwatch-adaptor).
//!
//! # Features
//!
//! - Device identity and lifecycle state types
//! - Channel and sample event types with payload decoding
//! - UUID and GATT handle constants for the occupancy characteristic
//! - Error types for payload decoding
//!
//! # Example
//!
//! ```
//! use bedwatch_types::{BinaryState, uuid::DEFAULT_ON_CODE};
//!
//! let state = BinaryState::decode(&[1], DEFAULT_ON_CODE).unwrap();
//! assert!(state.is_on());
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{
    BinaryState, Channel, DeviceIdentity, LifecycleState, SampleEvent, SampleValue, SubscriberId,
};
