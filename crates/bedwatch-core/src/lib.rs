//! Connection-and-polling engine for the bedwatch occupancy sensor.
//!
//! This crate drives one Bluetooth Low-Energy bed-occupancy switch: it
//! establishes a session, polls the occupancy characteristic on a fixed
//! cadence with bounded timeouts, detects and recovers from link failures,
//! and emits normalized samples with timestamps.
//!
//! # Architecture
//!
//! - [`session`]: the [`PeripheralSession`] capability, one bounded
//!   connect/read/disconnect cycle. Two interchangeable backends implement
//!   it: a native BLE client ([`ble`]) and a spawned interactive command
//!   tool ([`gatttool`]), selected at construction time.
//! - [`supervisor`]: owns the session lifecycle and the connected-status
//!   telemetry. Every connect attempt reports its outcome exactly once.
//! - [`poll`]: the periodic driver with the two-stage recovery protocol
//!   (soft reconnect, then teardown + cool-down + fresh connect).
//! - [`events`]: broadcast dispatch of samples to the adaptor facade.
//! - [`mock`]: scriptable session for tests.
//!
//! All failures are recoverable: the engine stays alive and keeps retrying
//! indefinitely, reporting link health on the `connected` channel.
//!
//! # Quick start
//!
//! ```no_run
//! use bedwatch_core::{
//!     Backend, ConnectionSupervisor, EventDispatcher, PollLoop, PollOptions, SessionConfig,
//! };
//! use bedwatch_types::DeviceIdentity;
//!
//! #[tokio::main]
//! async fn main() {
//!     let identity = DeviceIdentity::new("AA:BB:CC:DD:EE:FF");
//!     let config = SessionConfig::default();
//!     let dispatcher = EventDispatcher::default();
//!     let mut events = dispatcher.subscribe();
//!
//!     let supervisor = ConnectionSupervisor::new(
//!         identity,
//!         Backend::Ble.factory(config.clone()),
//!         config,
//!         dispatcher.clone(),
//!     );
//!     let handle = PollLoop::new(supervisor, dispatcher, PollOptions::default()).spawn();
//!
//!     while let Ok(sample) = events.recv().await {
//!         println!("{}: {:?}", sample.channel, sample.value);
//!     }
//!     handle.stop().await;
//! }
//! ```

pub mod ble;
pub mod error;
pub mod events;
pub mod gatttool;
pub mod mock;
pub mod poll;
pub mod session;
pub mod supervisor;

pub use ble::{BleSession, BleSessionFactory};
pub use error::{Error, Result};
pub use events::{EventDispatcher, EventReceiver, EventSender, event_channel};
pub use gatttool::{ToolSession, ToolSessionFactory};
pub use mock::{CallLog, MockSession, MockSessionFactory, ReadScript};
pub use poll::{DEFAULT_PERIOD, PollHandle, PollLoop, PollOptions};
pub use session::{
    Backend, DEFAULT_COOL_DOWN, DEFAULT_INIT_TIMEOUT, DEFAULT_READ_TIMEOUT, PeripheralSession,
    SessionConfig, SessionFactory,
};
pub use supervisor::ConnectionSupervisor;

// Re-export the shared vocabulary for convenience.
pub use bedwatch_types::{
    BinaryState, Channel, DeviceIdentity, LifecycleState, SampleEvent, SampleValue, SubscriberId,
};
