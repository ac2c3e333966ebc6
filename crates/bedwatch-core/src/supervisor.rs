//! Connection lifecycle supervision.
//!
//! The supervisor owns at most one live [`PeripheralSession`] and the
//! boolean connected status used for telemetry. Status is recomputed on
//! every connect attempt and every detected failure; it is deliberately not
//! derived from the adaptor's lifecycle state, and the two can disagree
//! during a recovery window.
//!
//! Status reporting is idempotent per attempt: every call to
//! [`ConnectionSupervisor::connect`] emits exactly one `connected` event,
//! success or failure. A forced teardown emits `connected=false` before the
//! following reconnect attempt, so a recovery sequence is observable in the
//! order the transitions actually occur.

use tokio::time::sleep;
use tracing::{info, warn};

use bedwatch_types::{DeviceIdentity, SampleEvent};

use crate::error::{Error, Result};
use crate::events::EventDispatcher;
use crate::session::{PeripheralSession, SessionConfig, SessionFactory};

/// Supervises one session against one device.
pub struct ConnectionSupervisor {
    identity: DeviceIdentity,
    factory: Box<dyn SessionFactory>,
    config: SessionConfig,
    dispatcher: EventDispatcher,
    session: Option<Box<dyn PeripheralSession>>,
    connected: bool,
}

impl ConnectionSupervisor {
    /// Create a supervisor for a device. No connection is attempted yet.
    pub fn new(
        identity: DeviceIdentity,
        factory: Box<dyn SessionFactory>,
        config: SessionConfig,
        dispatcher: EventDispatcher,
    ) -> Self {
        Self {
            identity,
            factory,
            config,
            dispatcher,
            session: None,
            connected: false,
        }
    }

    /// The identity this supervisor connects to.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Current connected status.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether a session handle currently exists.
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Open a fresh session.
    ///
    /// Emits exactly one `connected` status event, whatever the outcome. On
    /// failure the factory has handed us nothing to tear down, so only the
    /// status is updated. Callers must not invoke this over a still-open
    /// session; hard reinit goes through [`Self::teardown_and_cool_down`]
    /// first.
    pub async fn connect(&mut self) -> Result<()> {
        debug_assert!(self.session.is_none(), "connect over a live session");

        match self.factory.open(&self.identity).await {
            Ok(session) => {
                self.session = Some(session);
                self.connected = true;
                info!("Connected to {}", self.identity);
                self.dispatcher.send(SampleEvent::connected(true));
                Ok(())
            }
            Err(e) => {
                self.session = None;
                self.connected = false;
                warn!("Connect to {} failed: {}", self.identity, e);
                self.dispatcher.send(SampleEvent::connected(false));
                Err(e)
            }
        }
    }

    /// Read the occupancy switch once on the live session.
    pub async fn read_switch(&mut self) -> Result<Vec<u8>> {
        match self.session.as_mut() {
            Some(session) => session.read_switch().await,
            None => Err(Error::NotConnected),
        }
    }

    /// Attempt an in-place reconnect handshake on the live session.
    ///
    /// This is the soft stage of recovery: no teardown, no status event
    /// beyond what the handshake itself implies.
    pub async fn soft_reconnect(&mut self) -> Result<()> {
        match self.session.as_mut() {
            Some(session) => {
                session.reconnect().await?;
                self.connected = true;
                Ok(())
            }
            None => Err(Error::NotConnected),
        }
    }

    /// Force-close the session, report the disconnect, and sleep the
    /// cool-down before returning.
    ///
    /// The cool-down keeps a reconnect storm off a device that needs time to
    /// recover from an abrupt kill. Close failures are logged, never
    /// propagated.
    pub async fn teardown_and_cool_down(&mut self) {
        if let Some(mut session) = self.session.take()
            && let Err(e) = session.close().await
        {
            warn!("Teardown of {} failed: {}", self.identity, e);
        }
        self.connected = false;
        self.dispatcher.send(SampleEvent::connected(false));
        sleep(self.config.cool_down).await;
    }

    /// Gracefully close the session on stop.
    ///
    /// A failure during graceful close is logged and swallowed; stop always
    /// completes. No status event is emitted.
    pub async fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!("Graceful close of {} failed: {}", self.identity, e);
            }
            self.connected = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockSessionFactory, ReadScript};
    use bedwatch_types::{Channel, SampleValue};
    use std::time::Duration;
    use tokio::time::Instant;

    fn supervisor_with(factory: MockSessionFactory) -> (ConnectionSupervisor, EventDispatcher) {
        let dispatcher = EventDispatcher::new(16);
        let supervisor = ConnectionSupervisor::new(
            DeviceIdentity::new("AA:BB:CC:DD:EE:FF"),
            Box::new(factory),
            SessionConfig::default().cool_down(Duration::from_millis(100)),
            dispatcher.clone(),
        );
        (supervisor, dispatcher)
    }

    #[tokio::test]
    async fn test_connect_success_emits_one_connected_true() {
        let factory = MockSessionFactory::new();
        let (mut supervisor, dispatcher) = supervisor_with(factory);
        let mut rx = dispatcher.subscribe();

        supervisor.connect().await.unwrap();
        assert!(supervisor.is_connected());
        assert!(supervisor.has_session());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.channel, Channel::Connected);
        assert_eq!(event.value, SampleValue::Connected(true));
        // Exactly one event
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_failure_emits_one_connected_false() {
        let factory = MockSessionFactory::new();
        factory.fail_next_connects(1);
        let (mut supervisor, dispatcher) = supervisor_with(factory);
        let mut rx = dispatcher.subscribe();

        assert!(supervisor.connect().await.is_err());
        assert!(!supervisor.is_connected());
        assert!(!supervisor.has_session());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.value, SampleValue::Connected(false));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_read_without_session_is_not_connected() {
        let (mut supervisor, _dispatcher) = supervisor_with(MockSessionFactory::new());
        assert!(matches!(
            supervisor.read_switch().await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            supervisor.soft_reconnect().await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_closes_before_cool_down_elapses() {
        let factory = MockSessionFactory::new();
        let log = factory.call_log();
        let (mut supervisor, _dispatcher) = supervisor_with(factory);

        supervisor.connect().await.unwrap();
        let before = Instant::now();
        supervisor.teardown_and_cool_down().await;
        let elapsed = before.elapsed();

        assert!(elapsed >= Duration::from_millis(100), "cool-down not slept");
        assert_eq!(log.calls(), vec!["open", "close"]);
        assert!(!supervisor.has_session());
        assert!(!supervisor.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinit_never_connects_over_open_session() {
        let factory = MockSessionFactory::new();
        let log = factory.call_log();
        let (mut supervisor, _dispatcher) = supervisor_with(factory);

        supervisor.connect().await.unwrap();
        supervisor.teardown_and_cool_down().await;
        supervisor.connect().await.unwrap();

        // close strictly precedes the second open
        assert_eq!(log.calls(), vec!["open", "close", "open"]);
    }

    #[tokio::test]
    async fn test_teardown_swallows_close_failure() {
        let factory = MockSessionFactory::new();
        factory.fail_close(true);
        let (mut supervisor, dispatcher) = supervisor_with(factory);
        let mut rx = dispatcher.subscribe();

        supervisor.connect().await.unwrap();
        let _ = rx.recv().await.unwrap(); // connected=true
        supervisor.teardown_and_cool_down().await;

        // close failed, but the disconnect is still reported
        let event = rx.recv().await.unwrap();
        assert_eq!(event.value, SampleValue::Connected(false));
        assert!(!supervisor.has_session());
    }

    #[tokio::test]
    async fn test_soft_reconnect_delegates_to_session() {
        let factory = MockSessionFactory::new();
        factory.script_reads(vec![ReadScript::Ok(vec![1])]);
        factory.fail_soft_reconnect(false);
        let log = factory.call_log();
        let (mut supervisor, _dispatcher) = supervisor_with(factory);

        supervisor.connect().await.unwrap();
        supervisor.soft_reconnect().await.unwrap();
        assert_eq!(log.calls(), vec!["open", "reconnect"]);
    }
}
