//! Adaptor facade.
//!
//! Owns the lifecycle state machine and the subscription table, turns
//! inbound control messages into engine commands and bus replies, and fans
//! polled samples out to the current subscribers. All bus output goes
//! through one mpsc channel so the writer task serializes messages in the
//! order they were produced.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use bedwatch_core::events::EventReceiver;
use bedwatch_types::{LifecycleState, SampleEvent, SampleValue, SubscriberId};

use crate::messages::{
    BusMessage, CharacteristicUpdate, ControlMessage, ServiceResponse, StateNotification,
};
use crate::subscriptions::SubscriptionTable;

/// Commands from the facade to the engine runner task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    /// Connect to the device and start the poll loop.
    Start,
}

/// Control-plane front end of the adaptor.
pub struct AdaptorFacade {
    id: String,
    name: String,
    poll_interval: f64,
    state: LifecycleState,
    table: Arc<Mutex<SubscriptionTable>>,
    outbound: mpsc::Sender<BusMessage>,
    engine: mpsc::Sender<EngineCommand>,
}

impl AdaptorFacade {
    /// Create a facade in the `Stopped` state.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        poll_interval: f64,
        outbound: mpsc::Sender<BusMessage>,
        engine: mpsc::Sender<EngineCommand>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            poll_interval,
            state: LifecycleState::Stopped,
            table: Arc::new(Mutex::new(SubscriptionTable::new())),
            outbound,
            engine,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Handle one inbound control message.
    pub async fn handle(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::Configure => self.configure().await,
            ControlMessage::AppInit { id } => self.app_init(id).await,
            ControlMessage::AppRequest { id, service } => {
                self.table.lock().unwrap().register(&id, &service);
            }
            ControlMessage::AppCommand { id, data } => {
                if data.is_none() {
                    warn!("Malformed command from {id}: no data");
                } else {
                    warn!("Command from {id} rejected: device is read-only");
                }
            }
        }
    }

    /// Start the engine. Only acts in the `Stopped` state, so repeated
    /// configure messages start at most one poll loop.
    async fn configure(&mut self) {
        if self.state != LifecycleState::Stopped {
            debug!("Configure ignored in state {}", self.state.as_str());
            return;
        }
        self.transition(LifecycleState::Starting).await;
        if self.engine.send(EngineCommand::Start).await.is_err() {
            warn!("Engine runner is gone; cannot start polling");
        }
    }

    /// Answer a subscriber's hello with the service descriptor. The first
    /// hello after startup completes the `Starting` to `Running` move.
    async fn app_init(&mut self, app: SubscriberId) {
        let reply = ServiceResponse::descriptor(
            self.name.clone(),
            self.id.clone(),
            self.poll_interval,
            app.clone(),
        );
        self.send(BusMessage::Service(reply)).await;
        info!("Sent service descriptor to {app}");
        if self.state == LifecycleState::Starting {
            self.transition(LifecycleState::Running).await;
        }
    }

    /// Enter the `Error` state. Only a running adaptor can fault; faults
    /// reported before startup completes or after one is already latched
    /// are dropped.
    pub async fn fault(&mut self) {
        if self.state == LifecycleState::Running {
            self.transition(LifecycleState::Error).await;
        }
    }

    /// Leave the `Error` state. A no-op in any other state.
    pub async fn clear_error(&mut self) {
        if self.state == LifecycleState::Error {
            self.transition(LifecycleState::Running).await;
        }
    }

    async fn transition(&mut self, next: LifecycleState) {
        info!("State {} -> {}", self.state.as_str(), next.as_str());
        self.state = next;
        self.send(BusMessage::State(StateNotification::new(
            self.id.clone(),
            next,
        )))
        .await;
    }

    async fn send(&self, msg: BusMessage) {
        if self.outbound.send(msg).await.is_err() {
            warn!("Bus writer is gone; dropping outbound message");
        }
    }

    /// A fan-out handle sharing this facade's subscription table.
    pub fn fan_out(&self) -> EventFanOut {
        EventFanOut {
            id: self.id.clone(),
            table: Arc::clone(&self.table),
            outbound: self.outbound.clone(),
        }
    }
}

/// Delivers engine events to the current subscribers of each channel.
///
/// Runs as its own task so a slow bus writer never stalls the control
/// path.
pub struct EventFanOut {
    id: String,
    table: Arc<Mutex<SubscriptionTable>>,
    outbound: mpsc::Sender<BusMessage>,
}

impl EventFanOut {
    /// Deliver one event to every subscriber of its channel.
    pub async fn dispatch(&self, event: &SampleEvent) {
        let targets = self.table.lock().unwrap().subscribers(event.channel);
        for app in targets {
            let update = CharacteristicUpdate::new(self.id.clone(), app, event);
            if self
                .outbound
                .send(BusMessage::Characteristic(update))
                .await
                .is_err()
            {
                warn!("Bus writer is gone; stopping fan-out");
                return;
            }
        }
    }

    /// Consume engine events until the engine closes its channel.
    pub async fn run(self, mut events: EventReceiver) {
        loop {
            match events.recv().await {
                Ok(event) => self.dispatch(&event).await,
                Err(RecvError::Lagged(missed)) => {
                    warn!("Dropped {missed} events; fan-out fell behind");
                }
                Err(RecvError::Closed) => {
                    debug!("Event channel closed; fan-out exiting");
                    return;
                }
            }
        }
    }
}

/// Consecutive failed connect attempts before a fault is reported.
pub const FAULT_THRESHOLD: u32 = 5;

/// Link-health transitions derived from the engine's status events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthSignal {
    /// The device has been unreachable for [`FAULT_THRESHOLD`] attempts.
    Faulted,
    /// The link came back after a fault was reported.
    Recovered,
}

/// Reduce the engine's event stream to fault and recovery signals.
///
/// Successive `connected = false` events count failed attempts; any sample
/// or successful connect resets the count. One fault is reported per
/// outage. Exits when the engine closes the event channel or the receiver
/// is gone.
pub async fn watch_link_health(mut events: EventReceiver, signals: mpsc::Sender<HealthSignal>) {
    let mut failures = 0u32;
    let mut faulted = false;
    loop {
        match events.recv().await {
            Ok(event) => match event.value {
                SampleValue::Connected(false) => {
                    failures += 1;
                    if failures == FAULT_THRESHOLD && !faulted {
                        faulted = true;
                        if signals.send(HealthSignal::Faulted).await.is_err() {
                            return;
                        }
                    }
                }
                _ => {
                    failures = 0;
                    if faulted {
                        faulted = false;
                        if signals.send(HealthSignal::Recovered).await.is_err() {
                            return;
                        }
                    }
                }
            },
            Err(RecvError::Lagged(missed)) => {
                warn!("Dropped {missed} events; link-health watcher fell behind");
            }
            Err(RecvError::Closed) => {
                debug!("Event channel closed; link-health watcher exiting");
                return;
            }
        }
    }
}
