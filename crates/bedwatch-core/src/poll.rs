//! The periodic polling driver.
//!
//! Runs for the lifetime of the adaptor on a fixed period: acquire a
//! session if none is live, read the occupancy switch once, decode, emit.
//! A failed or timed-out read triggers the two-stage recovery protocol
//! before polling resumes. The loop executes on its own task so a hung
//! device session never stalls control-message handling; the only
//! cancellation point is the cooperative stop checked at cycle boundaries.

use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bedwatch_types::{BinaryState, SampleEvent};
use bedwatch_types::uuid::DEFAULT_ON_CODE;

use crate::error::{Error, Result};
use crate::events::EventDispatcher;
use crate::supervisor::ConnectionSupervisor;

/// Default fixed poll period.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(3);

/// Options for the poll loop.
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Fixed inter-cycle period. Also the implicit back-off after a failed
    /// acquire.
    pub period: Duration,
    /// Raw byte value the sensor reports for "on".
    pub on_code: u8,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            on_code: DEFAULT_ON_CODE,
        }
    }
}

impl PollOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll period.
    #[must_use]
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Set the raw "on" code.
    #[must_use]
    pub fn on_code(mut self, on_code: u8) -> Self {
        self.on_code = on_code;
        self
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if self.period.is_zero() {
            return Err(Error::invalid_config("poll period must be > 0"));
        }
        Ok(())
    }
}

/// The periodic driver over a [`ConnectionSupervisor`].
pub struct PollLoop {
    supervisor: ConnectionSupervisor,
    dispatcher: EventDispatcher,
    options: PollOptions,
}

impl PollLoop {
    /// Create a poll loop. Nothing runs until [`Self::spawn`] or
    /// [`Self::run`].
    pub fn new(
        supervisor: ConnectionSupervisor,
        dispatcher: EventDispatcher,
        options: PollOptions,
    ) -> Self {
        Self {
            supervisor,
            dispatcher,
            options,
        }
    }

    /// Spawn the loop on its own task and return a stop handle.
    pub fn spawn(self) -> PollHandle {
        let cancel = CancellationToken::new();
        let task_token = cancel.clone();
        let handle = tokio::spawn(async move {
            self.run(task_token).await;
        });
        PollHandle { handle, cancel }
    }

    /// Run until the token is cancelled, then close the session gracefully.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = interval(self.options.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Polling {} every {:?}",
            self.supervisor.identity(),
            self.options.period
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Poll loop cancelled, stopping gracefully");
                    break;
                }
                _ = ticker.tick() => {
                    self.cycle().await;
                }
            }
        }

        // Stop always completes; close failures are logged inside.
        self.supervisor.close_session().await;
    }

    /// One poll cycle: acquire, read, decode, emit; recover on failure.
    async fn cycle(&mut self) {
        if !self.supervisor.has_session() {
            // The fixed period is the back-off; no tight retry loop here.
            if self.supervisor.connect().await.is_err() {
                return;
            }
        }

        match self.supervisor.read_switch().await {
            Ok(raw) => match BinaryState::decode(&raw, self.options.on_code) {
                Ok(state) => {
                    debug!("Polled {}: {}", self.supervisor.identity(), state);
                    self.dispatcher.send(SampleEvent::binary(state));
                }
                Err(e) => {
                    // A malformed payload takes the same path as a protocol
                    // error, never a crash.
                    warn!("Undecodable payload from {}: {}", self.supervisor.identity(), e);
                    self.recover().await;
                }
            },
            Err(e) if e.needs_recovery() => {
                warn!("Read from {} failed: {}", self.supervisor.identity(), e);
                self.recover().await;
            }
            Err(e) => {
                warn!("Read from {} failed (not recoverable): {}", self.supervisor.identity(), e);
            }
        }
    }

    /// Two-stage recovery: soft retry on the existing session, then hard
    /// reinit (teardown, cool-down, fresh connect).
    async fn recover(&mut self) {
        match self.supervisor.soft_reconnect().await {
            Ok(()) => {
                info!("Soft reconnect to {} succeeded", self.supervisor.identity());
                return;
            }
            Err(e) => {
                warn!("Soft reconnect to {} failed: {}", self.supervisor.identity(), e);
            }
        }

        self.supervisor.teardown_and_cool_down().await;
        // connect reports its own result as a connected-status event; a
        // failure here is retried by the next cycle's acquire step.
        let _ = self.supervisor.connect().await;
    }
}

/// Handle for stopping a spawned poll loop.
pub struct PollHandle {
    handle: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

impl PollHandle {
    /// Signal the loop to stop and wait for its graceful close to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        let _ = (&mut self.handle).await;
    }

    /// Check if the loop is still running.
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Token that can be used to cancel the loop externally.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        // No poll loop may outlive its handle.
        self.cancel.cancel();
    }
}
