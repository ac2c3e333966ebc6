//! Event dispatch between the polling engine and the adaptor facade.
//!
//! Samples are fanned out over a broadcast channel: the poll loop is the
//! only sender, the facade's dispatch step the usual receiver. Status
//! events for a recovery sequence are sent synchronously at the transition
//! site, so receivers observe transitions in the order they occurred.

use tokio::sync::broadcast;

use bedwatch_types::SampleEvent;

/// Sender for sample events.
pub type EventSender = broadcast::Sender<SampleEvent>;

/// Receiver for sample events.
pub type EventReceiver = broadcast::Receiver<SampleEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    broadcast::channel(capacity)
}

/// Event dispatcher handed to the supervisor and poll loop.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: SampleEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bedwatch_types::{BinaryState, Channel, SampleValue};

    #[tokio::test]
    async fn test_dispatch_and_receive() {
        let dispatcher = EventDispatcher::new(8);
        let mut rx = dispatcher.subscribe();

        dispatcher.send(SampleEvent::binary(BinaryState::On));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.channel, Channel::BinarySensor);
        assert_eq!(event.value, SampleValue::Binary(BinaryState::On));
    }

    #[test]
    fn test_send_without_receivers_is_silent() {
        let dispatcher = EventDispatcher::new(8);
        assert_eq!(dispatcher.receiver_count(), 0);
        dispatcher.send(SampleEvent::connected(false));
    }

    #[tokio::test]
    async fn test_events_received_in_emission_order() {
        let dispatcher = EventDispatcher::new(8);
        let mut rx = dispatcher.subscribe();

        dispatcher.send(SampleEvent::connected(false));
        dispatcher.send(SampleEvent::connected(true));

        assert_eq!(
            rx.recv().await.unwrap().value,
            SampleValue::Connected(false)
        );
        assert_eq!(rx.recv().await.unwrap().value, SampleValue::Connected(true));
    }
}
