//! Subscriber bookkeeping.
//!
//! One table maps each event channel to the ordered list of subscribers
//! that want it. Writers are the control path only; the dispatch step only
//! reads. The facade wraps the table in a lock so fan-out always observes a
//! consistent snapshot.

use std::collections::HashMap;

use tracing::debug;

use bedwatch_types::{Channel, SubscriberId};

use crate::messages::ServiceEntry;

/// Minimum interval reported when nothing is subscribed.
pub const DEFAULT_MIN_INTERVAL: f64 = 1000.0;

/// One subscriber's registration on one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    /// Who wants the channel.
    pub app: SubscriberId,
    /// Requested delivery interval, in seconds.
    pub interval: f64,
}

/// Mapping from event channel to its ordered subscriber list.
#[derive(Debug, Clone)]
pub struct SubscriptionTable {
    channels: HashMap<Channel, Vec<Subscription>>,
}

impl SubscriptionTable {
    /// Create an empty table covering every published channel.
    pub fn new() -> Self {
        let mut channels = HashMap::new();
        for channel in Channel::ALL {
            channels.insert(channel, Vec::new());
        }
        Self { channels }
    }

    /// Register a subscriber's current channel requests.
    ///
    /// All prior memberships for the subscriber are purged first, then one
    /// membership per requested channel is added, so a subscriber appears
    /// at most once per channel no matter how often it re-registers.
    pub fn register(&mut self, app: &SubscriberId, services: &[ServiceEntry]) {
        for subs in self.channels.values_mut() {
            subs.retain(|s| &s.app != app);
        }

        for entry in services {
            let subs = self
                .channels
                .entry(entry.characteristic)
                .or_default();
            if !subs.iter().any(|s| &s.app == app) {
                subs.push(Subscription {
                    app: app.clone(),
                    interval: entry.interval,
                });
            }
        }

        debug!(
            "Subscriptions updated for {}: min interval now {}",
            app,
            self.min_interval()
        );
    }

    /// Subscribers currently registered on a channel, in registration order.
    pub fn subscribers(&self, channel: Channel) -> Vec<SubscriberId> {
        self.channels
            .get(&channel)
            .map(|subs| subs.iter().map(|s| s.app.clone()).collect())
            .unwrap_or_default()
    }

    /// Minimum requested interval across all current subscriptions.
    ///
    /// Metadata only; delivery is not throttled per subscriber. Recomputed
    /// from the live table, so re-registering at a larger interval raises
    /// the minimum back up.
    pub fn min_interval(&self) -> f64 {
        self.channels
            .values()
            .flatten()
            .map(|s| s.interval)
            .fold(DEFAULT_MIN_INTERVAL, f64::min)
    }

    /// Total number of memberships across all channels.
    pub fn len(&self) -> usize {
        self.channels.values().map(Vec::len).sum()
    }

    /// Whether nothing is subscribed at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriptionTable {
    fn default() -> Self {
        Self::new()
    }
}
