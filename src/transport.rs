use dashmap::DashMap;
use tokio::sync::{broadcast, oneshot};
use uuid::Uuid;

use crate::models::event::Event;

/// A logical publish/subscribe destination. One channel per trip, per
/// driver and per rider; `Observers` receives a copy of every publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    Trip(Uuid),
    Driver(Uuid),
    Rider(Uuid),
    Observers,
}

/// Channel-based transport plus the correlation map for pending trip
/// offers. A pending offer is keyed by (trip_id, driver_id) and resolved
/// or removed by key, so concurrent dispatch runs for different trips and
/// drivers cannot cross-talk.
pub struct ChannelHub {
    channels: DashMap<ChannelId, broadcast::Sender<Event>>,
    pending_offers: DashMap<(Uuid, Uuid), oneshot::Sender<bool>>,
    buffer_size: usize,
}

impl ChannelHub {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            channels: DashMap::new(),
            pending_offers: DashMap::new(),
            buffer_size,
        }
    }

    /// Subscribes to a channel, creating it on first use. Joining an
    /// already-joined channel just hands out another receiver.
    pub fn subscribe(&self, channel: ChannelId) -> broadcast::Receiver<Event> {
        self.channels
            .entry(channel)
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .subscribe()
    }

    /// Fire-and-forget publish. Returns how many receivers the event
    /// reached on the target channel; callers that need a delivery check
    /// (cancellation notices) inspect the count, everyone else ignores it.
    /// A channel whose last receiver is gone is dropped on the way out, so
    /// finished trips and departed clients do not accumulate senders.
    pub fn publish(&self, channel: ChannelId, event: Event) -> usize {
        if channel != ChannelId::Observers {
            let observers_gone = self
                .channels
                .get(&ChannelId::Observers)
                .map(|observers| observers.send(event.clone()).is_err())
                .unwrap_or(false);
            if observers_gone {
                self.reap(ChannelId::Observers);
            }
        }

        let reached = self
            .channels
            .get(&channel)
            .map(|tx| tx.send(event).unwrap_or(0))
            .unwrap_or(0);
        if reached == 0 {
            self.reap(channel);
        }
        reached
    }

    /// Removes the channel if nobody is subscribed anymore. Checked under
    /// the entry lock, so a racing subscribe keeps the entry alive.
    fn reap(&self, channel: ChannelId) {
        self.channels
            .remove_if(&channel, |_, tx| tx.receiver_count() == 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Registers a pending offer wait. A previous wait for the same key is
    /// displaced; its receiver resolves as dropped.
    pub fn register_offer(&self, trip_id: Uuid, driver_id: Uuid) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.pending_offers.insert((trip_id, driver_id), tx);
        rx
    }

    /// Resolves the wait matching both trip id and driver id. Returns false
    /// when no such wait exists (late or unsolicited response).
    pub fn resolve_offer(&self, trip_id: Uuid, driver_id: Uuid, accepted: bool) -> bool {
        match self.pending_offers.remove(&(trip_id, driver_id)) {
            Some((_, tx)) => tx.send(accepted).is_ok(),
            None => false,
        }
    }

    /// Deregisters a wait whose timeout elapsed first.
    pub fn cancel_offer(&self, trip_id: Uuid, driver_id: Uuid) {
        self.pending_offers.remove(&(trip_id, driver_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub() -> ChannelHub {
        ChannelHub::new(16)
    }

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let hub = hub();
        let trip_id = Uuid::new_v4();
        let mut rx = hub.subscribe(ChannelId::Trip(trip_id));

        let reached = hub.publish(
            ChannelId::Trip(trip_id),
            Event::NoDriversAvailable { trip_id },
        );
        assert_eq!(reached, 1);

        match rx.recv().await {
            Ok(Event::NoDriversAvailable { trip_id: id }) => assert_eq!(id, trip_id),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_reaches_nobody() {
        let hub = hub();
        let trip_id = Uuid::new_v4();
        let reached = hub.publish(
            ChannelId::Trip(trip_id),
            Event::NoDriversAvailable { trip_id },
        );
        assert_eq!(reached, 0);
    }

    #[tokio::test]
    async fn observers_receive_every_publish() {
        let hub = hub();
        let mut observers = hub.subscribe(ChannelId::Observers);
        let trip_id = Uuid::new_v4();

        hub.publish(
            ChannelId::Rider(Uuid::new_v4()),
            Event::NoDriversAvailable { trip_id },
        );

        assert!(matches!(
            observers.recv().await,
            Ok(Event::NoDriversAvailable { .. })
        ));
    }

    #[tokio::test]
    async fn offer_resolves_by_correlation_key() {
        let hub = hub();
        let trip_id = Uuid::new_v4();
        let driver_id = Uuid::new_v4();

        let rx = hub.register_offer(trip_id, driver_id);

        // A response for a different driver must not consume the wait.
        assert!(!hub.resolve_offer(trip_id, Uuid::new_v4(), true));
        assert!(hub.resolve_offer(trip_id, driver_id, true));
        assert_eq!(rx.await, Ok(true));
        // The wait is consumed; a duplicate response finds nothing.
        assert!(!hub.resolve_offer(trip_id, driver_id, true));
    }

    #[tokio::test]
    async fn abandoned_channels_are_reaped_on_publish() {
        let hub = hub();
        let trip_id = Uuid::new_v4();
        let rx = hub.subscribe(ChannelId::Trip(trip_id));
        assert_eq!(hub.channel_count(), 1);

        drop(rx);
        let reached = hub.publish(
            ChannelId::Trip(trip_id),
            Event::NoDriversAvailable { trip_id },
        );

        assert_eq!(reached, 0);
        assert_eq!(hub.channel_count(), 0);
    }

    #[tokio::test]
    async fn live_channels_survive_a_publish() {
        let hub = hub();
        let trip_id = Uuid::new_v4();
        let _rx = hub.subscribe(ChannelId::Trip(trip_id));

        hub.publish(
            ChannelId::Trip(trip_id),
            Event::NoDriversAvailable { trip_id },
        );
        assert_eq!(hub.channel_count(), 1);
    }

    #[tokio::test]
    async fn late_response_after_cancel_is_ignored() {
        let hub = hub();
        let trip_id = Uuid::new_v4();
        let driver_id = Uuid::new_v4();

        let _rx = hub.register_offer(trip_id, driver_id);
        hub.cancel_offer(trip_id, driver_id);

        assert!(!hub.resolve_offer(trip_id, driver_id, true));
    }
}
