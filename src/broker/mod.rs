//! Per-topic publish/subscribe broker.
//!
//! The broker maps a topic (a form id) to the channels of the observers
//! currently watching it. Every channel holds at most one pending payload
//! and publishing never waits: when a subscriber has not yet consumed its
//! previous payload, the new one is dropped for that subscriber only.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

/// A serialized message handed to subscribers.
pub type Payload = Arc<str>;

/// Pending payloads a subscriber channel can hold.
const SLOT_CAPACITY: usize = 1;

/// Process-unique identifier of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Subscribers = HashMap<SubscriberId, mpsc::Sender<Payload>>;

#[derive(Default)]
struct Registry {
    topics: RwLock<HashMap<String, Subscribers>>,
    next_id: AtomicU64,
}

/// Shared handle to the topic registry.
///
/// Cloning is cheap; all clones see the same registry.
#[derive(Clone, Default)]
pub struct Broker {
    registry: Arc<Registry>,
}

impl Broker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new single-slot channel under `topic`.
    pub fn subscribe(&self, topic: &str) -> Subscription {
        let id = SubscriberId(self.registry.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(SLOT_CAPACITY);

        self.registry
            .topics
            .write()
            .entry(topic.to_string())
            .or_default()
            .insert(id, tx);

        debug!(topic, subscriber = %id, "Subscribed");

        Subscription {
            topic: topic.to_string(),
            id,
            rx,
            broker: self.clone(),
        }
    }

    /// Remove a subscriber from `topic`.
    ///
    /// Drops the topic entry once its last subscriber is gone. Returns
    /// `false` if the subscriber was not registered, which leaves the
    /// registry untouched.
    pub fn unsubscribe(&self, topic: &str, id: SubscriberId) -> bool {
        let removed = {
            let mut topics = self.registry.topics.write();
            let Some(subscribers) = topics.get_mut(topic) else {
                return false;
            };
            let removed = subscribers.remove(&id);
            if subscribers.is_empty() {
                topics.remove(topic);
            }
            removed
        };

        // The sender is the registry's only handle; dropping it here releases the channel.
        match removed {
            Some(_sender) => {
                debug!(topic, subscriber = %id, "Unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Offer `payload` to every subscriber of `topic` without blocking.
    ///
    /// Subscribers whose slot is still occupied miss this payload.
    pub fn broadcast(&self, topic: &str, payload: impl Into<Payload>) {
        let senders: Vec<(SubscriberId, mpsc::Sender<Payload>)> = {
            let topics = self.registry.topics.read();
            match topics.get(topic) {
                Some(subscribers) => subscribers
                    .iter()
                    .map(|(id, tx)| (*id, tx.clone()))
                    .collect(),
                None => return,
            }
        };

        let payload = payload.into();
        let mut delivered = 0usize;
        let mut dropped = 0usize;

        for (id, tx) in senders {
            match tx.try_send(Arc::clone(&payload)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    trace!(topic, subscriber = %id, "Slot occupied, dropping payload");
                }
                // Receiver is mid-teardown
                Err(TrySendError::Closed(_)) => {}
            }
        }

        debug!(topic, delivered, dropped, "Broadcast");
    }

    /// Number of topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.registry.topics.read().len()
    }

    /// Number of subscribers currently registered under `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.registry
            .topics
            .read()
            .get(topic)
            .map_or(0, |subscribers| subscribers.len())
    }

    /// Total subscribers across all topics.
    pub fn total_subscribers(&self) -> usize {
        self.registry.topics.read().values().map(|s| s.len()).sum()
    }

    /// Release every channel, ending all open subscriptions.
    ///
    /// Returns the number of subscribers that were registered.
    pub fn close_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.registry.topics.write());
        let count = drained.values().map(|s| s.len()).sum();
        drop(drained);
        debug!(subscribers = count, "Closed all subscriptions");
        count
    }
}

/// The receiving side of one registration.
///
/// Dropping it unregisters the channel, so a subscription never outlives
/// the connection that owns it.
pub struct Subscription {
    topic: String,
    id: SubscriberId,
    rx: mpsc::Receiver<Payload>,
    broker: Broker,
}

impl Subscription {
    /// Identifier of this registration.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Topic this subscription listens on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next payload.
    ///
    /// Returns `None` once the broker released the channel.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }

    /// Take the pending payload, if any, without waiting.
    #[cfg(test)]
    pub fn try_recv(&mut self) -> Option<Payload> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broker.unsubscribe(&self.topic, self.id);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    fn payload(s: &str) -> Option<Payload> {
        Some(Payload::from(s))
    }

    #[test]
    fn test_subscribe_twice_gives_independent_copies() {
        let broker = Broker::new();
        let mut first = broker.subscribe("form-a");
        let mut second = broker.subscribe("form-a");

        assert_ne!(first.id(), second.id());
        assert_eq!(broker.subscriber_count("form-a"), 2);

        broker.broadcast("form-a", "snapshot-1");
        assert_eq!(first.try_recv(), payload("snapshot-1"));
        assert_eq!(second.try_recv(), payload("snapshot-1"));

        broker.broadcast("form-a", "snapshot-2");
        assert_eq!(first.try_recv(), payload("snapshot-2"));
        assert_eq!(second.try_recv(), payload("snapshot-2"));
    }

    #[test]
    fn test_full_slot_drops_only_for_that_subscriber() {
        let broker = Broker::new();
        let mut slow = broker.subscribe("form-a");
        let mut fast = broker.subscribe("form-a");

        broker.broadcast("form-a", "first");
        assert_eq!(fast.try_recv(), payload("first"));

        // `slow` still holds "first", so "second" is dropped for it
        broker.broadcast("form-a", "second");
        assert_eq!(fast.try_recv(), payload("second"));

        assert_eq!(slow.try_recv(), payload("first"));
        assert_eq!(slow.try_recv(), None);
    }

    #[test]
    fn test_subscriber_sees_ordered_subsequence() {
        let broker = Broker::new();
        let mut sub = broker.subscribe("t");
        let mut seen = Vec::new();

        for i in 0..10 {
            broker.broadcast("t", format!("{}", i));
            if i % 3 == 0 {
                if let Some(p) = sub.try_recv() {
                    seen.push(p.parse::<u32>().unwrap());
                }
            }
        }
        while let Some(p) = sub.try_recv() {
            seen.push(p.parse::<u32>().unwrap());
        }

        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_broadcast_without_subscribers_is_noop() {
        let broker = Broker::new();
        broker.broadcast("nobody", "payload");
        assert_eq!(broker.topic_count(), 0);
    }

    #[test]
    fn test_topics_are_isolated() {
        let broker = Broker::new();
        let mut a = broker.subscribe("a");
        let mut b = broker.subscribe("b");

        broker.broadcast("a", "for-a");

        assert_eq!(a.try_recv(), payload("for-a"));
        assert_eq!(b.try_recv(), None);
    }

    #[test]
    fn test_unsubscribe_removes_channel_and_empty_topic() {
        let broker = Broker::new();
        let first = broker.subscribe("form-a");
        let mut second = broker.subscribe("form-a");
        let first_id = first.id();

        assert!(broker.unsubscribe("form-a", first_id));
        assert_eq!(broker.subscriber_count("form-a"), 1);

        broker.broadcast("form-a", "after");
        assert_eq!(second.try_recv(), payload("after"));

        drop(second);
        assert_eq!(broker.subscriber_count("form-a"), 0);
        assert_eq!(broker.topic_count(), 0);

        // Dropping the already-unsubscribed handle must not disturb anything.
        drop(first);
        assert_eq!(broker.topic_count(), 0);
    }

    #[test]
    fn test_unsubscribe_unknown_is_noop() {
        let broker = Broker::new();
        let sub = broker.subscribe("form-a");

        assert!(!broker.unsubscribe("form-a", SubscriberId(u64::MAX)));
        assert!(!broker.unsubscribe("form-b", sub.id()));
        assert_eq!(broker.subscriber_count("form-a"), 1);

        assert!(broker.unsubscribe("form-a", sub.id()));
        assert!(!broker.unsubscribe("form-a", sub.id()));
    }

    #[test]
    fn test_unsubscribed_channel_gets_nothing() {
        let broker = Broker::new();
        let mut sub = broker.subscribe("form-a");

        broker.unsubscribe("form-a", sub.id());
        broker.broadcast("form-a", "late");

        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_recv_waits_for_broadcast() {
        let broker = Broker::new();
        let mut sub = broker.subscribe("form-a");

        {
            let mut recv = task::spawn(sub.recv());
            assert_pending!(recv.poll());

            broker.broadcast("form-a", "live");
            assert!(recv.is_woken());
            assert_ready_eq!(recv.poll(), payload("live"));
        }

        let mut recv = task::spawn(sub.recv());
        assert_pending!(recv.poll());
    }

    #[test]
    fn test_close_all_ends_subscriptions() {
        let broker = Broker::new();
        let mut a = broker.subscribe("a");
        let _b = broker.subscribe("b");

        assert_eq!(broker.total_subscribers(), 2);
        assert_eq!(broker.close_all(), 2);
        assert_eq!(broker.topic_count(), 0);

        let mut recv = task::spawn(a.recv());
        assert_ready_eq!(recv.poll(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_churn_leaves_no_topics() {
        let broker = Broker::new();
        let mut handles = Vec::new();

        for worker in 0..16 {
            let broker = broker.clone();
            handles.push(tokio::spawn(async move {
                let topic = format!("form-{}", worker % 4);
                for round in 0..50 {
                    let mut sub = broker.subscribe(&topic);
                    broker.broadcast(&topic, format!("{}-{}", worker, round));
                    let _ = sub.try_recv();
                    tokio::task::yield_now().await;
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(broker.topic_count(), 0);
        assert_eq!(broker.total_subscribers(), 0);
    }
}
