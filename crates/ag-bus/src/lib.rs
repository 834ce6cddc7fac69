//! Fan-out distribution of normalized file events.
//!
//! # Overview
//!
//! [`EventBus`] delivers every published [`FileEvent`] to every live
//! [`Subscription`], in publish order, without replay. Each subscriber owns a
//! bounded tokio mpsc queue; `publish` never blocks the watcher thread.
//!
//! ```text
//!                    ┌──► Subscription (queue, cap N) ──► consumer A
//! publish(&event) ───┼──► Subscription (queue, cap N) ──► consumer B
//!                    └──► Subscription (queue, cap N) ──► consumer C
//! ```
//!
//! # Backpressure
//!
//! A subscriber whose queue is full misses the event; the drop is logged
//! and counted in [`BusStats::dropped`]. A subscriber whose receiver has been
//! dropped is pruned on the next publish.
//!
//! # Usage
//!
//! ```no_run
//! use ag_bus::EventBus;
//! use ag_core::{BusConfig, FileEvent};
//!
//! # async fn example() {
//! let bus = EventBus::new(&BusConfig::default());
//! let mut subscription = bus.subscribe();
//!
//! bus.publish(&FileEvent::added("/srv/assets/a.png", false));
//!
//! while let Some(event) = subscription.recv().await {
//!     println!("{:?} {}", event.kind, event.path);
//! }
//! # }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use ag_core::{BusConfig, FileEvent};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, trace, warn};

/// Identifier of one subscription, unique per bus.
pub type SubscriberId = u64;

struct Slot {
    id: SubscriberId,
    tx: mpsc::Sender<FileEvent>,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

struct BusInner {
    subscribers: Mutex<Vec<Slot>>,
    next_id: AtomicU64,
    capacity: usize,
    counters: Counters,
}

impl BusInner {
    fn remove(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|slot| slot.id != id);
        before != subscribers.len()
    }
}

/// Point-in-time bus counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    /// Events handed to [`EventBus::publish`].
    pub published: u64,
    /// Per-subscriber deliveries that were enqueued.
    pub delivered: u64,
    /// Per-subscriber deliveries lost to a full queue.
    pub dropped: u64,
    /// Subscribers currently registered.
    pub subscribers: usize,
}

/// A cloneable handle to a shared subscriber list.
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.inner.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(&BusConfig::default())
    }
}

impl EventBus {
    /// Creates a bus whose subscribers each get a queue of
    /// `config.subscriber_capacity` events (at least one).
    #[must_use]
    pub fn new(config: &BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                capacity: config.subscriber_capacity.max(1),
                counters: Counters::default(),
            }),
        }
    }

    /// Registers a new subscriber.
    ///
    /// The subscription sees only events published after this call returns.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        self.inner.subscribers.lock().push(Slot { id, tx });
        debug!(subscriber = id, "Subscriber registered");

        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Removes a subscriber by id. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.inner.remove(id);
        if removed {
            debug!(subscriber = id, "Subscriber removed");
        }
        removed
    }

    /// Delivers `event` to every registered subscriber, in registration
    /// order. Returns the number of subscribers it was enqueued for.
    ///
    /// Never blocks on a slow consumer.
    pub fn publish(&self, event: &FileEvent) -> usize {
        let counters = &self.inner.counters;
        counters.published.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        self.inner.subscribers.lock().retain(|slot| {
            match slot.tx.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    counters.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(subscriber = slot.id, path = %event.path, "Subscriber queue full, dropping event");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscriber = slot.id, "Pruning closed subscriber");
                    false
                }
            }
        });

        counters
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        trace!(kind = event.kind.label(), path = %event.path, delivered, "Published event");
        delivered
    }

    /// Returns the number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Returns a snapshot of the bus counters.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        let counters = &self.inner.counters;
        BusStats {
            published: counters.published.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            subscribers: self.subscriber_count(),
        }
    }
}

/// The receiving end of one bus registration.
///
/// Dropping the subscription unregisters it.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<FileEvent>,
    bus: Weak<BusInner>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("queued", &self.rx.len())
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Returns this subscription's id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Receives the next event.
    ///
    /// Returns `None` once the bus is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<FileEvent> {
        self.rx.recv().await
    }

    /// Receives an event without waiting.
    pub fn try_recv(&mut self) -> Result<FileEvent, TryRecvError> {
        self.rx.try_recv()
    }

    /// Receives the next event from synchronous code.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context, as
    /// [`mpsc::Receiver::blocking_recv`] does.
    pub fn blocking_recv(&mut self) -> Option<FileEvent> {
        self.rx.blocking_recv()
    }

    /// Unregisters explicitly. Equivalent to dropping the subscription.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            if bus.remove(self.id) {
                debug!(subscriber = self.id, "Subscription dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn bus_with_capacity(subscriber_capacity: usize) -> EventBus {
        EventBus::new(&BusConfig {
            subscriber_capacity,
        })
    }

    #[test]
    fn test_every_subscriber_sees_events_in_order() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(&FileEvent::added("/r/a", false));
        bus.publish(&FileEvent::removed("/r/a", false));

        for sub in [&mut first, &mut second] {
            assert_eq!(sub.try_recv().unwrap(), FileEvent::added("/r/a", false));
            assert_eq!(sub.try_recv().unwrap(), FileEvent::removed("/r/a", false));
            assert!(matches!(sub.try_recv(), Err(TryRecvError::Empty)));
        }
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let bus = EventBus::default();
        bus.publish(&FileEvent::added("/r/early", false));

        let mut late = bus.subscribe();
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(&FileEvent::added("/r/a", false)), 0);
        assert_eq!(bus.stats().published, 1);
    }

    #[test]
    fn test_full_queue_drops_for_that_subscriber_only() {
        let bus = bus_with_capacity(1);
        let mut slow = bus.subscribe();
        let mut fast = bus.subscribe();

        assert_eq!(bus.publish(&FileEvent::added("/r/1", false)), 2);
        fast.try_recv().unwrap();
        assert_eq!(bus.publish(&FileEvent::added("/r/2", false)), 1);

        assert_eq!(slow.try_recv().unwrap().path.as_str(), "/r/1");
        assert!(slow.try_recv().is_err());
        assert_eq!(fast.try_recv().unwrap().path.as_str(), "/r/2");

        let stats = bus.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.delivered, 3);
        assert_eq!(stats.subscribers, 2);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::default();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(&FileEvent::added("/r/a", false)), 0);
    }

    #[test]
    fn test_explicit_unsubscribe() {
        let bus = EventBus::default();
        let sub = bus.subscribe();
        let id = sub.id();
        sub.unsubscribe();
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe_by_id_closes_queue() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();
        assert!(bus.unsubscribe(sub.id()));
        assert!(matches!(sub.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[test]
    fn test_subscription_outlives_bus() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();
        bus.publish(&FileEvent::added("/r/a", false));
        drop(bus);

        assert!(sub.try_recv().is_ok());
        assert!(matches!(sub.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[test]
    fn test_ids_are_unique() {
        let bus = EventBus::default();
        let a = bus.subscribe();
        let b = bus.subscribe();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_blocking_recv_from_thread() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();
        let publisher = bus.clone();

        let handle = std::thread::spawn(move || {
            publisher.publish(&FileEvent::modified("/r/m", false));
        });
        let event = sub.blocking_recv();
        handle.join().unwrap();

        assert_eq!(event, Some(FileEvent::modified("/r/m", false)));
    }

    #[tokio::test]
    async fn test_async_recv() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();
        let publisher = bus.clone();

        tokio::spawn(async move {
            publisher.publish(&FileEvent::renamed("/r/a", "/r/b", false));
        });

        let event = tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("timed out waiting for event");
        assert_eq!(event, Some(FileEvent::renamed("/r/a", "/r/b", false)));
    }

    #[test]
    fn test_stats_serialize() {
        let stats = BusStats {
            published: 3,
            delivered: 5,
            dropped: 1,
            subscribers: 2,
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert_eq!(
            json,
            r#"{"published":3,"delivered":5,"dropped":1,"subscribers":2}"#
        );
    }
}
