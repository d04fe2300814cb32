//! # Event Publisher
//!
//! Defines the publishing side of the event bus.
//!
//! The registry keeps one broadcast ring per [`EventKind`]. A burst of one
//! kind can only make subscribers of that kind lag; it never pushes other
//! kinds out of a subscriber's buffer.

use crate::events::{ChainEvent, EventFilter, EventKind};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, trace};

/// Trait for publishing events to the bus.
///
/// Publishing never blocks, so it is safe to call while holding a chain lock
/// or from inside a blocking task.
pub trait EventPublisher: Send + Sync {
    /// Publish an event to the bus.
    ///
    /// Returns the number of active subscribers that received the event.
    fn publish(&self, event: ChainEvent) -> usize;

    /// Get the total number of events published.
    fn events_published(&self) -> u64;
}

/// State shared between the bus and its subscriptions.
#[derive(Default)]
pub(crate) struct BusSignal {
    /// Woken after every publish and when the bus is dropped.
    pub(crate) notify: Notify,
    /// Set once the bus is gone.
    pub(crate) closed: AtomicBool,
    /// Live subscriptions.
    pub(crate) live: AtomicUsize,
}

/// In-memory implementation of the event bus.
///
/// Uses `tokio::sync::broadcast` for multi-producer, multi-consumer semantics,
/// with a separate channel per event kind.
pub struct InMemoryEventBus {
    /// Subscription registry keyed by event kind.
    senders: HashMap<EventKind, broadcast::Sender<ChainEvent>>,

    signal: Arc<BusSignal>,

    /// Total events published.
    events_published: AtomicU64,

    /// Per-kind channel capacity.
    capacity: usize,
}

impl InMemoryEventBus {
    /// Create a new in-memory event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory event bus buffering `capacity` events per kind.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let senders = EventKind::ALL
            .into_iter()
            .map(|kind| (kind, broadcast::channel(capacity).0))
            .collect();
        Self {
            senders,
            signal: Arc::new(BusSignal::default()),
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to events matching a filter.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let kinds = filter.effective_kinds();
        let receivers = kinds
            .iter()
            .filter_map(|kind| self.senders.get(kind).map(|tx| (*kind, tx.subscribe())))
            .collect();

        self.signal.live.fetch_add(1, Ordering::SeqCst);
        debug!(kinds = ?kinds, "New subscription created");

        Subscription::new(receivers, filter, self.signal.clone())
    }

    /// Number of live subscriptions interested in `kind`.
    #[must_use]
    pub fn subscribers_for(&self, kind: EventKind) -> usize {
        self.senders.get(&kind).map_or(0, |tx| tx.receiver_count())
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.signal.live.load(Ordering::SeqCst)
    }

    /// Get the per-kind channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InMemoryEventBus {
    fn drop(&mut self) {
        self.signal.closed.store(true, Ordering::SeqCst);
        self.signal.notify.notify_waiters();
    }
}

impl EventPublisher for InMemoryEventBus {
    fn publish(&self, event: ChainEvent) -> usize {
        let kind = event.kind();
        self.events_published.fetch_add(1, Ordering::Relaxed);

        let Some(sender) = self.senders.get(&kind) else {
            return 0;
        };
        match sender.send(event) {
            Ok(receivers) => {
                debug!(kind = ?kind, receivers, "Event published");
                self.signal.notify.notify_waiters();
                receivers
            }
            Err(_) => {
                trace!(kind = ?kind, "Event dropped (no interested subscribers)");
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
