//! # Event Subscriber
//!
//! Defines the subscription side of the event bus.

use crate::events::{ChainEvent, EventFilter, EventKind};
use crate::publisher::BusSignal;
use std::pin::pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The event bus was closed.
    #[error("Event bus closed")]
    Closed,
}

/// A subscription handle for receiving events.
///
/// Holds one receiver per subscribed kind. Events of one kind arrive in
/// publish order; kinds are interleaved round-robin.
///
/// When dropped, the subscription is removed from the bus registry.
pub struct Subscription {
    receivers: Vec<(EventKind, broadcast::Receiver<ChainEvent>)>,
    filter: EventFilter,
    signal: Arc<BusSignal>,
    /// Receiver polled first on the next call.
    cursor: usize,
}

impl Subscription {
    pub(crate) fn new(
        receivers: Vec<(EventKind, broadcast::Receiver<ChainEvent>)>,
        filter: EventFilter,
        signal: Arc<BusSignal>,
    ) -> Self {
        Self {
            receivers,
            filter,
            signal,
            cursor: 0,
        }
    }

    /// Receive the next event that matches the filter.
    ///
    /// Returns `None` once the bus has been dropped and every buffered event
    /// was delivered.
    pub async fn recv(&mut self) -> Option<ChainEvent> {
        let signal = Arc::clone(&self.signal);
        loop {
            // Register for the wakeup before polling so a publish in between
            // is not missed
            let mut notified = pin!(signal.notify.notified());
            notified.as_mut().enable();

            match self.try_recv() {
                Ok(Some(event)) => return Some(event),
                Ok(None) if signal.closed.load(Ordering::SeqCst) => return None,
                Ok(None) => notified.await,
                Err(SubscriptionError::Closed) => return None,
            }
        }
    }

    /// Try to receive the next event without blocking.
    ///
    /// - `Ok(Some(event))` - An event was available and matched
    /// - `Ok(None)` - No event available
    /// - `Err(SubscriptionError::Closed)` - The bus was dropped
    pub fn try_recv(&mut self) -> Result<Option<ChainEvent>, SubscriptionError> {
        let count = self.receivers.len();
        let mut closed = 0;

        for step in 0..count {
            let index = (self.cursor + step) % count;
            let (kind, receiver) = &mut self.receivers[index];

            loop {
                match receiver.try_recv() {
                    Ok(event) => {
                        self.cursor = (index + 1) % count;
                        return Ok(Some(event));
                    }
                    Err(TryRecvError::Lagged(missed)) => {
                        warn!(kind = ?kind, missed, "Subscriber lagged, oldest events dropped");
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Closed) => {
                        closed += 1;
                        break;
                    }
                }
            }
        }

        if count > 0 && closed == count {
            return Err(SubscriptionError::Closed);
        }
        Ok(None)
    }

    /// Get the filter for this subscription.
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.signal.live.fetch_sub(1, Ordering::SeqCst);
        let kinds: Vec<EventKind> = self.receivers.iter().map(|(kind, _)| *kind).collect();
        debug!(kinds = ?kinds, "Subscription dropped");
    }
}
