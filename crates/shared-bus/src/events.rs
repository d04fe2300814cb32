//! # Chain Events
//!
//! Every event that flows through the shared bus.

use shared_types::{Block, Hash, PeerId, Transaction};

/// All events that can be published to the event bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    /// A block mined by this node was appended to the chain.
    NewLocalBlock {
        /// Hash of the mined block.
        hash: Hash,
        /// The mined block.
        block: Block,
    },

    /// A block received from a peer became the new head.
    NewHead {
        /// Hash of the new head.
        hash: Hash,
        /// The new head block.
        block: Block,
    },

    /// A transaction passed verification and may be mined.
    TransactionAccepted {
        /// The verified transaction.
        tx: Transaction,
        /// The peer that relayed it, `None` when submitted locally.
        origin: Option<PeerId>,
    },
}

impl ChainEvent {
    /// The tag of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::NewLocalBlock { .. } => EventKind::NewLocalBlock,
            Self::NewHead { .. } => EventKind::NewHead,
            Self::TransactionAccepted { .. } => EventKind::TransactionAccepted,
        }
    }
}

/// Event tags used for filtering and for the subscription registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// See [`ChainEvent::NewLocalBlock`].
    NewLocalBlock,
    /// See [`ChainEvent::NewHead`].
    NewHead,
    /// See [`ChainEvent::TransactionAccepted`].
    TransactionAccepted,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 3] = [
        EventKind::NewLocalBlock,
        EventKind::NewHead,
        EventKind::TransactionAccepted,
    ];
}

/// Filter for subscribing to specific event kinds. Empty means all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Kinds to receive.
    pub kinds: Vec<EventKind>,
}

impl EventFilter {
    /// Receive every event.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Receive only the listed kinds.
    #[must_use]
    pub fn kinds(kinds: Vec<EventKind>) -> Self {
        Self { kinds }
    }

    /// Check whether an event passes this filter.
    #[must_use]
    pub fn matches(&self, event: &ChainEvent) -> bool {
        self.accepts(event.kind())
    }

    /// Check whether a kind passes this filter.
    #[must_use]
    pub fn accepts(&self, kind: EventKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }

    /// The concrete kinds this filter lets through.
    pub(crate) fn effective_kinds(&self) -> Vec<EventKind> {
        EventKind::ALL
            .into_iter()
            .filter(|kind| self.accepts(*kind))
            .collect()
    }
}
