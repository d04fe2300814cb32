//! Error types for chain synchronization

use crate::domain::messages::MessageCode;
use fc_03_blockchain::{BatchInsertError, ChainError};
use shared_types::{short_hex, Hash, PeerId};
use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Failures of a peer transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The remote end went away
    #[error("Peer disconnected")]
    Disconnected,

    /// This end was closed locally
    #[error("Transport closed")]
    Closed,
}

/// Errors of the sync handler.
///
/// Everything up to `Malformed` is fatal for the connection only.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Protocol version mismatch: ours {ours}, theirs {theirs}")]
    ProtocolMismatch { ours: u16, theirs: u16 },

    #[error("Network id mismatch: ours {ours}, theirs {theirs}")]
    NetworkMismatch { ours: u64, theirs: u64 },

    #[error("Genesis mismatch: ours {}, theirs {}", short_hex(.ours), short_hex(.theirs))]
    GenesisMismatch { ours: Hash, theirs: Hash },

    #[error("Handshake timed out")]
    HandshakeTimeout,

    #[error("Peer {0} is already connected")]
    DuplicatePeer(PeerId),

    #[error("Unexpected {code} message")]
    UnexpectedMessage { code: MessageCode },

    #[error("Malformed message from {peer}: {reason}")]
    Malformed { peer: PeerId, reason: String },

    #[error("No {code} reply from {peer} in time")]
    ResponseTimeout { peer: PeerId, code: MessageCode },

    #[error("Peer {0} is not connected")]
    UnknownPeer(PeerId),

    #[error("Sync handler already started")]
    AlreadyStarted,

    #[error("Blocking task failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Batch(#[from] BatchInsertError),
}

impl SyncError {
    /// Whether the error ends the connection with the peer.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_)
                | SyncError::ProtocolMismatch { .. }
                | SyncError::NetworkMismatch { .. }
                | SyncError::GenesisMismatch { .. }
                | SyncError::HandshakeTimeout
                | SyncError::DuplicatePeer(_)
                | SyncError::UnexpectedMessage { .. }
                | SyncError::Malformed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_fatal_classification() {
        assert!(SyncError::HandshakeTimeout.is_connection_fatal());
        assert!(SyncError::from(TransportError::Disconnected).is_connection_fatal());
        assert!(!SyncError::from(ChainError::Interrupted).is_connection_fatal());
        assert!(!SyncError::UnknownPeer(PeerId::default()).is_connection_fatal());
    }

    #[test]
    fn test_genesis_mismatch_message_uses_short_hashes() {
        let err = SyncError::GenesisMismatch {
            ours: [0xaa; 32],
            theirs: [0xbb; 32],
        };
        assert_eq!(
            err.to_string(),
            "Genesis mismatch: ours aaaaaaaaaaaaaaaa, theirs bbbbbbbbbbbbbbbb"
        );
    }
}
