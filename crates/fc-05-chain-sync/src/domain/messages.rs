//! Typed protocol messages exchanged with peers.

use shared_types::{Block, Hash, Transaction};
use std::fmt;

/// Fixed message codes. The dispatcher routes on these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageCode {
    Status = 0x00,
    GetHashesFromHeight = 0x01,
    Hashes = 0x02,
    GetBlocks = 0x03,
    Blocks = 0x04,
    NewBlock = 0x05,
    Transactions = 0x06,
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:02x})", self, *self as u8)
    }
}

/// Handshake payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub protocol_version: u16,
    pub network_id: u64,
    pub genesis: Hash,
    pub head_hash: Hash,
    pub height: u64,
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Handshake, sent once by each side on connect
    Status(Status),
    /// Ask for up to `count` hashes of heights `[from, from + count)`
    GetHashesFromHeight { from: u64, count: u64 },
    /// Reply to `GetHashesFromHeight`, ascending by height. Empty means nothing to send.
    Hashes(Vec<Hash>),
    /// Ask for the blocks with these hashes
    GetBlocks(Vec<Hash>),
    /// Reply to `GetBlocks`. Unknown hashes are skipped.
    Blocks(Vec<Block>),
    /// Announcement of a freshly mined block
    NewBlock(Block),
    /// Relayed loose transactions
    Transactions(Vec<Transaction>),
}

impl Message {
    /// The routing code of this message.
    pub fn code(&self) -> MessageCode {
        match self {
            Message::Status(_) => MessageCode::Status,
            Message::GetHashesFromHeight { .. } => MessageCode::GetHashesFromHeight,
            Message::Hashes(_) => MessageCode::Hashes,
            Message::GetBlocks(_) => MessageCode::GetBlocks,
            Message::Blocks(_) => MessageCode::Blocks,
            Message::NewBlock(_) => MessageCode::NewBlock,
            Message::Transactions(_) => MessageCode::Transactions,
        }
    }
}
