//! Hexagonal ports of the miner.

pub mod inbound;
