//! Hexagonal ports of the chain store.

pub mod outbound;
