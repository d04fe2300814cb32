//! Hexagonal ports of the blockchain subsystem.

pub mod outbound;
