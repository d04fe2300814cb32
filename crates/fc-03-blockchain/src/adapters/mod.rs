//! Adapters for the blockchain ports.

pub mod ecdsa;
