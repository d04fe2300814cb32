//! Adapters for the chain store ports.

pub mod memory;
pub mod serializer;
