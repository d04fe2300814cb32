//! # Adapter Implementations
//!
//! Concrete engines behind the subsystems' outbound ports.

pub mod storage;

pub use storage::open_store;
