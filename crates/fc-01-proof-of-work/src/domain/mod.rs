//! Pure proof-of-work logic.

pub mod compact;
pub mod engine;
