//! Chain store domain types.

pub mod errors;
