//! Pure chain logic: ledger walks and block body rules.

pub mod ledger;
pub mod validation;
