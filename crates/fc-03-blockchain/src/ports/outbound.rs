//! # Outbound Ports (Driven Ports)

use shared_types::{Hash, UnlockProof};

/// Evaluates the locking predicate of an output.
///
/// The chain treats locks and proofs as opaque bytes. The verifier alone
/// decides whether `proof` unlocks `lock` for a transaction whose signing
/// message is `message`.
///
/// Production: [`crate::EcdsaScriptVerifier`]
pub trait ScriptVerifier: Send + Sync {
    /// Whether `proof` satisfies `lock` for `message`.
    fn unlock_satisfied(&self, lock: &[u8], proof: &UnlockProof, message: &Hash) -> bool;
}
