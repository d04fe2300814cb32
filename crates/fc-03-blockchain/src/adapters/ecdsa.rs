//! secp256k1 pay-to-key-hash unlocking.
//!
//! - Lock: `sha256(compressed SEC1 public key)`, 32 bytes
//! - Proof: the SEC1 public key and a 64-byte ECDSA signature over the
//!   transaction sighash
//!
//! Uses the k256 crate for the curve operations.

use crate::ports::outbound::ScriptVerifier;
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use shared_types::{sha256, Hash, KeyHash, Transaction, UnlockProof};

/// Verifies ECDSA pay-to-key-hash proofs.
#[derive(Debug, Default, Clone, Copy)]
pub struct EcdsaScriptVerifier;

impl EcdsaScriptVerifier {
    /// Create a verifier.
    pub fn new() -> Self {
        Self
    }
}

impl ScriptVerifier for EcdsaScriptVerifier {
    fn unlock_satisfied(&self, lock: &[u8], proof: &UnlockProof, message: &Hash) -> bool {
        if lock != sha256(&proof.public_key).as_slice() {
            return false;
        }
        let Ok(key) = VerifyingKey::from_sec1_bytes(&proof.public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&proof.signature) else {
            return false;
        };
        key.verify(message, &signature).is_ok()
    }
}

/// Key hash that outputs paying `key` are locked to.
pub fn key_hash_of(key: &VerifyingKey) -> KeyHash {
    sha256(key.to_encoded_point(true).as_bytes())
}

/// Sign every input of `tx` with `key` and refresh its id.
///
/// All inputs share the same signing message, so every input must spend an
/// output locked to `key`.
pub fn sign_transaction(tx: &mut Transaction, key: &SigningKey) {
    let public_key = key.verifying_key().to_encoded_point(true).as_bytes().to_vec();
    let signature: Signature = key.sign(&tx.sighash());
    let signature = signature.to_bytes().to_vec();

    for input in &mut tx.inputs {
        input.proof = UnlockProof {
            signature: signature.clone(),
            public_key: public_key.clone(),
        };
    }
    tx.refresh_id();
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{OutPoint, TxInput, TxOutput};

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_slice(&[seed; 32]).unwrap()
    }

    fn signed_spend(signer: &SigningKey) -> Transaction {
        let mut tx = Transaction::new(
            vec![TxInput::unsigned(OutPoint::new([7; 32], 0))],
            vec![TxOutput::to_key_hash(10, [9; 32])],
        );
        sign_transaction(&mut tx, signer);
        tx
    }

    #[test]
    fn test_signed_input_unlocks_own_output() {
        let alice = key(1);
        let tx = signed_spend(&alice);
        let lock = key_hash_of(alice.verifying_key());

        assert!(EcdsaScriptVerifier.unlock_satisfied(&lock, &tx.inputs[0].proof, &tx.sighash()));
        assert_eq!(tx.id, tx.compute_id());
    }

    #[test]
    fn test_foreign_lock_is_rejected() {
        let tx = signed_spend(&key(1));
        let bob_lock = key_hash_of(key(2).verifying_key());
        assert!(!EcdsaScriptVerifier.unlock_satisfied(&bob_lock, &tx.inputs[0].proof, &tx.sighash()));
    }

    #[test]
    fn test_modified_message_is_rejected() {
        let alice = key(1);
        let mut tx = signed_spend(&alice);
        let lock = key_hash_of(alice.verifying_key());

        tx.outputs[0].value = 11;
        assert!(!EcdsaScriptVerifier.unlock_satisfied(&lock, &tx.inputs[0].proof, &tx.sighash()));
    }

    #[test]
    fn test_garbage_proof_is_rejected() {
        let proof = UnlockProof {
            signature: vec![0; 10],
            public_key: vec![2; 33],
        };
        let lock = sha256(&proof.public_key);
        assert!(!EcdsaScriptVerifier.unlock_satisfied(&lock, &proof, &[0; 32]));
    }
}
