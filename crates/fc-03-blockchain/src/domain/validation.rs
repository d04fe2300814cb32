//! Block body rules.
//!
//! Split in two passes so the chain walk happens once per block:
//!
//! 1. [`check_structure`]: rules that need no chain state
//! 2. [`check_inputs`]: input resolution, unlock proofs and value balance,
//!    given the outpoints resolved on the parent's branch

use super::ledger::Resolution;
use crate::error::{ChainError, Result};
use crate::ports::outbound::ScriptVerifier;
use shared_types::{OutPoint, Transaction};
use std::collections::{HashMap, HashSet};

/// Transaction count, coinbase placement and value, and id integrity.
///
/// The coinbase must carry the data for `height`, so coinbase ids never
/// repeat along a branch. Other transactions cannot repeat either: a copy
/// spends the same outpoints and fails input resolution.
pub fn check_structure(txs: &[Transaction], height: u64, max_txs: usize, reward: u64) -> Result<()> {
    if txs.len() > max_txs {
        return Err(ChainError::OversizedBlock {
            count: txs.len(),
            max: max_txs,
        });
    }

    for (index, tx) in txs.iter().enumerate() {
        if tx.id != tx.compute_id() {
            return Err(ChainError::invalid_tx(tx.id, "id does not match content"));
        }

        if tx.is_coinbase() {
            if index != 0 {
                return Err(ChainError::MisplacedCoinbase { index });
            }
            if tx.inputs[0].proof.signature != Transaction::coinbase_data(height) {
                return Err(ChainError::invalid_tx(
                    tx.id,
                    format!("coinbase data does not commit to height {height}"),
                ));
            }
            match tx.total_output() {
                Some(minted) if minted <= reward => {}
                _ => {
                    return Err(ChainError::invalid_tx(
                        tx.id,
                        format!("coinbase mints more than the reward of {reward}"),
                    ))
                }
            }
        } else if tx.inputs.is_empty() {
            return Err(ChainError::invalid_tx(tx.id, "no inputs"));
        }
    }

    Ok(())
}

/// Every outpoint spent by the non-coinbase transactions of a body.
pub fn spent_outpoints(txs: &[Transaction]) -> HashSet<OutPoint> {
    txs.iter()
        .filter(|tx| !tx.is_coinbase())
        .flat_map(|tx| tx.inputs.iter().map(|input| input.prev_out))
        .collect()
}

/// Verify the inputs of every non-coinbase transaction.
///
/// Each input must reference an existing output that is unspent on the branch
/// and not spent earlier in the same body, and its proof must satisfy the
/// output's lock. Inputs must cover outputs.
pub fn check_inputs(
    txs: &[Transaction],
    resolved: &HashMap<OutPoint, Resolution>,
    verifier: &dyn ScriptVerifier,
) -> Result<()> {
    let mut spent_in_body: HashSet<OutPoint> = HashSet::new();

    for tx in txs.iter().filter(|tx| !tx.is_coinbase()) {
        let message = tx.sighash();
        let mut input_total: u64 = 0;

        for input in &tx.inputs {
            let outpoint = input.prev_out;
            if !spent_in_body.insert(outpoint) {
                return Err(ChainError::DoubleSpend {
                    txid: tx.id,
                    outpoint,
                });
            }

            let output = match resolved.get(&outpoint) {
                Some(Resolution::Unspent(output)) => output,
                Some(Resolution::Spent) => {
                    return Err(ChainError::DoubleSpend {
                        txid: tx.id,
                        outpoint,
                    })
                }
                None => {
                    return Err(ChainError::invalid_tx(
                        tx.id,
                        format!("references unknown output {outpoint}"),
                    ))
                }
            };

            if !verifier.unlock_satisfied(&output.lock, &input.proof, &message) {
                return Err(ChainError::invalid_tx(
                    tx.id,
                    format!("unlock proof rejected for {outpoint}"),
                ));
            }

            input_total = input_total
                .checked_add(output.value)
                .ok_or_else(|| ChainError::invalid_tx(tx.id, "input value overflow"))?;
        }

        let output_total = tx
            .total_output()
            .ok_or_else(|| ChainError::invalid_tx(tx.id, "output value overflow"))?;
        if output_total > input_total {
            return Err(ChainError::invalid_tx(
                tx.id,
                format!("outputs {output_total} exceed inputs {input_total}"),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{Hash, TxInput, TxOutput, UnlockProof};

    struct AcceptAll;

    impl ScriptVerifier for AcceptAll {
        fn unlock_satisfied(&self, _: &[u8], _: &UnlockProof, _: &Hash) -> bool {
            true
        }
    }

    struct RejectAll;

    impl ScriptVerifier for RejectAll {
        fn unlock_satisfied(&self, _: &[u8], _: &UnlockProof, _: &Hash) -> bool {
            false
        }
    }

    fn spend(from: OutPoint, value: u64) -> Transaction {
        Transaction::new(
            vec![TxInput::unsigned(from)],
            vec![TxOutput::to_key_hash(value, [2; 32])],
        )
    }

    fn funded(outpoint: OutPoint, value: u64) -> HashMap<OutPoint, Resolution> {
        let mut resolved = HashMap::new();
        resolved.insert(
            outpoint,
            Resolution::Unspent(TxOutput::to_key_hash(value, [1; 32])),
        );
        resolved
    }

    #[test]
    fn test_structure_rejects_second_coinbase() {
        let txs = vec![
            Transaction::coinbase([1; 32], 50, 1),
            Transaction::coinbase([2; 32], 50, 1),
        ];
        assert_eq!(
            check_structure(&txs, 1, 10, 50),
            Err(ChainError::MisplacedCoinbase { index: 1 })
        );
    }

    #[test]
    fn test_structure_rejects_inflated_coinbase() {
        let txs = vec![Transaction::coinbase([1; 32], 51, 1)];
        assert!(matches!(
            check_structure(&txs, 1, 10, 50),
            Err(ChainError::InvalidTransaction { .. })
        ));
    }

    #[test]
    fn test_structure_requires_coinbase_height() {
        let txs = vec![Transaction::coinbase([1; 32], 50, 0)];
        assert!(matches!(
            check_structure(&txs, 4, 10, 50),
            Err(ChainError::InvalidTransaction { .. })
        ));
        assert_eq!(check_structure(&txs, 0, 10, 50), Ok(()));
    }

    #[test]
    fn test_structure_rejects_tampered_id() {
        let mut tx = spend(OutPoint::new([5; 32], 0), 10);
        tx.outputs[0].value = 11;
        assert!(matches!(
            check_structure(&[tx], 1, 10, 50),
            Err(ChainError::InvalidTransaction { .. })
        ));
    }

    #[test]
    fn test_structure_rejects_oversized_block() {
        let txs = vec![Transaction::coinbase([1; 32], 50, 1); 3];
        assert_eq!(
            check_structure(&txs, 1, 2, 50),
            Err(ChainError::OversizedBlock { count: 3, max: 2 })
        );
    }

    #[test]
    fn test_inputs_accept_funded_spend() {
        let source = OutPoint::new([5; 32], 0);
        let txs = vec![spend(source, 40)];
        assert_eq!(check_inputs(&txs, &funded(source, 50), &AcceptAll), Ok(()));
    }

    #[test]
    fn test_inputs_reject_intra_block_double_spend() {
        let source = OutPoint::new([5; 32], 0);
        let first = spend(source, 10);
        let second = spend(source, 20);
        let err = check_inputs(&[first, second.clone()], &funded(source, 50), &AcceptAll);
        assert_eq!(
            err,
            Err(ChainError::DoubleSpend {
                txid: second.id,
                outpoint: source
            })
        );
    }

    #[test]
    fn test_inputs_reject_spent_and_unknown() {
        let source = OutPoint::new([5; 32], 0);
        let mut resolved = HashMap::new();
        resolved.insert(source, Resolution::Spent);

        assert!(matches!(
            check_inputs(&[spend(source, 1)], &resolved, &AcceptAll),
            Err(ChainError::DoubleSpend { .. })
        ));
        assert!(matches!(
            check_inputs(&[spend(source, 1)], &HashMap::new(), &AcceptAll),
            Err(ChainError::InvalidTransaction { .. })
        ));
    }

    #[test]
    fn test_inputs_reject_bad_proof_and_overspend() {
        let source = OutPoint::new([5; 32], 0);
        assert!(check_inputs(&[spend(source, 10)], &funded(source, 50), &RejectAll).is_err());
        assert!(check_inputs(&[spend(source, 60)], &funded(source, 50), &AcceptAll).is_err());
    }
}
