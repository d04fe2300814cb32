//! UTXO derivation by walking blocks from newest to oldest.
//!
//! There is no materialized UTXO index. Every query walks the chain backward,
//! recording outpoints consumed by inputs before looking at the outputs of
//! the same block. An output created by a block is therefore only reported
//! unspent when no newer block on the walked branch spends it.

use shared_types::{Block, Hash, KeyHash, OutPoint, TxOutput, Utxo};
use std::collections::{HashMap, HashSet};

/// State of an outpoint on a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The output exists and nothing on the branch spends it.
    Unspent(TxOutput),
    /// The output exists but a later input already consumes it.
    Spent,
}

/// Resolve `wanted` outpoints against a newest-first walk of blocks.
///
/// The walk stops as soon as every wanted transaction has been found.
/// Outpoints missing from the result do not exist on the branch.
pub fn resolve_outpoints<I, E>(
    blocks: I,
    wanted: &HashSet<OutPoint>,
) -> Result<HashMap<OutPoint, Resolution>, E>
where
    I: IntoIterator<Item = Result<Block, E>>,
{
    let mut by_txid: HashMap<Hash, Vec<i64>> = HashMap::new();
    for outpoint in wanted {
        by_txid.entry(outpoint.txid).or_default().push(outpoint.index);
    }

    let mut spent: HashSet<OutPoint> = HashSet::new();
    let mut resolved = HashMap::with_capacity(wanted.len());

    for block in blocks {
        if by_txid.is_empty() {
            break;
        }
        let block = block?;

        for tx in block.transactions.iter().filter(|tx| !tx.is_coinbase()) {
            for input in &tx.inputs {
                if wanted.contains(&input.prev_out) {
                    spent.insert(input.prev_out);
                }
            }
        }

        for tx in &block.transactions {
            let Some(indices) = by_txid.remove(&tx.id) else {
                continue;
            };
            for index in indices {
                let outpoint = OutPoint::new(tx.id, index);
                let Some(output) = usize::try_from(index).ok().and_then(|i| tx.outputs.get(i)) else {
                    continue;
                };
                let state = if spent.contains(&outpoint) {
                    Resolution::Spent
                } else {
                    Resolution::Unspent(output.clone())
                };
                resolved.insert(outpoint, state);
            }
        }
    }

    Ok(resolved)
}

/// Collect unspent outputs locked to `key` from a newest-first walk.
///
/// With `target = Some(amount)` the walk stops once the collected value
/// reaches `amount`. Returns the accumulated value and the outputs.
pub fn collect_unspent<I, E>(
    blocks: I,
    key: &KeyHash,
    target: Option<u64>,
) -> Result<(u64, Vec<Utxo>), E>
where
    I: IntoIterator<Item = Result<Block, E>>,
{
    let mut spent: HashSet<OutPoint> = HashSet::new();
    let mut accumulated: u64 = 0;
    let mut utxos = Vec::new();

    'walk: for block in blocks {
        let block = block?;

        for tx in block.transactions.iter().filter(|tx| !tx.is_coinbase()) {
            spent.extend(tx.inputs.iter().map(|input| input.prev_out));
        }

        for tx in &block.transactions {
            for (index, output) in tx.outputs.iter().enumerate() {
                let outpoint = OutPoint::new(tx.id, index as i64);
                if !output.is_locked_with(key) || spent.contains(&outpoint) {
                    continue;
                }

                accumulated = accumulated.saturating_add(output.value);
                utxos.push(Utxo {
                    outpoint,
                    output: output.clone(),
                });

                if target.is_some_and(|amount| accumulated >= amount) {
                    break 'walk;
                }
            }
        }
    }

    Ok((accumulated, utxos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{Transaction, TxInput, ZERO_HASH};
    use std::convert::Infallible;

    const ALICE: KeyHash = [1; 32];
    const BOB: KeyHash = [2; 32];

    fn newest_first(blocks: Vec<Block>) -> Vec<Result<Block, Infallible>> {
        blocks.into_iter().rev().map(Ok).collect()
    }

    /// genesis pays alice 50, block 1 pays alice 50, block 2 moves 30 to bob
    fn fixture() -> (Vec<Block>, Transaction, Transaction) {
        let cb0 = Transaction::coinbase(ALICE, 50, 0);
        let cb1 = Transaction::coinbase(ALICE, 50, 1);
        let spend = Transaction::new(
            vec![TxInput::unsigned(OutPoint::new(cb0.id, 0))],
            vec![
                shared_types::TxOutput::to_key_hash(30, BOB),
                shared_types::TxOutput::to_key_hash(20, ALICE),
            ],
        );
        let blocks = vec![
            Block::new(0, 0, ZERO_HASH, vec![cb0.clone()]),
            Block::new(1, 1, [0xa0; 32], vec![cb1.clone()]),
            Block::new(2, 2, [0xa1; 32], vec![spend.clone()]),
        ];
        (blocks, cb0, spend)
    }

    #[test]
    fn test_collect_unspent_skips_spent_outputs() {
        let (blocks, _, _) = fixture();

        let (alice, utxos) = collect_unspent(newest_first(blocks.clone()), &ALICE, None).unwrap();
        assert_eq!(alice, 70);
        assert_eq!(utxos.len(), 2);

        let (bob, _) = collect_unspent(newest_first(blocks), &BOB, None).unwrap();
        assert_eq!(bob, 30);
    }

    #[test]
    fn test_collect_unspent_stops_at_target() {
        let (blocks, _, _) = fixture();
        let (acc, utxos) = collect_unspent(newest_first(blocks), &ALICE, Some(10)).unwrap();
        assert_eq!(acc, 20);
        assert_eq!(utxos.len(), 1);
    }

    #[test]
    fn test_resolve_outpoints_reports_state() {
        let (blocks, cb0, spend) = fixture();
        let spent_out = OutPoint::new(cb0.id, 0);
        let live_out = OutPoint::new(spend.id, 1);
        let missing = OutPoint::new([9; 32], 0);
        let out_of_range = OutPoint::new(spend.id, 7);

        let wanted: HashSet<_> = [spent_out, live_out, missing, out_of_range].into_iter().collect();
        let resolved = resolve_outpoints(newest_first(blocks), &wanted).unwrap();

        assert_eq!(resolved.get(&spent_out), Some(&Resolution::Spent));
        assert!(matches!(resolved.get(&live_out), Some(Resolution::Unspent(out)) if out.value == 20));
        assert!(!resolved.contains_key(&missing));
        assert!(!resolved.contains_key(&out_of_range));
    }

    #[test]
    fn test_walk_errors_propagate() {
        let blocks: Vec<Result<Block, &str>> = vec![Err("disk")];
        assert_eq!(collect_unspent(blocks, &ALICE, None), Err("disk"));
    }
}
