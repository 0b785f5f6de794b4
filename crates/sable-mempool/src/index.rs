//! Secondary orderings over the owning entry map.
//!
//! The pool's primary store maps txid to entry; this module keeps the
//! score- and time-ordered views in sync with it. Keys snapshot the fields
//! they order by, so any mutation of those fields must go through
//! remove-then-reinsert: [`MempoolIndex::remove`] with the entry in its old
//! state, mutate, then [`MempoolIndex::insert`]. The pool does this inside
//! one critical section.

use std::collections::BTreeSet;

use sable_core::types::Hash256;

use crate::entry::TxEntry;
use crate::score::{AncestorScoreKey, DescendantScoreKey, MiningScoreKey};

#[derive(Debug, Default)]
pub(crate) struct MempoolIndex {
    by_descendant_score: BTreeSet<DescendantScoreKey>,
    by_entry_time: BTreeSet<(u64, Hash256)>,
    by_mining_score: BTreeSet<MiningScoreKey>,
    by_ancestor_score: BTreeSet<AncestorScoreKey>,
}

impl MempoolIndex {
    /// Add `entry` to every ordering. The entry must not already be indexed.
    pub(crate) fn insert(&mut self, entry: &TxEntry) {
        let fresh = self.by_descendant_score.insert(DescendantScoreKey::new(entry))
            && self.by_entry_time.insert((entry.time(), entry.txid()))
            && self.by_mining_score.insert(MiningScoreKey::new(entry))
            && self.by_ancestor_score.insert(AncestorScoreKey::new(entry));
        debug_assert!(fresh, "entry {} indexed twice", entry.txid());
    }

    /// Remove `entry` from every ordering. The entry must be in the same
    /// state as when it was last inserted, or the keys will not be found.
    pub(crate) fn remove(&mut self, entry: &TxEntry) {
        let found = self.by_descendant_score.remove(&DescendantScoreKey::new(entry))
            && self.by_entry_time.remove(&(entry.time(), entry.txid()))
            && self.by_mining_score.remove(&MiningScoreKey::new(entry))
            && self.by_ancestor_score.remove(&AncestorScoreKey::new(entry));
        debug_assert!(found, "entry {} missing from an index", entry.txid());
    }

    pub(crate) fn len(&self) -> usize {
        self.by_descendant_score.len()
    }

    pub(crate) fn clear(&mut self) {
        self.by_descendant_score.clear();
        self.by_entry_time.clear();
        self.by_mining_score.clear();
        self.by_ancestor_score.clear();
    }

    /// Txid of the entry with the lowest descendant score (eviction pick).
    pub(crate) fn worst_descendant_score(&self) -> Option<Hash256> {
        self.by_descendant_score.iter().next().map(|k| k.txid)
    }

    /// All txids in eviction order, lowest descendant score first.
    pub(crate) fn descendant_order(&self) -> Vec<Hash256> {
        self.by_descendant_score.iter().map(|k| k.txid).collect()
    }

    /// Txids with entry time strictly below `cutoff`, oldest first.
    pub(crate) fn entries_older_than(&self, cutoff: u64) -> Vec<Hash256> {
        self.by_entry_time
            .range(..(cutoff, Hash256::ZERO))
            .map(|(_, txid)| *txid)
            .collect()
    }

    /// All txids ordered by ancestor score, best last.
    pub(crate) fn by_ancestor_score(&self) -> impl Iterator<Item = Hash256> + '_ {
        self.by_ancestor_score.iter().map(|k| k.txid)
    }

    /// All txids ordered by mining score, best last.
    pub(crate) fn by_mining_score(&self) -> impl Iterator<Item = Hash256> + '_ {
        self.by_mining_score.iter().map(|k| k.txid)
    }

    /// Whether every ordering holds exactly `expected` elements.
    pub(crate) fn is_consistent(&self, expected: usize) -> bool {
        self.by_descendant_score.len() == expected
            && self.by_entry_time.len() == expected
            && self.by_mining_score.len() == expected
            && self.by_ancestor_score.len() == expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockpoints::LockPoints;
    use sable_core::constants::SEQUENCE_FINAL;
    use sable_core::types::{OutPoint, Transaction, TxInput, TxOutput};
    use std::sync::Arc;

    fn entry(seed: u8, fee: u64, time: u64) -> TxEntry {
        let tx = Arc::new(Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint { txid: Hash256([seed; 32]), index: 0 },
                signature: vec![0; 64],
                public_key: vec![0; 32],
                sequence: SEQUENCE_FINAL,
            }],
            outputs: vec![TxOutput { value: 1, pubkey_hash: Hash256::ZERO }],
            lock_time: 0,
        });
        let txid = tx.txid().unwrap();
        TxEntry::new(tx, txid, fee, 1000, 1, time, 0, 0, LockPoints::default())
    }

    #[test]
    fn insert_and_remove_keep_orderings_aligned() {
        let mut index = MempoolIndex::default();
        let a = entry(1, 1_000, 10);
        let b = entry(2, 2_000, 20);

        index.insert(&a);
        index.insert(&b);
        assert!(index.is_consistent(2));

        index.remove(&a);
        assert!(index.is_consistent(1));
        assert_eq!(index.worst_descendant_score(), Some(b.txid()));
    }

    #[test]
    fn worst_descendant_score_is_lowest_feerate() {
        let mut index = MempoolIndex::default();
        let cheap = entry(1, 1_000, 10);
        let rich = entry(2, 50_000, 10);
        index.insert(&rich);
        index.insert(&cheap);

        assert_eq!(index.worst_descendant_score(), Some(cheap.txid()));
    }

    #[test]
    fn rekey_after_mutation() {
        let mut index = MempoolIndex::default();
        let mut e = entry(1, 1_000, 10);
        let rich = entry(2, 5_000, 10);
        index.insert(&e);
        index.insert(&rich);
        assert_eq!(index.worst_descendant_score(), Some(e.txid()));

        // A descendant arrives paying well: remove, mutate, reinsert.
        index.remove(&e);
        e.update_descendant_state(1_000, 20_000, 1);
        index.insert(&e);

        assert_eq!(index.worst_descendant_score(), Some(rich.txid()));
        assert!(index.is_consistent(2));
    }

    #[test]
    fn entries_older_than_uses_strict_cutoff() {
        let mut index = MempoolIndex::default();
        let old = entry(1, 1_000, 10);
        let edge = entry(2, 1_000, 20);
        let new = entry(3, 1_000, 30);
        index.insert(&old);
        index.insert(&edge);
        index.insert(&new);

        let expired = index.entries_older_than(20);
        assert_eq!(expired, vec![old.txid()]);
    }

    #[test]
    fn clear_empties_all_orderings() {
        let mut index = MempoolIndex::default();
        index.insert(&entry(1, 1_000, 10));
        index.clear();
        assert!(index.is_consistent(0));
        assert_eq!(index.worst_descendant_score(), None);
    }
}
