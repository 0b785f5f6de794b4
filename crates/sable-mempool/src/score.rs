//! Ordering keys for the pool's secondary indexes.
//!
//! Fee-rate comparisons cross-multiply in 128-bit so no precision is lost to
//! division. Every key ends in the txid so orderings are total and
//! deterministic.

use std::cmp::Ordering;

use sable_core::types::Hash256;

use crate::entry::TxEntry;

/// Compare `fee_a / size_a` against `fee_b / size_b` without dividing.
///
/// A zero size sorts as an infinite rate.
pub(crate) fn cmp_feerate(fee_a: i64, size_a: u64, fee_b: i64, size_b: u64) -> Ordering {
    // a/b > c/d  <=>  a*d > c*b  for positive denominators.
    let lhs = fee_a as i128 * size_b as i128;
    let rhs = fee_b as i128 * size_a as i128;
    match (size_a, size_b) {
        (0, 0) => Ordering::Equal,
        (0, _) => Ordering::Greater,
        (_, 0) => Ordering::Less,
        _ => lhs.cmp(&rhs),
    }
}

/// Eviction ordering: `max(feerate(entry), feerate(entry + descendants))`,
/// ascending, so the least attractive package sorts first.
///
/// Feerate ties prefer newer entries first, so eviction sheds the most
/// recently accepted of equally priced packages.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DescendantScoreKey {
    mod_fee: i64,
    vsize: u64,
    time: u64,
    pub(crate) txid: Hash256,
}

impl DescendantScoreKey {
    pub(crate) fn new(entry: &TxEntry) -> Self {
        // Pick whichever of (self) and (self + descendants) pays the
        // better rate; a cheap parent with a generous child is scored as
        // the package.
        let use_package = cmp_feerate(
            entry.mod_fees_with_descendants(),
            entry.size_with_descendants(),
            entry.modified_fee(),
            entry.vsize(),
        ) == Ordering::Greater;
        let (mod_fee, vsize) = if use_package {
            (entry.mod_fees_with_descendants(), entry.size_with_descendants())
        } else {
            (entry.modified_fee(), entry.vsize())
        };
        Self { mod_fee, vsize, time: entry.time(), txid: entry.txid() }
    }
}

impl Ord for DescendantScoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_feerate(self.mod_fee, self.vsize, other.mod_fee, other.vsize)
            .then_with(|| other.time.cmp(&self.time))
            .then_with(|| self.txid.cmp(&other.txid))
    }
}

impl PartialOrd for DescendantScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DescendantScoreKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DescendantScoreKey {}

/// Block-construction ordering: `min(feerate(entry), feerate(entry +
/// ancestors))`, ascending; iterate in reverse for best-first selection.
///
/// A generous child is held back by an unpaid parent, so the package rate
/// caps the entry's own.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AncestorScoreKey {
    mod_fee: i64,
    vsize: u64,
    pub(crate) txid: Hash256,
}

impl AncestorScoreKey {
    pub(crate) fn new(entry: &TxEntry) -> Self {
        let use_package = cmp_feerate(
            entry.mod_fees_with_ancestors(),
            entry.size_with_ancestors(),
            entry.modified_fee(),
            entry.vsize(),
        ) == Ordering::Less;
        let (mod_fee, vsize) = if use_package {
            (entry.mod_fees_with_ancestors(), entry.size_with_ancestors())
        } else {
            (entry.modified_fee(), entry.vsize())
        };
        Self { mod_fee, vsize, txid: entry.txid() }
    }
}

impl Ord for AncestorScoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_feerate(self.mod_fee, self.vsize, other.mod_fee, other.vsize)
            .then_with(|| self.txid.cmp(&other.txid))
    }
}

impl PartialOrd for AncestorScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for AncestorScoreKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AncestorScoreKey {}

/// Mining score: modified fee rate including ancestors, ascending, unique
/// per entry via the txid tiebreak.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MiningScoreKey {
    mod_fee: i64,
    vsize: u64,
    pub(crate) txid: Hash256,
}

impl MiningScoreKey {
    pub(crate) fn new(entry: &TxEntry) -> Self {
        Self {
            mod_fee: entry.mod_fees_with_ancestors(),
            vsize: entry.size_with_ancestors(),
            txid: entry.txid(),
        }
    }

    /// Compare two entries by mining score, best first.
    pub(crate) fn cmp_entries_desc(a: &TxEntry, b: &TxEntry) -> Ordering {
        Self::new(b).cmp(&Self::new(a))
    }
}

impl Ord for MiningScoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_feerate(self.mod_fee, self.vsize, other.mod_fee, other.vsize)
            .then_with(|| self.txid.cmp(&other.txid))
    }
}

impl PartialOrd for MiningScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MiningScoreKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MiningScoreKey {}
