//! Per-transaction pool bookkeeping.
//!
//! A [`TxEntry`] records one accepted transaction together with its cached
//! ancestor and descendant aggregates. The aggregates include the entry
//! itself by convention and are kept consistent by the pool's
//! aggregate-maintenance operations; nothing else mutates an entry.

use std::fmt;
use std::sync::Arc;

use sable_core::types::{FeeRate, Hash256, Transaction};

use crate::lockpoints::LockPoints;

/// Why an entry left the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Entry aged past the pool expiry.
    Expiry,
    /// Evicted while trimming to the size limit.
    SizeLimit,
    /// Invalidated by a chain reorganisation.
    Reorg,
    /// Confirmed in a connected block.
    Block,
    /// An input was spent by a confirmed transaction.
    Conflict,
    /// Replaced by a higher-paying conflicting transaction.
    Replaced,
    /// Explicit removal with no specific cause.
    Unknown,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Expiry => "expiry",
            Self::SizeLimit => "size limit",
            Self::Reorg => "reorg",
            Self::Block => "block",
            Self::Conflict => "conflict",
            Self::Replaced => "replaced",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Deferred pool notification, dispatched by the caller after the pool lock
/// is released.
#[derive(Debug, Clone)]
pub enum MempoolEvent {
    /// A transaction entered the pool.
    Added(Arc<Transaction>),
    /// A transaction left the pool for the given reason.
    Removed(Arc<Transaction>, RemovalReason),
}

/// Snapshot of one pool entry for queries, relay, and the dump.
#[derive(Debug, Clone)]
pub struct TxMempoolInfo {
    /// The transaction body.
    pub tx: Arc<Transaction>,
    /// Transaction ID.
    pub txid: Hash256,
    /// Acceptance timestamp (Unix seconds).
    pub time: u64,
    /// Absolute fee paid, in sables.
    pub fee: u64,
    /// Virtual size in bytes.
    pub vsize: u64,
    /// Priority adjustment applied via prioritisation, in sables.
    pub fee_delta: i64,
    /// In-pool ancestors including self.
    pub ancestor_count: u64,
    /// Total virtual size of in-pool ancestors including self.
    pub ancestor_size: u64,
    /// Total modified fees of in-pool ancestors including self.
    pub ancestor_fees: i64,
    /// In-pool descendants including self.
    pub descendant_count: u64,
    /// Total virtual size of in-pool descendants including self.
    pub descendant_size: u64,
    /// Total modified fees of in-pool descendants including self.
    pub descendant_fees: i64,
}

/// A transaction in the pool with its bookkeeping record.
#[derive(Debug, Clone)]
pub struct TxEntry {
    tx: Arc<Transaction>,
    txid: Hash256,
    fee: u64,
    vsize: u64,
    sig_op_cost: u64,
    time: u64,
    height: u64,
    fee_delta: i64,
    lock_points: LockPoints,
    // Aggregates over this entry plus all in-pool descendants.
    count_with_descendants: u64,
    size_with_descendants: u64,
    mod_fees_with_descendants: i64,
    // Aggregates over this entry plus all in-pool ancestors.
    count_with_ancestors: u64,
    size_with_ancestors: u64,
    mod_fees_with_ancestors: i64,
}

/// Approximate heap overhead per entry beyond the transaction body: the
/// bookkeeping record itself plus its share of the owning map node.
const ENTRY_OVERHEAD: usize = 296;

/// Approximate cost per tracked input in the spent-output index.
const SPENT_INDEX_COST: usize = 88;

fn add_signed(value: u64, delta: i64) -> u64 {
    if delta >= 0 {
        value.saturating_add(delta as u64)
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}

impl TxEntry {
    /// Create an entry whose aggregates cover only itself.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tx: Arc<Transaction>,
        txid: Hash256,
        fee: u64,
        vsize: u64,
        sig_op_cost: u64,
        time: u64,
        height: u64,
        fee_delta: i64,
        lock_points: LockPoints,
    ) -> Self {
        let mod_fee = fee as i64 + fee_delta;
        Self {
            tx,
            txid,
            fee,
            vsize,
            sig_op_cost,
            time,
            height,
            fee_delta,
            lock_points,
            count_with_descendants: 1,
            size_with_descendants: vsize,
            mod_fees_with_descendants: mod_fee,
            count_with_ancestors: 1,
            size_with_ancestors: vsize,
            mod_fees_with_ancestors: mod_fee,
        }
    }

    pub fn tx(&self) -> &Arc<Transaction> {
        &self.tx
    }

    pub fn txid(&self) -> Hash256 {
        self.txid
    }

    pub fn fee(&self) -> u64 {
        self.fee
    }

    pub fn vsize(&self) -> u64 {
        self.vsize
    }

    pub fn sig_op_cost(&self) -> u64 {
        self.sig_op_cost
    }

    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn fee_delta(&self) -> i64 {
        self.fee_delta
    }

    /// Fee plus the prioritisation delta; the value every ordering uses.
    pub fn modified_fee(&self) -> i64 {
        self.fee as i64 + self.fee_delta
    }

    /// Modified fee rate of this entry alone.
    pub fn fee_rate(&self) -> FeeRate {
        FeeRate::from_fee_and_size(self.modified_fee().max(0) as u64, self.vsize)
    }

    pub fn lock_points(&self) -> &LockPoints {
        &self.lock_points
    }

    pub fn count_with_descendants(&self) -> u64 {
        self.count_with_descendants
    }

    pub fn size_with_descendants(&self) -> u64 {
        self.size_with_descendants
    }

    pub fn mod_fees_with_descendants(&self) -> i64 {
        self.mod_fees_with_descendants
    }

    pub fn count_with_ancestors(&self) -> u64 {
        self.count_with_ancestors
    }

    pub fn size_with_ancestors(&self) -> u64 {
        self.size_with_ancestors
    }

    pub fn mod_fees_with_ancestors(&self) -> i64 {
        self.mod_fees_with_ancestors
    }

    /// Snapshot for queries and the dump.
    pub fn info(&self) -> TxMempoolInfo {
        TxMempoolInfo {
            tx: Arc::clone(&self.tx),
            txid: self.txid,
            time: self.time,
            fee: self.fee,
            vsize: self.vsize,
            fee_delta: self.fee_delta,
            ancestor_count: self.count_with_ancestors,
            ancestor_size: self.size_with_ancestors,
            ancestor_fees: self.mod_fees_with_ancestors,
            descendant_count: self.count_with_descendants,
            descendant_size: self.size_with_descendants,
            descendant_fees: self.mod_fees_with_descendants,
        }
    }

    /// Approximate heap cost of this entry: body, bookkeeping, and its share
    /// of the spent-output index.
    pub fn dynamic_usage(&self) -> usize {
        ENTRY_OVERHEAD + self.vsize as usize + self.tx.inputs.len() * SPENT_INDEX_COST
    }

    // --- Aggregate maintenance (pool-internal) ---

    pub(crate) fn update_descendant_state(
        &mut self,
        size_delta: i64,
        fee_delta: i64,
        count_delta: i64,
    ) {
        self.size_with_descendants = add_signed(self.size_with_descendants, size_delta);
        self.mod_fees_with_descendants += fee_delta;
        self.count_with_descendants = add_signed(self.count_with_descendants, count_delta);
        debug_assert!(self.count_with_descendants >= 1);
        debug_assert!(self.size_with_descendants >= self.vsize);
    }

    pub(crate) fn update_ancestor_state(
        &mut self,
        size_delta: i64,
        fee_delta: i64,
        count_delta: i64,
    ) {
        self.size_with_ancestors = add_signed(self.size_with_ancestors, size_delta);
        self.mod_fees_with_ancestors += fee_delta;
        self.count_with_ancestors = add_signed(self.count_with_ancestors, count_delta);
        debug_assert!(self.count_with_ancestors >= 1);
        debug_assert!(self.size_with_ancestors >= self.vsize);
    }

    /// Replace absolute ancestor totals (used when re-deriving from a freshly
    /// computed ancestor set).
    pub(crate) fn set_ancestor_state(&mut self, count: u64, size: u64, mod_fees: i64) {
        self.count_with_ancestors = count;
        self.size_with_ancestors = size;
        self.mod_fees_with_ancestors = mod_fees;
    }

    /// Change the prioritisation delta, adjusting this entry's own share of
    /// both aggregate families. Ancestor/descendant propagation is the
    /// pool's job.
    pub(crate) fn update_fee_delta(&mut self, new_delta: i64) {
        let diff = new_delta - self.fee_delta;
        self.mod_fees_with_descendants += diff;
        self.mod_fees_with_ancestors += diff;
        self.fee_delta = new_delta;
    }

    pub(crate) fn update_lock_points(&mut self, lock_points: LockPoints) {
        self.lock_points = lock_points;
    }
}
