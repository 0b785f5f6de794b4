//! The acceptance pipeline: every gate a candidate passes between arriving
//! from the network and becoming a pool entry.
//!
//! The pipeline is a linear sequence; any gate may reject, and each
//! rejection is a distinct [`MempoolError`] so callers can decide whether to
//! drop, orphan-pool, or penalise the submitter. Nothing mutates pool state
//! until the final commit, so an abandoned call leaves no trace.
//!
//! Replacement (BIP 125) lives here too: a candidate that double-spends
//! in-pool inputs may evict the conflicting entries if every conflict
//! signals replaceability, the candidate strictly outbids them, and the
//! eviction stays bounded.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use sable_core::coins::CoinsView;
use sable_core::error::{MempoolError, TransactionError};
use sable_core::traits::{ChainView, InputVerifier};
use sable_core::types::{Coin, Hash256, OutPoint, Transaction};
use sable_core::validation::{check_outputs_not_dust, validate_transaction_structure};

use crate::entry::{RemovalReason, TxEntry};
use crate::lockpoints::calculate_lock_points;
use crate::pool::{Mempool, PoolInner};
use crate::score::cmp_feerate;

/// Options for one acceptance attempt.
#[derive(Debug, Clone)]
pub struct AcceptOptions {
    /// Waive the minimum relay fee gate.
    pub limit_free: bool,
    /// Skip the post-commit trim (reorg replay uses this; the caller trims
    /// once at the end).
    pub override_mempool_limit: bool,
    /// Reject fees above this cap as probable mistakes.
    pub absurd_fee_cap: Option<u64>,
    /// Observation time recorded on the entry (Unix seconds).
    pub accept_time: u64,
    /// Locally submitted raw transaction: exempt from the relay dust
    /// policy, everything else unchanged.
    pub raw_tx: bool,
    /// Whether this acceptance may feed the fee estimator. Reorg replay
    /// turns this off.
    pub valid_fee_estimate: bool,
}

impl Default for AcceptOptions {
    fn default() -> Self {
        Self {
            limit_free: false,
            override_mempool_limit: false,
            absurd_fee_cap: None,
            accept_time: 0,
            raw_tx: false,
            valid_fee_estimate: true,
        }
    }
}

/// Result of a successful acceptance.
#[derive(Debug)]
pub struct Accepted {
    pub txid: Hash256,
    /// Absolute fee the transaction pays.
    pub fee: u64,
    /// Virtual size in bytes.
    pub vsize: u64,
    /// Entries evicted by replacement, in txid order.
    pub replaced: Vec<Arc<Transaction>>,
    pub(crate) fee_estimate_ok: bool,
}

/// Read-only overlay of pool outputs on a base view, borrowed from inside
/// the lock. The public [`crate::pool::CoinsViewMemPool`] re-locks per call
/// and would deadlock here.
struct InnerCoinsView<'a> {
    base: &'a dyn CoinsView,
    inner: &'a PoolInner,
}

impl CoinsView for InnerCoinsView<'_> {
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.inner
            .pool_coin(outpoint)
            .or_else(|| self.base.get_coin(outpoint))
    }
}

/// Whether a pool entry opted into replaceability, directly or through an
/// in-pool ancestor.
fn signals_replaceability(inner: &PoolInner, txid: &Hash256) -> bool {
    let Some(entry) = inner.entry(txid) else {
        return false;
    };
    if entry.tx().signals_rbf() {
        return true;
    }
    inner
        .calculate_entry_ancestors(txid)
        .iter()
        .any(|a| inner.entry(a).is_some_and(|e| e.tx().signals_rbf()))
}

impl Mempool {
    /// Validate `tx` against current policy and, on success, commit it to
    /// the pool, evicting any replaced conflicts first.
    ///
    /// The whole pipeline runs under the pool lock; the fee estimator is
    /// notified after it is released. Call [`Mempool::drain_events`]
    /// afterwards to dispatch `Added`/`Removed` notifications.
    pub fn accept_to_pool(
        &self,
        tx: Transaction,
        coins: &dyn CoinsView,
        chain: &dyn ChainView,
        verifier: &dyn InputVerifier,
        opts: &AcceptOptions,
    ) -> Result<Accepted, MempoolError> {
        let txid = tx
            .txid()
            .map_err(|e| MempoolError::Internal(e.to_string()))?;
        let vsize = tx
            .vsize()
            .map_err(|e| MempoolError::Internal(e.to_string()))?;

        let mut inner = self.inner.lock();
        let result = accept_worker(&mut inner, tx, txid, vsize, coins, chain, verifier, opts);
        let estimator_info = match &result {
            Ok(accepted) => inner.entry(&accepted.txid).map(|e| e.info()),
            Err(_) => None,
        };
        drop(inner);

        match &result {
            Ok(accepted) => {
                debug!(%txid, fee = accepted.fee, vsize, replaced = accepted.replaced.len(),
                    "accepted transaction into mempool");
                if let (Some(estimator), Some(info)) = (&self.estimator, estimator_info) {
                    estimator.process_transaction(&info, accepted.fee_estimate_ok);
                }
            }
            Err(err) => {
                debug!(%txid, %err, "rejected transaction");
            }
        }
        result
    }

    /// Replay transactions from disconnected blocks after the tip
    /// retreated, then reconcile the dependency graph and drop entries the
    /// new tip invalidates.
    ///
    /// `disconnected` must be in block order (parents before children)
    /// across all disconnected blocks, oldest block first. When
    /// `add_to_pool` is false (or a transaction fails re-acceptance) it is
    /// removed together with any in-pool descendants instead.
    ///
    /// Returns the txids successfully reinserted.
    pub fn update_mempool_for_reorg(
        &self,
        disconnected: &[Transaction],
        add_to_pool: bool,
        coins: &dyn CoinsView,
        chain: &dyn ChainView,
        verifier: &dyn InputVerifier,
        now: u64,
    ) -> Vec<Hash256> {
        let mut reinserted = Vec::new();

        for tx in disconnected {
            if add_to_pool && !tx.is_coinbase() {
                let opts = AcceptOptions {
                    limit_free: true,
                    override_mempool_limit: true,
                    accept_time: now,
                    valid_fee_estimate: false,
                    ..AcceptOptions::default()
                };
                match self.accept_to_pool(tx.clone(), coins, chain, verifier, &opts) {
                    Ok(accepted) => {
                        reinserted.push(accepted.txid);
                        continue;
                    }
                    Err(err) => {
                        debug!(%err, "disconnected transaction not re-accepted");
                    }
                }
            }
            // Not re-added: make sure no descendants linger either.
            let _ = self.remove_recursive(tx, RemovalReason::Reorg);
        }

        self.update_transactions_from_block(&reinserted);
        self.remove_for_reorg(coins, chain);

        let limit = self.inner.lock().config.max_mempool_bytes;
        self.trim_to_size(limit, None);

        info!(
            disconnected = disconnected.len(),
            replayed = reinserted.len(),
            "updated mempool for reorg"
        );
        reinserted
    }
}

#[allow(clippy::too_many_arguments)]
fn accept_worker(
    inner: &mut PoolInner,
    tx: Transaction,
    txid: Hash256,
    vsize: u64,
    coins: &dyn CoinsView,
    chain: &dyn ChainView,
    verifier: &dyn InputVerifier,
    opts: &AcceptOptions,
) -> Result<Accepted, MempoolError> {
    // Gate 1: shape and standardness.
    if tx.is_coinbase() {
        return Err(MempoolError::Coinbase);
    }
    validate_transaction_structure(&tx).map_err(MempoolError::NonStandard)?;
    if !opts.raw_tx {
        check_outputs_not_dust(&tx, inner.config.min_relay_fee)
            .map_err(MempoolError::NonStandard)?;
    }

    let next_height = chain.tip_height() + 1;
    let next_mtp = chain.median_time_past();
    if !tx.is_final_at(next_height, next_mtp) {
        return Err(MempoolError::NonFinal(tx.lock_time));
    }

    // Gate 2: duplicates, in pool or confirmed.
    if inner.exists(&txid) {
        return Err(MempoolError::AlreadyInPool(txid.to_string()));
    }
    for index in 0..tx.outputs.len() as u64 {
        if coins.have_coin(&OutPoint { txid, index }) {
            return Err(MempoolError::AlreadyConfirmed(txid.to_string()));
        }
    }

    // The rolling floor decays with time, so evaluate it against the
    // acceptance timestamp before the read-only borrow below.
    let floor_fee = inner
        .min_fee(inner.config.max_mempool_bytes, opts.accept_time)
        .fee(vsize);

    let relay_fee = inner.config.min_relay_fee.fee(vsize);
    let incremental_fee = inner.config.incremental_relay_fee.fee(vsize);
    let max_replacements = inner.config.max_replacement_candidates;

    let (fee, lock_points, ancestors, all_conflicts, spends_pool_input) = {
        let view = InnerCoinsView { base: coins, inner: &*inner };

        // Gate 3: input availability through the pool overlay.
        let mut input_value: u64 = 0;
        let mut input_heights = Vec::with_capacity(tx.inputs.len());
        let mut spends_pool_input = false;
        for input in &tx.inputs {
            let in_pool = inner.exists(&input.previous_output.txid);
            let Some(coin) = view.get_coin(&input.previous_output) else {
                return Err(MempoolError::MissingInputs(txid.to_string()));
            };
            if coin.is_coinbase && !coin.is_mature(next_height) {
                return Err(MempoolError::ImmatureSpend(input.previous_output.to_string()));
            }
            input_value = input_value
                .checked_add(coin.output.value)
                .ok_or(MempoolError::NonStandard(
                    TransactionError::ValueOverflow,
                ))?;
            input_heights.push(if in_pool { next_height } else { coin.height });
            spends_pool_input |= in_pool;
        }

        let output_value = tx.total_output_value().ok_or(MempoolError::NonStandard(
            TransactionError::ValueOverflow,
        ))?;
        let fee = input_value.checked_sub(output_value).ok_or_else(|| {
            MempoolError::NonStandard(TransactionError::InsufficientFunds {
                have: input_value,
                need: output_value,
            })
        })?;
        let mod_fee = fee as i64 + inner.apply_delta(&txid);

        // Relative locks need the resolved input heights, so they complete
        // the finality checks here.
        let lock_points = calculate_lock_points(&tx, &input_heights, chain);
        if !lock_points.is_final_at(next_height, next_mtp) {
            return Err(MempoolError::NonBip68Final);
        }

        // Gate 4: conflicts and replacement.
        let mut direct_conflicts: BTreeSet<Hash256> = BTreeSet::new();
        for input in &tx.inputs {
            if let Some(spender) = inner.spender_of(&input.previous_output) {
                direct_conflicts.insert(spender);
            }
        }

        let mut all_conflicts: BTreeSet<Hash256> = BTreeSet::new();
        if !direct_conflicts.is_empty() {
            for conflict in &direct_conflicts {
                if !signals_replaceability(inner, conflict) {
                    return Err(MempoolError::Conflict(conflict.to_string()));
                }
            }

            for conflict in &direct_conflicts {
                let entry = inner
                    .entry(conflict)
                    .expect("conflicting spender must be a pool entry");
                if cmp_feerate(mod_fee, vsize, entry.modified_fee(), entry.vsize())
                    != std::cmp::Ordering::Greater
                {
                    return Err(MempoolError::ReplacementFeeRateTooLow(conflict.to_string()));
                }
            }

            for conflict in &direct_conflicts {
                inner.calculate_descendants(*conflict, &mut all_conflicts);
            }

            let conflicting_fees: i64 = all_conflicts
                .iter()
                .filter_map(|c| inner.entry(c))
                .map(|e| e.modified_fee())
                .sum();
            let required = conflicting_fees + incremental_fee as i64;
            if mod_fee < required {
                return Err(MempoolError::InsufficientReplacementFee {
                    paid: mod_fee.max(0) as u64,
                    need: required.max(0) as u64,
                });
            }

            // The replacement may not introduce unconfirmed inputs the
            // originals did not already depend on.
            let mut conflict_parents: BTreeSet<Hash256> = BTreeSet::new();
            for conflict in &direct_conflicts {
                if let Some(parents) = inner.direct_parents(conflict) {
                    conflict_parents.extend(parents.iter().copied());
                }
            }
            for input in &tx.inputs {
                let parent = input.previous_output.txid;
                if inner.exists(&parent) && !conflict_parents.contains(&parent) {
                    return Err(MempoolError::ReplacementAddsUnconfirmed(
                        input.previous_output.to_string(),
                    ));
                }
            }

            if all_conflicts.len() > max_replacements {
                return Err(MempoolError::TooManyReplacements {
                    count: all_conflicts.len(),
                    max: max_replacements,
                });
            }
        }

        // Gate 5: fee floors and the absurdity cap.
        if !opts.limit_free && mod_fee < relay_fee as i64 {
            return Err(MempoolError::FeeTooLow {
                fee: mod_fee.max(0) as u64,
                min: relay_fee,
            });
        }
        if floor_fee > 0 && mod_fee < floor_fee as i64 {
            return Err(MempoolError::MempoolMinFeeNotMet {
                fee: mod_fee.max(0) as u64,
                min: floor_fee,
            });
        }
        if let Some(cap) = opts.absurd_fee_cap {
            if fee > cap {
                return Err(MempoolError::AbsurdFee { fee, cap });
            }
        }

        // Gate 6: ancestor package limits.
        let ancestors = inner.calculate_candidate_ancestors(&tx, vsize)?;

        // A replacement spending an output of something it evicts would
        // orphan itself.
        for ancestor in &ancestors {
            if all_conflicts.contains(ancestor) {
                return Err(MempoolError::SpendsConflictingTx(ancestor.to_string()));
            }
        }

        // Gate 7: script verification, against the same overlay.
        verifier.verify_inputs(&tx, &view).map_err(|e| match e {
            TransactionError::InvalidSignature { index } => {
                MempoolError::ScriptVerifyFailed { index, detail: "invalid signature".into() }
            }
            other => MempoolError::ScriptVerifyFailed { index: 0, detail: other.to_string() },
        })?;

        (fee, lock_points, ancestors, all_conflicts, spends_pool_input)
    };

    // Gate 8: commit. Replaced entries go first so their removal events
    // precede the replacement's addition.
    let replaced: Vec<Arc<Transaction>> = all_conflicts
        .iter()
        .filter_map(|c| inner.entry(c).map(|e| Arc::clone(e.tx())))
        .collect();
    if !all_conflicts.is_empty() {
        info!(%txid, replaced = all_conflicts.len(), "replacing conflicting transactions");
        inner.remove_staged(&all_conflicts, false, RemovalReason::Replaced);
    }

    let sig_op_cost = tx.sig_op_cost();
    let entry = TxEntry::new(
        Arc::new(tx),
        txid,
        fee,
        vsize,
        sig_op_cost,
        opts.accept_time,
        chain.tip_height(),
        0, // any stored delta is applied inside add_unchecked
        lock_points,
    );
    inner.add_unchecked(entry, &ancestors);
    inner.maybe_check(coins);

    if !opts.override_mempool_limit {
        let limit = inner.config.max_mempool_bytes;
        inner.trim_to_size(limit, None);
        if !inner.exists(&txid) {
            return Err(MempoolError::PoolFull);
        }
    }

    let fee_estimate_ok =
        opts.valid_fee_estimate && all_conflicts.is_empty() && !spends_pool_input;

    Ok(Accepted { txid, fee, vsize, replaced, fee_estimate_ok })
}
