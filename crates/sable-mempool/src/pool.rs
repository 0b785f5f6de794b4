//! The transaction pool: owning store, dependency graph, and aggregates.
//!
//! Entries live in a primary txid-keyed map; the secondary orderings
//! ([`crate::index`]) and the link graph stay consistent with it under one
//! mutual-exclusion lock. Parents and children are tracked per entry so
//! that ancestor and descendant aggregates can be maintained incrementally:
//! when an entry is added, every ancestor's descendant state absorbs it;
//! when a set of entries is removed, aggregate updates happen *before* any
//! link is severed, because walking an entry's ancestors requires the links
//! of every not-yet-removed member.
//!
//! Reorg replay is the one place the "new entries have no in-pool children"
//! assumption breaks: transactions from disconnected blocks may have
//! children already in the pool. [`Mempool::update_transactions_from_block`]
//! reconciles the graph afterwards; between the bulk insert and that call
//! the ancestor/descendant walks are not defined for the affected entries.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use sable_core::coins::CoinsView;
use sable_core::error::MempoolError;
use sable_core::traits::ChainView;
use sable_core::types::{Coin, FeeRate, Hash256, OutPoint, Transaction};

use crate::config::MempoolConfig;
use crate::entry::{MempoolEvent, RemovalReason, TxEntry, TxMempoolInfo};
use crate::fees::RollingFeeState;
use crate::index::MempoolIndex;
use crate::lockpoints::calculate_lock_points;
use crate::score::MiningScoreKey;

/// Marker height for coins created by unconfirmed pool transactions.
pub const MEMPOOL_HEIGHT: u64 = u64::MAX;

/// Approximate heap cost of one directed link-graph edge entry.
const LINK_COST: usize = 56;

/// Direct parents and children of one entry, ordered by txid.
#[derive(Debug, Clone, Default)]
struct TxLinks {
    parents: BTreeSet<Hash256>,
    children: BTreeSet<Hash256>,
}

pub(crate) struct PoolInner {
    pub(crate) config: MempoolConfig,
    map: HashMap<Hash256, TxEntry>,
    index: MempoolIndex,
    links: HashMap<Hash256, TxLinks>,
    /// Spent outpoint to the unique in-pool spender.
    spent_by: BTreeMap<OutPoint, Hash256>,
    /// Priority deltas, surviving entries not being in the pool.
    deltas: HashMap<Hash256, i64>,
    total_tx_size: u64,
    cached_inner_usage: usize,
    transactions_updated: u64,
    rolling_fee: RollingFeeState,
    pending_events: VecDeque<MempoolEvent>,
    /// Accumulator for sampled sanity checking.
    check_credit: u64,
}

impl PoolInner {
    fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            map: HashMap::new(),
            index: MempoolIndex::default(),
            links: HashMap::new(),
            spent_by: BTreeMap::new(),
            deltas: HashMap::new(),
            total_tx_size: 0,
            cached_inner_usage: 0,
            transactions_updated: 0,
            rolling_fee: RollingFeeState::new(0),
            pending_events: VecDeque::new(),
            check_credit: 0,
        }
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub(crate) fn exists(&self, txid: &Hash256) -> bool {
        self.map.contains_key(txid)
    }

    pub(crate) fn entry(&self, txid: &Hash256) -> Option<&TxEntry> {
        self.map.get(txid)
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn total_tx_size(&self) -> u64 {
        self.total_tx_size
    }

    pub(crate) fn is_spent(&self, outpoint: &OutPoint) -> bool {
        self.spent_by.contains_key(outpoint)
    }

    pub(crate) fn spender_of(&self, outpoint: &OutPoint) -> Option<Hash256> {
        self.spent_by.get(outpoint).copied()
    }

    pub(crate) fn direct_parents(&self, txid: &Hash256) -> Option<&BTreeSet<Hash256>> {
        self.links.get(txid).map(|l| &l.parents)
    }

    pub(crate) fn direct_children(&self, txid: &Hash256) -> Option<&BTreeSet<Hash256>> {
        self.links.get(txid).map(|l| &l.children)
    }

    /// An output created by an in-pool transaction, as a coin at the marker
    /// height.
    pub(crate) fn pool_coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        let entry = self.map.get(&outpoint.txid)?;
        let output = entry.tx().outputs.get(outpoint.index as usize)?;
        Some(Coin {
            output: output.clone(),
            height: MEMPOOL_HEIGHT,
            is_coinbase: false,
        })
    }

    /// Approximate total heap footprint of the pool.
    pub(crate) fn dynamic_memory_usage(&self) -> usize {
        self.cached_inner_usage
    }

    pub(crate) fn apply_delta(&self, txid: &Hash256) -> i64 {
        self.deltas.get(txid).copied().unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Index upkeep
    // ------------------------------------------------------------------

    /// Remove the entry from every ordering, mutate it, reinsert it.
    /// The only legal way to touch an indexed field.
    fn modify_entry(&mut self, txid: &Hash256, f: impl FnOnce(&mut TxEntry)) {
        let Some(entry) = self.map.get_mut(txid) else {
            return;
        };
        self.index.remove(entry);
        f(entry);
        self.index.insert(entry);
    }

    // ------------------------------------------------------------------
    // Link graph
    // ------------------------------------------------------------------

    fn update_child(&mut self, parent: Hash256, child: Hash256, add: bool) {
        let Some(links) = self.links.get_mut(&parent) else {
            return;
        };
        if add {
            if links.children.insert(child) {
                self.cached_inner_usage += LINK_COST;
            }
        } else if links.children.remove(&child) {
            self.cached_inner_usage -= LINK_COST;
        }
    }

    fn update_parent(&mut self, child: Hash256, parent: Hash256, add: bool) {
        let Some(links) = self.links.get_mut(&child) else {
            return;
        };
        if add {
            if links.parents.insert(parent) {
                self.cached_inner_usage += LINK_COST;
            }
        } else if links.parents.remove(&parent) {
            self.cached_inner_usage -= LINK_COST;
        }
    }

    // ------------------------------------------------------------------
    // Ancestor / descendant walks
    // ------------------------------------------------------------------

    /// Transitive in-pool ancestors of a not-yet-inserted transaction, with
    /// the configured package limits applied. The candidate itself is not in
    /// the returned set but counts toward the limits.
    pub(crate) fn calculate_candidate_ancestors(
        &self,
        tx: &Transaction,
        vsize: u64,
    ) -> Result<BTreeSet<Hash256>, MempoolError> {
        let parents: BTreeSet<Hash256> = tx
            .inputs
            .iter()
            .filter_map(|i| {
                let parent = i.previous_output.txid;
                self.map.contains_key(&parent).then_some(parent)
            })
            .collect();
        self.walk_ancestors(parents, vsize, true)
    }

    /// Transitive in-pool ancestors of an in-pool entry, unbounded.
    pub(crate) fn calculate_entry_ancestors(&self, txid: &Hash256) -> BTreeSet<Hash256> {
        let parents = self
            .links
            .get(txid)
            .map(|l| l.parents.clone())
            .unwrap_or_default();
        // Limits disabled: the walk cannot fail.
        self.walk_ancestors(parents, 0, false)
            .unwrap_or_default()
    }

    /// Worklist walk over parent links, smallest txid first so limit
    /// rejections are deterministic.
    fn walk_ancestors(
        &self,
        mut work: BTreeSet<Hash256>,
        entry_size: u64,
        apply_limits: bool,
    ) -> Result<BTreeSet<Hash256>, MempoolError> {
        let mut ancestors: BTreeSet<Hash256> = BTreeSet::new();
        let mut total_size = entry_size;

        while let Some(txid) = work.pop_first() {
            if !ancestors.insert(txid) {
                continue;
            }
            let entry = self
                .map
                .get(&txid)
                .expect("link graph references entry missing from the pool");

            if apply_limits {
                total_size += entry.vsize();
                if entry.size_with_descendants() + entry_size > self.config.limit_descendant_size {
                    return Err(MempoolError::AncestorLimit(format!(
                        "exceeds descendant size limit for tx {txid} [limit: {}]",
                        self.config.limit_descendant_size
                    )));
                }
                if entry.count_with_descendants() + 1 > self.config.limit_descendant_count {
                    return Err(MempoolError::AncestorLimit(format!(
                        "too many descendants for tx {txid} [limit: {}]",
                        self.config.limit_descendant_count
                    )));
                }
                if total_size > self.config.limit_ancestor_size {
                    return Err(MempoolError::AncestorLimit(format!(
                        "exceeds ancestor size limit [limit: {}]",
                        self.config.limit_ancestor_size
                    )));
                }
                if ancestors.len() as u64 + 1 > self.config.limit_ancestor_count {
                    return Err(MempoolError::AncestorLimit(format!(
                        "too many ancestors [limit: {}]",
                        self.config.limit_ancestor_count
                    )));
                }
            }

            if let Some(links) = self.links.get(&txid) {
                for parent in &links.parents {
                    if !ancestors.contains(parent) {
                        work.insert(*parent);
                    }
                }
            }
        }

        Ok(ancestors)
    }

    /// Extend `out` with `txid` and every in-pool descendant. Assumes `out`
    /// is already closed under descendants for anything it contains.
    pub(crate) fn calculate_descendants(&self, txid: Hash256, out: &mut BTreeSet<Hash256>) {
        let mut stage: BTreeSet<Hash256> = BTreeSet::new();
        if !out.contains(&txid) {
            stage.insert(txid);
        }
        while let Some(current) = stage.pop_first() {
            out.insert(current);
            if let Some(links) = self.links.get(&current) {
                for child in &links.children {
                    if !out.contains(child) {
                        stage.insert(*child);
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Aggregate maintenance
    // ------------------------------------------------------------------

    /// Add or subtract `txid`'s size, fee, and count in every ancestor's
    /// descendant state. Also mirrors the direct parent -> child edges.
    fn update_ancestors_of(&mut self, add: bool, txid: Hash256, ancestors: &BTreeSet<Hash256>) {
        let parents = self
            .links
            .get(&txid)
            .map(|l| l.parents.clone())
            .unwrap_or_default();
        for parent in parents {
            self.update_child(parent, txid, add);
        }

        let Some(entry) = self.map.get(&txid) else {
            return;
        };
        let (size_delta, fee_delta, count_delta) = if add {
            (entry.vsize() as i64, entry.modified_fee(), 1)
        } else {
            (-(entry.vsize() as i64), -entry.modified_fee(), -1)
        };
        for ancestor in ancestors {
            self.modify_entry(ancestor, |e| {
                e.update_descendant_state(size_delta, fee_delta, count_delta)
            });
        }
    }

    /// Recompute `txid`'s ancestor totals from a freshly calculated set.
    fn update_entry_for_ancestors(&mut self, txid: Hash256, ancestors: &BTreeSet<Hash256>) {
        let Some(entry) = self.map.get(&txid) else {
            return;
        };
        let mut count = 1u64;
        let mut size = entry.vsize();
        let mut fees = entry.modified_fee();
        for ancestor in ancestors {
            if let Some(a) = self.map.get(ancestor) {
                count += 1;
                size += a.vsize();
                fees += a.modified_fee();
            }
        }
        self.modify_entry(&txid, |e| e.set_ancestor_state(count, size, fees));
    }

    /// Insert an entry whose policy checks already passed. `ancestors` is
    /// the candidate's transitive in-pool ancestor set (excluding itself).
    pub(crate) fn add_unchecked(&mut self, mut entry: TxEntry, ancestors: &BTreeSet<Hash256>) {
        let txid = entry.txid();

        // A delta stored before the transaction arrived applies immediately.
        if let Some(&delta) = self.deltas.get(&txid) {
            entry.update_fee_delta(delta);
        }

        self.total_tx_size += entry.vsize();
        self.cached_inner_usage += entry.dynamic_usage();
        for input in &entry.tx().inputs {
            self.spent_by.insert(input.previous_output.clone(), txid);
        }

        let parents: BTreeSet<Hash256> = entry
            .tx()
            .inputs
            .iter()
            .filter_map(|i| {
                let parent = i.previous_output.txid;
                self.map.contains_key(&parent).then_some(parent)
            })
            .collect();

        let tx = Arc::clone(entry.tx());
        self.index.insert(&entry);
        self.map.insert(txid, entry);
        self.links.insert(txid, TxLinks::default());

        for parent in &parents {
            self.update_parent(txid, *parent, true);
        }
        self.update_ancestors_of(true, txid, ancestors);
        self.update_entry_for_ancestors(txid, ancestors);

        self.transactions_updated += 1;
        self.pending_events.push_back(MempoolEvent::Added(tx));
    }

    /// Prepare a set of entries for removal: fix aggregates while the link
    /// graph is still intact, then sever the edges crossing the boundary.
    ///
    /// `to_remove` must be closed under descendants except for
    /// block-inclusion removal, where `update_descendants` recomputes the
    /// ancestor state of surviving descendants instead.
    fn update_for_remove_from_mempool(
        &mut self,
        to_remove: &BTreeSet<Hash256>,
        update_descendants: bool,
    ) {
        if update_descendants {
            for txid in to_remove {
                let mut descendants = BTreeSet::new();
                self.calculate_descendants(*txid, &mut descendants);
                descendants.remove(txid);

                let Some(entry) = self.map.get(txid) else {
                    continue;
                };
                let (size, fees) = (entry.vsize() as i64, entry.modified_fee());
                for descendant in descendants {
                    if !to_remove.contains(&descendant) {
                        self.modify_entry(&descendant, |e| {
                            e.update_ancestor_state(-size, -fees, -1)
                        });
                    }
                }
            }
        }

        // Aggregates first: the ancestor walk needs every member's links.
        for txid in to_remove {
            let ancestors = self.calculate_entry_ancestors(txid);
            let surviving: BTreeSet<Hash256> =
                ancestors.difference(to_remove).copied().collect();
            self.update_ancestors_of(false, *txid, &surviving);
        }

        // Sever the child -> parent edges pointing into the removed set.
        for txid in to_remove {
            let children = self
                .links
                .get(txid)
                .map(|l| l.children.clone())
                .unwrap_or_default();
            for child in children {
                self.update_parent(child, *txid, false);
            }
        }
    }

    /// Drop one entry from every container. Aggregates and boundary links
    /// must already have been fixed by `update_for_remove_from_mempool`.
    fn remove_unchecked(&mut self, txid: Hash256, reason: RemovalReason) {
        let Some(entry) = self.map.remove(&txid) else {
            return;
        };
        for input in &entry.tx().inputs {
            self.spent_by.remove(&input.previous_output);
        }
        self.index.remove(&entry);
        if let Some(links) = self.links.remove(&txid) {
            self.cached_inner_usage -=
                (links.parents.len() + links.children.len()) * LINK_COST;
        }
        self.total_tx_size -= entry.vsize();
        self.cached_inner_usage -= entry.dynamic_usage();
        self.transactions_updated += 1;
        self.pending_events
            .push_back(MempoolEvent::Removed(Arc::clone(entry.tx()), reason));
    }

    /// Remove a staged set atomically with link and aggregate cleanup.
    pub(crate) fn remove_staged(
        &mut self,
        stage: &BTreeSet<Hash256>,
        update_descendants: bool,
        reason: RemovalReason,
    ) {
        self.update_for_remove_from_mempool(stage, update_descendants);
        for txid in stage {
            self.remove_unchecked(*txid, reason);
        }
    }

    /// Remove a transaction and all in-pool descendants. Also covers the
    /// case where `tx` itself is not in the pool but spenders of its
    /// outputs are.
    pub(crate) fn remove_recursive(
        &mut self,
        tx: &Transaction,
        reason: RemovalReason,
    ) -> Result<usize, MempoolError> {
        let txid = tx
            .txid()
            .map_err(|e| MempoolError::Internal(e.to_string()))?;
        let mut stage = BTreeSet::new();
        if self.map.contains_key(&txid) {
            self.calculate_descendants(txid, &mut stage);
        } else {
            for index in 0..tx.outputs.len() as u64 {
                if let Some(child) = self.spender_of(&OutPoint { txid, index }) {
                    self.calculate_descendants(child, &mut stage);
                }
            }
        }
        let removed = stage.len();
        self.remove_staged(&stage, false, reason);
        Ok(removed)
    }

    /// Remove pool entries that double-spend an input of `tx`.
    pub(crate) fn remove_conflicts(&mut self, tx: &Transaction) -> Result<usize, MempoolError> {
        let txid = tx
            .txid()
            .map_err(|e| MempoolError::Internal(e.to_string()))?;
        let mut removed = 0;
        for input in &tx.inputs {
            let Some(conflict) = self.spender_of(&input.previous_output) else {
                continue;
            };
            if conflict == txid || !self.map.contains_key(&conflict) {
                continue;
            }
            let conflict_tx = self
                .map
                .get(&conflict)
                .map(|e| Arc::clone(e.tx()))
                .expect("spent-by index references entry missing from the pool");
            removed += self.remove_recursive(&conflict_tx, RemovalReason::Conflict)?;
        }
        Ok(removed)
    }

    /// Process a connected block: drop confirmed entries (recomputing the
    /// ancestor state of their surviving children), evict conflicting
    /// spends, clear their prioritisation, and unfreeze rolling-fee decay.
    ///
    /// Returns the confirmed entries' snapshots for the fee estimator.
    pub(crate) fn remove_for_block(
        &mut self,
        block_txs: &[Transaction],
        now: u64,
    ) -> Result<Vec<TxMempoolInfo>, MempoolError> {
        let mut confirmed = Vec::new();
        for tx in block_txs {
            let txid = tx
                .txid()
                .map_err(|e| MempoolError::Internal(e.to_string()))?;
            if let Some(entry) = self.map.get(&txid) {
                confirmed.push(entry.info());
                let stage = BTreeSet::from([txid]);
                self.remove_staged(&stage, true, RemovalReason::Block);
            }
            self.remove_conflicts(tx)?;
            self.deltas.remove(&txid);
        }
        self.rolling_fee.on_block(now);
        Ok(confirmed)
    }

    // ------------------------------------------------------------------
    // Reorg reconciliation
    // ------------------------------------------------------------------

    /// After reorg replay, absorb the in-pool children the bulk insert could
    /// not see. `hashes` are the txids reinserted from disconnected blocks,
    /// in block order; they are processed newest-first so each entry's
    /// descendants are already self-consistent when its turn comes.
    pub(crate) fn update_transactions_from_block(&mut self, hashes: &[Hash256]) {
        let exclude: HashSet<Hash256> = hashes.iter().copied().collect();
        let mut cached_descendants: HashMap<Hash256, BTreeSet<Hash256>> = HashMap::new();

        for txid in hashes.iter().rev() {
            if !self.map.contains_key(txid) {
                continue;
            }
            // Spenders of this entry's outputs are its missed children.
            let from = OutPoint { txid: *txid, index: 0 };
            let to = OutPoint { txid: *txid, index: u64::MAX };
            let children: Vec<Hash256> =
                self.spent_by.range(from..=to).map(|(_, c)| *c).collect();
            for child in children {
                if self.map.contains_key(&child) {
                    self.update_child(*txid, child, true);
                    self.update_parent(child, *txid, true);
                }
            }
            self.update_for_descendants(*txid, &mut cached_descendants, &exclude);
        }
    }

    /// Fold the full descendant closure of `txid` into its descendant state
    /// and add `txid` to each such descendant's ancestor state. Descendants
    /// in `exclude` were reinserted after `txid` and already account for it.
    fn update_for_descendants(
        &mut self,
        txid: Hash256,
        cached_descendants: &mut HashMap<Hash256, BTreeSet<Hash256>>,
        exclude: &HashSet<Hash256>,
    ) {
        let mut stage: BTreeSet<Hash256> = self
            .links
            .get(&txid)
            .map(|l| l.children.clone())
            .unwrap_or_default();
        let mut all: BTreeSet<Hash256> = BTreeSet::new();

        while let Some(current) = stage.pop_first() {
            if !all.insert(current) {
                continue;
            }
            if let Some(cached) = cached_descendants.get(&current) {
                // Everything below this point was walked before.
                all.extend(cached.iter().copied());
            } else if let Some(links) = self.links.get(&current) {
                for child in &links.children {
                    if !all.contains(child) {
                        stage.insert(*child);
                    }
                }
            }
        }

        let Some(entry) = self.map.get(&txid) else {
            return;
        };
        let (self_size, self_fees) = (entry.vsize() as i64, entry.modified_fee());

        let mut delta_size = 0i64;
        let mut delta_fees = 0i64;
        let mut delta_count = 0i64;
        for descendant in &all {
            if exclude.contains(descendant) {
                continue;
            }
            let Some(d) = self.map.get(descendant) else {
                continue;
            };
            delta_size += d.vsize() as i64;
            delta_fees += d.modified_fee();
            delta_count += 1;
            self.modify_entry(descendant, |e| {
                e.update_ancestor_state(self_size, self_fees, 1)
            });
        }
        self.modify_entry(&txid, |e| {
            e.update_descendant_state(delta_size, delta_fees, delta_count)
        });
        cached_descendants.insert(txid, all);
    }

    /// After the tip retreats, drop entries whose locks or coinbase spends
    /// are no longer valid, together with their descendants.
    pub(crate) fn remove_for_reorg(
        &mut self,
        coins: &dyn CoinsView,
        chain: &dyn ChainView,
    ) -> usize {
        let next_height = chain.tip_height() + 1;
        let next_mtp = chain.median_time_past();
        let tip_hash = chain.tip_hash();

        let mut invalid: BTreeSet<Hash256> = BTreeSet::new();
        let mut refreshed_locks = Vec::new();

        for (txid, entry) in &self.map {
            let tx = entry.tx();
            let mut keep = tx.is_final_at(next_height, next_mtp);

            if keep {
                if entry.lock_points().is_valid_for(tip_hash) {
                    keep = entry.lock_points().is_final_at(next_height, next_mtp);
                } else {
                    match self.resolve_input_heights(tx, coins, next_height) {
                        Some(heights) => {
                            let lp = calculate_lock_points(tx, &heights, chain);
                            keep = lp.is_final_at(next_height, next_mtp);
                            if keep {
                                refreshed_locks.push((*txid, lp));
                            }
                        }
                        // An input vanished with the disconnected block.
                        None => keep = false,
                    }
                }
            }

            if keep {
                let immature_spend = tx.inputs.iter().any(|input| {
                    if self.map.contains_key(&input.previous_output.txid) {
                        return false;
                    }
                    coins
                        .get_coin(&input.previous_output)
                        .is_some_and(|coin| !coin.is_mature(next_height))
                });
                keep = !immature_spend;
            }

            if !keep {
                invalid.insert(*txid);
            }
        }

        // Lock points cache no ordering fields, so no rekey is needed.
        for (txid, lp) in refreshed_locks {
            if let Some(entry) = self.map.get_mut(&txid) {
                entry.update_lock_points(lp);
            }
        }

        let mut stage = BTreeSet::new();
        for txid in invalid {
            self.calculate_descendants(txid, &mut stage);
        }
        let removed = stage.len();
        self.remove_staged(&stage, false, RemovalReason::Reorg);
        removed
    }

    /// Height of the coin spent by each input: confirmed coins report their
    /// block, in-pool parents the next block height. `None` if any input is
    /// unavailable.
    pub(crate) fn resolve_input_heights(
        &self,
        tx: &Transaction,
        coins: &dyn CoinsView,
        next_height: u64,
    ) -> Option<Vec<u64>> {
        tx.inputs
            .iter()
            .map(|input| {
                if self.map.contains_key(&input.previous_output.txid) {
                    Some(next_height)
                } else {
                    coins.get_coin(&input.previous_output).map(|c| c.height)
                }
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Eviction, expiry, minimum fee
    // ------------------------------------------------------------------

    /// Evict lowest-scored packages until dynamic usage fits `limit`,
    /// raising the rolling fee floor past each evicted package.
    ///
    /// `no_spends_remaining`, if provided, collects outpoints that no longer
    /// have any in-pool spender and whose creating transaction is not in the
    /// pool either.
    pub(crate) fn trim_to_size(
        &mut self,
        limit: usize,
        mut no_spends_remaining: Option<&mut Vec<OutPoint>>,
    ) {
        let mut max_rate_evicted = FeeRate::ZERO;

        while self.dynamic_memory_usage() > limit {
            let Some(worst) = self.index.worst_descendant_score() else {
                break;
            };
            let Some(entry) = self.map.get(&worst) else {
                break;
            };
            let package_rate = FeeRate::from_fee_and_size(
                entry.mod_fees_with_descendants().max(0) as u64,
                entry.size_with_descendants(),
            )
            .saturating_add(self.config.incremental_relay_fee);
            self.rolling_fee.track_package_removed(package_rate);
            max_rate_evicted = max_rate_evicted.max(package_rate);

            let mut stage = BTreeSet::new();
            self.calculate_descendants(worst, &mut stage);

            let staged_txs: Vec<Arc<Transaction>> = if no_spends_remaining.is_some() {
                stage
                    .iter()
                    .filter_map(|txid| self.map.get(txid).map(|e| Arc::clone(e.tx())))
                    .collect()
            } else {
                Vec::new()
            };

            self.remove_staged(&stage, false, RemovalReason::SizeLimit);

            if let Some(out) = no_spends_remaining.as_deref_mut() {
                for tx in &staged_txs {
                    for input in &tx.inputs {
                        if !self.exists(&input.previous_output.txid)
                            && !self.is_spent(&input.previous_output)
                        {
                            out.push(input.previous_output.clone());
                        }
                    }
                }
            }
        }

        if max_rate_evicted > FeeRate::ZERO {
            debug!(
                floor = %max_rate_evicted,
                usage = self.dynamic_memory_usage(),
                "trimmed mempool to size limit"
            );
        }
    }

    /// Remove every entry accepted before `cutoff`, with descendants.
    /// Returns how many entries were removed.
    pub(crate) fn expire(&mut self, cutoff: u64) -> usize {
        let seeds = self.index.entries_older_than(cutoff);
        let mut stage = BTreeSet::new();
        for txid in seeds {
            self.calculate_descendants(txid, &mut stage);
        }
        let removed = stage.len();
        self.remove_staged(&stage, false, RemovalReason::Expiry);
        removed
    }

    pub(crate) fn min_fee(&mut self, size_limit: usize, now: u64) -> FeeRate {
        let usage = self.dynamic_memory_usage();
        let incremental = self.config.incremental_relay_fee;
        self.rolling_fee.min_fee(incremental, size_limit, usage, now)
    }

    // ------------------------------------------------------------------
    // Prioritisation
    // ------------------------------------------------------------------

    /// Accumulate `delta` for `txid` and, if the entry is present, push the
    /// change through both aggregate families.
    pub(crate) fn prioritise(&mut self, txid: Hash256, delta: i64) {
        let total = {
            let slot = self.deltas.entry(txid).or_insert(0);
            *slot += delta;
            *slot
        };
        self.propagate_delta(txid, delta, total);
        info!(%txid, delta, total, "prioritised transaction");
    }

    /// Drop the stored delta and undo its effect on a present entry.
    pub(crate) fn clear_prioritisation(&mut self, txid: Hash256) {
        if let Some(total) = self.deltas.remove(&txid) {
            if total != 0 {
                self.propagate_delta(txid, -total, 0);
            }
        }
    }

    fn propagate_delta(&mut self, txid: Hash256, increment: i64, new_total: i64) {
        if !self.map.contains_key(&txid) {
            return;
        }
        self.modify_entry(&txid, |e| e.update_fee_delta(new_total));

        let ancestors = self.calculate_entry_ancestors(&txid);
        for ancestor in ancestors {
            self.modify_entry(&ancestor, |e| e.update_descendant_state(0, increment, 0));
        }

        let mut descendants = BTreeSet::new();
        self.calculate_descendants(txid, &mut descendants);
        descendants.remove(&txid);
        for descendant in descendants {
            self.modify_entry(&descendant, |e| e.update_ancestor_state(0, increment, 0));
        }
        self.transactions_updated += 1;
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Whether none of `tx`'s inputs spend an in-pool output.
    pub(crate) fn has_no_inputs_of(&self, tx: &Transaction) -> bool {
        !tx.inputs
            .iter()
            .any(|i| self.map.contains_key(&i.previous_output.txid))
    }

    /// Txids ordered by dependency depth (fewest ancestors first), then by
    /// mining score best first.
    pub(crate) fn sorted_by_depth_and_score(&self) -> Vec<Hash256> {
        let mut entries: Vec<&TxEntry> = self.map.values().collect();
        entries.sort_by(|a, b| {
            a.count_with_ancestors()
                .cmp(&b.count_with_ancestors())
                .then_with(|| MiningScoreKey::cmp_entries_desc(a, b))
        });
        entries.iter().map(|e| e.txid()).collect()
    }

    pub(crate) fn eviction_order(&self) -> Vec<Hash256> {
        // Lowest descendant score first; mirrors trim_to_size's pick order.
        self.index.descendant_order()
    }

    pub(crate) fn mining_order(&self) -> Vec<Hash256> {
        let mut order: Vec<Hash256> = self.index.by_mining_score().collect();
        order.reverse();
        order
    }

    pub(crate) fn ancestor_score_order(&self) -> Vec<Hash256> {
        let mut order: Vec<Hash256> = self.index.by_ancestor_score().collect();
        order.reverse();
        order
    }

    pub(crate) fn info_all(&self) -> Vec<TxMempoolInfo> {
        self.sorted_by_depth_and_score()
            .into_iter()
            .filter_map(|txid| self.map.get(&txid).map(|e| e.info()))
            .collect()
    }

    pub(crate) fn bump_transactions_updated(&mut self, n: u64) {
        self.transactions_updated += n;
    }

    pub(crate) fn transactions_updated(&self) -> u64 {
        self.transactions_updated
    }

    pub(crate) fn residual_deltas(&self) -> Vec<(Hash256, i64)> {
        let mut residual: Vec<(Hash256, i64)> = self
            .deltas
            .iter()
            .filter(|(txid, _)| !self.map.contains_key(txid))
            .map(|(txid, delta)| (*txid, *delta))
            .collect();
        residual.sort();
        residual
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
        self.index.clear();
        self.links.clear();
        self.spent_by.clear();
        self.deltas.clear();
        self.total_tx_size = 0;
        self.cached_inner_usage = 0;
        self.rolling_fee.reset(0);
        self.transactions_updated += 1;
    }

    pub(crate) fn take_events(&mut self) -> Vec<MempoolEvent> {
        self.pending_events.drain(..).collect()
    }

    // ------------------------------------------------------------------
    // Sanity checking
    // ------------------------------------------------------------------

    /// Sampled consistency check; frequency is a fraction of calls over
    /// 2^32, accumulated deterministically.
    pub(crate) fn maybe_check(&mut self, coins: &dyn CoinsView) {
        if self.config.check_frequency == 0 {
            return;
        }
        self.check_credit += self.config.check_frequency as u64;
        if self.check_credit >= 1 << 32 {
            self.check_credit -= 1 << 32;
            self.check(coins);
        }
    }

    /// Verify every structural invariant. Panics on violation: a pool that
    /// fails its own bookkeeping must not keep running.
    pub(crate) fn check(&self, coins: &dyn CoinsView) {
        assert!(
            self.index.is_consistent(self.map.len()),
            "secondary orderings out of step with the primary map"
        );

        let mut recomputed_size = 0u64;
        let mut recomputed_usage = 0usize;
        let mut spent_count = 0usize;

        for (txid, entry) in &self.map {
            assert_eq!(*txid, entry.txid(), "entry stored under wrong txid");
            recomputed_size += entry.vsize();
            recomputed_usage += entry.dynamic_usage();

            let links = self.links.get(txid).expect("entry missing from link graph");
            recomputed_usage += (links.parents.len() + links.children.len()) * LINK_COST;

            // Reflexivity of the link graph.
            for parent in &links.parents {
                let parent_links = self
                    .links
                    .get(parent)
                    .expect("parent missing from link graph");
                assert!(
                    parent_links.children.contains(txid),
                    "parent {parent} does not list {txid} as child"
                );
            }
            for child in &links.children {
                let child_links = self
                    .links
                    .get(child)
                    .expect("child missing from link graph");
                assert!(
                    child_links.parents.contains(txid),
                    "child {child} does not list {txid} as parent"
                );
            }

            // Inputs: every spend is indexed, in-pool parents are linked,
            // everything else must be a confirmed coin.
            for input in &entry.tx().inputs {
                spent_count += 1;
                assert_eq!(
                    self.spent_by.get(&input.previous_output),
                    Some(txid),
                    "spent-output index disagrees for {}",
                    input.previous_output
                );
                let parent = input.previous_output.txid;
                if self.map.contains_key(&parent) {
                    assert!(
                        links.parents.contains(&parent),
                        "in-pool parent {parent} not linked from {txid}"
                    );
                } else {
                    assert!(
                        coins.have_coin(&input.previous_output),
                        "input {} of {txid} is neither in-pool nor confirmed",
                        input.previous_output
                    );
                }
            }

            // Aggregates match a fresh walk.
            let mut descendants = BTreeSet::new();
            self.calculate_descendants(*txid, &mut descendants);
            let (mut d_count, mut d_size, mut d_fees) = (0u64, 0u64, 0i64);
            for d in &descendants {
                let de = self.map.get(d).expect("descendant missing from the pool");
                d_count += 1;
                d_size += de.vsize();
                d_fees += de.modified_fee();
            }
            assert_eq!(entry.count_with_descendants(), d_count, "descendant count of {txid}");
            assert_eq!(entry.size_with_descendants(), d_size, "descendant size of {txid}");
            assert_eq!(entry.mod_fees_with_descendants(), d_fees, "descendant fees of {txid}");

            let ancestors = self.calculate_entry_ancestors(txid);
            assert!(!ancestors.contains(txid), "cycle: {txid} is its own ancestor");
            let (mut a_count, mut a_size, mut a_fees) = (1u64, entry.vsize(), entry.modified_fee());
            for a in &ancestors {
                let ae = self.map.get(a).expect("ancestor missing from the pool");
                a_count += 1;
                a_size += ae.vsize();
                a_fees += ae.modified_fee();
            }
            assert_eq!(entry.count_with_ancestors(), a_count, "ancestor count of {txid}");
            assert_eq!(entry.size_with_ancestors(), a_size, "ancestor size of {txid}");
            assert_eq!(entry.mod_fees_with_ancestors(), a_fees, "ancestor fees of {txid}");
        }

        assert_eq!(self.total_tx_size, recomputed_size, "total size drifted");
        assert_eq!(self.cached_inner_usage, recomputed_usage, "usage accounting drifted");
        assert_eq!(self.spent_by.len(), spent_count, "spent-output index size drifted");
    }
}

/// The shared transaction pool.
///
/// One mutual-exclusion lock guards all state; every public operation holds
/// it for its full duration. Notifications are queued while the lock is
/// held and dispatched by whoever calls [`Mempool::drain_events`] afterwards,
/// so listeners never run under the pool lock.
pub struct Mempool {
    pub(crate) inner: Mutex<PoolInner>,
    pub(crate) estimator: Option<Arc<dyn crate::estimator::FeeEstimator>>,
}

impl Mempool {
    /// Create a pool with the given policy configuration.
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            inner: Mutex::new(PoolInner::new(config)),
            estimator: None,
        }
    }

    /// Create a pool that notifies `estimator` about activity.
    pub fn with_estimator(
        config: MempoolConfig,
        estimator: Arc<dyn crate::estimator::FeeEstimator>,
    ) -> Self {
        Self {
            inner: Mutex::new(PoolInner::new(config)),
            estimator: Some(estimator),
        }
    }

    // --- Point queries ---

    pub fn exists(&self, txid: &Hash256) -> bool {
        self.inner.lock().exists(txid)
    }

    /// The transaction body, if present.
    pub fn get(&self, txid: &Hash256) -> Option<Arc<Transaction>> {
        self.inner.lock().entry(txid).map(|e| Arc::clone(e.tx()))
    }

    /// Snapshot of one entry.
    pub fn info(&self, txid: &Hash256) -> Option<TxMempoolInfo> {
        self.inner.lock().entry(txid).map(|e| e.info())
    }

    /// Snapshots of every entry, ordered by dependency depth then mining
    /// score.
    pub fn info_all(&self) -> Vec<TxMempoolInfo> {
        self.inner.lock().info_all()
    }

    /// All txids, ordered by dependency depth then mining score.
    pub fn query_hashes(&self) -> Vec<Hash256> {
        self.inner.lock().sorted_by_depth_and_score()
    }

    /// Relative order of two pool entries by depth and score. `None` when
    /// either is absent.
    pub fn compare_depth_and_score(
        &self,
        a: &Hash256,
        b: &Hash256,
    ) -> Option<std::cmp::Ordering> {
        let inner = self.inner.lock();
        let ea = inner.entry(a)?;
        let eb = inner.entry(b)?;
        Some(
            ea.count_with_ancestors()
                .cmp(&eb.count_with_ancestors())
                .then_with(|| MiningScoreKey::cmp_entries_desc(ea, eb)),
        )
    }

    /// Whether an outpoint is spent by a pool transaction.
    pub fn is_spent(&self, outpoint: &OutPoint) -> bool {
        self.inner.lock().is_spent(outpoint)
    }

    /// The in-pool spender of an outpoint, if any.
    pub fn spender_of(&self, outpoint: &OutPoint) -> Option<Hash256> {
        self.inner.lock().spender_of(outpoint)
    }

    /// Whether none of `tx`'s inputs depend on pool transactions, i.e. it
    /// could be mined without any of them.
    pub fn has_no_inputs_of(&self, tx: &Transaction) -> bool {
        self.inner.lock().has_no_inputs_of(tx)
    }

    /// Direct in-pool parents of an entry.
    pub fn parents_of(&self, txid: &Hash256) -> Option<Vec<Hash256>> {
        self.inner
            .lock()
            .direct_parents(txid)
            .map(|s| s.iter().copied().collect())
    }

    /// Direct in-pool children of an entry.
    pub fn children_of(&self, txid: &Hash256) -> Option<Vec<Hash256>> {
        self.inner
            .lock()
            .direct_children(txid)
            .map(|s| s.iter().copied().collect())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of all entries' virtual sizes.
    pub fn total_tx_size(&self) -> u64 {
        self.inner.lock().total_tx_size()
    }

    /// Approximate heap footprint of the pool.
    pub fn dynamic_memory_usage(&self) -> usize {
        self.inner.lock().dynamic_memory_usage()
    }

    /// Monotone mutation counter; miners poll it to notice stale templates.
    pub fn transactions_updated(&self) -> u64 {
        self.inner.lock().transactions_updated()
    }

    /// Bump the mutation counter without changing the pool.
    pub fn add_transactions_updated(&self, n: u64) {
        self.inner.lock().bump_transactions_updated(n);
    }

    /// False iff the transaction is in the pool and its ancestor or
    /// descendant count exceeds `chain_limit`.
    pub fn transaction_within_chain_limit(&self, txid: &Hash256, chain_limit: u64) -> bool {
        let inner = self.inner.lock();
        match inner.entry(txid) {
            Some(e) => {
                e.count_with_ancestors() <= chain_limit
                    && e.count_with_descendants() <= chain_limit
            }
            None => true,
        }
    }

    /// Txids in eviction order: lowest descendant score first.
    pub fn eviction_order(&self) -> Vec<Hash256> {
        self.inner.lock().eviction_order()
    }

    /// Txids in block-construction order: best mining score first.
    pub fn mining_order(&self) -> Vec<Hash256> {
        self.inner.lock().mining_order()
    }

    /// Txids by ancestor score, best first.
    pub fn ancestor_score_order(&self) -> Vec<Hash256> {
        self.inner.lock().ancestor_score_order()
    }

    // --- Removal surface ---

    /// Remove a transaction and all descendants. Handles the
    /// not-in-pool-but-spent case that arises during reorgs.
    pub fn remove_recursive(
        &self,
        tx: &Transaction,
        reason: RemovalReason,
    ) -> Result<usize, MempoolError> {
        self.inner.lock().remove_recursive(tx, reason)
    }

    /// Process a connected block's transactions at `height`, observed at
    /// wall-clock `now`.
    pub fn remove_for_block(
        &self,
        block_txs: &[Transaction],
        height: u64,
        now: u64,
    ) -> Result<usize, MempoolError> {
        let confirmed = self.inner.lock().remove_for_block(block_txs, now)?;
        let removed = confirmed.len();
        if removed > 0 {
            debug!(height, removed, "removed confirmed transactions from pool");
        }
        if let Some(estimator) = &self.estimator {
            estimator.process_block(height, &confirmed);
        }
        Ok(removed)
    }

    /// Revalidate every entry's locks against a retreated tip, removing
    /// failures with their descendants. Returns how many entries were
    /// removed.
    pub fn remove_for_reorg(&self, coins: &dyn CoinsView, chain: &dyn ChainView) -> usize {
        let removed = self.inner.lock().remove_for_reorg(coins, chain);
        if removed > 0 {
            info!(removed, "removed entries invalidated by reorg");
        }
        removed
    }

    /// Reconcile graph state after reinserting `hashes` from disconnected
    /// blocks; see [`Mempool::update_mempool_for_reorg`] for the full flow.
    pub fn update_transactions_from_block(&self, hashes: &[Hash256]) {
        self.inner.lock().update_transactions_from_block(hashes);
    }

    /// Evict until dynamic usage fits `limit`; see
    /// [`PoolInner::trim_to_size`] internals for floor-fee behaviour.
    pub fn trim_to_size(&self, limit: usize, no_spends_remaining: Option<&mut Vec<OutPoint>>) {
        self.inner.lock().trim_to_size(limit, no_spends_remaining);
    }

    /// Remove entries accepted before `cutoff` (with descendants); returns
    /// the count removed.
    pub fn expire(&self, cutoff: u64) -> usize {
        let removed = self.inner.lock().expire(cutoff);
        if removed > 0 {
            debug!(removed, cutoff, "expired stale mempool entries");
        }
        removed
    }

    /// Drop everything, including prioritisation and the fee floor.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    // --- Fees and prioritisation ---

    /// The admission fee floor at wall-clock `now`, given the configured
    /// pool size limit.
    pub fn get_min_fee(&self, size_limit: usize, now: u64) -> FeeRate {
        self.inner.lock().min_fee(size_limit, now)
    }

    /// Adjust the mining priority of a transaction by `delta` sables. The
    /// adjustment survives the transaction leaving (or never entering) the
    /// pool.
    pub fn prioritise_transaction(&self, txid: Hash256, delta: i64) {
        self.inner.lock().prioritise(txid, delta);
    }

    /// Remove a stored priority delta, undoing its effect on a present
    /// entry.
    pub fn clear_prioritisation(&self, txid: Hash256) {
        self.inner.lock().clear_prioritisation(txid);
    }

    /// The currently stored priority delta for a transaction.
    pub fn apply_delta(&self, txid: &Hash256) -> i64 {
        self.inner.lock().apply_delta(txid)
    }

    // --- Events and checking ---

    /// Drain queued notifications. Call after every batch of operations,
    /// outside any caller-side locking.
    pub fn drain_events(&self) -> Vec<MempoolEvent> {
        self.inner.lock().take_events()
    }

    /// Run the full consistency check unconditionally. Panics on violation.
    pub fn check(&self, coins: &dyn CoinsView) {
        self.inner.lock().check(coins);
    }
}

/// A coins view that overlays unconfirmed pool outputs on a base view.
///
/// Spent outpoints are *not* hidden: acceptance and replacement need every
/// candidate coin visible to check signatures, and double-spends are policed
/// by the pool's own spent-output index instead.
pub struct CoinsViewMemPool<'a> {
    base: &'a dyn CoinsView,
    mempool: &'a Mempool,
}

impl<'a> CoinsViewMemPool<'a> {
    pub fn new(base: &'a dyn CoinsView, mempool: &'a Mempool) -> Self {
        Self { base, mempool }
    }
}

impl CoinsView for CoinsViewMemPool<'_> {
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.mempool
            .inner
            .lock()
            .pool_coin(outpoint)
            .or_else(|| self.base.get_coin(outpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accept::AcceptOptions;
    use crate::config::MempoolConfig;
    use sable_core::coins::MemoryCoinsView;
    use sable_core::constants::{COIN, SEQUENCE_FINAL};
    use sable_core::traits::{AcceptAllVerifier, StaticChainView};
    use sable_core::types::{TxInput, TxOutput};

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn chain() -> StaticChainView {
        StaticChainView {
            height: 100,
            hash: Hash256([0xAA; 32]),
            median_time_past: 1_700_000_000,
        }
    }

    /// Coins view with twenty 100-SABLE coins at `([seed; 32], 0)`.
    fn coins() -> MemoryCoinsView {
        let mut view = MemoryCoinsView::new();
        for seed in 1u8..=20 {
            view.add_coin(
                OutPoint { txid: Hash256([seed; 32]), index: 0 },
                Coin {
                    output: TxOutput { value: 100 * COIN, pubkey_hash: Hash256::ZERO },
                    height: 1,
                    is_coinbase: false,
                },
            );
        }
        view
    }

    fn spend(outpoints: &[(Hash256, u64)], total_out: u64) -> Transaction {
        Transaction {
            version: 2,
            inputs: outpoints
                .iter()
                .map(|(txid, index)| TxInput {
                    previous_output: OutPoint { txid: *txid, index: *index },
                    signature: vec![0; 64],
                    public_key: vec![0; 32],
                    sequence: SEQUENCE_FINAL,
                })
                .collect(),
            outputs: vec![
                TxOutput { value: total_out / 2, pubkey_hash: Hash256::ZERO },
                TxOutput { value: total_out - total_out / 2, pubkey_hash: Hash256::ZERO },
            ],
            lock_time: 0,
        }
    }

    /// Build a spend of `outpoints` paying exactly `fee`, resolving input
    /// values through the pool overlay.
    fn spend_fee(
        pool: &Mempool,
        view: &MemoryCoinsView,
        outpoints: &[(Hash256, u64)],
        fee: u64,
    ) -> Transaction {
        let overlay = CoinsViewMemPool::new(view, pool);
        let total: u64 = outpoints
            .iter()
            .map(|(txid, index)| {
                overlay
                    .get_coin(&OutPoint { txid: *txid, index: *index })
                    .expect("test outpoint must resolve")
                    .output
                    .value
            })
            .sum();
        spend(outpoints, total - fee)
    }

    fn accept(pool: &Mempool, coins: &MemoryCoinsView, tx: Transaction) -> Hash256 {
        let opts = AcceptOptions { accept_time: 1000, ..AcceptOptions::default() };
        pool.accept_to_pool(tx, coins, &chain(), &AcceptAllVerifier, &opts)
            .expect("acceptance should succeed")
            .txid
    }

    fn accept_at(pool: &Mempool, coins: &MemoryCoinsView, tx: Transaction, time: u64) -> Hash256 {
        let opts = AcceptOptions { accept_time: time, ..AcceptOptions::default() };
        pool.accept_to_pool(tx, coins, &chain(), &AcceptAllVerifier, &opts)
            .expect("acceptance should succeed")
            .txid
    }

    fn checked_pool() -> Mempool {
        Mempool::new(MempoolConfig::with_full_checks())
    }

    // ------------------------------------------------------------------
    // Aggregates on a chain
    // ------------------------------------------------------------------

    #[test]
    fn chain_acceptance_updates_descendant_state() {
        let view = coins();
        let pool = checked_pool();

        let parent_tx = spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000);
        let a = accept(&pool, &view, parent_tx);
        let child_tx = spend_fee(&pool, &view, &[(a, 0)], 20_000);
        let b = accept(&pool, &view, child_tx);

        let info_a = pool.info(&a).unwrap();
        let info_b = pool.info(&b).unwrap();

        assert_eq!(info_a.descendant_count, 2);
        assert_eq!(info_a.descendant_size, info_a.vsize + info_b.vsize);
        assert_eq!(info_a.descendant_fees, 30_000);
        assert_eq!(info_a.ancestor_count, 1);

        assert_eq!(info_b.ancestor_count, 2);
        assert_eq!(info_b.ancestor_size, info_a.vsize + info_b.vsize);
        assert_eq!(info_b.ancestor_fees, 30_000);
        assert_eq!(info_b.descendant_count, 1);

        assert_eq!(pool.parents_of(&b).unwrap(), vec![a]);
        assert_eq!(pool.children_of(&a).unwrap(), vec![b]);
        pool.check(&view);
    }

    #[test]
    fn diamond_counts_each_descendant_once() {
        let view = coins();
        let pool = checked_pool();

        // A pays two outputs; B and C each spend one; D spends one of each.
        let a = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000));
        let b = accept(&pool, &view, spend(&[(a, 0)], 40 * COIN));
        let c = accept(&pool, &view, spend(&[(a, 1)], 40 * COIN));
        let d = accept(&pool, &view, spend(&[(b, 0), (c, 0)], 30 * COIN));

        let info_a = pool.info(&a).unwrap();
        assert_eq!(info_a.descendant_count, 4, "D reached twice but counted once");

        let info_d = pool.info(&d).unwrap();
        assert_eq!(info_d.ancestor_count, 4, "A reached twice but counted once");
        pool.check(&view);
    }

    #[test]
    fn total_size_tracks_membership() {
        let view = coins();
        let pool = checked_pool();
        assert_eq!(pool.total_tx_size(), 0);

        let a = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000));
        let expected = pool.info(&a).unwrap().vsize;
        assert_eq!(pool.total_tx_size(), expected);

        let tx = (*pool.get(&a).unwrap()).clone();
        pool.remove_recursive(&tx, RemovalReason::Unknown).unwrap();
        assert_eq!(pool.total_tx_size(), 0);
        assert_eq!(pool.dynamic_memory_usage(), 0);
        pool.check(&view);
    }

    // ------------------------------------------------------------------
    // Removal paths
    // ------------------------------------------------------------------

    #[test]
    fn remove_recursive_takes_descendants() {
        let view = coins();
        let pool = checked_pool();

        let a = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000));
        let b = accept(&pool, &view, spend(&[(a, 0)], 40 * COIN));
        let _c = accept(&pool, &view, spend(&[(b, 0)], 30 * COIN));
        let other = accept(&pool, &view, spend(&[(Hash256([2; 32]), 0)], 100 * COIN - 10_000));

        let tx_a = (*pool.get(&a).unwrap()).clone();
        let removed = pool.remove_recursive(&tx_a, RemovalReason::Unknown).unwrap();
        assert_eq!(removed, 3);
        assert_eq!(pool.len(), 1);
        assert!(pool.exists(&other));
        pool.check(&view);
    }

    #[test]
    fn remove_recursive_of_absent_parent_sweeps_spenders() {
        let view = coins();
        let pool = checked_pool();

        let a = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000));
        let b = accept(&pool, &view, spend(&[(a, 0)], 40 * COIN));
        let tx_a = (*pool.get(&a).unwrap()).clone();

        // Drop A alone through the block path, then sweep by the absent tx.
        pool.remove_for_block(std::slice::from_ref(&tx_a), 101, 2000).unwrap();
        assert!(!pool.exists(&a));
        assert!(pool.exists(&b));

        let removed = pool.remove_recursive(&tx_a, RemovalReason::Reorg).unwrap();
        assert_eq!(removed, 1);
        assert!(!pool.exists(&b));
        pool.check(&view);
    }

    #[test]
    fn block_removal_recomputes_child_ancestors() {
        let view = coins();
        let pool = checked_pool();

        let a = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000));
        let b = accept(&pool, &view, spend(&[(a, 0)], 40 * COIN));
        assert_eq!(pool.info(&b).unwrap().ancestor_count, 2);

        let tx_a = (*pool.get(&a).unwrap()).clone();
        let removed = pool.remove_for_block(std::slice::from_ref(&tx_a), 101, 2000).unwrap();
        assert_eq!(removed, 1);

        // B survives with its ancestor state shrunk back to itself.
        let info_b = pool.info(&b).unwrap();
        assert_eq!(info_b.ancestor_count, 1);
        assert_eq!(info_b.ancestor_size, info_b.vsize);
        assert!(pool.parents_of(&b).unwrap().is_empty());
        pool.check(&view);
    }

    #[test]
    fn block_removal_evicts_conflicting_spends() {
        let view = coins();
        let pool = checked_pool();

        let a = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000));
        // A different transaction spending the same coin confirms instead.
        let mut rival = spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 20_000);
        rival.lock_time = 1; // distinct txid
        pool.remove_for_block(&[rival], 101, 2000).unwrap();

        assert!(!pool.exists(&a));
        assert!(pool.is_empty());
        pool.check(&view);
    }

    #[test]
    fn removal_reasons_flow_to_events() {
        let view = coins();
        let pool = checked_pool();

        let a = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000));
        let tx_a = (*pool.get(&a).unwrap()).clone();
        pool.drain_events();

        pool.remove_for_block(std::slice::from_ref(&tx_a), 101, 2000).unwrap();
        let events = pool.drain_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            MempoolEvent::Removed(tx, reason) => {
                assert_eq!(tx.txid().unwrap(), a);
                assert_eq!(*reason, RemovalReason::Block);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    // ------------------------------------------------------------------
    // Prioritisation
    // ------------------------------------------------------------------

    #[test]
    fn prioritise_propagates_through_aggregates() {
        let view = coins();
        let pool = checked_pool();

        let a = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000));
        let b_tx = spend_fee(&pool, &view, &[(a, 0)], 20_000);
        let b = accept(&pool, &view, b_tx);

        pool.prioritise_transaction(b, 7_000);
        assert_eq!(pool.apply_delta(&b), 7_000);

        let info_a = pool.info(&a).unwrap();
        let info_b = pool.info(&b).unwrap();
        assert_eq!(info_b.fee_delta, 7_000);
        assert_eq!(info_a.descendant_fees, 30_000 + 7_000);
        assert_eq!(info_b.ancestor_fees, 30_000 + 7_000);
        // The literal fee never moves.
        assert_eq!(info_b.fee, 20_000);
        pool.check(&view);

        pool.prioritise_transaction(a, -2_000);
        let info_a = pool.info(&a).unwrap();
        let info_b = pool.info(&b).unwrap();
        assert_eq!(info_a.fee_delta, -2_000);
        assert_eq!(info_a.descendant_fees, 35_000);
        assert_eq!(info_b.ancestor_fees, 35_000);
        pool.check(&view);
    }

    #[test]
    fn prioritise_then_inverse_restores_ordering() {
        let view = coins();
        let pool = checked_pool();

        let low = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 5_000));
        let high = accept(&pool, &view, spend(&[(Hash256([2; 32]), 0)], 100 * COIN - 50_000));
        let before = pool.eviction_order();
        assert_eq!(before, vec![low, high]);

        pool.prioritise_transaction(low, 200_000);
        assert_eq!(pool.eviction_order(), vec![high, low]);

        pool.prioritise_transaction(low, -200_000);
        assert_eq!(pool.eviction_order(), before);
        pool.check(&view);
    }

    #[test]
    fn delta_survives_absence_and_applies_on_accept() {
        let view = coins();
        let pool = checked_pool();

        let tx = spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 5_000);
        let txid = tx.txid().unwrap();
        pool.prioritise_transaction(txid, 42_000);

        let accepted = accept(&pool, &view, tx);
        assert_eq!(accepted, txid);
        let info = pool.info(&txid).unwrap();
        assert_eq!(info.fee_delta, 42_000);
        assert_eq!(info.ancestor_fees, 5_000 + 42_000);
        pool.check(&view);
    }

    #[test]
    fn clear_prioritisation_undoes_adjustment() {
        let view = coins();
        let pool = checked_pool();

        let a = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000));
        pool.prioritise_transaction(a, 9_000);
        pool.clear_prioritisation(a);

        assert_eq!(pool.apply_delta(&a), 0);
        let info = pool.info(&a).unwrap();
        assert_eq!(info.fee_delta, 0);
        assert_eq!(info.descendant_fees, 10_000);
        pool.check(&view);
    }

    // ------------------------------------------------------------------
    // Expiry and trimming
    // ------------------------------------------------------------------

    #[test]
    fn expire_removes_old_entries_with_descendants() {
        let view = coins();
        let pool = checked_pool();

        let a = accept_at(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000), 100);
        let _b = accept_at(&pool, &view, spend(&[(a, 0)], 40 * COIN), 5_000);
        let keep = accept_at(&pool, &view, spend(&[(Hash256([2; 32]), 0)], 100 * COIN - 10_000), 5_000);

        // Cutoff catches A; its newer descendant must follow it out.
        let removed = pool.expire(101);
        assert_eq!(removed, 2);
        assert_eq!(pool.len(), 1);
        assert!(pool.exists(&keep));
        pool.check(&view);
    }

    #[test]
    fn trim_to_size_evicts_worst_and_raises_floor() {
        let view = coins();
        let pool = checked_pool();

        let cheap = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 2_000));
        let rich = accept(&pool, &view, spend(&[(Hash256([2; 32]), 0)], 100 * COIN - 90_000));

        assert_eq!(pool.get_min_fee(1 << 20, 1000), FeeRate::ZERO);

        let usage = pool.dynamic_memory_usage();
        let mut freed = Vec::new();
        pool.trim_to_size(usage - 1, Some(&mut freed));

        assert!(!pool.exists(&cheap));
        assert!(pool.exists(&rich));
        assert!(pool.dynamic_memory_usage() <= usage - 1);
        // The evicted spend's funding outpoint has no remaining spender.
        assert_eq!(freed, vec![OutPoint { txid: Hash256([1; 32]), index: 0 }]);

        // Floor now sits above the evicted package's rate.
        let floor = pool.get_min_fee(1 << 20, 1000);
        let cheap_rate = FeeRate::from_fee_and_size(2_000, pool.info(&rich).unwrap().vsize);
        assert!(floor > cheap_rate);
        pool.check(&view);
    }

    #[test]
    fn trim_removes_whole_package() {
        let view = coins();
        let pool = checked_pool();

        let a = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 2_000));
        let b = accept(&pool, &view, spend(&[(a, 0)], 40 * COIN));
        let rich = accept(&pool, &view, spend(&[(Hash256([2; 32]), 0)], 100 * COIN - 90_000));

        pool.trim_to_size(pool.info(&rich).unwrap().vsize as usize * 4, None);

        assert!(!pool.exists(&a));
        assert!(!pool.exists(&b));
        assert!(pool.exists(&rich));
        pool.check(&view);
    }

    // ------------------------------------------------------------------
    // Reorg reconciliation
    // ------------------------------------------------------------------

    #[test]
    fn update_transactions_from_block_relinks_children() {
        let view = coins();
        let pool = checked_pool();

        // A with child B; a block confirms A; the block disconnects.
        let a = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000));
        let b_tx = spend_fee(&pool, &view, &[(a, 0)], 20_000);
        let b = accept(&pool, &view, b_tx);
        let tx_a = (*pool.get(&a).unwrap()).clone();
        pool.remove_for_block(std::slice::from_ref(&tx_a), 101, 2000).unwrap();
        assert_eq!(pool.info(&b).unwrap().ancestor_count, 1);

        // Reinsertion cannot see B as a child yet.
        let a_again = accept(&pool, &view, tx_a);
        assert_eq!(a_again, a);
        assert_eq!(pool.info(&a).unwrap().descendant_count, 1);

        pool.update_transactions_from_block(&[a]);

        let info_a = pool.info(&a).unwrap();
        let info_b = pool.info(&b).unwrap();
        assert_eq!(pool.children_of(&a).unwrap(), vec![b]);
        assert_eq!(pool.parents_of(&b).unwrap(), vec![a]);
        assert_eq!(info_a.descendant_count, 2);
        assert_eq!(info_a.descendant_fees, 30_000);
        assert_eq!(info_b.ancestor_count, 2);
        pool.check(&view);
    }

    #[test]
    fn update_transactions_from_block_excludes_replayed_chain() {
        let view = coins();
        let pool = checked_pool();

        // Both A and its child B confirmed, then both disconnected.
        let a = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000));
        let b = accept(&pool, &view, spend(&[(a, 0)], 40 * COIN));
        let grandchild = accept(&pool, &view, spend(&[(b, 0)], 15 * COIN));
        let tx_a = (*pool.get(&a).unwrap()).clone();
        let tx_b = (*pool.get(&b).unwrap()).clone();
        pool.remove_for_block(&[tx_a.clone(), tx_b.clone()], 101, 2000).unwrap();

        // Replay in block order: A then B; each sees no children at insert.
        accept(&pool, &view, tx_a);
        accept(&pool, &view, tx_b);
        pool.update_transactions_from_block(&[a, b]);

        // B's pass absorbs the grandchild; A's pass must reuse that walk
        // via the cache and skip B itself as already accounted for.
        assert_eq!(pool.info(&a).unwrap().descendant_count, 3);
        assert_eq!(pool.info(&b).unwrap().descendant_count, 2);
        assert_eq!(pool.info(&grandchild).unwrap().ancestor_count, 3);
        pool.check(&view);
    }

    #[test]
    fn remove_for_reorg_drops_immature_coinbase_spends() {
        let mut view = coins();
        // A freshly mined coinbase coin.
        view.add_coin(
            OutPoint { txid: Hash256([30; 32]), index: 0 },
            Coin {
                output: TxOutput { value: 50 * COIN, pubkey_hash: Hash256::ZERO },
                height: 60,
                is_coinbase: true,
            },
        );
        let pool = checked_pool();

        // Accepted while the chain was long enough (tip 160).
        let tall_chain = StaticChainView {
            height: 160,
            hash: Hash256([0xBB; 32]),
            median_time_past: 1_700_000_000,
        };
        let opts = AcceptOptions { accept_time: 1000, ..AcceptOptions::default() };
        let spend_cb = spend(&[(Hash256([30; 32]), 0)], 50 * COIN - 10_000);
        let cb_spender = pool
            .accept_to_pool(spend_cb, &view, &tall_chain, &AcceptAllVerifier, &opts)
            .unwrap()
            .txid;
        let safe = pool
            .accept_to_pool(
                spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000),
                &view,
                &tall_chain,
                &AcceptAllVerifier,
                &opts,
            )
            .unwrap()
            .txid;

        // Tip retreats to 110: the coinbase (height 60) is immature again.
        let short_chain = StaticChainView {
            height: 110,
            hash: Hash256([0xCC; 32]),
            median_time_past: 1_700_000_000,
        };
        let removed = pool.remove_for_reorg(&view, &short_chain);
        assert_eq!(removed, 1);
        assert!(!pool.exists(&cb_spender));
        assert!(pool.exists(&safe));
        pool.check(&view);
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    #[test]
    fn query_hashes_orders_parents_first() {
        let view = coins();
        let pool = checked_pool();

        let a = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000));
        let b = accept(&pool, &view, spend(&[(a, 0)], 40 * COIN));
        let c = accept(&pool, &view, spend(&[(b, 0)], 15 * COIN));

        let order = pool.query_hashes();
        let pos = |txid| order.iter().position(|h| *h == txid).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(b) < pos(c));

        assert_eq!(
            pool.compare_depth_and_score(&a, &b),
            Some(std::cmp::Ordering::Less)
        );
        assert_eq!(pool.compare_depth_and_score(&a, &Hash256::ZERO), None);
    }

    #[test]
    fn spent_tracking_and_no_inputs_of() {
        let view = coins();
        let pool = checked_pool();

        let a = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000));
        assert!(pool.is_spent(&OutPoint { txid: Hash256([1; 32]), index: 0 }));
        assert_eq!(
            pool.spender_of(&OutPoint { txid: Hash256([1; 32]), index: 0 }),
            Some(a)
        );

        let independent = spend(&[(Hash256([2; 32]), 0)], 100 * COIN - 10_000);
        let dependent = spend(&[(a, 0)], 40 * COIN);
        assert!(pool.has_no_inputs_of(&independent));
        assert!(!pool.has_no_inputs_of(&dependent));
    }

    #[test]
    fn chain_limit_probe() {
        let view = coins();
        let pool = checked_pool();

        let a = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000));
        let b = accept(&pool, &view, spend(&[(a, 0)], 40 * COIN));

        assert!(pool.transaction_within_chain_limit(&a, 2));
        assert!(!pool.transaction_within_chain_limit(&a, 1));
        assert!(pool.transaction_within_chain_limit(&b, 2));
        // Unknown transactions are within any limit.
        assert!(pool.transaction_within_chain_limit(&Hash256::ZERO, 0));
    }

    #[test]
    fn mining_order_prefers_best_packages() {
        let view = coins();
        let pool = checked_pool();

        let poor = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 1_000));
        let rich = accept(&pool, &view, spend(&[(Hash256([2; 32]), 0)], 100 * COIN - 80_000));

        assert_eq!(pool.mining_order(), vec![rich, poor]);
        assert_eq!(pool.ancestor_score_order(), vec![rich, poor]);
    }

    #[test]
    fn transactions_updated_counts_mutations() {
        let view = coins();
        let pool = checked_pool();
        let before = pool.transactions_updated();

        let a = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000));
        assert!(pool.transactions_updated() > before);

        let mid = pool.transactions_updated();
        let tx = (*pool.get(&a).unwrap()).clone();
        pool.remove_recursive(&tx, RemovalReason::Unknown).unwrap();
        assert!(pool.transactions_updated() > mid);

        pool.add_transactions_updated(5);
        assert_eq!(pool.transactions_updated(), mid + 1 + 5);
    }

    #[test]
    fn clear_resets_everything() {
        let view = coins();
        let pool = checked_pool();

        accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000));
        pool.clear();

        assert!(pool.is_empty());
        assert_eq!(pool.total_tx_size(), 0);
        assert_eq!(pool.dynamic_memory_usage(), 0);
        assert!(!pool.is_spent(&OutPoint { txid: Hash256([1; 32]), index: 0 }));
        pool.check(&view);
    }

    #[test]
    fn coins_view_mempool_overlays_pool_outputs() {
        let view = coins();
        let pool = checked_pool();
        let a = accept(&pool, &view, spend(&[(Hash256([1; 32]), 0)], 100 * COIN - 10_000));

        let overlay = CoinsViewMemPool::new(&view, &pool);
        // Pool output visible.
        let pool_out = overlay.get_coin(&OutPoint { txid: a, index: 0 }).unwrap();
        assert_eq!(pool_out.height, MEMPOOL_HEIGHT);
        assert!(!pool_out.is_coinbase);
        // Base coin still visible even though the pool spends it.
        assert!(overlay.get_coin(&OutPoint { txid: Hash256([1; 32]), index: 0 }).is_some());
        // Unknown outpoints stay unknown.
        assert!(overlay.get_coin(&OutPoint { txid: Hash256([9; 32]), index: 7 }).is_none());
    }
}
