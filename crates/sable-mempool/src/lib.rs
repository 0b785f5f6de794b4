//! # sable-mempool
//!
//! In-memory pool of unconfirmed transactions, holding candidates for the
//! next block that have been validated against the current best chain tip.
//!
//! The pool maintains a dependency graph between unconfirmed transactions
//! (parent = spent output, child = spender) and keeps per-entry ancestor and
//! descendant aggregates consistent across insertion, removal,
//! prioritisation, and chain reorganisations. Four orderings over the same
//! entry set stay live on every mutation:
//!
//! - by txid (point lookup)
//! - by descendant score (eviction picks the lowest)
//! - by entry time (expiry)
//! - by ancestor/mining score (block construction)
//!
//! Entry points: [`Mempool::accept_to_pool`] for policy-checked admission
//! (including BIP 125 replacement), [`Mempool::remove_for_block`] when a
//! block connects, [`Mempool::update_mempool_for_reorg`] when one
//! disconnects, and [`Mempool::trim_to_size`] / [`Mempool::expire`] under
//! memory or staleness pressure.

pub mod accept;
pub mod config;
pub mod dump;
pub mod entry;
pub mod estimator;
pub mod fees;
pub mod lockpoints;
pub mod pool;
mod index;
mod score;

pub use accept::{AcceptOptions, Accepted};
pub use config::MempoolConfig;
pub use dump::{LoadStats, MEMPOOL_DUMP_VERSION};
pub use entry::{MempoolEvent, RemovalReason, TxMempoolInfo};
pub use estimator::FeeEstimator;
pub use lockpoints::LockPoints;
pub use pool::{CoinsViewMemPool, Mempool};
