//! Fee-estimation notification seam.
//!
//! The pool tells the estimator about accepted transactions and confirmed
//! blocks, fire-and-forget. Notifications are dispatched after the pool
//! lock is released, so implementations may take their own locks freely.

use crate::entry::TxMempoolInfo;

/// Consumer of mempool activity for fee estimation.
pub trait FeeEstimator: Send + Sync {
    /// A transaction entered the pool.
    ///
    /// `valid_fee_estimate` is false when the entry is unsuitable as a fee
    /// signal: it replaced others, depends on unconfirmed inputs, or arrived
    /// during reorg replay.
    fn process_transaction(&self, info: &TxMempoolInfo, valid_fee_estimate: bool);

    /// A block confirmed these pool entries at `height`.
    fn process_block(&self, height: u64, entries: &[TxMempoolInfo]);
}
