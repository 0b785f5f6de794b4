//! Trait interfaces between the mempool and its collaborators.
//!
//! These traits define the contracts the pool consumes:
//! - [`ChainView`] — best-tip accessor for lock evaluation (the node implements)
//! - [`InputVerifier`] — script/signature verification (the crypto layer implements)

use crate::coins::CoinsView;
use crate::error::TransactionError;
use crate::types::{Hash256, Transaction};

/// Read-only accessor for the active chain tip.
///
/// The mempool uses it to evaluate absolute and relative lock times and to
/// tag cached lock points with the tip they were computed against.
pub trait ChainView: Send + Sync {
    /// Height of the best block.
    fn tip_height(&self) -> u64;

    /// Hash of the best block.
    fn tip_hash(&self) -> Hash256;

    /// Median time past of the best block (Unix seconds), the reference
    /// point for time-based locks.
    fn median_time_past(&self) -> u64;

    /// Median time past of the block at `height`.
    ///
    /// Time-based relative locks measure from the block before the one that
    /// created the spent coin. Default implementation falls back to the tip
    /// value; nodes with header access should override.
    fn median_time_past_at(&self, _height: u64) -> u64 {
        self.median_time_past()
    }
}

/// A fixed chain tip.
///
/// Implements [`ChainView`] with constant values; suitable for tests and for
/// snapshotting the tip before a long-running verification step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticChainView {
    pub height: u64,
    pub hash: Hash256,
    pub median_time_past: u64,
}

impl ChainView for StaticChainView {
    fn tip_height(&self) -> u64 {
        self.height
    }

    fn tip_hash(&self) -> Hash256 {
        self.hash
    }

    fn median_time_past(&self) -> u64 {
        self.median_time_past
    }
}

/// Script and signature verification over a transaction's inputs.
///
/// The mempool delegates input authorization entirely to this seam; the
/// production implementation checks Ed25519 signatures against each spent
/// coin's pubkey hash.
pub trait InputVerifier: Send + Sync {
    /// Verify every input of `tx` against the coins visible in `coins`.
    ///
    /// `coins` includes unconfirmed pool outputs during acceptance, so
    /// chained unconfirmed spends can be verified.
    fn verify_inputs(&self, tx: &Transaction, coins: &dyn CoinsView)
        -> Result<(), TransactionError>;
}

/// Verifier that accepts every input.
///
/// For tests, benchmarks, and trusted local submission paths where
/// signatures were already checked upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllVerifier;

impl InputVerifier for AcceptAllVerifier {
    fn verify_inputs(
        &self,
        _tx: &Transaction,
        _coins: &dyn CoinsView,
    ) -> Result<(), TransactionError> {
        Ok(())
    }
}
