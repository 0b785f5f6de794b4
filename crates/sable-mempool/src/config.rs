//! Mempool policy configuration.

use sable_core::constants::{
    DEFAULT_ANCESTOR_LIMIT, DEFAULT_ANCESTOR_SIZE_LIMIT, DEFAULT_DESCENDANT_LIMIT,
    DEFAULT_DESCENDANT_SIZE_LIMIT, DEFAULT_INCREMENTAL_RELAY_FEE_RATE,
    DEFAULT_MAX_MEMPOOL_BYTES, DEFAULT_MEMPOOL_EXPIRY_SECS, DEFAULT_MIN_RELAY_FEE_RATE,
    MAX_REPLACEMENT_CANDIDATES,
};
use sable_core::types::FeeRate;

/// Policy knobs for the transaction pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MempoolConfig {
    /// Dynamic-memory limit in bytes; eviction trims below this.
    pub max_mempool_bytes: usize,
    /// Entries older than this many seconds are expired.
    pub expiry_secs: u64,
    /// Maximum number of in-pool ancestors (including the entry itself).
    pub limit_ancestor_count: u64,
    /// Maximum total virtual size of in-pool ancestors.
    pub limit_ancestor_size: u64,
    /// Maximum number of in-pool descendants any ancestor may have.
    pub limit_descendant_count: u64,
    /// Maximum total virtual size of descendants any ancestor may have.
    pub limit_descendant_size: u64,
    /// Minimum relay fee rate.
    pub min_relay_fee: FeeRate,
    /// Fee-rate step required for replacements and the rolling-floor unit.
    pub incremental_relay_fee: FeeRate,
    /// Maximum entries a replacement may evict (conflicts + descendants).
    pub max_replacement_candidates: usize,
    /// Sampled sanity-check frequency as a fraction of operations over 2^32.
    /// Zero disables checking.
    pub check_frequency: u32,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_mempool_bytes: DEFAULT_MAX_MEMPOOL_BYTES,
            expiry_secs: DEFAULT_MEMPOOL_EXPIRY_SECS,
            limit_ancestor_count: DEFAULT_ANCESTOR_LIMIT,
            limit_ancestor_size: DEFAULT_ANCESTOR_SIZE_LIMIT,
            limit_descendant_count: DEFAULT_DESCENDANT_LIMIT,
            limit_descendant_size: DEFAULT_DESCENDANT_SIZE_LIMIT,
            min_relay_fee: FeeRate::from_sables_per_kvb(DEFAULT_MIN_RELAY_FEE_RATE),
            incremental_relay_fee: FeeRate::from_sables_per_kvb(
                DEFAULT_INCREMENTAL_RELAY_FEE_RATE,
            ),
            max_replacement_candidates: MAX_REPLACEMENT_CANDIDATES,
            check_frequency: 0,
        }
    }
}

impl MempoolConfig {
    /// Configuration with sanity checking enabled on every operation.
    ///
    /// For tests; checking walks the whole graph and is far too slow for
    /// production pools.
    pub fn with_full_checks() -> Self {
        Self { check_frequency: u32::MAX, ..Self::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_sane() {
        let cfg = MempoolConfig::default();
        assert!(cfg.max_mempool_bytes > 0);
        assert_eq!(cfg.limit_ancestor_count, 25);
        assert_eq!(cfg.limit_descendant_count, 25);
        assert_eq!(cfg.check_frequency, 0);
        assert!(cfg.min_relay_fee > FeeRate::ZERO);
    }

    #[test]
    fn full_checks_enables_sampling() {
        assert_eq!(MempoolConfig::with_full_checks().check_frequency, u32::MAX);
    }
}
