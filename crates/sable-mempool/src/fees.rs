//! Rolling minimum fee: the pool's exponentially decaying admission floor.
//!
//! Every size-limit eviction bumps the floor to the evicted package's fee
//! rate plus the incremental relay fee. Between bumps the floor halves every
//! [`ROLLING_FEE_HALFLIFE`](sable_core::constants::ROLLING_FEE_HALFLIFE)
//! seconds, but only once a block has arrived since the last bump — a
//! stalled chain keeps the floor frozen. Below half the incremental relay
//! fee the floor snaps to zero.
//!
//! All methods take explicit timestamps so callers and tests control the
//! clock.

use sable_core::constants::ROLLING_FEE_HALFLIFE;
use sable_core::types::FeeRate;

/// Decay is re-evaluated at most once per this many seconds.
const UPDATE_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub(crate) struct RollingFeeState {
    /// Current floor in sables/kvB. Kept as a double so repeated partial
    /// half-lives compound precisely.
    rate: f64,
    last_update: u64,
    block_since_bump: bool,
}

impl RollingFeeState {
    pub(crate) fn new(now: u64) -> Self {
        Self { rate: 0.0, last_update: now, block_since_bump: false }
    }

    /// Raise the floor to an evicted package's rate (plus increment, applied
    /// by the caller). Freezes decay until the next block arrives.
    pub(crate) fn track_package_removed(&mut self, rate: FeeRate) {
        let rate = rate.sables_per_kvb() as f64;
        if rate > self.rate {
            self.rate = rate;
            self.block_since_bump = false;
        }
    }

    /// Note a connected block at `now`, unfreezing decay.
    pub(crate) fn on_block(&mut self, now: u64) {
        self.last_update = now;
        self.block_since_bump = true;
    }

    /// Current floor at `now`.
    ///
    /// `usage` and `size_limit` shorten the half-life when the pool is under
    /// half (or a quarter of) its limit, so an emptying pool reopens faster.
    pub(crate) fn min_fee(
        &mut self,
        incremental: FeeRate,
        size_limit: usize,
        usage: usize,
        now: u64,
    ) -> FeeRate {
        if !self.block_since_bump || self.rate == 0.0 {
            return FeeRate::from_sables_per_kvb(self.rate.round() as u64);
        }
        if now > self.last_update + UPDATE_INTERVAL_SECS {
            let mut halflife = ROLLING_FEE_HALFLIFE as f64;
            if usage < size_limit / 4 {
                halflife /= 4.0;
            } else if usage < size_limit / 2 {
                halflife /= 2.0;
            }
            self.rate /= 2f64.powf((now - self.last_update) as f64 / halflife);
            self.last_update = now;

            if self.rate < incremental.sables_per_kvb() as f64 / 2.0 {
                self.rate = 0.0;
                return FeeRate::ZERO;
            }
        }
        FeeRate::from_sables_per_kvb(self.rate.round() as u64).max(incremental)
    }

    pub(crate) fn reset(&mut self, now: u64) {
        self.rate = 0.0;
        self.last_update = now;
        self.block_since_bump = false;
    }
}
