//! Opaque dump and restore of the pool across restarts.
//!
//! The blob is versioned bincode: a record per entry `(tx, time,
//! fee_delta)` in dependency order, followed by the residual priority
//! side-map (deltas for transactions not currently in the pool). Restoring
//! replays every record through the acceptance pipeline with its recorded
//! time, so policy is re-applied and expired entries are skipped.

use tracing::info;

use sable_core::coins::CoinsView;
use sable_core::error::MempoolError;
use sable_core::traits::{ChainView, InputVerifier};
use sable_core::types::{Hash256, Transaction};

use crate::accept::AcceptOptions;
use crate::pool::Mempool;

/// Current dump format version. Unknown versions are rejected on load.
pub const MEMPOOL_DUMP_VERSION: u64 = 1;

#[derive(bincode::Encode, bincode::Decode)]
struct DumpRecord {
    tx: Transaction,
    time: u64,
    fee_delta: i64,
}

#[derive(bincode::Encode, bincode::Decode)]
struct MempoolDump {
    version: u64,
    records: Vec<DumpRecord>,
    deltas: Vec<(Hash256, i64)>,
}

/// Outcome counts of a dump restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadStats {
    /// Entries re-accepted into the pool.
    pub accepted: usize,
    /// Entries rejected by the acceptance pipeline.
    pub failed: usize,
    /// Entries skipped because they had already expired.
    pub expired: usize,
}

impl Mempool {
    /// Serialise the pool into a version-1 dump blob.
    ///
    /// Entries are written in dependency order so a restore re-accepts
    /// parents before children. In-pool deltas travel with their entry; the
    /// side-map remainder is appended separately.
    pub fn save(&self) -> Result<Vec<u8>, MempoolError> {
        let (infos, deltas) = {
            let inner = self.inner.lock();
            (inner.info_all(), inner.residual_deltas())
        };
        let dump = MempoolDump {
            version: MEMPOOL_DUMP_VERSION,
            records: infos
                .into_iter()
                .map(|i| DumpRecord {
                    tx: (*i.tx).clone(),
                    time: i.time,
                    fee_delta: i.fee_delta,
                })
                .collect(),
            deltas,
        };
        bincode::encode_to_vec(&dump, bincode::config::standard())
            .map_err(|e| MempoolError::Internal(e.to_string()))
    }

    /// Restore a dump produced by [`Mempool::save`] by replaying it through
    /// acceptance at time `now`.
    ///
    /// Records older than the configured expiry are skipped; the rest are
    /// re-validated against `coins`/`chain`, so entries the current tip no
    /// longer admits count as failed rather than poisoning the pool.
    pub fn load(
        &self,
        bytes: &[u8],
        coins: &dyn CoinsView,
        chain: &dyn ChainView,
        verifier: &dyn InputVerifier,
        now: u64,
    ) -> Result<LoadStats, MempoolError> {
        let (dump, _): (MempoolDump, usize) =
            bincode::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| MempoolError::CorruptDump(e.to_string()))?;
        if dump.version != MEMPOOL_DUMP_VERSION {
            return Err(MempoolError::UnsupportedDumpVersion(dump.version));
        }

        let expiry = self.inner.lock().config.expiry_secs;
        let mut stats = LoadStats::default();

        for record in dump.records {
            if record.time + expiry <= now {
                stats.expired += 1;
                continue;
            }
            let txid = record
                .tx
                .txid()
                .map_err(|e| MempoolError::CorruptDump(e.to_string()))?;
            if record.fee_delta != 0 {
                self.prioritise_transaction(txid, record.fee_delta);
            }
            let opts = AcceptOptions {
                accept_time: record.time,
                valid_fee_estimate: false,
                ..AcceptOptions::default()
            };
            match self.accept_to_pool(record.tx, coins, chain, verifier, &opts) {
                Ok(_) => stats.accepted += 1,
                Err(_) => stats.failed += 1,
            }
        }

        for (txid, delta) in dump.deltas {
            self.prioritise_transaction(txid, delta);
        }

        info!(
            accepted = stats.accepted,
            failed = stats.failed,
            expired = stats.expired,
            "restored mempool dump"
        );
        Ok(stats)
    }
}
