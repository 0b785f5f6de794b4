//! Read-only UTXO views.
//!
//! [`CoinsView`] is the interface the mempool consumes to resolve
//! transaction inputs against confirmed state. The production node backs it
//! with its database; [`MemoryCoinsView`] is an in-memory implementation for
//! tests and tools.

use std::collections::HashMap;

use crate::types::{Coin, OutPoint, Transaction};

/// Read-only view of unspent transaction outputs.
pub trait CoinsView: Send + Sync {
    /// Look up a coin by outpoint. Returns `None` if spent or unknown.
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin>;

    /// Whether a coin exists and is unspent.
    ///
    /// Default implementation delegates to [`get_coin`](Self::get_coin).
    fn have_coin(&self, outpoint: &OutPoint) -> bool {
        self.get_coin(outpoint).is_some()
    }
}

/// In-memory UTXO view for testing.
#[derive(Debug, Clone, Default)]
pub struct MemoryCoinsView {
    coins: HashMap<OutPoint, Coin>,
}

impl MemoryCoinsView {
    /// Create an empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a coin at the given outpoint, replacing any previous coin.
    pub fn add_coin(&mut self, outpoint: OutPoint, coin: Coin) {
        self.coins.insert(outpoint, coin);
    }

    /// Insert all outputs of `tx` as coins created at `height`.
    ///
    /// Returns the txid. Serialization failures are propagated from
    /// [`Transaction::txid`].
    pub fn add_transaction_outputs(
        &mut self,
        tx: &Transaction,
        height: u64,
    ) -> Result<crate::types::Hash256, crate::error::TransactionError> {
        let txid = tx.txid()?;
        let is_coinbase = tx.is_coinbase();
        for (index, output) in tx.outputs.iter().enumerate() {
            self.coins.insert(
                OutPoint { txid, index: index as u64 },
                Coin {
                    output: output.clone(),
                    height,
                    is_coinbase,
                },
            );
        }
        Ok(txid)
    }

    /// Remove a coin, returning it if present.
    pub fn spend_coin(&mut self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.remove(outpoint)
    }

    /// Number of coins in the view.
    pub fn len(&self) -> usize {
        self.coins.len()
    }

    /// Whether the view holds no coins.
    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }
}

impl CoinsView for MemoryCoinsView {
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.get(outpoint).cloned()
    }
}
