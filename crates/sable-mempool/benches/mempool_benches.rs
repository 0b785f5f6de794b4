//! Criterion benchmarks for mempool hot paths.
//!
//! Covers: independent acceptance throughput, chained acceptance (ancestor
//! walks and aggregate propagation), size-pressure trimming, and the
//! block-construction ordering snapshot.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use sable_core::coins::MemoryCoinsView;
use sable_core::constants::{COIN, SEQUENCE_FINAL};
use sable_core::traits::{AcceptAllVerifier, StaticChainView};
use sable_core::types::{Coin, Hash256, OutPoint, Transaction, TxInput, TxOutput};
use sable_mempool::{AcceptOptions, Mempool, MempoolConfig};

fn chain() -> StaticChainView {
    StaticChainView {
        height: 100,
        hash: Hash256([0xAA; 32]),
        median_time_past: 1_700_000_000,
    }
}

fn funded_view(count: u64) -> (MemoryCoinsView, Vec<OutPoint>) {
    let mut view = MemoryCoinsView::new();
    let mut outpoints = Vec::with_capacity(count as usize);
    for i in 0..count {
        let txid = Hash256(*blake3::hash(&i.to_le_bytes()).as_bytes());
        let op = OutPoint { txid, index: 0 };
        view.add_coin(
            op.clone(),
            Coin {
                output: TxOutput { value: 100 * COIN, pubkey_hash: Hash256::ZERO },
                height: 1,
                is_coinbase: false,
            },
        );
        outpoints.push(op);
    }
    (view, outpoints)
}

fn spend(op: &OutPoint, total_out: u64) -> Transaction {
    Transaction {
        version: 2,
        inputs: vec![TxInput {
            previous_output: op.clone(),
            signature: vec![0; 64],
            public_key: vec![0; 32],
            sequence: SEQUENCE_FINAL,
        }],
        outputs: vec![TxOutput { value: total_out, pubkey_hash: Hash256::ZERO }],
        lock_time: 0,
    }
}

fn opts() -> AcceptOptions {
    AcceptOptions { accept_time: 1000, ..AcceptOptions::default() }
}

fn bench_accept_independent(c: &mut Criterion) {
    let (view, ops) = funded_view(256);
    c.bench_function("accept_256_independent", |b| {
        b.iter(|| {
            let pool = Mempool::new(MempoolConfig::default());
            for (i, op) in ops.iter().enumerate() {
                let tx = spend(op, 100 * COIN - 10_000 - i as u64);
                let _ = black_box(pool.accept_to_pool(
                    tx,
                    &view,
                    &chain(),
                    &AcceptAllVerifier,
                    &opts(),
                ));
            }
        })
    });
}

fn bench_accept_chain(c: &mut Criterion) {
    let (view, ops) = funded_view(1);
    c.bench_function("accept_chain_of_24", |b| {
        b.iter(|| {
            let mut config = MempoolConfig::default();
            config.limit_ancestor_count = 25;
            let pool = Mempool::new(config);

            let mut prev = ops[0].clone();
            let mut value = 100 * COIN;
            for _ in 0..24 {
                value -= 10_000;
                let tx = spend(&prev, value);
                let accepted = pool
                    .accept_to_pool(tx, &view, &chain(), &AcceptAllVerifier, &opts())
                    .expect("chain link accepted");
                prev = OutPoint { txid: accepted.txid, index: 0 };
            }
            black_box(pool.len())
        })
    });
}

fn bench_trim_to_size(c: &mut Criterion) {
    let (view, ops) = funded_view(512);
    c.bench_function("trim_512_to_quarter", |b| {
        b.iter(|| {
            let pool = Mempool::new(MempoolConfig::default());
            for (i, op) in ops.iter().enumerate() {
                let tx = spend(op, 100 * COIN - 10_000 - (i as u64) * 10);
                let _ = pool.accept_to_pool(tx, &view, &chain(), &AcceptAllVerifier, &opts());
            }
            let target = pool.dynamic_memory_usage() / 4;
            pool.trim_to_size(target, None);
            black_box(pool.len())
        })
    });
}

fn bench_mining_order(c: &mut Criterion) {
    let (view, ops) = funded_view(512);
    let pool = Mempool::new(MempoolConfig::default());
    for (i, op) in ops.iter().enumerate() {
        let tx = spend(op, 100 * COIN - 10_000 - (i as u64) * 10);
        let _ = pool.accept_to_pool(tx, &view, &chain(), &AcceptAllVerifier, &opts());
    }
    c.bench_function("mining_order_512", |b| {
        b.iter(|| black_box(pool.mining_order()))
    });
}

criterion_group!(
    benches,
    bench_accept_independent,
    bench_accept_chain,
    bench_trim_to_size,
    bench_mining_order
);
criterion_main!(benches);
