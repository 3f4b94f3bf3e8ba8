//! Benchmarks for bundle compilation
//!
//! Compilation is pure hashing over the transaction list, so these numbers
//! bound how large a definition can get before `deploy` feels sluggish.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ethers::types::{Address, Bytes, U256};

use convoy_core::builder::RawTransaction;
use convoy_core::bundle::TransactionBundle;

fn generate_raw_transactions(count: usize) -> Vec<RawTransaction> {
    (0..count)
        .map(|i| {
            let byte = (i % 251) as u8;
            if i % 4 == 0 {
                RawTransaction {
                    to: None,
                    data: Bytes::from(vec![byte; 2048]),
                    gas_limit: U256::from(1_500_000u64),
                }
            } else {
                RawTransaction {
                    to: Some(Address::repeat_byte(byte)),
                    data: Bytes::from(vec![byte; 132]),
                    gas_limit: U256::from(120_000u64),
                }
            }
        })
        .collect()
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("bundle_compile");

    for size in [10usize, 100, 1000].iter() {
        let raw = generate_raw_transactions(*size);
        group.bench_with_input(BenchmarkId::new("compile", size), size, |b, _| {
            b.iter(|| {
                let bundle = TransactionBundle::compile(black_box(&raw));
                black_box(bundle.hash)
            });
        });
    }

    group.finish();
}

fn bench_chain_verification(c: &mut Criterion) {
    let raw = generate_raw_transactions(1000);
    let bundle = TransactionBundle::compile(&raw);

    c.bench_function("verify_chain_1000", |b| {
        b.iter(|| black_box(bundle.verify_chain()));
    });
}

criterion_group!(benches, bench_compile, bench_chain_verification);
criterion_main!(benches);
