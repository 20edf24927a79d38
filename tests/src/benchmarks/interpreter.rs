//! # Interpreter Brutal Benchmarks
//!
//! Stress conditions for the fetch-decode-execute loop:
//! - Tight loops with tens of thousands of jumps
//! - Large KECCAK256 inputs with quadratic memory growth
//! - Storage-heavy frames going through the checkpointed caches
//! - Deep nested-call chains through `run_call`

use super::workloads::{countdown_loop, engine, keccak_once, memory_sweep, run, runtime, storage_writes};
use criterion::{black_box, BenchmarkId, Criterion, Throughput};
use qc_evm::prelude::*;
use std::sync::Arc;
use std::time::Duration;

pub fn brutal_loops(c: &mut Criterion) {
    let mut group = c.benchmark_group("qc-evm/brutal/loops");
    group.measurement_time(Duration::from_secs(10));

    let rt = runtime();
    let mut evm = engine();

    for iterations in [100u16, 1_000, 10_000] {
        let code = countdown_loop(iterations);
        group.throughput(Throughput::Elements(u64::from(iterations) * 7));
        group.bench_with_input(
            BenchmarkId::new("countdown", iterations),
            &code,
            |b, code| b.iter(|| black_box(run(&rt, &mut evm, code))),
        );
    }

    group.finish();
}

pub fn brutal_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("qc-evm/brutal/memory");

    let rt = runtime();
    let mut evm = engine();

    for len in [32u16, 1_024, 16_384] {
        let code = keccak_once(len);
        group.throughput(Throughput::Bytes(u64::from(len)));
        group.bench_with_input(BenchmarkId::new("keccak256", len), &code, |b, code| {
            b.iter(|| black_box(run(&rt, &mut evm, code)))
        });
    }

    let sweep = memory_sweep(255);
    group.bench_function("mstore_sweep_255_words", |b| {
        b.iter(|| black_box(run(&rt, &mut evm, &sweep)))
    });

    group.finish();
}

pub fn brutal_storage(c: &mut Criterion) {
    let mut group = c.benchmark_group("qc-evm/brutal/storage");

    let rt = runtime();
    let contract = Address::from_low_u64(0x5700);

    for slots in [1u8, 16, 128] {
        let code = storage_writes(slots);
        group.throughput(Throughput::Elements(u64::from(slots)));
        group.bench_with_input(BenchmarkId::new("sstore_tx", slots), &code, |b, code| {
            b.iter_batched(
                || {
                    let backend = Arc::new(InMemoryBackend::new());
                    rt.block_on(backend.insert_code(contract, code));
                    Evm::new(VmConfig::default(), backend).expect("default config")
                },
                |mut evm| {
                    let result = rt.block_on(evm.run_call(RunCallOpts {
                        to: Some(contract),
                        ..RunCallOpts::default()
                    }));
                    black_box(result)
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Contract that calls itself until the forwarded gas runs out.
fn self_caller(address: Address) -> Vec<u8> {
    let bytes = address.as_bytes();
    vec![
        0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, // out, in, value
        0x61, bytes[18], bytes[19], // address
        0x5a, 0xf1, 0x00, // CALL(GAS, ...)
    ]
}

pub fn brutal_nested_calls(c: &mut Criterion) {
    let mut group = c.benchmark_group("qc-evm/brutal/nested_calls");
    group.sample_size(20);

    let rt = runtime();
    let contract = Address::from_low_u64(0xca11);
    let code = self_caller(contract);

    for gas in [10_000u64, 50_000] {
        group.bench_with_input(BenchmarkId::new("recursive_call", gas), &gas, |b, gas| {
            b.iter_batched(
                || {
                    let backend = Arc::new(InMemoryBackend::new());
                    rt.block_on(backend.insert_code(contract, &code));
                    Evm::new(VmConfig::default(), backend).expect("default config")
                },
                |mut evm| {
                    let result = rt.block_on(evm.run_call(RunCallOpts {
                        to: Some(contract),
                        gas_limit: Some(*gas),
                        ..RunCallOpts::default()
                    }));
                    black_box(result)
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}
