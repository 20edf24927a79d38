//! # QC-EVM Benchmarks
//!
//! Throughput of the engine's hot paths:
//!
//! | Area | Workload |
//! |------|----------|
//! | Dispatch loop | countdown loop, 7 opcodes per iteration |
//! | Memory | KECCAK256 over growing inputs, MSTORE sweep |
//! | State caches | SSTORE-heavy transactions with flush |
//! | Orchestrator | self-recursive CALL chain |
//! | Precompiles | SHA256 / IDENTITY through `run_call` |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use qc_evm::prelude::*;
use qc_tests::benchmarks::interpreter::{
    brutal_loops, brutal_memory, brutal_nested_calls, brutal_storage,
};
use qc_tests::benchmarks::workloads::runtime;
use std::sync::Arc;

// ============================================================================
// Precompiles through the full message path
// ============================================================================

fn bench_precompile_calls(c: &mut Criterion) {
    let mut group = c.benchmark_group("qc-evm/precompiles");

    let rt = runtime();
    let mut evm = Evm::new(VmConfig::default(), Arc::new(InMemoryBackend::new()))
        .expect("default config");

    for (name, address) in [("sha256", 2u64), ("identity", 4)] {
        for size in [32usize, 1_024] {
            let input = Bytes::from(vec![0xab; size]);
            group.throughput(Throughput::Bytes(size as u64));
            group.bench_with_input(BenchmarkId::new(name, size), &input, |b, input| {
                b.iter(|| {
                    let result = rt.block_on(evm.run_call(RunCallOpts {
                        to: Some(Address::from_low_u64(address)),
                        data: input.clone(),
                        ..RunCallOpts::default()
                    }));
                    black_box(result)
                })
            });
        }
    }

    group.finish();
}

// ============================================================================
// Engine construction (rule-set resolution and dispatch table)
// ============================================================================

fn bench_engine_construction(c: &mut Criterion) {
    let backend = Arc::new(InMemoryBackend::new());
    c.bench_function("qc-evm/construct_shanghai", |b| {
        b.iter(|| black_box(Evm::new(VmConfig::default(), Arc::clone(&backend))))
    });
}

criterion_group!(
    benches,
    brutal_loops,
    brutal_memory,
    brutal_storage,
    brutal_nested_calls,
    bench_precompile_calls,
    bench_engine_construction,
);

criterion_main!(benches);
