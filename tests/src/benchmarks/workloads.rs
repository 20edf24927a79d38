//! Bytecode generators for interpreter workloads.

use qc_evm::prelude::*;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Offset of the loop head in [`countdown_loop`].
const LOOP_HEAD: u8 = 3;

/// Counts `iterations` down to zero: PUSH2 n, JUMPDEST, PUSH1 1, SWAP1, SUB, DUP1, JUMPI.
#[must_use]
pub fn countdown_loop(iterations: u16) -> Vec<u8> {
    let [hi, lo] = iterations.to_be_bytes();
    vec![
        0x61, hi, lo, // PUSH2 n
        0x5b, // JUMPDEST
        0x60, 0x01, 0x90, 0x03, // n - 1
        0x80, 0x60, LOOP_HEAD, 0x57, // JUMPI(head, n - 1)
        0x00,
    ]
}

/// Hashes `len` bytes of zeroed memory once.
#[must_use]
pub fn keccak_once(len: u16) -> Vec<u8> {
    let [hi, lo] = len.to_be_bytes();
    vec![0x61, hi, lo, 0x60, 0x00, 0x20, 0x50, 0x00]
}

/// Writes slots `0..slots` with non-zero values.
#[must_use]
pub fn storage_writes(slots: u8) -> Vec<u8> {
    let mut code = Vec::with_capacity(usize::from(slots) * 5 + 1);
    for slot in 0..slots {
        code.extend_from_slice(&[0x60, slot.wrapping_add(1), 0x60, slot, 0x55]);
    }
    code.push(0x00);
    code
}

/// Touches `words` words of memory with MSTORE, one word at a time.
#[must_use]
pub fn memory_sweep(words: u8) -> Vec<u8> {
    let mut code = Vec::with_capacity(usize::from(words) * 6 + 1);
    for word in 0..words {
        let [hi, lo] = (u16::from(word) * 32).to_be_bytes();
        code.extend_from_slice(&[0x60, 0xff, 0x61, hi, lo, 0x52]);
    }
    code.push(0x00);
    code
}

/// Single-threaded runtime for driving the async engine from benchmarks.
///
/// # Panics
///
/// Panics if the runtime cannot be created.
#[must_use]
pub fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("tokio runtime")
}

/// Shanghai engine over a fresh in-memory backend.
///
/// # Panics
///
/// Panics if the default config is rejected.
#[must_use]
pub fn engine() -> Evm<InMemoryBackend> {
    Evm::new(VmConfig::default(), Arc::new(InMemoryBackend::new())).expect("default config")
}

/// Runs `code` directly with a generous gas limit.
///
/// # Panics
///
/// Panics on a host failure; traps are returned in the result.
pub fn run(rt: &Runtime, evm: &mut Evm<InMemoryBackend>, code: &[u8]) -> ExecResult {
    rt.block_on(evm.run_code(RunCodeOpts {
        code: Bytes::from_slice(code),
        gas_limit: Some(30_000_000),
        ..RunCodeOpts::default()
    }))
    .expect("host failure")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_countdown_loop_terminates() {
        let rt = runtime();
        let mut evm = engine();
        let result = run(&rt, &mut evm, &countdown_loop(10));
        assert!(result.is_success(), "{:?}", result.exception_error);
        // PUSH2 + 10 * (JUMPDEST + PUSH1 + SWAP1 + SUB + DUP1 + PUSH1 + JUMPI)
        assert_eq!(result.execution_gas_used, 3 + 10 * (1 + 3 + 3 + 3 + 3 + 3 + 10));
    }

    #[test]
    fn test_workloads_succeed() {
        let rt = runtime();
        let mut evm = engine();
        for code in [keccak_once(1024), storage_writes(8), memory_sweep(16)] {
            let result = run(&rt, &mut evm, &code);
            assert!(result.is_success(), "{:?}", result.exception_error);
        }
    }
}
