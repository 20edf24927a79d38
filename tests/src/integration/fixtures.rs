//! Shared fixtures for the integration suite.

use qc_evm::evm::gas::memory_cost;
use qc_evm::prelude::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Externally-owned account that signs every test transaction.
pub const CALLER: Address = Address::from_low_u64(0xca11);

/// Starting balance of [`CALLER`].
pub const CALLER_BALANCE: u64 = 10_000_000;

/// Gas limit used by [`call_to`].
pub const TX_GAS: u64 = 1_000_000;

/// Installs an `EnvFilter` subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine on the default (Shanghai) rule-set with a funded [`CALLER`].
pub async fn shanghai() -> (Arc<InMemoryBackend>, Evm<InMemoryBackend>) {
    with_config(VmConfig::default()).await
}

/// Engine on `config` with a funded [`CALLER`].
pub async fn with_config(config: VmConfig) -> (Arc<InMemoryBackend>, Evm<InMemoryBackend>) {
    init_tracing();
    let backend = Arc::new(InMemoryBackend::new());
    backend
        .insert_balance(CALLER, U256::from(CALLER_BALANCE))
        .await;
    let evm = Evm::new(config, Arc::clone(&backend)).expect("valid config");
    (backend, evm)
}

/// Zero-value call from [`CALLER`] to `to`.
pub fn call_to(to: Address) -> RunCallOpts {
    RunCallOpts {
        caller: CALLER,
        to: Some(to),
        gas_limit: Some(TX_GAS),
        ..RunCallOpts::default()
    }
}

/// Contract creation from [`CALLER`].
pub fn create_with(init_code: &[u8], gas_limit: u64) -> RunCallOpts {
    RunCallOpts {
        caller: CALLER,
        data: Bytes::from_slice(init_code),
        gas_limit: Some(gas_limit),
        ..RunCallOpts::default()
    }
}

/// Sum of the static fees of `ops` under the engine's dispatch table.
pub fn static_fees(evm: &Evm<InMemoryBackend>, ops: &[u8]) -> u64 {
    ops.iter()
        .map(|op| evm.opcodes().get(*op).map_or(0, |info| info.fee))
        .sum()
}

/// Cost of growing memory from zero to `words` words.
pub fn memory_words(evm: &Evm<InMemoryBackend>, words: u64) -> u64 {
    memory_cost(words, evm.rules().gas()).expect("small memory")
}

/// Storage key `n`.
pub fn slot(n: u64) -> StorageKey {
    StorageKey::from_u256(U256::from(n))
}

/// Storage word `n`.
pub fn word(n: u64) -> StorageValue {
    StorageValue::from_u256(U256::from(n))
}

/// `PUSH2 address` for the small test addresses.
pub fn push2(code: &mut Vec<u8>, address: Address) {
    let bytes = address.as_bytes();
    code.extend_from_slice(&[0x61, bytes[18], bytes[19]]);
}

/// `CALL(gas = GAS, to, value, in = 0..0, out = 0..0)`, leaving the status on the stack.
pub fn call_all_gas(code: &mut Vec<u8>, to: Address, value: u8) {
    code.extend_from_slice(&[0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, value]);
    push2(code, to);
    code.extend_from_slice(&[0x5a, 0xf1]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_all_gas_layout() {
        let mut code = Vec::new();
        call_all_gas(&mut code, Address::from_low_u64(0xb000), 0);
        assert_eq!(code.len(), 15);
        assert_eq!(&code[10..], &[0x61, 0xb0, 0x00, 0x5a, 0xf1]);
    }

    #[tokio::test]
    async fn test_static_fees_follow_rule_set() {
        let (_backend, evm) = shanghai().await;
        // PUSH1 + MSTORE + PUSH0
        assert_eq!(static_fees(&evm, &[0x60, 0x52, 0x5f]), 3 + 3 + 2);
        assert_eq!(memory_words(&evm, 1), 3);
    }
}
