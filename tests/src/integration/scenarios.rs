//! # End-to-End Scenarios
//!
//! Whole transactions through `Evm::run_call`:
//!
//! 1. **Deploy then call**: a two-transaction flow returning 42
//! 2. **Reverted inner call**: inner writes vanish, outer writes after the CALL stay
//! 3. **Repeated SELFDESTRUCT**: the cold beneficiary surcharge is paid once
//! 4. **BLOCKHASH**: the host oracle is consulted inside the 256-block window only

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use async_trait::async_trait;
    use qc_evm::prelude::*;
    use std::sync::Arc;

    const OUTER: Address = Address::from_low_u64(0xa000);
    const INNER: Address = Address::from_low_u64(0xb000);
    const BENEFICIARY: Address = Address::from_low_u64(0xbe0e);

    // =========================================================================
    // DEPLOY THEN CALL
    // =========================================================================

    /// PUSH1 0x2a PUSH1 0x00 MSTORE PUSH1 0x20 PUSH1 0x00 RETURN
    const RETURN_42: [u8; 10] = [0x60, 0x2a, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3];

    /// Init code that copies `runtime` (appended after a 12-byte prefix) and returns it.
    fn deployer(runtime: &[u8]) -> Vec<u8> {
        let len = u8::try_from(runtime.len()).expect("short runtime");
        let mut code = vec![
            0x60, len, // size
            0x60, 0x0c, // code offset
            0x60, 0x00, // memory offset
            0x39, // CODECOPY
            0x60, len, 0x60, 0x00, 0xf3, // RETURN(0, len)
        ];
        code.extend_from_slice(runtime);
        code
    }

    #[tokio::test]
    async fn test_freshly_deployed_contract_returns_42() {
        let (backend, mut evm) = shanghai().await;

        let deployed = evm
            .run_call(create_with(&deployer(&RETURN_42), TX_GAS))
            .await
            .unwrap();
        assert!(deployed.exec.is_success(), "{:?}", deployed.exec.exception_error);
        let contract = deployed.created_address.unwrap();
        assert_eq!(backend.code_of(contract).await.as_slice(), &RETURN_42);

        let result = evm.run_call(call_to(contract)).await.unwrap();
        assert!(result.exec.is_success());

        let mut expected = [0u8; 32];
        expected[31] = 42;
        assert_eq!(result.exec.return_value.as_slice(), &expected);

        // Five static fees plus one word of memory expansion; RETURN is free.
        let fees = static_fees(&evm, &[0x60, 0x60, 0x52, 0x60, 0x60, 0xf3]);
        assert_eq!(result.exec.execution_gas_used, fees + memory_words(&evm, 1));
        assert_eq!(result.exec.execution_gas_used, 18);

        assert_eq!(backend.account(CALLER).await.unwrap().nonce, 2);
    }

    // =========================================================================
    // REVERTED INNER CALL
    // =========================================================================

    #[tokio::test]
    async fn test_reverted_inner_call_keeps_outer_writes() {
        let (backend, mut evm) = shanghai().await;

        // SSTORE(0, 1); MSTORE(0, 0xdead); REVERT(30, 2)
        let inner = [
            0x60, 0x01, 0x60, 0x00, 0x55, //
            0x61, 0xde, 0xad, 0x60, 0x00, 0x52, //
            0x60, 0x02, 0x60, 0x1e, 0xfd,
        ];
        backend.insert_code(INNER, &inner).await;

        let mut outer = vec![0x60, 0x11, 0x60, 0x00, 0x55]; // SSTORE(0, 0x11)
        call_all_gas(&mut outer, INNER, 0);
        outer.extend_from_slice(&[
            0x15, 0x60, 0x04, 0x55, // SSTORE(4, ISZERO(status))
            0x3d, 0x60, 0x02, 0x55, // SSTORE(2, RETURNDATASIZE)
            0x60, 0x02, 0x60, 0x00, 0x60, 0x00, 0x3e, // RETURNDATACOPY(0, 0, 2)
            0x60, 0x00, 0x51, 0x60, 0x03, 0x55, // SSTORE(3, MLOAD(0))
            0x60, 0x77, 0x60, 0x01, 0x55, // SSTORE(1, 0x77)
            0x00,
        ]);
        backend.insert_code(OUTER, &outer).await;

        let result = evm.run_call(call_to(OUTER)).await.unwrap();
        assert!(result.exec.is_success(), "{:?}", result.exec.exception_error);

        assert_eq!(backend.storage_value(OUTER, slot(0)).await, word(0x11));
        assert_eq!(backend.storage_value(OUTER, slot(1)).await, word(0x77));
        assert_eq!(backend.storage_value(OUTER, slot(2)).await, word(2));
        assert_eq!(
            backend.storage_value(OUTER, slot(3)).await,
            StorageValue::from_u256(U256::from(0xdead_u64) << 240)
        );
        assert_eq!(backend.storage_value(OUTER, slot(4)).await, word(1));

        assert_eq!(backend.storage_value(INNER, slot(0)).await, StorageValue::ZERO);
        assert_eq!(backend.slot_count(INNER).await, 0);
    }

    #[tokio::test]
    async fn test_reverted_inner_call_drops_its_logs() {
        let (backend, mut evm) = shanghai().await;

        // LOG0(0, 0); REVERT(0, 0)
        backend
            .insert_code(INNER, &[0x60, 0x00, 0x60, 0x00, 0xa0, 0x60, 0x00, 0x60, 0x00, 0xfd])
            .await;
        // LOG0(0, 0); CALL inner; STOP
        let mut outer = vec![0x60, 0x00, 0x60, 0x00, 0xa0];
        call_all_gas(&mut outer, INNER, 0);
        outer.extend_from_slice(&[0x50, 0x00]);
        backend.insert_code(OUTER, &outer).await;

        let result = evm.run_call(call_to(OUTER)).await.unwrap();
        assert!(result.exec.is_success());
        assert_eq!(result.exec.logs.len(), 1);
        assert_eq!(result.exec.logs[0].address, OUTER);
    }

    // =========================================================================
    // REPEATED SELFDESTRUCT
    // =========================================================================

    /// Runs OUTER, which calls a self-destructing INNER twice.
    async fn selfdestruct_twice(access_list: Vec<(Address, Vec<StorageKey>)>) -> (u64, EvmResult) {
        let (backend, mut evm) = shanghai().await;

        let mut inner = Vec::new();
        push2(&mut inner, BENEFICIARY);
        inner.push(0xff);
        backend.insert_code(INNER, &inner).await;

        let mut outer = Vec::new();
        call_all_gas(&mut outer, INNER, 0);
        outer.push(0x50);
        call_all_gas(&mut outer, INNER, 0);
        outer.extend_from_slice(&[0x50, 0x00]);
        backend.insert_code(OUTER, &outer).await;

        let mut opts = call_to(OUTER);
        opts.access_list = access_list;
        let result = evm.run_call(opts).await.unwrap();
        (evm.rules().gas().cold_account_access, result)
    }

    #[tokio::test]
    async fn test_selfdestruct_cold_beneficiary_charged_once() {
        let (cold_fee, cold) = selfdestruct_twice(Vec::new()).await;
        let (_, warm) = selfdestruct_twice(vec![(BENEFICIARY, Vec::new())]).await;

        assert!(cold.exec.is_success());
        assert!(warm.exec.is_success());
        assert_eq!(
            cold.exec.execution_gas_used - warm.exec.execution_gas_used,
            cold_fee
        );
        assert_eq!(cold.exec.selfdestruct.get(&INNER), Some(&BENEFICIARY));
        assert_eq!(cold.exec.selfdestruct.len(), 1);
    }

    // =========================================================================
    // BLOCKHASH
    // =========================================================================

    struct FixedHashes;

    #[async_trait]
    impl BlockHashOracle for FixedHashes {
        async fn get_block_hash(&self, number: u64) -> Option<Hash> {
            let mut bytes = [0u8; 32];
            bytes[24..].copy_from_slice(&number.to_be_bytes());
            bytes[0] = 0xbb;
            Some(Hash::new(bytes))
        }
    }

    async fn blockhash_of(number: u8) -> StorageValue {
        let (backend, evm) = shanghai().await;
        let mut evm = evm.with_block_hashes(Arc::new(FixedHashes));
        // SSTORE(0, BLOCKHASH(number))
        backend
            .insert_code(OUTER, &[0x60, number, 0x40, 0x60, 0x00, 0x55, 0x00])
            .await;
        let mut opts = call_to(OUTER);
        opts.block = Some(BlockContext {
            number: 300,
            ..BlockContext::default()
        });
        let result = evm.run_call(opts).await.unwrap();
        assert!(result.exec.is_success());
        backend.storage_value(OUTER, slot(0)).await
    }

    #[tokio::test]
    async fn test_blockhash_window() {
        let inside = blockhash_of(100).await;
        assert_eq!(inside.as_bytes()[0], 0xbb);
        assert_eq!(inside.as_bytes()[31], 100);

        // 300 - 256 = 44 is the oldest visible block
        assert_eq!(blockhash_of(43).await, StorageValue::ZERO);
        assert_eq!(blockhash_of(44).await.as_bytes()[31], 44);
    }
}
