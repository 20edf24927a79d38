//! # Contract Creation
//!
//! Address collisions, size limits and the CREATE opcode path.

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use qc_evm::prelude::*;

    const FACTORY: Address = Address::from_low_u64(0xf000);

    /// PUSH1 1 PUSH1 0 MSTORE8 PUSH1 1 PUSH1 0 RETURN: deploys the byte 0x01.
    const DEPLOY_ONE_BYTE: [u8; 10] = [0x60, 0x01, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xf3];

    #[tokio::test]
    async fn test_create_collision_on_nonce_burns_gas() {
        let (backend, mut evm) = shanghai().await;
        let target = generate_address(CALLER, 0);
        backend
            .insert_account(target, Account::new(1, U256::zero()))
            .await;

        let result = evm
            .run_call(create_with(&DEPLOY_ONE_BYTE, 200_000))
            .await
            .unwrap();

        assert_eq!(result.exec.exception_error, Some(VmError::CreateCollision));
        assert_eq!(result.exec.execution_gas_used, 200_000);
        assert_eq!(result.created_address, Some(target));
        assert!(backend.code_of(target).await.is_empty());
        assert_eq!(backend.account(target).await.unwrap().nonce, 1);
    }

    #[tokio::test]
    async fn test_create_collision_on_code() {
        let (backend, mut evm) = shanghai().await;
        let target = generate_address(CALLER, 0);
        backend.insert_code(target, &[0x00]).await;

        let result = evm
            .run_call(create_with(&DEPLOY_ONE_BYTE, 200_000))
            .await
            .unwrap();

        assert_eq!(result.exec.exception_error, Some(VmError::CreateCollision));
        assert_eq!(result.exec.execution_gas_used, 200_000);
        assert_eq!(backend.code_of(target).await.as_slice(), &[0x00]);
    }

    #[tokio::test]
    async fn test_create_opcode_collision_consumes_forwarded_gas() {
        let (backend, mut evm) = shanghai().await;
        backend
            .insert_account(generate_address(FACTORY, 0), Account::new(1, U256::zero()))
            .await;
        // SSTORE(0, ISZERO(CREATE(0, 0, 0)))
        let code = [
            0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0xf0, //
            0x15, 0x60, 0x00, 0x55, 0x00,
        ];
        backend.insert_code(FACTORY, &code).await;

        let result = evm.run_call(call_to(FACTORY)).await.unwrap();
        assert!(result.exec.is_success(), "{:?}", result.exec.exception_error);
        assert_eq!(backend.storage_value(FACTORY, slot(0)).await, word(1));

        let schedule = evm.rules().gas().clone();
        let before = static_fees(&evm, &[0x60, 0x60, 0x60, 0xf0]);
        let available = TX_GAS - before;
        let forwarded = available - available / 64;
        let after = static_fees(&evm, &[0x15, 0x60, 0x55]) + schedule.cold_sload + schedule.sstore_init;
        assert_eq!(result.exec.execution_gas_used, before + forwarded + after);

        // The factory nonce still moved.
        assert_eq!(backend.account(FACTORY).await.unwrap().nonce, 1);
    }

    #[tokio::test]
    async fn test_create_opcode_deploys_and_pushes_address() {
        let (backend, mut evm) = shanghai().await;
        // MSTORE(0, init) then SSTORE(0, CREATE(0, 22, 10))
        let mut init_word = [0u8; 32];
        init_word[22..].copy_from_slice(&DEPLOY_ONE_BYTE);
        let mut code = vec![0x7f];
        code.extend_from_slice(&init_word);
        code.extend_from_slice(&[
            0x60, 0x00, 0x52, // MSTORE
            0x60, 0x0a, 0x60, 0x16, 0x60, 0x00, 0xf0, // CREATE(0, 22, 10)
            0x60, 0x00, 0x55, 0x00,
        ]);
        backend.insert_code(FACTORY, &code).await;

        let result = evm.run_call(call_to(FACTORY)).await.unwrap();
        assert!(result.exec.is_success(), "{:?}", result.exec.exception_error);

        let created = generate_address(FACTORY, 0);
        assert_eq!(
            backend.storage_value(FACTORY, slot(0)).await,
            StorageValue::from_u256(created.to_word())
        );
        assert_eq!(backend.code_of(created).await.as_slice(), &[0x01]);
        assert_eq!(backend.account(created).await.unwrap().nonce, 1);
    }

    #[tokio::test]
    async fn test_oversized_code_rejected() {
        let (backend, mut evm) = shanghai().await;
        // RETURN(0, 24577): one byte above the deployed-code limit
        let init = [0x61, 0x60, 0x01, 0x60, 0x00, 0xf3];
        let result = evm.run_call(create_with(&init, 5_000_000)).await.unwrap();

        assert_eq!(result.exec.exception_error, Some(VmError::CodeSizeExceedsMaximum));
        assert_eq!(result.exec.execution_gas_used, 5_000_000);
        let target = generate_address(CALLER, 0);
        assert!(backend.code_of(target).await.is_empty());
    }

    #[tokio::test]
    async fn test_unlimited_code_size_allows_large_deploy() {
        let mut config = VmConfig::default();
        config.allow_unlimited_contract_size = true;
        let (backend, mut evm) = with_config(config).await;
        let init = [0x61, 0x60, 0x01, 0x60, 0x00, 0xf3];
        let result = evm.run_call(create_with(&init, 9_000_000)).await.unwrap();

        assert!(result.exec.is_success(), "{:?}", result.exec.exception_error);
        let target = generate_address(CALLER, 0);
        assert_eq!(backend.code_of(target).await.len(), 24_577);
    }

    #[tokio::test]
    async fn test_create2_address_uses_salt() {
        let (backend, mut evm) = shanghai().await;
        let salt = Hash::new([7u8; 32]);
        let mut opts = create_with(&DEPLOY_ONE_BYTE, 200_000);
        opts.salt = Some(salt);
        let result = evm.run_call(opts).await.unwrap();

        let expected = generate_address2(CALLER, salt, &DEPLOY_ONE_BYTE);
        assert_eq!(result.created_address, Some(expected));
        assert_eq!(backend.code_of(expected).await.as_slice(), &[0x01]);
    }

    /// PUSH1 100 PUSH1 0 RETURN: returns 100 zero bytes.
    const RETURN_100_BYTES: [u8; 5] = [0x60, 0x64, 0x60, 0x00, 0xf3];

    fn create_with_value(value: u64) -> RunCallOpts {
        RunCallOpts {
            value: U256::from(value),
            ..create_with(&RETURN_100_BYTES, 10_000)
        }
    }

    #[tokio::test]
    async fn test_frontier_code_store_out_of_gas_keeps_account() {
        let (backend, mut evm) = with_config(VmConfig::for_hardfork(Hardfork::Chainstart)).await;
        let target = generate_address(CALLER, 0);

        let result = evm.run_call(create_with_value(100)).await.unwrap();

        assert_eq!(result.exec.exception_error, Some(VmError::CodeStoreOutOfGas));
        assert_eq!(result.created_address, Some(target));
        let used = static_fees(&evm, &[0x60, 0x60, 0xf3]) + memory_words(&evm, 4);
        assert_eq!(result.exec.execution_gas_used, used);

        // The frame committed: value moved, no code stored.
        let created = backend.account(target).await.unwrap();
        assert_eq!(created.balance, U256::from(100));
        assert_eq!(created.nonce, 0);
        assert!(backend.code_of(target).await.is_empty());
        let caller = backend.account(CALLER).await.unwrap();
        assert_eq!(caller.balance, U256::from(CALLER_BALANCE - 100));
    }

    #[tokio::test]
    async fn test_homestead_code_deposit_out_of_gas_reverts() {
        let (backend, mut evm) = with_config(VmConfig::for_hardfork(Hardfork::Homestead)).await;
        let target = generate_address(CALLER, 0);

        let result = evm.run_call(create_with_value(100)).await.unwrap();

        assert_eq!(result.exec.exception_error, Some(VmError::OutOfGas));
        assert_eq!(result.exec.execution_gas_used, 10_000);
        assert!(backend.account(target).await.is_none());
    }
}
