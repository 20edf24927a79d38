//! # Call Value and Depth Gates
//!
//! A nested CALL whose value exceeds the caller's balance, or that would
//! exceed the call depth, is refused before any frame is opened: nothing
//! moves, a zero is pushed, and only the metered fees are spent.

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use qc_evm::prelude::*;

    const SENDER: Address = Address::from_low_u64(0xa000);
    const TARGET: Address = Address::from_low_u64(0xd000);

    /// CALL(gas = 100000, TARGET, value, 0, 0, 0, 0); SSTORE(0, ISZERO(status))
    fn send_value(value: u8) -> Vec<u8> {
        let mut code = vec![0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, value];
        push2(&mut code, TARGET);
        code.extend_from_slice(&[0x62, 0x01, 0x86, 0xa0, 0xf1]);
        code.extend_from_slice(&[0x15, 0x60, 0x00, 0x55, 0x00]);
        code
    }

    #[tokio::test]
    async fn test_call_with_insufficient_balance_pushes_zero() {
        let (backend, mut evm) = shanghai().await;
        backend.insert_balance(SENDER, U256::from(10)).await;
        backend.insert_code(SENDER, &send_value(100)).await;

        let result = evm.run_call(call_to(SENDER)).await.unwrap();
        assert!(result.exec.is_success(), "{:?}", result.exec.exception_error);

        // status 0 stored as ISZERO(0) = 1
        assert_eq!(backend.storage_value(SENDER, slot(0)).await, word(1));
        assert!(backend.account(TARGET).await.is_none());
        assert_eq!(backend.account(SENDER).await.unwrap().balance, U256::from(10));

        // Only the metered fees: the forwarded 100000 is never charged and the
        // stipend stays with the caller.
        let s = evm.rules().gas().clone();
        let ops = [0x60, 0x60, 0x60, 0x60, 0x60, 0x61, 0x62, 0xf1, 0x15, 0x60, 0x55];
        let expected = static_fees(&evm, &ops)
            + s.cold_account_access
            + s.call_value_transfer
            + s.call_new_account
            - s.call_stipend
            + s.cold_sload
            + s.sstore_init;
        assert_eq!(result.exec.execution_gas_used, expected);
        assert!(result.exec.execution_gas_used < 100_000);
    }

    #[tokio::test]
    async fn test_call_with_sufficient_balance_moves_value() {
        let (backend, mut evm) = shanghai().await;
        backend.insert_balance(SENDER, U256::from(500)).await;
        backend.insert_code(SENDER, &send_value(100)).await;

        let result = evm.run_call(call_to(SENDER)).await.unwrap();
        assert!(result.exec.is_success());

        assert_eq!(backend.storage_value(SENDER, slot(0)).await, StorageValue::ZERO);
        assert_eq!(backend.account(TARGET).await.unwrap().balance, U256::from(100));
        assert_eq!(backend.account(SENDER).await.unwrap().balance, U256::from(400));
    }

    #[tokio::test]
    async fn test_call_depth_limit_refuses_frame() {
        let mut config = VmConfig::default();
        config.max_call_depth = 1;
        let (backend, mut evm) = with_config(config).await;
        backend.insert_balance(SENDER, U256::from(500)).await;
        backend.insert_code(SENDER, &send_value(100)).await;

        let result = evm.run_call(call_to(SENDER)).await.unwrap();
        assert!(result.exec.is_success());

        assert_eq!(backend.storage_value(SENDER, slot(0)).await, word(1));
        assert!(backend.account(TARGET).await.is_none());
    }

    #[tokio::test]
    async fn test_top_level_value_above_balance_is_trapped() {
        let (backend, mut evm) = shanghai().await;
        let mut opts = call_to(TARGET);
        opts.value = U256::from(CALLER_BALANCE + 1);
        let result = evm.run_call(opts).await.unwrap();

        assert_eq!(result.exec.exception_error, Some(VmError::InsufficientBalance));
        assert_eq!(result.exec.execution_gas_used, 0);
        assert!(backend.account(TARGET).await.is_none());
    }

    #[tokio::test]
    async fn test_skip_balance_tops_up_caller() {
        let (backend, mut evm) = shanghai().await;
        let mut opts = call_to(TARGET);
        opts.value = U256::from(CALLER_BALANCE * 3);
        opts.skip_balance = true;
        let result = evm.run_call(opts).await.unwrap();

        assert!(result.exec.is_success());
        assert_eq!(
            backend.account(TARGET).await.unwrap().balance,
            U256::from(CALLER_BALANCE * 3)
        );
    }
}
