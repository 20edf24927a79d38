//! # SSTORE Net Metering
//!
//! Sequences of writes to one slot inside a single transaction, priced by
//! the EIP-2200 table as adjusted by EIP-2929 and EIP-3529. Each case
//! starts from a seeded original value; the first write also pays the cold
//! slot surcharge.

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use qc_evm::prelude::*;

    const CONTRACT: Address = Address::from_low_u64(0x5700);

    struct Outcome {
        gas_used: u64,
        refund: u64,
        schedule: GasSchedule,
    }

    /// Writes `values` to slot 0 in order, starting from `original`.
    async fn run_writes(config: VmConfig, original: u64, values: &[u8]) -> Outcome {
        let (backend, mut evm) = with_config(config).await;
        if original != 0 {
            backend.insert_storage(CONTRACT, slot(0), word(original)).await;
        }

        let mut code = Vec::new();
        let mut ops = Vec::new();
        for value in values {
            code.extend_from_slice(&[0x60, *value, 0x60, 0x00, 0x55]);
            ops.extend_from_slice(&[0x60, 0x60, 0x55]);
        }
        code.push(0x00);
        backend.insert_code(CONTRACT, &code).await;

        let result = evm.run_call(call_to(CONTRACT)).await.unwrap();
        assert!(result.exec.is_success(), "{:?}", result.exec.exception_error);

        let schedule = evm.rules().gas().clone();
        let fees = static_fees(&evm, &ops) + schedule.cold_sload;
        Outcome {
            gas_used: result.exec.execution_gas_used - fees,
            refund: result.exec.gas_refund,
            schedule,
        }
    }

    async fn shanghai_writes(original: u64, values: &[u8]) -> Outcome {
        run_writes(VmConfig::default(), original, values).await
    }

    #[tokio::test]
    async fn test_set_then_same_value_is_noop() {
        let out = shanghai_writes(0, &[5, 5]).await;
        let s = &out.schedule;
        assert_eq!(out.gas_used, s.sstore_init + s.sstore_noop);
        assert_eq!(out.refund, 0);
    }

    #[tokio::test]
    async fn test_set_then_other_value_is_dirty() {
        let out = shanghai_writes(0, &[5, 7]).await;
        let s = &out.schedule;
        assert_eq!(out.gas_used, s.sstore_init + s.sstore_dirty);
        assert_eq!(out.refund, 0);
    }

    #[tokio::test]
    async fn test_set_then_restore_zero_refunds_init() {
        let out = shanghai_writes(0, &[5, 0]).await;
        let s = &out.schedule;
        assert_eq!(out.gas_used, s.sstore_init + s.sstore_dirty);
        assert_eq!(out.refund, s.sstore_init_refund);
    }

    #[tokio::test]
    async fn test_clear_grants_clear_refund() {
        let out = shanghai_writes(3, &[0]).await;
        let s = &out.schedule;
        assert_eq!(out.gas_used, s.sstore_clean);
        assert_eq!(out.refund, s.sstore_clear_refund);
    }

    #[tokio::test]
    async fn test_clear_then_restore_reverses_clear_refund_once() {
        let out = shanghai_writes(3, &[0, 3]).await;
        let s = &out.schedule;
        assert_eq!(out.gas_used, s.sstore_clean + s.sstore_dirty);
        assert_eq!(out.refund, s.sstore_clean_refund);
    }

    #[tokio::test]
    async fn test_clear_then_new_value_removes_clear_refund() {
        let out = shanghai_writes(3, &[0, 5]).await;
        let s = &out.schedule;
        assert_eq!(out.gas_used, s.sstore_clean + s.sstore_dirty);
        assert_eq!(out.refund, 0);
    }

    #[tokio::test]
    async fn test_clear_rewrite_clear_grants_refund_once() {
        let out = shanghai_writes(3, &[0, 5, 0]).await;
        let s = &out.schedule;
        assert_eq!(out.gas_used, s.sstore_clean + 2 * s.sstore_dirty);
        assert_eq!(out.refund, s.sstore_clear_refund);
    }

    #[tokio::test]
    async fn test_reduced_refunds_after_london() {
        let berlin = run_writes(VmConfig::for_hardfork(Hardfork::Berlin), 3, &[0]).await;
        let london = run_writes(VmConfig::for_hardfork(Hardfork::London), 3, &[0]).await;
        assert_eq!(berlin.refund, 15_000);
        assert_eq!(london.refund, 4_800);
    }

    #[tokio::test]
    async fn test_sentry_traps_with_low_gas() {
        let (backend, mut evm) = shanghai().await;
        backend
            .insert_code(CONTRACT, &[0x60, 0x01, 0x60, 0x00, 0x55, 0x00])
            .await;
        let mut opts = call_to(CONTRACT);
        opts.gas_limit = Some(2_306);
        let result = evm.run_call(opts).await.unwrap();

        // 6 gas of pushes leaves exactly the sentry amount
        assert_eq!(result.exec.exception_error, Some(VmError::OutOfGas));
        assert_eq!(backend.slot_count(CONTRACT).await, 0);
    }
}
