//! # Static Frames
//!
//! Inside a STATICCALL any state change traps the callee: SSTORE, LOG and
//! CALL with value all end the frame with a zero status and leave nothing
//! behind, while the caller carries on.

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use qc_evm::prelude::*;

    const OUTER: Address = Address::from_low_u64(0xa000);
    const INNER: Address = Address::from_low_u64(0xb000);
    const BYSTANDER: Address = Address::from_low_u64(0xd000);

    /// SSTORE(0, 1)
    const WRITER: [u8; 6] = [0x60, 0x01, 0x60, 0x00, 0x55, 0x00];
    /// LOG0(0, 0)
    const LOGGER: [u8; 6] = [0x60, 0x00, 0x60, 0x00, 0xa0, 0x00];
    /// SLOAD(0)
    const READER: [u8; 5] = [0x60, 0x00, 0x54, 0x50, 0x00];

    /// Calls INNER with 100000 gas and stores `2 + status` in slot 0.
    fn outer(is_static: bool) -> Vec<u8> {
        let mut code = vec![0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00];
        if !is_static {
            code.extend_from_slice(&[0x60, 0x00]);
        }
        push2(&mut code, INNER);
        code.extend_from_slice(&[0x62, 0x01, 0x86, 0xa0]);
        code.push(if is_static { 0xfa } else { 0xf1 });
        code.extend_from_slice(&[0x60, 0x02, 0x01, 0x60, 0x00, 0x55, 0x00]);
        code
    }

    /// Sends 1 wei to BYSTANDER.
    fn payer() -> Vec<u8> {
        let mut code = Vec::new();
        call_all_gas(&mut code, BYSTANDER, 1);
        code.extend_from_slice(&[0x50, 0x00]);
        code
    }

    async fn run(is_static: bool, inner: &[u8]) -> (std::sync::Arc<InMemoryBackend>, EvmResult) {
        let (backend, mut evm) = shanghai().await;
        backend.insert_code(OUTER, &outer(is_static)).await;
        backend.insert_code(INNER, inner).await;
        backend.insert_balance(INNER, U256::from(10)).await;

        let result = evm.run_call(call_to(OUTER)).await.unwrap();
        assert!(result.exec.is_success(), "{:?}", result.exec.exception_error);
        (backend, result)
    }

    #[tokio::test]
    async fn test_sstore_in_static_frame_fails() {
        let (backend, _) = run(true, &WRITER).await;
        assert_eq!(backend.storage_value(OUTER, slot(0)).await, word(2));
        assert_eq!(backend.storage_value(INNER, slot(0)).await, word(0));

        let (backend, _) = run(false, &WRITER).await;
        assert_eq!(backend.storage_value(OUTER, slot(0)).await, word(3));
        assert_eq!(backend.storage_value(INNER, slot(0)).await, word(1));
    }

    #[tokio::test]
    async fn test_log_in_static_frame_fails() {
        let (backend, result) = run(true, &LOGGER).await;
        assert_eq!(backend.storage_value(OUTER, slot(0)).await, word(2));
        assert!(result.exec.logs.is_empty());

        let (backend, result) = run(false, &LOGGER).await;
        assert_eq!(backend.storage_value(OUTER, slot(0)).await, word(3));
        assert_eq!(result.exec.logs.len(), 1);
    }

    #[tokio::test]
    async fn test_value_call_in_static_frame_fails() {
        let (backend, _) = run(true, &payer()).await;
        assert_eq!(backend.storage_value(OUTER, slot(0)).await, word(2));
        assert!(backend.account(BYSTANDER).await.is_none());
        assert_eq!(backend.account(INNER).await.unwrap().balance, U256::from(10));

        let (backend, _) = run(false, &payer()).await;
        assert_eq!(backend.storage_value(OUTER, slot(0)).await, word(3));
        assert_eq!(backend.account(BYSTANDER).await.unwrap().balance, U256::one());
        assert_eq!(backend.account(INNER).await.unwrap().balance, U256::from(9));
    }

    #[tokio::test]
    async fn test_reads_in_static_frame_succeed() {
        let (backend, _) = run(true, &READER).await;
        assert_eq!(backend.storage_value(OUTER, slot(0)).await, word(3));
    }
}
