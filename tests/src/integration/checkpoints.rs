//! # Checkpoint Algebra
//!
//! Random well-nested `checkpoint` / `commit` / `revert` sequences against
//! `StateManager`, checked after every step against a snapshot model: a
//! reverted frame restores the snapshot taken at its checkpoint, a committed
//! frame simply drops it.
//!
//! The backend is inspected at the end, after the last frame closes and the
//! manager flushes.

#[cfg(test)]
mod tests {
    use super::super::fixtures::{init_tracing, slot, word};
    use qc_evm::prelude::*;
    use qc_evm::state::CheckpointMap;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    const CONTRACT: Address = Address::from_low_u64(0xc0de);
    const ACCOUNTS: [Address; 3] = [
        Address::from_low_u64(0x1001),
        Address::from_low_u64(0x1002),
        Address::from_low_u64(0x1003),
    ];

    /// Committed view of the world: storage of `CONTRACT` plus balances.
    #[derive(Clone, Debug, Default, PartialEq, Eq)]
    struct Model {
        storage: BTreeMap<u64, u64>,
        balances: BTreeMap<usize, u64>,
    }

    enum Step {
        Store { key: u64, value: u64 },
        Balance { index: usize, balance: u64 },
        Checkpoint,
        Commit,
        Revert,
    }

    fn next_step(rng: &mut StdRng, depth: usize) -> Step {
        match rng.gen_range(0..10) {
            0..=3 => Step::Store {
                key: rng.gen_range(0..4),
                value: rng.gen_range(0..3),
            },
            4 | 5 => Step::Balance {
                index: rng.gen_range(0..ACCOUNTS.len()),
                balance: rng.gen_range(1..5),
            },
            6 | 7 => Step::Checkpoint,
            8 if depth > 1 => Step::Commit,
            9 if depth > 1 => Step::Revert,
            _ => Step::Checkpoint,
        }
    }

    async fn assert_matches(state: &mut StateManager<InMemoryBackend>, model: &Model) {
        for key in 0..4 {
            let expected = model.storage.get(&key).copied().unwrap_or(0);
            let actual = state.get_contract_storage(CONTRACT, slot(key)).await.unwrap();
            assert_eq!(actual, word(expected), "slot {key}");
        }
        for (index, address) in ACCOUNTS.iter().enumerate() {
            let expected = model.balances.get(&index).copied().unwrap_or(0);
            let actual = state.get_account_or_default(*address).await.unwrap().balance;
            assert_eq!(actual, U256::from(expected), "account {index}");
        }
    }

    async fn run_sequence(seed: u64) {
        let backend = Arc::new(InMemoryBackend::new());
        let mut state = StateManager::new(Arc::clone(&backend));
        let mut rng = StdRng::seed_from_u64(seed);

        let mut model = Model::default();
        let mut snapshots: Vec<Model> = Vec::new();

        // The transaction frame; its commit flushes to the backend.
        state.checkpoint();
        snapshots.push(model.clone());

        for _ in 0..200 {
            match next_step(&mut rng, snapshots.len()) {
                Step::Store { key, value } => {
                    state.put_contract_storage(CONTRACT, slot(key), word(value));
                    if value == 0 {
                        model.storage.remove(&key);
                    } else {
                        model.storage.insert(key, value);
                    }
                }
                Step::Balance { index, balance } => {
                    state.put_account(ACCOUNTS[index], Account::new(0, U256::from(balance)));
                    model.balances.insert(index, balance);
                }
                Step::Checkpoint => {
                    state.checkpoint();
                    snapshots.push(model.clone());
                }
                Step::Commit => {
                    state.commit().await.unwrap();
                    snapshots.pop();
                }
                Step::Revert => {
                    state.revert().await.unwrap();
                    model = snapshots.pop().unwrap();
                }
            }
            assert_eq!(state.depth(), snapshots.len());
            assert_matches(&mut state, &model).await;
        }

        while snapshots.len() > 1 {
            if rng.gen_bool(0.5) {
                state.commit().await.unwrap();
                snapshots.pop();
            } else {
                state.revert().await.unwrap();
                model = snapshots.pop().unwrap();
            }
        }
        state.commit().await.unwrap();
        assert_eq!(state.depth(), 0);

        for key in 0..4 {
            let expected = model.storage.get(&key).copied().unwrap_or(0);
            assert_eq!(backend.storage_value(CONTRACT, slot(key)).await, word(expected));
        }
        for (index, address) in ACCOUNTS.iter().enumerate() {
            let stored = backend.account(*address).await.map(|account| account.balance);
            let expected = model.balances.get(&index).map(|balance| U256::from(*balance));
            assert_eq!(stored, expected, "account {index}");
        }
    }

    #[tokio::test]
    async fn test_random_nested_frames_match_snapshot_model() {
        init_tracing();
        for seed in 0..32 {
            run_sequence(seed).await;
        }
    }

    #[tokio::test]
    async fn test_reverted_transaction_never_reaches_backend() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut state = StateManager::new(Arc::clone(&backend));

        state.checkpoint();
        state.put_contract_storage(CONTRACT, slot(1), word(9));
        state.checkpoint();
        state.put_contract_storage(CONTRACT, slot(2), word(8));
        state.commit().await.unwrap();
        state.revert().await.unwrap();

        assert_eq!(state.depth(), 0);
        assert_eq!(backend.slot_count(CONTRACT).await, 0);
    }

    #[tokio::test]
    async fn test_clear_storage_is_revertible() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.insert_storage(CONTRACT, slot(0), word(5)).await;
        let mut state = StateManager::new(Arc::clone(&backend));

        state.checkpoint();
        state.checkpoint();
        state.clear_contract_storage(CONTRACT);
        assert_eq!(
            state.get_contract_storage(CONTRACT, slot(0)).await.unwrap(),
            StorageValue::ZERO
        );
        state.revert().await.unwrap();
        assert_eq!(
            state.get_contract_storage(CONTRACT, slot(0)).await.unwrap(),
            word(5)
        );
        state.commit().await.unwrap();
        assert_eq!(backend.storage_value(CONTRACT, slot(0)).await, word(5));
    }

    #[test]
    fn test_commit_keeps_outer_capture() {
        let mut map: CheckpointMap<u8, u8> = CheckpointMap::new();
        map.put(1, 10);
        map.checkpoint();
        map.put(1, 11);
        map.checkpoint();
        map.put(1, 12);
        map.commit().unwrap();
        map.revert().unwrap();

        assert_eq!(map.get(&1), Some(&10));
        assert_eq!(map.flush().unwrap(), vec![(1, Some(10))]);
    }
}
