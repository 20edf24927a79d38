//! # Precompiled Contracts
//!
//! Native implementations living at the fixed addresses `0x01`-`0x09`, plus
//! whatever the embedder registers (the BLS12-381 family of EIP-2537 sits
//! at `0x0a`-`0x12` and is supplied that way).
//!
//! | Address | Name | Active from |
//! |---------|------|-------------|
//! | 0x01 | ECRECOVER | Chainstart |
//! | 0x02 | SHA256 | Chainstart |
//! | 0x03 | RIPEMD160 | Chainstart |
//! | 0x04 | IDENTITY | Chainstart |
//! | 0x05 | MODEXP | Byzantium |
//! | 0x06 | ECADD | Byzantium |
//! | 0x07 | ECMUL | Byzantium |
//! | 0x08 | ECPAIRING | Byzantium |
//! | 0x09 | BLAKE2F | Istanbul |
//!
//! A precompile that fails for any reason consumes the whole gas limit it
//! was given.

pub mod blake2f;
pub mod bn128;
pub mod ecrecover;
pub mod identity;
pub mod modexp;
pub mod ripemd160;
pub mod sha256;

use crate::config::{Hardfork, RuleSet};
use crate::domain::value_objects::{Address, Bytes};
use crate::errors::PrecompileError;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Precompile execution result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrecompileOutput {
    /// Gas used by the precompile.
    pub gas_used: u64,
    /// Output data.
    pub output: Bytes,
}

/// Trait for precompiled contracts.
pub trait Precompile: Send + Sync {
    /// Execute the precompile with given input.
    ///
    /// # Arguments
    ///
    /// * `input` - Call data
    /// * `gas_limit` - Maximum gas available
    /// * `rules` - Active rule-set, for precompiles repriced by a hardfork
    ///
    /// # Errors
    ///
    /// Returns `OutOfGas` when the cost exceeds `gas_limit`, or an
    /// input error.
    fn execute(
        &self,
        input: &[u8],
        gas_limit: u64,
        rules: &RuleSet,
    ) -> Result<PrecompileOutput, PrecompileError>;

    /// Get the address of this precompile.
    fn address(&self) -> Address;
}

/// `base + word * ceil(len / 32)`, the cost shape of the hashing precompiles.
pub(crate) fn linear_cost(len: usize, base: u64, word: u64) -> u64 {
    let words = len.div_ceil(32) as u64;
    base.saturating_add(word.saturating_mul(words))
}

/// Fails with `OutOfGas` if `cost` exceeds `gas_limit`.
pub(crate) fn charge(cost: u64, gas_limit: u64) -> Result<(), PrecompileError> {
    if cost > gas_limit {
        return Err(PrecompileError::OutOfGas);
    }
    Ok(())
}

/// `input[offset..offset + len]`, right-padded with zeros past the end.
pub(crate) fn padded(input: &[u8], offset: usize, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    if offset < input.len() {
        let available = (input.len() - offset).min(len);
        out[..available].copy_from_slice(&input[offset..offset + available]);
    }
    out
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Activation condition of a built-in precompile.
#[derive(Clone, Copy, Debug)]
enum Gate {
    Hardfork(Hardfork),
}

impl Gate {
    fn is_open(self, rules: &RuleSet) -> bool {
        match self {
            Self::Hardfork(hardfork) => rules.gte(hardfork),
        }
    }
}

fn builtins() -> Vec<(Gate, Arc<dyn Precompile>)> {
    vec![
        (Gate::Hardfork(Hardfork::Chainstart), Arc::new(ecrecover::Ecrecover)),
        (Gate::Hardfork(Hardfork::Chainstart), Arc::new(sha256::Sha256Precompile)),
        (Gate::Hardfork(Hardfork::Chainstart), Arc::new(ripemd160::Ripemd160Precompile)),
        (Gate::Hardfork(Hardfork::Chainstart), Arc::new(identity::Identity)),
        (Gate::Hardfork(Hardfork::Byzantium), Arc::new(modexp::ModExp)),
        (Gate::Hardfork(Hardfork::Byzantium), Arc::new(bn128::EcAdd)),
        (Gate::Hardfork(Hardfork::Byzantium), Arc::new(bn128::EcMul)),
        (Gate::Hardfork(Hardfork::Byzantium), Arc::new(bn128::EcPairing)),
        (Gate::Hardfork(Hardfork::Istanbul), Arc::new(blake2f::Blake2F)),
    ]
}

/// Address-keyed dispatch of the precompiles active under one rule-set.
#[derive(Clone, Default)]
pub struct PrecompileRegistry {
    entries: BTreeMap<Address, Arc<dyn Precompile>>,
}

impl PrecompileRegistry {
    /// Registry with the built-ins active under `rules`.
    #[must_use]
    pub fn new(rules: &RuleSet) -> Self {
        let mut registry = Self::default();
        for (gate, precompile) in builtins() {
            if gate.is_open(rules) {
                registry.register(precompile);
            }
        }
        registry
    }

    /// Adds (or replaces) a precompile at its own address.
    pub fn register(&mut self, precompile: Arc<dyn Precompile>) {
        self.entries.insert(precompile.address(), precompile);
    }

    /// The precompile at `address`, if one is active.
    #[must_use]
    pub fn get(&self, address: &Address) -> Option<Arc<dyn Precompile>> {
        self.entries.get(address).cloned()
    }

    /// Returns true if a precompile is active at `address`.
    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        self.entries.contains_key(address)
    }

    /// Active addresses in ascending order, for access-list pre-warming.
    #[must_use]
    pub fn active_precompiles(&self) -> Vec<Address> {
        self.entries.keys().copied().collect()
    }
}

impl fmt::Debug for PrecompileRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrecompileRegistry")
            .field("addresses", &self.active_precompiles())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;

    fn registry(hardfork: Hardfork) -> PrecompileRegistry {
        PrecompileRegistry::new(&RuleSet::new(VmConfig::for_hardfork(hardfork)).unwrap())
    }

    #[test]
    fn test_gating_by_hardfork() {
        assert_eq!(registry(Hardfork::Homestead).active_precompiles().len(), 4);
        assert_eq!(registry(Hardfork::Byzantium).active_precompiles().len(), 8);

        let istanbul = registry(Hardfork::Istanbul);
        assert_eq!(istanbul.active_precompiles().len(), 9);
        assert!(istanbul.contains(&Address::from_low_u64(9)));
        assert!(!istanbul.contains(&Address::from_low_u64(10)));
    }

    #[test]
    fn test_dispatch_identity() {
        let rules = RuleSet::default();
        let registry = PrecompileRegistry::new(&rules);
        let identity = registry.get(&Address::from_low_u64(4)).unwrap();

        let out = identity.execute(b"hello world", 100_000, &rules).unwrap();
        assert_eq!(out.output.as_slice(), b"hello world");
    }

    struct Echo;

    impl Precompile for Echo {
        fn execute(
            &self,
            input: &[u8],
            _gas_limit: u64,
            _rules: &RuleSet,
        ) -> Result<PrecompileOutput, PrecompileError> {
            Ok(PrecompileOutput {
                gas_used: 1,
                output: Bytes::from_slice(input),
            })
        }

        fn address(&self) -> Address {
            Address::from_low_u64(0x0b)
        }
    }

    #[test]
    fn test_register_custom() {
        let mut registry = registry(Hardfork::Shanghai);
        registry.register(Arc::new(Echo));
        assert!(registry.contains(&Address::from_low_u64(0x0b)));
        assert_eq!(
            registry.active_precompiles().last(),
            Some(&Address::from_low_u64(0x0b))
        );
    }

    /// Decodes a hex literal, ignoring whitespace.
    pub(crate) fn hex(s: &str) -> Vec<u8> {
        let digits: Vec<u8> = s.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
        digits
            .chunks(2)
            .map(|pair| u8::from_str_radix(std::str::from_utf8(pair).unwrap(), 16).unwrap())
            .collect()
    }

    #[test]
    fn test_padded() {
        assert_eq!(padded(&[1, 2, 3], 1, 4), vec![2, 3, 0, 0]);
        assert_eq!(padded(&[1, 2, 3], 9, 2), vec![0, 0]);
    }
}
