//! # RIPEMD-160 Precompile (0x03)
//!
//! The 20-byte digest is returned left-padded to a 32-byte word.

use super::{charge, linear_cost, Precompile, PrecompileOutput};
use crate::config::RuleSet;
use crate::domain::value_objects::{Address, Bytes};
use crate::errors::PrecompileError;
use ripemd::{Digest, Ripemd160};

const RIPEMD160_BASE_COST: u64 = 600;
const RIPEMD160_WORD_COST: u64 = 120;

/// RIPEMD-160 precompile.
pub struct Ripemd160Precompile;

impl Precompile for Ripemd160Precompile {
    fn execute(
        &self,
        input: &[u8],
        gas_limit: u64,
        _rules: &RuleSet,
    ) -> Result<PrecompileOutput, PrecompileError> {
        let gas_cost = linear_cost(input.len(), RIPEMD160_BASE_COST, RIPEMD160_WORD_COST);
        charge(gas_cost, gas_limit)?;

        let digest = Ripemd160::digest(input);
        let mut output = vec![0u8; 32];
        output[12..].copy_from_slice(&digest);
        Ok(PrecompileOutput {
            gas_used: gas_cost,
            output: Bytes::from(output),
        })
    }

    fn address(&self) -> Address {
        Address::from_low_u64(3)
    }
}
