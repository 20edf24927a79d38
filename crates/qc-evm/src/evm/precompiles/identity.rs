//! # Identity Precompile (0x04)
//!
//! Simply returns the input data as output.

use super::{charge, linear_cost, Precompile, PrecompileOutput};
use crate::config::RuleSet;
use crate::domain::value_objects::{Address, Bytes};
use crate::errors::PrecompileError;

/// Gas cost per word.
const IDENTITY_WORD_COST: u64 = 3;
/// Base gas cost.
const IDENTITY_BASE_COST: u64 = 15;

/// Identity precompile - returns input as output.
pub struct Identity;

impl Precompile for Identity {
    fn execute(
        &self,
        input: &[u8],
        gas_limit: u64,
        _rules: &RuleSet,
    ) -> Result<PrecompileOutput, PrecompileError> {
        let gas_cost = linear_cost(input.len(), IDENTITY_BASE_COST, IDENTITY_WORD_COST);
        charge(gas_cost, gas_limit)?;

        Ok(PrecompileOutput {
            gas_used: gas_cost,
            output: Bytes::from_slice(input),
        })
    }

    fn address(&self) -> Address {
        Address::from_low_u64(4)
    }
}
