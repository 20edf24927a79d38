//! # ModExp Precompile (0x05)
//!
//! Arbitrary-precision modular exponentiation (EIP-198, repriced by EIP-2565).
//!
//! Input format:
//! - bytes 0-31: length of base (Bsize)
//! - bytes 32-63: length of exponent (Esize)
//! - bytes 64-95: length of modulus (Msize)
//! - bytes 96-(96+Bsize): base
//! - bytes (96+Bsize)-(96+Bsize+Esize): exponent
//! - bytes (96+Bsize+Esize)-(96+Bsize+Esize+Msize): modulus
//!
//! Missing bytes read as zero. The output is exactly Msize bytes.

use super::{charge, padded, Precompile, PrecompileOutput};
use crate::config::RuleSet;
use crate::domain::value_objects::{Address, Bytes, U256};
use crate::errors::PrecompileError;
use crate::evm::gas::saturating_u64;

/// Minimum gas cost under EIP-2565.
const MODEXP_MIN_GAS: u128 = 200;
/// EIP-198 divisor.
const GQUAD_DIVISOR: u128 = 20;
/// EIP-2565 divisor.
const GQUAD_DIVISOR_2565: u128 = 3;

/// ModExp precompile.
pub struct ModExp;

impl Precompile for ModExp {
    fn execute(
        &self,
        input: &[u8],
        gas_limit: u64,
        rules: &RuleSet,
    ) -> Result<PrecompileOutput, PrecompileError> {
        let base_len = saturating_u64(U256::from_big_endian(&padded(input, 0, 32)));
        let exp_len = saturating_u64(U256::from_big_endian(&padded(input, 32, 32)));
        let mod_len = saturating_u64(U256::from_big_endian(&padded(input, 64, 32)));

        let exp_head = exponent_head(input, base_len, exp_len);
        let gas_cost = gas_cost(base_len, exp_len, mod_len, exp_head, rules.is_activated(2565));
        charge(gas_cost, gas_limit)?;

        if base_len == 0 && mod_len == 0 {
            return Ok(PrecompileOutput {
                gas_used: gas_cost,
                output: Bytes::new(),
            });
        }

        let to_usize = |len: u64| usize::try_from(len).map_err(|_| PrecompileError::OutOfGas);
        let base_len = to_usize(base_len)?;
        let exp_len = to_usize(exp_len)?;
        let mod_len = to_usize(mod_len)?;

        let base = padded(input, 96, base_len);
        let exponent = padded(input, 96usize.saturating_add(base_len), exp_len);
        let modulus = padded(
            input,
            96usize.saturating_add(base_len).saturating_add(exp_len),
            mod_len,
        );

        let output = if modulus.iter().all(|&b| b == 0) {
            vec![0u8; mod_len]
        } else {
            fit_to(aurora_engine_modexp::modexp(&base, &exponent, &modulus), mod_len)
        };

        Ok(PrecompileOutput {
            gas_used: gas_cost,
            output: Bytes::from(output),
        })
    }

    fn address(&self) -> Address {
        Address::from_low_u64(5)
    }
}

/// The first `min(32, exp_len)` exponent bytes as an integer.
fn exponent_head(input: &[u8], base_len: u64, exp_len: u64) -> U256 {
    let Ok(start) = usize::try_from(base_len.saturating_add(96)) else {
        return U256::zero();
    };
    let head_len = exp_len.min(32) as usize;
    U256::from_big_endian(&padded(input, start, head_len))
}

/// Left-pads or truncates (from the left) to `len` bytes.
fn fit_to(mut value: Vec<u8>, len: usize) -> Vec<u8> {
    if value.len() > len {
        value.drain(..value.len() - len);
        value
    } else {
        let mut out = vec![0u8; len - value.len()];
        out.extend_from_slice(&value);
        out
    }
}

/// Bit length of the exponent after the first 32 bytes count for 8 bits each.
fn adjusted_exponent_length(exp_len: u64, exp_head: U256) -> u128 {
    let head_bits = if exp_head.is_zero() {
        0
    } else {
        u128::from(exp_head.bits() as u64 - 1)
    };
    if exp_len <= 32 {
        head_bits
    } else {
        u128::from(exp_len - 32)
            .saturating_mul(8)
            .saturating_add(head_bits)
    }
}

/// EIP-198 piecewise multiplication complexity.
fn mult_complexity(x: u128) -> u128 {
    if x <= 64 {
        x.saturating_mul(x)
    } else if x <= 1024 {
        (x.saturating_mul(x) / 4)
            .saturating_add(96 * x)
            .saturating_sub(3072)
    } else {
        (x.saturating_mul(x) / 16)
            .saturating_add(x.saturating_mul(480))
            .saturating_sub(199_680)
    }
}

fn gas_cost(base_len: u64, exp_len: u64, mod_len: u64, exp_head: U256, eip2565: bool) -> u64 {
    let max_len = u128::from(base_len.max(mod_len));
    let iterations = adjusted_exponent_length(exp_len, exp_head).max(1);

    let cost = if eip2565 {
        let words = max_len.div_ceil(8);
        (words.saturating_mul(words).saturating_mul(iterations) / GQUAD_DIVISOR_2565)
            .max(MODEXP_MIN_GAS)
    } else {
        mult_complexity(max_len).saturating_mul(iterations) / GQUAD_DIVISOR
    };
    u64::try_from(cost).unwrap_or(u64::MAX)
}
