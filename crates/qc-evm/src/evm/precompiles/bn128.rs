//! # alt_bn128 Precompiles (0x06, 0x07, 0x08)
//!
//! Point addition, scalar multiplication and the pairing check on the
//! BN254 curve (EIP-196, EIP-197), repriced by EIP-1108 in Istanbul.
//!
//! Points are encoded as big-endian 32-byte coordinates. `(0, 0)` is the
//! point at infinity. G2 coordinates are `Fq2` elements written imaginary
//! part first.

use super::{charge, padded, Precompile, PrecompileOutput};
use crate::config::{Hardfork, RuleSet};
use crate::domain::value_objects::{Address, Bytes};
use crate::errors::PrecompileError;
use bn::{AffineG1, AffineG2, Fq, Fq2, Fr, Group, Gt, G1, G2};

const ADD_GAS_BYZANTIUM: u64 = 500;
const ADD_GAS_ISTANBUL: u64 = 150;
const MUL_GAS_BYZANTIUM: u64 = 40_000;
const MUL_GAS_ISTANBUL: u64 = 6_000;
const PAIRING_BASE_BYZANTIUM: u64 = 100_000;
const PAIRING_BASE_ISTANBUL: u64 = 45_000;
const PAIRING_PER_POINT_BYZANTIUM: u64 = 80_000;
const PAIRING_PER_POINT_ISTANBUL: u64 = 34_000;

/// Size of one G1 + G2 pairing input element.
const PAIR_LEN: usize = 192;

fn read_fq(input: &[u8], offset: usize) -> Result<Fq, PrecompileError> {
    Fq::from_slice(&input[offset..offset + 32])
        .map_err(|_| PrecompileError::InvalidInput("coordinate not in field"))
}

fn read_g1(input: &[u8], offset: usize) -> Result<G1, PrecompileError> {
    let x = read_fq(input, offset)?;
    let y = read_fq(input, offset + 32)?;
    if x == Fq::zero() && y == Fq::zero() {
        return Ok(G1::zero());
    }
    AffineG1::new(x, y)
        .map(Into::into)
        .map_err(|_| PrecompileError::InvalidInput("point not on curve"))
}

fn read_g2(input: &[u8], offset: usize) -> Result<G2, PrecompileError> {
    let x_im = read_fq(input, offset)?;
    let x_re = read_fq(input, offset + 32)?;
    let y_im = read_fq(input, offset + 64)?;
    let y_re = read_fq(input, offset + 96)?;

    let x = Fq2::new(x_re, x_im);
    let y = Fq2::new(y_re, y_im);
    if x.is_zero() && y.is_zero() {
        return Ok(G2::zero());
    }
    AffineG2::new(x, y)
        .map(Into::into)
        .map_err(|_| PrecompileError::InvalidInput("point not on curve"))
}

fn encode_g1(point: G1) -> Result<Bytes, PrecompileError> {
    let mut out = vec![0u8; 64];
    if let Some(affine) = AffineG1::from_jacobian(point) {
        affine
            .x()
            .to_big_endian(&mut out[..32])
            .map_err(|_| PrecompileError::InvalidInput("coordinate encoding"))?;
        affine
            .y()
            .to_big_endian(&mut out[32..])
            .map_err(|_| PrecompileError::InvalidInput("coordinate encoding"))?;
    }
    Ok(Bytes::from(out))
}

/// ECADD precompile (0x06).
pub struct EcAdd;

impl Precompile for EcAdd {
    fn execute(
        &self,
        input: &[u8],
        gas_limit: u64,
        rules: &RuleSet,
    ) -> Result<PrecompileOutput, PrecompileError> {
        let gas_cost = if rules.gte(Hardfork::Istanbul) {
            ADD_GAS_ISTANBUL
        } else {
            ADD_GAS_BYZANTIUM
        };
        charge(gas_cost, gas_limit)?;

        let input = padded(input, 0, 128);
        let p1 = read_g1(&input, 0)?;
        let p2 = read_g1(&input, 64)?;

        Ok(PrecompileOutput {
            gas_used: gas_cost,
            output: encode_g1(p1 + p2)?,
        })
    }

    fn address(&self) -> Address {
        Address::from_low_u64(6)
    }
}

/// ECMUL precompile (0x07).
pub struct EcMul;

impl Precompile for EcMul {
    fn execute(
        &self,
        input: &[u8],
        gas_limit: u64,
        rules: &RuleSet,
    ) -> Result<PrecompileOutput, PrecompileError> {
        let gas_cost = if rules.gte(Hardfork::Istanbul) {
            MUL_GAS_ISTANBUL
        } else {
            MUL_GAS_BYZANTIUM
        };
        charge(gas_cost, gas_limit)?;

        let input = padded(input, 0, 96);
        let point = read_g1(&input, 0)?;
        // scalars at or above the group order are reduced
        let scalar = Fr::from_slice(&input[64..96])
            .map_err(|_| PrecompileError::InvalidInput("scalar encoding"))?;

        Ok(PrecompileOutput {
            gas_used: gas_cost,
            output: encode_g1(point * scalar)?,
        })
    }

    fn address(&self) -> Address {
        Address::from_low_u64(7)
    }
}

/// ECPAIRING precompile (0x08).
pub struct EcPairing;

impl Precompile for EcPairing {
    fn execute(
        &self,
        input: &[u8],
        gas_limit: u64,
        rules: &RuleSet,
    ) -> Result<PrecompileOutput, PrecompileError> {
        let pairs = (input.len() / PAIR_LEN) as u64;
        let gas_cost = if rules.gte(Hardfork::Istanbul) {
            PAIRING_BASE_ISTANBUL.saturating_add(PAIRING_PER_POINT_ISTANBUL.saturating_mul(pairs))
        } else {
            PAIRING_BASE_BYZANTIUM
                .saturating_add(PAIRING_PER_POINT_BYZANTIUM.saturating_mul(pairs))
        };
        charge(gas_cost, gas_limit)?;

        if input.len() % PAIR_LEN != 0 {
            return Err(PrecompileError::InvalidInput("length not a multiple of 192"));
        }

        let mut batch = Vec::with_capacity(input.len() / PAIR_LEN);
        for chunk in input.chunks_exact(PAIR_LEN) {
            batch.push((read_g1(chunk, 0)?, read_g2(chunk, 64)?));
        }
        let success = batch.is_empty() || bn::pairing_batch(&batch) == Gt::one();

        let mut output = vec![0u8; 32];
        output[31] = u8::from(success);
        Ok(PrecompileOutput {
            gas_used: gas_cost,
            output: Bytes::from(output),
        })
    }

    fn address(&self) -> Address {
        Address::from_low_u64(8)
    }
}
