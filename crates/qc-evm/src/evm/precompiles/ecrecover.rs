//! # Ecrecover Precompile (0x01)
//!
//! Recovers the signer address from an ECDSA signature.
//!
//! Input format (128 bytes, right-padded when shorter):
//! - bytes 0-31: message hash
//! - bytes 32-63: v (recovery id, must be 27 or 28)
//! - bytes 64-95: r
//! - bytes 96-127: s
//!
//! Any malformed signature yields empty output, never an error.

use super::{charge, padded, Precompile, PrecompileOutput};
use crate::config::RuleSet;
use crate::domain::services::keccak256;
use crate::domain::value_objects::{Address, Bytes};
use crate::errors::PrecompileError;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

/// Fixed gas cost for ecrecover.
const ECRECOVER_GAS: u64 = 3000;

/// Ecrecover precompile.
pub struct Ecrecover;

impl Precompile for Ecrecover {
    fn execute(
        &self,
        input: &[u8],
        gas_limit: u64,
        _rules: &RuleSet,
    ) -> Result<PrecompileOutput, PrecompileError> {
        charge(ECRECOVER_GAS, gas_limit)?;

        let input = padded(input, 0, 128);
        let output = recover(&input).map(Bytes::from).unwrap_or_default();
        Ok(PrecompileOutput {
            gas_used: ECRECOVER_GAS,
            output,
        })
    }

    fn address(&self) -> Address {
        Address::from_low_u64(1)
    }
}

/// Signer address as a left-padded word, `None` for any invalid signature.
fn recover(input: &[u8]) -> Option<Vec<u8>> {
    let hash = &input[0..32];
    let v = &input[32..64];

    // v is a full word: everything above the last byte must be zero
    if v[..31].iter().any(|&b| b != 0) || !matches!(v[31], 27 | 28) {
        return None;
    }

    let mut signature = Signature::from_slice(&input[64..128]).ok()?;
    let mut parity = v[31] - 27;
    // k256 only recovers from low-s signatures; the high-s twin has the
    // opposite y parity
    if let Some(normalized) = signature.normalize_s() {
        signature = normalized;
        parity ^= 1;
    }
    let recovery_id = RecoveryId::from_byte(parity)?;

    let key = VerifyingKey::recover_from_prehash(hash, &signature, recovery_id).ok()?;
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);

    let mut word = vec![0u8; 32];
    word[12..].copy_from_slice(&digest.as_bytes()[12..]);
    Some(word)
}
