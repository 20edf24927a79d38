//! # Domain Services
//!
//! Pure functions: contract address derivation and hashing.

use crate::domain::value_objects::{Address, Hash};
use sha3::{Digest, Keccak256};

// =============================================================================
// CONTRACT ADDRESS COMPUTATION
// =============================================================================

/// Computes the contract address for CREATE.
///
/// Address = keccak256(rlp(\[sender, nonce\]))\[12:\]
#[must_use]
pub fn generate_address(sender: Address, nonce: u64) -> Address {
    let mut content = Vec::with_capacity(30);

    // 20-byte string: 0x80 + 20
    content.push(0x94);
    content.extend_from_slice(sender.as_bytes());

    if nonce == 0 {
        content.push(0x80);
    } else if nonce < 0x80 {
        content.push(nonce.to_be_bytes()[7]);
    } else {
        let be = nonce.to_be_bytes();
        let start = be.iter().position(|&b| b != 0).unwrap_or(7);
        let trimmed = &be[start..];
        content.push(0x80 + trimmed.len() as u8);
        content.extend_from_slice(trimmed);
    }

    // Content is at most 30 bytes, so the short list header always applies.
    let mut rlp = Vec::with_capacity(content.len() + 1);
    rlp.push(0xc0 + content.len() as u8);
    rlp.extend_from_slice(&content);

    address_from_digest(&Keccak256::digest(&rlp))
}

/// Computes the contract address for CREATE2 (EIP-1014).
///
/// Address = keccak256(0xff ++ sender ++ salt ++ `keccak256(init_code)`)\[12:\]
#[must_use]
pub fn generate_address2(sender: Address, salt: Hash, init_code: &[u8]) -> Address {
    let code_hash = Keccak256::digest(init_code);

    let mut data = Vec::with_capacity(85);
    data.push(0xff);
    data.extend_from_slice(sender.as_bytes());
    data.extend_from_slice(salt.as_bytes());
    data.extend_from_slice(&code_hash);

    address_from_digest(&Keccak256::digest(&data))
}

fn address_from_digest(digest: &[u8]) -> Address {
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&digest[12..32]);
    Address::new(addr)
}

// =============================================================================
// KECCAK256 UTILITY
// =============================================================================

/// Computes keccak256 hash of data.
#[must_use]
pub fn keccak256(data: &[u8]) -> Hash {
    Hash::new(Keccak256::digest(data).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::EMPTY_CODE_HASH;

    fn addr(hex: &str) -> Address {
        let mut bytes = [0u8; 20];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).unwrap();
        }
        Address::new(bytes)
    }

    #[test]
    fn test_generate_address_known_vectors() {
        let sender = addr("6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0");
        assert_eq!(
            generate_address(sender, 0),
            addr("cd234a471b72ba2f1ccf0a70fcaba648a5eecd8d")
        );
        assert_eq!(
            generate_address(sender, 1),
            addr("343c43a37d37dff08ae8c4a11544c718abb4fcf8")
        );
    }

    #[test]
    fn test_generate_address_large_nonce_differs() {
        let sender = Address::new([1u8; 20]);
        assert_ne!(generate_address(sender, 0x80), generate_address(sender, 0x7f));
        assert_ne!(
            generate_address(sender, u64::MAX),
            generate_address(sender, u64::MAX - 1)
        );
    }

    #[test]
    fn test_generate_address2_eip1014_example() {
        let created = generate_address2(Address::ZERO, Hash::ZERO, &[0x00]);
        assert_eq!(created, addr("4d1a2e2bb4f88f0250f26ffff098b0b30b26bf38"));
    }

    #[test]
    fn test_keccak_of_empty_is_empty_code_hash() {
        assert_eq!(keccak256(&[]), EMPTY_CODE_HASH);
    }
}
