//! The subset of EIP-712 shared by order, transaction and approval hashing.

use hex_literal::hex;
use sha3::{Digest, Keccak256};
use web3::types::{Address, H256, U256};

// See tests for the pre-images
pub const DOMAIN_SEPARATOR_TYPE_HASH: [u8; 32] =
    hex!("8b73c3c69bb8fe3d512ecc4cf759cc79239f7b179b0ffacaa9a75d522b39400f");
pub const EXCHANGE_NAME_HASH: [u8; 32] =
    hex!("f0f24618f4c4be1e62e026fb039a20ef96f4495294817d1027ffaa6d1f70e61e");
pub const COORDINATOR_NAME_HASH: [u8; 32] =
    hex!("626d101e477fd17dd52afb3f9ad9eb016bf60f6e377877f34e8f3ea84c930236");
pub const VERSION_HASH: [u8; 32] =
    hex!("d7a1ce683065975771bedf401ecab037f4f4c62cc51fefdc8b39dd246ff0343a");

pub struct BigEndian([u8; 32]);

impl AsRef<[u8]> for BigEndian {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&U256> for BigEndian {
    fn from(value: &U256) -> Self {
        let mut result = [0; 32];
        value.to_big_endian(&mut result);
        Self(result)
    }
}

pub fn keccak(bytes: &[u8]) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    H256::from(<[u8; 32]>::from(hasher.finalize()))
}

/// `keccak256(encodeType(EIP712Domain) ‖ name ‖ version ‖ chainId ‖ contract)`
pub fn hash_domain(name_hash: [u8; 32], chain_id: u64, verifying_contract: Address) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(DOMAIN_SEPARATOR_TYPE_HASH);
    hasher.update(name_hash);
    hasher.update(VERSION_HASH);
    hasher.update(BigEndian::from(&U256::from(chain_id)));
    hasher.update(H256::from(verifying_contract));
    H256::from(<[u8; 32]>::from(hasher.finalize()))
}

/// `keccak256(0x1901 ‖ domainSeparator ‖ hashStruct(value))`
pub fn hash_typed_data(domain_separator: H256, struct_hash: H256) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(hex!("1901"));
    hasher.update(domain_separator);
    hasher.update(struct_hash);
    H256::from(<[u8; 32]>::from(hasher.finalize()))
}

#[cfg(test)]
pub mod test {
    use super::*;

    #[track_caller]
    pub fn assert_hex_eq<const N: usize>(value: [u8; N], expected: [u8; N]) {
        assert_eq!(hex::encode(value), hex::encode(expected));
    }

    pub fn hash(bytes: &[u8]) -> [u8; 32] {
        let mut hasher = Keccak256::new();
        hasher.update(bytes);
        <[u8; 32]>::from(hasher.finalize())
    }

    #[test]
    fn test_domain_separator_type_hash() {
        assert_hex_eq(DOMAIN_SEPARATOR_TYPE_HASH, hash(b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)"));
    }

    #[test]
    fn test_exchange_name_hash() {
        assert_hex_eq(EXCHANGE_NAME_HASH, hash(b"0x Protocol"));
    }

    #[test]
    fn test_coordinator_name_hash() {
        assert_hex_eq(COORDINATOR_NAME_HASH, hash(b"0x Protocol Coordinator"));
    }

    #[test]
    fn test_version_hash() {
        assert_hex_eq(VERSION_HASH, hash(b"3.0.0"));
    }

    #[test]
    fn test_hash_domain_is_deterministic() {
        let contract = Address::from(hex!("1dc4c1cefef38a777b15aa20260a54e584b16c48"));
        let first = hash_domain(EXCHANGE_NAME_HASH, 1337, contract);
        let second = hash_domain(EXCHANGE_NAME_HASH, 1337, contract);
        assert_eq!(first, second);
        assert_ne!(first, hash_domain(COORDINATOR_NAME_HASH, 1337, contract));
        assert_ne!(first, hash_domain(EXCHANGE_NAME_HASH, 1, contract));
    }
}
