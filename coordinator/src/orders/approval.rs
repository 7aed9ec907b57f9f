use hex_literal::hex;
use secp256k1::SecretKey;
use sha3::{Digest, Keccak256};
use web3::types::{Address, Bytes, H256, U256};

use super::eip712::{self, BigEndian, COORDINATOR_NAME_HASH};
use crate::ethereum::ChainInfo;

// See tests for the pre-image
const APPROVAL_TYPE_HASH: [u8; 32] =
    hex!("00299877d73f791bcbdcaa109992a075a4ca417ff2752cdd66a90aac51953d25");

// Trailing signature-type tag on approval signatures.
const EIP712_SIGNATURE_TYPE: u8 = 0x05;

/// The artifact the coordinator produces: a typed-data digest over the
/// approved order hashes, the account allowed to broadcast, and a deadline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorApproval {
    pub order_hashes:                     Vec<H256>,
    pub tx_origin:                        Address,
    pub approval_expiration_time_seconds: u64,
}

impl CoordinatorApproval {
    pub fn hash(&self, chain: &ChainInfo) -> H256 {
        let domain =
            eip712::hash_domain(COORDINATOR_NAME_HASH, chain.chain_id, chain.coordinator);
        eip712::hash_typed_data(domain, self.struct_hash())
    }

    /// Produce the 66-byte wire signature `v ‖ r ‖ s ‖ 0x05` over the
    /// approval digest.
    pub fn sign(&self, chain: &ChainInfo, key: &SecretKey) -> Result<Bytes, secp256k1::Error> {
        let digest = self.hash(chain);
        let (v, r, s) = crate::utils::crypto::sign(&digest, key)?;
        let mut bytes = Vec::with_capacity(66);
        bytes.push(v);
        bytes.extend_from_slice(r.as_bytes());
        bytes.extend_from_slice(s.as_bytes());
        bytes.push(EIP712_SIGNATURE_TYPE);
        Ok(Bytes(bytes))
    }

    fn struct_hash(&self) -> H256 {
        // Dynamic array rule: hash the concatenation of the members.
        let order_hashes = {
            let mut hasher = Keccak256::new();
            for order_hash in &self.order_hashes {
                hasher.update(order_hash);
            }
            <[u8; 32]>::from(hasher.finalize())
        };
        let mut hasher = Keccak256::new();
        hasher.update(APPROVAL_TYPE_HASH);
        hasher.update(order_hashes);
        hasher.update(H256::from(self.tx_origin));
        hasher.update(BigEndian::from(&U256::from(
            self.approval_expiration_time_seconds,
        )));
        H256::from(<[u8; 32]>::from(hasher.finalize()))
    }
}

/// Recover the fee recipient that produced a wire-format approval signature.
pub fn recover_approval_signer(digest: &H256, signature: &[u8]) -> Option<Address> {
    if signature.len() != 66 || signature[65] != EIP712_SIGNATURE_TYPE {
        return None;
    }
    let v = signature[0].checked_sub(27)?;
    crate::utils::crypto::recover(digest.as_bytes(), &signature[1..65], i32::from(v)).ok()
}
