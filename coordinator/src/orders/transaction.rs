use hex_literal::hex;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use web3::types::{Address, Bytes, H256, U256};

use super::{
    eip712::{self, BigEndian, EXCHANGE_NAME_HASH},
    Error, PackedSignature,
};
use crate::{
    ethereum::ChainInfo,
    require,
    utils::serde::{u256_dec, u64_dec},
};

// See tests for the pre-image
const TRANSACTION_TYPE_HASH: [u8; 32] =
    hex!("6b4c70d217b44d0ff0d3bf7aeb18eb8604c5cd06f615a4b497aeefa4f01d2775");

/// A signed intent to call the Exchange contract, broadcast by some
/// `txOrigin` on behalf of the signer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZeroExTransaction {
    #[serde(with = "u256_dec")]
    pub salt:                    U256,
    #[serde(with = "u64_dec")]
    pub expiration_time_seconds: u64,
    pub signer_address:          Address,
    pub data:                    Bytes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedZeroExTransaction {
    #[serde(flatten)]
    pub transaction: ZeroExTransaction,
    pub signature:   Bytes,
}

impl ZeroExTransaction {
    /// The transaction identity: its EIP712 hash under the Exchange domain
    /// of the chain it targets.
    pub fn hash(&self, chain: &ChainInfo) -> H256 {
        let domain = eip712::hash_domain(EXCHANGE_NAME_HASH, chain.chain_id, chain.exchange);
        eip712::hash_typed_data(domain, self.struct_hash())
    }

    fn struct_hash(&self) -> H256 {
        let mut hasher = Keccak256::new();
        hasher.update(TRANSACTION_TYPE_HASH);
        hasher.update(BigEndian::from(&self.salt));
        hasher.update(BigEndian::from(&U256::from(self.expiration_time_seconds)));
        hasher.update(H256::from(self.signer_address));
        hasher.update(eip712::keccak(&self.data.0));
        H256::from(<[u8; 32]>::from(hasher.finalize()))
    }
}

impl SignedZeroExTransaction {
    pub fn hash(&self, chain: &ChainInfo) -> H256 {
        self.transaction.hash(chain)
    }

    /// Verify that the packed signature recovers the declared signer.
    pub fn validate_signature(&self, chain: &ChainInfo) -> Result<(), Error> {
        let hash = self.transaction.hash(chain);
        let signer = PackedSignature::parse(&self.signature.0)?
            .recover(&hash)
            .ok_or(Error::InvalidSignature)?;
        require!(
            signer == self.transaction.signer_address,
            Error::InvalidSignature
        );
        Ok(())
    }
}

#[cfg(test)]
pub mod test {
    use serde_json::{from_value, json};

    use super::{
        super::{
            eip712::test::{assert_hex_eq, hash},
            signature::test::{signed, test_key},
            SignatureType,
        },
        *,
    };
    use crate::utils::crypto;

    #[test]
    fn test_transaction_type_hash() {
        assert_hex_eq(TRANSACTION_TYPE_HASH, hash(b"ZeroExTransaction(uint256 salt,uint256 expirationTimeSeconds,address signerAddress,bytes data)"));
    }

    #[test]
    fn test_transaction_hash() {
        let transaction = ZeroExTransaction {
            salt:                    123.into(),
            expiration_time_seconds: 1_615_000_000,
            signer_address:          Address::from(hex!(
                "5409ed021d9299bf6814279a6a1411a7e866a631"
            )),
            data:                    Bytes(hex!("deadbeef").to_vec()),
        };
        assert_eq!(
            transaction.hash(&ChainInfo::default()),
            H256::from(hex!(
                "4dd96477ba7918db07a4fd95b391a6873a530f6fe27fb92c509118769fd53e53"
            ))
        );
    }

    #[test]
    fn test_json_transaction() {
        let transaction = from_value::<SignedZeroExTransaction>(json!({
            "salt": "123",
            "expirationTimeSeconds": "1615000000",
            "signerAddress": "0x5409ed021d9299bf6814279a6a1411a7e866a631",
            "data": "0xdeadbeef",
            "signature": "0x1c00",
        }))
        .unwrap();
        assert_eq!(transaction.transaction.salt, 123.into());
        assert_eq!(transaction.signature, Bytes(vec![0x1c, 0x00]));
    }

    #[test]
    fn test_validate_signature() {
        let chain = ChainInfo::default();
        let key = test_key();
        let mut signed_transaction = SignedZeroExTransaction {
            transaction: ZeroExTransaction {
                salt: 123.into(),
                expiration_time_seconds: 1_615_000_000,
                signer_address: crypto::address(&key),
                data: Bytes(hex!("deadbeef").to_vec()),
            },
            signature:   Bytes::default(),
        };
        let hash = signed_transaction.hash(&chain);
        signed_transaction.signature = Bytes(signed(&hash, &key, SignatureType::EthSign));
        signed_transaction.validate_signature(&chain).unwrap();

        // A different declared signer must be rejected.
        signed_transaction.transaction.signer_address = Address::zero();
        assert!(signed_transaction.validate_signature(&chain).is_err());
    }
}
