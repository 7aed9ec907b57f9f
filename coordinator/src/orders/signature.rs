use core::convert::{TryFrom, TryInto};

use sha3::{Digest, Keccak256};
use web3::types::{Address, Recovery, RecoveryMessage, H256};

use super::Error;
use crate::{require, utils::crypto};

const ETH_SIGN_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Signature schemes accepted on signed transactions and orders.
/// See <https://github.com/0xProject/0x-protocol-specification/blob/master/v3/v3-specification.md#signature-types>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureType {
    EIP712,
    EthSign,
}

impl Default for SignatureType {
    fn default() -> Self {
        Self::EIP712
    }
}

impl From<SignatureType> for u8 {
    fn from(value: SignatureType) -> Self {
        match value {
            SignatureType::EIP712 => 2,
            SignatureType::EthSign => 3,
        }
    }
}

impl TryFrom<u8> for SignatureType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::EIP712),
            3 => Ok(Self::EthSign),
            _ => Err(Error::UnsupportedSignatureType),
        }
    }
}

/// A packed 66-byte signature: `v ‖ r ‖ s ‖ type`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackedSignature {
    pub signature_type: SignatureType,
    pub v:              u8,
    pub r:              H256,
    pub s:              H256,
}

impl PackedSignature {
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        require!(bytes.len() == 66, Error::InvalidSignature);
        Ok(Self {
            signature_type: bytes[65].try_into()?,
            v:              bytes[0],
            r:              H256::from_slice(&bytes[1..33]),
            s:              H256::from_slice(&bytes[33..65]),
        })
    }

    /// Recover the signer from a signature
    /// See <https://github.com/0xProject/0x-protocol-specification/blob/master/v3/v3-specification.md#validating-signatures>
    pub fn recover(&self, hash: &H256) -> Option<Address> {
        let hash = match self.signature_type {
            SignatureType::EIP712 => *hash,
            SignatureType::EthSign => {
                let mut hasher = Keccak256::new();
                hasher.update(ETH_SIGN_PREFIX);
                hasher.update(hash);
                H256::from(<[u8; 32]>::from(hasher.finalize()))
            }
        };
        let recovery = Recovery {
            message: RecoveryMessage::Hash(hash),
            v:       self.v.into(),
            r:       self.r,
            s:       self.s,
        };
        let (signature, recovery_id) = recovery.as_signature()?;
        crypto::recover(hash.as_bytes(), &signature, recovery_id).ok()
    }
}

#[cfg(test)]
pub mod test {
    use hex_literal::hex;
    use secp256k1::SecretKey;

    use super::*;

    pub fn test_key() -> SecretKey {
        SecretKey::from_slice(&hex!(
            "f2f48ee19680706196e2e339e5da3491186e0c4c5030670656b0e0164837257d"
        ))
        .unwrap()
    }

    pub fn signed(digest: &H256, key: &SecretKey, signature_type: SignatureType) -> Vec<u8> {
        let hash = match signature_type {
            SignatureType::EIP712 => *digest,
            SignatureType::EthSign => {
                let mut hasher = Keccak256::new();
                hasher.update(ETH_SIGN_PREFIX);
                hasher.update(digest);
                H256::from(<[u8; 32]>::from(hasher.finalize()))
            }
        };
        let (v, r, s) = crypto::sign(&hash, key).unwrap();
        let mut bytes = Vec::with_capacity(66);
        bytes.push(v);
        bytes.extend_from_slice(r.as_bytes());
        bytes.extend_from_slice(s.as_bytes());
        bytes.push(signature_type.into());
        bytes
    }

    #[test]
    fn test_parse_rejects_bad_length() {
        assert_eq!(
            PackedSignature::parse(&[0; 65]).unwrap_err().to_string(),
            Error::InvalidSignature.to_string()
        );
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let mut bytes = [0_u8; 66];
        bytes[65] = 6;
        assert_eq!(
            PackedSignature::parse(&bytes).unwrap_err().to_string(),
            Error::UnsupportedSignatureType.to_string()
        );
    }

    #[test]
    fn test_eip712_recover_round_trip() {
        let key = test_key();
        let digest = H256::from(hex!(
            "34710999b30110d7b798eb8cb21320387ca9b5671c621fd2bb913075dfe0b0d6"
        ));
        let bytes = signed(&digest, &key, SignatureType::EIP712);
        let signature = PackedSignature::parse(&bytes).unwrap();
        assert_eq!(signature.recover(&digest), Some(crypto::address(&key)));
    }

    #[test]
    fn test_eth_sign_recover_round_trip() {
        let key = test_key();
        let digest = H256::from(hex!(
            "34710999b30110d7b798eb8cb21320387ca9b5671c621fd2bb913075dfe0b0d6"
        ));
        let bytes = signed(&digest, &key, SignatureType::EthSign);
        let signature = PackedSignature::parse(&bytes).unwrap();
        assert_eq!(signature.recover(&digest), Some(crypto::address(&key)));
        // The same bytes under the EIP712 scheme recover a different signer.
        let as_eip712 = PackedSignature {
            signature_type: SignatureType::EIP712,
            ..signature
        };
        assert_ne!(as_eip712.recover(&digest), Some(crypto::address(&key)));
    }
}
