//! secp256k1 sign and recover with a precomputed context.
//!
//! The recovery half is inlined from [`web3`][0] to benefit from precomputed
//! tables in a static context.
//!
//! See <https://github.com/tomusdrw/rust-web3/issues/534>
//!
//! [0]: https://docs.rs/web3/0.17.0/src/web3/signing.rs.html#123-149

use once_cell::sync::Lazy;
use secp256k1::{
    recovery::{RecoverableSignature, RecoveryId},
    All, Error, Message, PublicKey, Secp256k1, SecretKey,
};
use sha3::{Digest, Keccak256};
use web3::types::{Address, H256};

static CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

pub fn recover(message: &[u8], signature: &[u8], recovery_id: i32) -> Result<Address, Error> {
    // Recover public key
    let message = Message::from_slice(message)?;
    let recovery_id = RecoveryId::from_i32(recovery_id)?;
    let signature = RecoverableSignature::from_compact(signature, recovery_id)?;
    let public_key = CONTEXT.recover(&message, &signature)?;
    Ok(public_key_address(&public_key))
}

/// Sign a 32-byte digest, producing the Ethereum `(v, r, s)` triple with
/// `v ∈ {27, 28}`.
pub fn sign(digest: &H256, key: &SecretKey) -> Result<(u8, H256, H256), Error> {
    let message = Message::from_slice(digest.as_bytes())?;
    let (recovery_id, compact) = CONTEXT
        .sign_recoverable(&message, key)
        .serialize_compact();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let v = 27 + recovery_id.to_i32() as u8;
    let r = H256::from_slice(&compact[..32]);
    let s = H256::from_slice(&compact[32..]);
    Ok((v, r, s))
}

/// The Ethereum address controlled by a private key.
pub fn address(key: &SecretKey) -> Address {
    public_key_address(&PublicKey::from_secret_key(&CONTEXT, key))
}

fn public_key_address(public_key: &PublicKey) -> Address {
    // Hash public key into address
    let public_key = public_key.serialize_uncompressed();
    debug_assert_eq!(public_key[0], 0x04);
    let hash = {
        let mut hasher = Keccak256::new();
        hasher.update(&public_key[1..]);
        hasher.finalize()
    };
    Address::from_slice(&hash[12..])
}

#[cfg(test)]
pub mod test {
    use hex_literal::hex;
    use pretty_assertions::assert_eq;
    use web3::signing::recover as ref_recover;

    use super::*;

    #[test]
    fn test_recover_matches_web3() {
        // Signing is deterministic (RFC 6979), so this exercises a fixed
        // signature without hard-coding one.
        let key = SecretKey::from_slice(&[0xaa; 32]).unwrap();
        let digest = H256::from(hex!(
            "c1e7a2640a31612b186b5e4e6ff29622127b570c5f1b6a26806de4b25718ab6a"
        ));
        let (v, r, s) = sign(&digest, &key).unwrap();
        let mut compact = [0_u8; 64];
        compact[..32].copy_from_slice(r.as_bytes());
        compact[32..].copy_from_slice(s.as_bytes());
        let recovery_id = i32::from(v - 27);

        let result = recover(digest.as_bytes(), &compact, recovery_id).unwrap();
        let expected = ref_recover(digest.as_bytes(), &compact, recovery_id).unwrap();
        assert_eq!(result, expected);
        assert_eq!(result, address(&key));
    }

    #[test]
    fn test_sign_recovers_signer() {
        let key = SecretKey::from_slice(&hex!(
            "0123456789012345678901234567890123456789012345678901234567890123"
        ))
        .unwrap();
        let digest = H256::from(hex!(
            "5b8d1f33c0a4e9b7263a9c1d4e80b52f6d97a0c3e1b44a6f8829d5c07a3160de"
        ));

        let (v, r, s) = sign(&digest, &key).unwrap();
        assert!(v == 27 || v == 28);

        let mut compact = [0_u8; 64];
        compact[..32].copy_from_slice(r.as_bytes());
        compact[32..].copy_from_slice(s.as_bytes());
        let recovered = recover(digest.as_bytes(), &compact, i32::from(v - 27)).unwrap();
        assert_eq!(recovered, address(&key));
    }
}
