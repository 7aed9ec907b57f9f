use strum_macros::IntoStaticStr;
use thiserror::Error;

#[derive(Debug, Error, IntoStaticStr)]
pub enum Error {
    #[error("SIGNATURE_INVALID: signature is malformed or does not recover the signer")]
    InvalidSignature,
    #[error("SIGNATURE_UNSUPPORTED: signature type must be EIP712 (0x02) or EthSign (0x03)")]
    UnsupportedSignatureType,
}
