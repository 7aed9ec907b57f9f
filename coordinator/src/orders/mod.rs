mod approval;
mod eip712;
mod error;
mod order;
mod signature;
mod transaction;

pub use self::{
    approval::{recover_approval_signer, CoordinatorApproval},
    error::Error,
    order::{Order, SignedOrder},
    signature::{PackedSignature, SignatureType},
    transaction::{SignedZeroExTransaction, ZeroExTransaction},
};

#[cfg(test)]
pub use self::{order::test::example_order, signature::test as signature_test};
