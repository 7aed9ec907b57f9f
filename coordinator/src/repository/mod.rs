//! Persistent coordinator state behind an abstract repository.
//!
//! The repository owns all mutable state: the grow-only soft-cancel set, the
//! per-`(order, taker)` fill ledger, the seen-transaction table and the
//! outstanding fill approvals per order. Implementations must make
//! [`Repository::try_reserve_fill`] atomic per `(order_hash, taker)`; the
//! engine relies on it to keep the cumulative requested amount within an
//! order's taker asset amount under concurrent requests.

mod memory;

use core::fmt::Debug;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use web3::types::{Address, Bytes, H256, U256};

pub use self::memory::MemoryRepository;
use crate::{
    orders::SignedOrder,
    utils::serde::{u256_dec, u256_vec_dec, u64_dec},
};

/// A processed meta-transaction. Inserted once on first successful approval
/// and never overwritten; recomputing the approval digest from a record and
/// recovering its signatures must yield configured fee recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub transaction_hash:                 H256,
    pub tx_origin:                        Address,
    pub signer_address:                   Address,
    pub signatures:                       Vec<Bytes>,
    #[serde(with = "u64_dec")]
    pub approval_expiration_time_seconds: u64,
    pub orders:                           Vec<SignedOrder>,
    #[serde(with = "u256_vec_dec")]
    pub taker_asset_fill_amounts:         Vec<U256>,
}

/// One outstanding fill approval for an order, reported back to the maker
/// when the order is soft-cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillApprovalRecord {
    pub order_hash:              H256,
    pub transaction_hash:        H256,
    pub approval_signatures:     Vec<Bytes>,
    #[serde(with = "u64_dec")]
    pub expiration_time_seconds: u64,
    #[serde(with = "u256_dec")]
    pub taker_asset_fill_amount: U256,
}

#[async_trait]
pub trait Repository: Debug + Send + Sync {
    /// Add order hashes to the soft-cancel set. Grow-only; re-cancelling is
    /// a no-op.
    async fn soft_cancel(&self, order_hashes: &[H256]) -> AnyResult<()>;

    /// The subset of the given hashes that is soft-cancelled.
    async fn soft_cancelled_subset(&self, order_hashes: &[H256]) -> AnyResult<Vec<H256>>;

    /// Cumulative taker asset amount previously requested by `taker` for the
    /// order.
    async fn requested_fill_amount(&self, order_hash: H256, taker: Address) -> AnyResult<U256>;

    /// Atomically add `amount` to the `(order_hash, taker)` ledger entry iff
    /// the running sum stays within `max`. Returns whether the reservation
    /// was made.
    async fn try_reserve_fill(
        &self,
        order_hash: H256,
        taker: Address,
        amount: U256,
        max: U256,
    ) -> AnyResult<bool>;

    async fn transaction_exists(&self, transaction_hash: H256) -> AnyResult<bool>;

    /// The stored record for a processed transaction, if any.
    async fn transaction(&self, transaction_hash: H256) -> AnyResult<Option<TransactionRecord>>;

    /// Insert a transaction record. Returns false without modifying the
    /// table when the hash is already present.
    async fn insert_transaction(&self, record: TransactionRecord) -> AnyResult<bool>;

    async fn record_fill_approval(&self, record: FillApprovalRecord) -> AnyResult<()>;

    /// All fill approvals ever issued for the order, in issuance order.
    async fn fill_approvals(&self, order_hash: H256) -> AnyResult<Vec<FillApprovalRecord>>;
}
