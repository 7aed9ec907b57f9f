use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use anyhow::{anyhow, Result as AnyResult};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};
use web3::types::{Address, H256, U256};

use super::{FillApprovalRecord, Repository, TransactionRecord};

static OPS_COUNTER: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "repository_operations",
        "Repository operations by kind.",
        &["kind"]
    )
    .unwrap()
});

#[derive(Debug, Default)]
struct Tables {
    soft_cancels:      HashSet<H256>,
    fill_ledger:       HashMap<(H256, Address), U256>,
    seen_transactions: HashMap<H256, TransactionRecord>,
    fill_approvals:    HashMap<H256, Vec<FillApprovalRecord>>,
}

/// In-process [`Repository`]. A single mutex over the tables makes the
/// ledger's read-increment atomic per key; no await happens while it is
/// held.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    fn lock(&self) -> AnyResult<std::sync::MutexGuard<Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow!("repository lock was poisoned"))
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn soft_cancel(&self, order_hashes: &[H256]) -> AnyResult<()> {
        OPS_COUNTER.with_label_values(&["soft_cancel"]).inc();
        let mut tables = self.lock()?;
        tables.soft_cancels.extend(order_hashes.iter().copied());
        Ok(())
    }

    async fn soft_cancelled_subset(&self, order_hashes: &[H256]) -> AnyResult<Vec<H256>> {
        OPS_COUNTER
            .with_label_values(&["soft_cancelled_subset"])
            .inc();
        let tables = self.lock()?;
        Ok(order_hashes
            .iter()
            .copied()
            .filter(|hash| tables.soft_cancels.contains(hash))
            .collect())
    }

    async fn requested_fill_amount(&self, order_hash: H256, taker: Address) -> AnyResult<U256> {
        OPS_COUNTER
            .with_label_values(&["requested_fill_amount"])
            .inc();
        let tables = self.lock()?;
        Ok(tables
            .fill_ledger
            .get(&(order_hash, taker))
            .copied()
            .unwrap_or_default())
    }

    async fn try_reserve_fill(
        &self,
        order_hash: H256,
        taker: Address,
        amount: U256,
        max: U256,
    ) -> AnyResult<bool> {
        OPS_COUNTER.with_label_values(&["try_reserve_fill"]).inc();
        let mut tables = self.lock()?;
        let entry = tables.fill_ledger.entry((order_hash, taker)).or_default();
        let reserved = entry
            .checked_add(amount)
            .filter(|total| *total <= max)
            .map(|total| *entry = total)
            .is_some();
        Ok(reserved)
    }

    async fn transaction_exists(&self, transaction_hash: H256) -> AnyResult<bool> {
        OPS_COUNTER
            .with_label_values(&["transaction_exists"])
            .inc();
        let tables = self.lock()?;
        Ok(tables.seen_transactions.contains_key(&transaction_hash))
    }

    async fn transaction(&self, transaction_hash: H256) -> AnyResult<Option<TransactionRecord>> {
        OPS_COUNTER.with_label_values(&["transaction"]).inc();
        let tables = self.lock()?;
        Ok(tables.seen_transactions.get(&transaction_hash).cloned())
    }

    async fn insert_transaction(&self, record: TransactionRecord) -> AnyResult<bool> {
        OPS_COUNTER.with_label_values(&["insert_transaction"]).inc();
        let mut tables = self.lock()?;
        if tables
            .seen_transactions
            .contains_key(&record.transaction_hash)
        {
            return Ok(false);
        }
        tables
            .seen_transactions
            .insert(record.transaction_hash, record);
        Ok(true)
    }

    async fn record_fill_approval(&self, record: FillApprovalRecord) -> AnyResult<()> {
        OPS_COUNTER
            .with_label_values(&["record_fill_approval"])
            .inc();
        let mut tables = self.lock()?;
        tables
            .fill_approvals
            .entry(record.order_hash)
            .or_default()
            .push(record);
        Ok(())
    }

    async fn fill_approvals(&self, order_hash: H256) -> AnyResult<Vec<FillApprovalRecord>> {
        OPS_COUNTER.with_label_values(&["fill_approvals"]).inc();
        let tables = self.lock()?;
        Ok(tables
            .fill_approvals
            .get(&order_hash)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
pub mod test {
    use pretty_assertions::assert_eq;
    use web3::types::Bytes;

    use super::*;

    fn hash(byte: u8) -> H256 {
        H256::from([byte; 32])
    }

    fn taker(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    #[tokio::test]
    async fn test_soft_cancels_are_monotone() {
        let repository = MemoryRepository::default();
        let hashes = [hash(1), hash(2), hash(3)];

        assert_eq!(
            repository.soft_cancelled_subset(&hashes).await.unwrap(),
            vec![]
        );
        repository.soft_cancel(&hashes[..2]).await.unwrap();
        repository.soft_cancel(&hashes[..1]).await.unwrap();
        assert_eq!(
            repository.soft_cancelled_subset(&hashes).await.unwrap(),
            vec![hash(1), hash(2)]
        );
    }

    #[tokio::test]
    async fn test_ledger_reservation_stays_within_max() {
        let repository = MemoryRepository::default();
        let max = U256::from(100);

        assert!(repository
            .try_reserve_fill(hash(1), taker(1), U256::from(40), max)
            .await
            .unwrap());
        // 40 + 70 > 100
        assert!(!repository
            .try_reserve_fill(hash(1), taker(1), U256::from(70), max)
            .await
            .unwrap());
        // The failed reservation must not change the ledger.
        assert_eq!(
            repository
                .requested_fill_amount(hash(1), taker(1))
                .await
                .unwrap(),
            U256::from(40)
        );
        // A different taker has its own entry.
        assert!(repository
            .try_reserve_fill(hash(1), taker(2), U256::from(100), max)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_ledger_overflow_is_exceeded() {
        let repository = MemoryRepository::default();
        let max = U256::max_value();
        assert!(repository
            .try_reserve_fill(hash(1), taker(1), max, max)
            .await
            .unwrap());
        assert!(!repository
            .try_reserve_fill(hash(1), taker(1), U256::one(), max)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_transactions_insert_once() {
        let repository = MemoryRepository::default();
        let record = TransactionRecord {
            transaction_hash:                 hash(7),
            tx_origin:                        taker(1),
            signer_address:                   taker(2),
            signatures:                       vec![Bytes(vec![0x1b])],
            approval_expiration_time_seconds: 100,
            orders:                           vec![],
            taker_asset_fill_amounts:         vec![],
        };

        assert!(!repository.transaction_exists(hash(7)).await.unwrap());
        assert!(repository
            .insert_transaction(record.clone())
            .await
            .unwrap());
        assert!(repository.transaction_exists(hash(7)).await.unwrap());

        // A second insert with different contents leaves the first in place.
        let other = TransactionRecord {
            tx_origin: taker(3),
            ..record
        };
        assert!(!repository.insert_transaction(other).await.unwrap());
    }

    #[tokio::test]
    async fn test_fill_approvals_accumulate() {
        let repository = MemoryRepository::default();
        let record = FillApprovalRecord {
            order_hash:              hash(1),
            transaction_hash:        hash(2),
            approval_signatures:     vec![Bytes(vec![0x1c])],
            expiration_time_seconds: 100,
            taker_asset_fill_amount: U256::from(40),
        };

        assert_eq!(repository.fill_approvals(hash(1)).await.unwrap(), vec![]);
        repository
            .record_fill_approval(record.clone())
            .await
            .unwrap();
        repository
            .record_fill_approval(FillApprovalRecord {
                transaction_hash: hash(3),
                ..record.clone()
            })
            .await
            .unwrap();
        let approvals = repository.fill_approvals(hash(1)).await.unwrap();
        assert_eq!(approvals.len(), 2);
        assert_eq!(approvals[0], record);
    }
}
