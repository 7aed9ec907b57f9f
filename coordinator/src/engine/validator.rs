//! Per-order validation: partition a request's orders into approved and
//! refused-with-reason.

use std::{collections::HashSet, sync::Arc};

use anyhow::Result as AnyResult;
use serde::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;
use web3::types::{Address, H256, U256};

use crate::{orders::SignedOrder, repository::Repository};

/// Why an order is excluded from the approval set. Refusals are data, not
/// errors: the request partially succeeds around them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefusalReason {
    SoftCancelled,
    LedgerExceeded,
    Expired,
    Redundant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Refusal {
    pub order_hash: H256,
    pub reason:     RefusalReason,
}

/// An order served by this coordinator, with its hash and requested fill
/// amount resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorOrder {
    pub signed_order: SignedOrder,
    pub hash:         H256,
    pub fill_amount:  U256,
}

#[derive(Clone, Debug)]
pub struct RequestValidator {
    repository: Arc<dyn Repository>,
}

impl RequestValidator {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// Refusals for the given orders as of `now`. The soft-cancel check
    /// precedes the ledger check, and a zero fill amount is redundant rather
    /// than ledger-exceeded.
    pub async fn refusals(
        &self,
        taker: Address,
        orders: &[CoordinatorOrder],
        now_seconds: u64,
    ) -> AnyResult<Vec<Refusal>> {
        let hashes: Vec<H256> = orders.iter().map(|order| order.hash).collect();
        let soft_cancelled: HashSet<H256> = self
            .repository
            .soft_cancelled_subset(&hashes)
            .await?
            .into_iter()
            .collect();

        let mut refusals = vec![];
        for order in orders {
            let reason = if soft_cancelled.contains(&order.hash) {
                Some(RefusalReason::SoftCancelled)
            } else if order.signed_order.order.expired_at(now_seconds) {
                Some(RefusalReason::Expired)
            } else if order.fill_amount.is_zero() {
                Some(RefusalReason::Redundant)
            } else {
                let requested = self
                    .repository
                    .requested_fill_amount(order.hash, taker)
                    .await?;
                let within = requested
                    .checked_add(order.fill_amount)
                    .map_or(false, |total| {
                        total <= order.signed_order.order.taker_asset_amount
                    });
                if within {
                    None
                } else {
                    Some(RefusalReason::LedgerExceeded)
                }
            };
            if let Some(reason) = reason {
                refusals.push(Refusal {
                    order_hash: order.hash,
                    reason,
                });
            }
        }
        Ok(refusals)
    }
}
