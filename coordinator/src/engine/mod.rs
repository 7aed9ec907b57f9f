//! The approval engine: decode → classify → validate → delay → re-validate →
//! sign → persist → broadcast.

mod classifier;
mod fillable;
mod validator;

use core::time::Duration;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use anyhow::{anyhow, Error as AnyError, Result as AnyResult};
use futures::stream::{self, StreamExt as _};
use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec,
};
use secp256k1::SecretKey;
use serde::Serialize;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::error;
use web3::types::{Address, Bytes, H256, U256};

pub use self::{
    classifier::{DecodedCall, ExchangeMethod, FillAmounts},
    validator::{CoordinatorOrder, Refusal, RefusalReason, RequestValidator},
};
use crate::{
    ethereum::{ChainInfo, OrderStateOracle},
    events::{CancelRequestAccepted, Event, EventBroadcaster, FillRequestAccepted,
             FillRequestReceived},
    orders::{CoordinatorApproval, Order, SignedOrder, SignedZeroExTransaction},
    repository::{FillApprovalRecord, Repository, TransactionRecord},
    require,
    utils::{serde::u64_dec, unix_now},
};

// Concurrent trader-state fetches per request
const CONCURRENT_STATE_FETCHES: usize = 8;
// Deadline on each trader-state fetch
const STATE_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

static REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "engine_requests",
        "Approval requests by Exchange method.",
        &["method"]
    )
    .unwrap()
});
static APPROVALS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("engine_approvals", "Number of approvals issued.").unwrap()
});
static REFUSAL_REASON: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "engine_refusal_reason",
        "Count of refused orders by reason.",
        &["reason"]
    )
    .unwrap()
});
static DELAY_REFUSALS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "engine_delay_refusals",
        "Count of orders refused only by the post-delay re-validation."
    )
    .unwrap()
});
static SOFT_CANCELS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("engine_soft_cancels", "Count of orders soft-cancelled.").unwrap()
});

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("transaction data could not be decoded against the Exchange ABI")]
    TransactionDecodingFailed,
    #[error("{0} is not a coordinated Exchange function")]
    InvalidFunctionCall(String),
    #[error("transaction signature does not recover the declared signer")]
    InvalidTransactionSignature,
    #[error("no order names a fee recipient served by this coordinator")]
    NoCoordinatorOrdersIncluded,
    #[error("transaction has already been used")]
    TransactionAlreadyUsed,
    #[error("only the maker can cancel orders")]
    OnlyMakerCanCancelOrders,
    #[error("transaction expires after the approval would")]
    TransactionExpirationTooHigh,
    #[error("no private key configured for fee recipient {0:?}")]
    MissingFeeRecipientKey(Address),
    #[error("internal error")]
    Internal(#[from] AnyError),
}

impl RequestError {
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::TransactionDecodingFailed => 1001,
            Self::InvalidFunctionCall(_) => 1002,
            Self::InvalidTransactionSignature => 1003,
            Self::NoCoordinatorOrdersIncluded => 1004,
            Self::TransactionAlreadyUsed => 1005,
            Self::OnlyMakerCanCancelOrders => 1006,
            Self::TransactionExpirationTooHigh => 1007,
            Self::MissingFeeRecipientKey(_) | Self::Internal(_) => 1008,
        }
    }

    pub const fn field(&self) -> &'static str {
        match self {
            Self::TransactionDecodingFailed
            | Self::InvalidFunctionCall(_)
            | Self::NoCoordinatorOrdersIncluded => "signedTransaction.data",
            Self::InvalidTransactionSignature => "signedTransaction.signature",
            Self::TransactionAlreadyUsed => "signedTransaction",
            Self::OnlyMakerCanCancelOrders => "signedTransaction.signerAddress",
            Self::TransactionExpirationTooHigh => "signedTransaction.expirationTimeSeconds",
            Self::MissingFeeRecipientKey(_) | Self::Internal(_) => "",
        }
    }

    /// Whether the failure is the requester's fault (400) or ours (500).
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::MissingFeeRecipientKey(_) | Self::Internal(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FillOutcome {
    pub approval_hash:           Option<H256>,
    pub approved_order_hashes:   Vec<H256>,
    pub orders_refused_approval: Vec<Refusal>,
    pub signatures:              Vec<Bytes>,
    #[serde(with = "u64_dec")]
    pub expiration_time_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOutcome {
    pub zerox_order_hashes:         Vec<H256>,
    pub outstanding_fill_signatures: Vec<FillApprovalRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RequestOutcome {
    Fill(FillOutcome),
    Cancel(CancelOutcome),
}

/// Per-chain request state machine. All fields are immutable after
/// construction; mutable state lives in the repository.
pub struct ApprovalEngine {
    chain:               ChainInfo,
    repository:          Arc<dyn Repository>,
    oracle:              Arc<dyn OrderStateOracle>,
    broadcaster:         EventBroadcaster,
    validator:           RequestValidator,
    signers:             HashMap<Address, SecretKey>,
    selective_delay:     Duration,
    expiration_duration: Duration,
}

impl ApprovalEngine {
    pub fn new(
        chain: ChainInfo,
        repository: Arc<dyn Repository>,
        oracle: Arc<dyn OrderStateOracle>,
        broadcaster: EventBroadcaster,
        signers: HashMap<Address, SecretKey>,
        selective_delay: Duration,
        expiration_duration: Duration,
    ) -> Self {
        Self {
            validator: RequestValidator::new(repository.clone()),
            chain,
            repository,
            oracle,
            broadcaster,
            signers,
            selective_delay,
            expiration_duration,
        }
    }

    pub const fn chain(&self) -> &ChainInfo {
        &self.chain
    }

    /// The subset of the given order hashes that is soft-cancelled.
    pub async fn soft_cancelled_subset(&self, order_hashes: &[H256]) -> AnyResult<Vec<H256>> {
        self.repository.soft_cancelled_subset(order_hashes).await
    }

    pub async fn handle_request(
        &self,
        request: SignedZeroExTransaction,
        tx_origin: Address,
    ) -> Result<RequestOutcome, RequestError> {
        let decoded = classifier::decode_call(&request.transaction.data.0, &self.chain)
            .map_err(|error| match error {
                classifier::DecodeError::UnsupportedFunction(name) => {
                    RequestError::InvalidFunctionCall(name)
                }
                classifier::DecodeError::MalformedCalldata => {
                    RequestError::TransactionDecodingFailed
                }
            })?;
        REQUESTS.with_label_values(&[decoded.method.name()]).inc();

        request
            .validate_signature(&self.chain)
            .map_err(|_| RequestError::InvalidTransactionSignature)?;
        let transaction_hash = request.hash(&self.chain);

        require!(
            decoded
                .orders
                .iter()
                .any(|order| self.serves(&order.order)),
            RequestError::NoCoordinatorOrdersIncluded
        );

        if decoded.method.is_cancellation() {
            self.handle_cancel(&request, transaction_hash, &decoded)
                .await
                .map(RequestOutcome::Cancel)
        } else {
            self.handle_fill(&request, tx_origin, transaction_hash, decoded)
                .await
                .map(RequestOutcome::Fill)
        }
    }

    fn serves(&self, order: &Order) -> bool {
        self.signers.contains_key(&order.fee_recipient_address)
    }

    async fn handle_fill(
        &self,
        request: &SignedZeroExTransaction,
        tx_origin: Address,
        transaction_hash: H256,
        decoded: DecodedCall,
    ) -> Result<FillOutcome, RequestError> {
        let fill_amounts = match decoded.fill_amounts {
            FillAmounts::Direct(ref amounts) => amounts.clone(),
            FillAmounts::MarketSell(total) => {
                let caps = self.fill_caps(&decoded.orders).await?;
                classifier::derive_market_sell_amounts(&caps, total)
            }
            FillAmounts::MarketBuy(total) => {
                let caps = self.fill_caps(&decoded.orders).await?;
                classifier::derive_market_buy_amounts(&decoded.orders, &caps, total)
            }
            FillAmounts::Cancellation => {
                return Err(anyhow!("cancellation routed to the fill path").into());
            }
        };

        let taker = request.transaction.signer_address;
        let coordinator_orders: Vec<CoordinatorOrder> = decoded
            .orders
            .iter()
            .zip(&fill_amounts)
            .filter(|(order, _)| self.serves(&order.order))
            .map(|(signed_order, fill_amount)| CoordinatorOrder {
                hash:         signed_order.hash(),
                signed_order: signed_order.clone(),
                fill_amount:  *fill_amount,
            })
            .collect();

        // Replay protection: a second use of the same transaction could move
        // broadcast rights to a different txOrigin.
        require!(
            !self.repository.transaction_exists(transaction_hash).await?,
            RequestError::TransactionAlreadyUsed
        );

        let mut refusals = self
            .validator
            .refusals(taker, &coordinator_orders, unix_now())
            .await?;

        self.broadcaster.send(
            self.chain.chain_id,
            Event::FillRequestReceived(FillRequestReceived { transaction_hash }),
        );

        // The anti-front-running window: subscribers got equal notice above,
        // and liveness may change before we sign.
        if !self.selective_delay.is_zero() {
            sleep(self.selective_delay).await;
            let recheck = self
                .validator
                .refusals(taker, &coordinator_orders, unix_now())
                .await?;
            let known: HashSet<H256> = refusals.iter().map(|refusal| refusal.order_hash).collect();
            for refusal in recheck {
                if !known.contains(&refusal.order_hash) {
                    DELAY_REFUSALS.inc();
                    refusals.push(refusal);
                }
            }
        }

        let approval_expiration = unix_now() + self.expiration_duration.as_secs();
        require!(
            request.transaction.expiration_time_seconds <= approval_expiration,
            RequestError::TransactionExpirationTooHigh
        );

        // Commit the ledger before signing; the conditional add is atomic
        // per (order, taker), so concurrent requests cannot jointly exceed
        // an order's taker asset amount.
        let refused: HashSet<H256> = refusals.iter().map(|refusal| refusal.order_hash).collect();
        let mut approved: Vec<&CoordinatorOrder> = vec![];
        for order in coordinator_orders
            .iter()
            .filter(|order| !refused.contains(&order.hash))
        {
            let reserved = self
                .repository
                .try_reserve_fill(
                    order.hash,
                    taker,
                    order.fill_amount,
                    order.signed_order.order.taker_asset_amount,
                )
                .await?;
            if reserved {
                approved.push(order);
            } else {
                refusals.push(Refusal {
                    order_hash: order.hash,
                    reason:     RefusalReason::LedgerExceeded,
                });
            }
        }
        for refusal in &refusals {
            REFUSAL_REASON
                .with_label_values(&[refusal.reason.into()])
                .inc();
        }

        if approved.is_empty() {
            return Ok(FillOutcome {
                approval_hash:           None,
                approved_order_hashes:   vec![],
                orders_refused_approval: refusals,
                signatures:              vec![],
                expiration_time_seconds: approval_expiration,
            });
        }

        let approval = CoordinatorApproval {
            order_hashes:                     approved.iter().map(|order| order.hash).collect(),
            tx_origin,
            approval_expiration_time_seconds: approval_expiration,
        };
        let approval_hash = approval.hash(&self.chain);
        let signatures = self.sign_for_recipients(&approval, &approved)?;

        let record = TransactionRecord {
            transaction_hash,
            tx_origin,
            signer_address: taker,
            signatures: signatures.clone(),
            approval_expiration_time_seconds: approval_expiration,
            orders: approved
                .iter()
                .map(|order| order.signed_order.clone())
                .collect(),
            taker_asset_fill_amounts: approved.iter().map(|order| order.fill_amount).collect(),
        };
        require!(
            self.repository.insert_transaction(record).await?,
            RequestError::TransactionAlreadyUsed
        );
        for order in &approved {
            self.repository
                .record_fill_approval(FillApprovalRecord {
                    order_hash:              order.hash,
                    transaction_hash,
                    approval_signatures:     signatures.clone(),
                    expiration_time_seconds: approval_expiration,
                    taker_asset_fill_amount: order.fill_amount,
                })
                .await?;
        }
        APPROVALS.inc();

        self.broadcaster.send(
            self.chain.chain_id,
            Event::FillRequestAccepted(Box::new(FillRequestAccepted {
                approval_hash,
                function_name: decoded.method.name(),
                order: approved[0].signed_order.clone(),
                taker_asset_fill_amounts: approved.iter().map(|order| order.fill_amount).collect(),
                approved_order_hashes: approval.order_hashes.clone(),
                approval_expiration_time_seconds: approval_expiration,
            })),
        );

        Ok(FillOutcome {
            approval_hash: Some(approval_hash),
            approved_order_hashes: approval.order_hashes,
            orders_refused_approval: refusals,
            signatures,
            expiration_time_seconds: approval_expiration,
        })
    }

    async fn handle_cancel(
        &self,
        request: &SignedZeroExTransaction,
        transaction_hash: H256,
        decoded: &DecodedCall,
    ) -> Result<CancelOutcome, RequestError> {
        let signer = request.transaction.signer_address;
        require!(
            decoded
                .orders
                .iter()
                .all(|order| order.order.maker_address == signer),
            RequestError::OnlyMakerCanCancelOrders
        );

        let order_hashes: Vec<H256> = decoded.orders.iter().map(SignedOrder::hash).collect();
        self.repository.soft_cancel(&order_hashes).await?;
        SOFT_CANCELS.inc_by(order_hashes.len() as u64);

        // Approvals already in flight may still settle; report them back.
        let now = unix_now();
        let mut outstanding = vec![];
        for order_hash in &order_hashes {
            outstanding.extend(
                self.repository
                    .fill_approvals(*order_hash)
                    .await?
                    .into_iter()
                    .filter(|record| record.expiration_time_seconds > now),
            );
        }

        self.broadcaster.send(
            self.chain.chain_id,
            Event::CancelRequestAccepted(CancelRequestAccepted {
                transaction_hash,
                zerox_order_hashes: order_hashes.clone(),
            }),
        );

        Ok(CancelOutcome {
            zerox_order_hashes:         order_hashes,
            outstanding_fill_signatures: outstanding,
        })
    }

    /// One signature per distinct fee recipient in the approved set, in
    /// first-appearance order.
    fn sign_for_recipients(
        &self,
        approval: &CoordinatorApproval,
        approved: &[&CoordinatorOrder],
    ) -> Result<Vec<Bytes>, RequestError> {
        let mut recipients: Vec<Address> = vec![];
        for order in approved {
            let recipient = order.signed_order.order.fee_recipient_address;
            if !recipients.contains(&recipient) {
                recipients.push(recipient);
            }
        }
        recipients
            .into_iter()
            .map(|recipient| {
                let key = self
                    .signers
                    .get(&recipient)
                    .ok_or(RequestError::MissingFeeRecipientKey(recipient))?;
                approval
                    .sign(&self.chain, key)
                    .map_err(|error| {
                        RequestError::Internal(anyhow!("approval signing failed: {}", error))
                    })
            })
            .collect()
    }

    /// Remaining fillable taker asset amount per order, in order.
    async fn fill_caps(&self, orders: &[SignedOrder]) -> Result<Vec<U256>, RequestError> {
        let states = stream::iter(orders)
            .map(|signed_order| async move {
                timeout(
                    STATE_FETCH_TIMEOUT,
                    self.oracle.trader_state(&signed_order.order),
                )
                .await
            })
            .buffered(CONCURRENT_STATE_FETCHES)
            .collect::<Vec<_>>()
            .await;
        orders
            .iter()
            .zip(states)
            .map(|(signed_order, state)| {
                let state = state
                    .map_err(|_| anyhow!("order state oracle timed out"))?
                    .map_err(|error| {
                        error!(?error, "Error fetching trader state");
                        anyhow!("order state oracle failure")
                    })?;
                Ok(fillable::remaining_fillable_amount(
                    &signed_order.order,
                    &state,
                ))
            })
            .collect()
    }
}

impl core::fmt::Debug for ApprovalEngine {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        // Keys are secrets; only the chain identifies the engine.
        fmt.debug_struct("ApprovalEngine")
            .field("chain", &self.chain)
            .finish()
    }
}
