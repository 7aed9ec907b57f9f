//! On-chain order-state reads backing the fillable-amount computation.

use async_trait::async_trait;
use tokio::try_join;
use web3::{
    contract::{Contract, Options as Web3Options},
    transports::Http,
    types::{Address, H256, U256},
};

use super::Error;
use crate::orders::Order;

/// Balances, allowances and the filled amount relevant to a single order,
/// snapshotted from the chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraderState {
    pub maker_balance:                   U256,
    pub maker_allowance:                 U256,
    pub maker_fee_balance:               U256,
    pub maker_fee_allowance:             U256,
    pub taker_balance:                   U256,
    pub taker_allowance:                 U256,
    pub taker_fee_balance:               U256,
    pub taker_fee_allowance:             U256,
    pub order_taker_asset_filled_amount: U256,
}

/// Read-only view of trader state on some chain.
#[async_trait]
pub trait OrderStateOracle: Send + Sync {
    async fn trader_state(&self, order: &Order) -> Result<TraderState, Error>;
}

/// Oracle backed by the DevUtils and Exchange contracts over web3.
#[derive(Clone, Debug)]
pub struct DevUtilsOracle {
    dev_utils: Contract<Http>,
    exchange:  Contract<Http>,
}

impl DevUtilsOracle {
    pub fn new(dev_utils: Contract<Http>, exchange: Contract<Http>) -> Self {
        Self {
            dev_utils,
            exchange,
        }
    }

    async fn balance_and_allowance(
        &self,
        owner: Address,
        asset_data: Vec<u8>,
    ) -> Result<(U256, U256), Error> {
        let result = self
            .dev_utils
            .query(
                "getBalanceAndAssetProxyAllowance",
                (owner, asset_data),
                None,
                Web3Options::default(),
                None,
            )
            .await?;
        Ok(result)
    }

    async fn filled(&self, order_hash: H256) -> Result<U256, Error> {
        let result = self
            .exchange
            .query("filled", (order_hash,), None, Web3Options::default(), None)
            .await?;
        Ok(result)
    }
}

#[async_trait]
impl OrderStateOracle for DevUtilsOracle {
    async fn trader_state(&self, order: &Order) -> Result<TraderState, Error> {
        let maker = order.maker_address;
        let taker = order.taker_address;

        // Sides that cannot constrain the fillable amount are not fetched.
        let taker_side = async {
            if taker.is_zero() {
                Ok((U256::zero(), U256::zero()))
            } else {
                self.balance_and_allowance(taker, order.taker_asset_data.0.clone())
                    .await
            }
        };
        let maker_fee_side = async {
            if order.maker_fee.is_zero() {
                Ok((U256::zero(), U256::zero()))
            } else {
                self.balance_and_allowance(maker, order.maker_fee_asset_data.0.clone())
                    .await
            }
        };
        let taker_fee_side = async {
            if taker.is_zero() || order.taker_fee.is_zero() {
                Ok((U256::zero(), U256::zero()))
            } else {
                self.balance_and_allowance(taker, order.taker_fee_asset_data.0.clone())
                    .await
            }
        };

        let (
            (maker_balance, maker_allowance),
            (maker_fee_balance, maker_fee_allowance),
            (taker_balance, taker_allowance),
            (taker_fee_balance, taker_fee_allowance),
            order_taker_asset_filled_amount,
        ) = try_join!(
            self.balance_and_allowance(maker, order.maker_asset_data.0.clone()),
            maker_fee_side,
            taker_side,
            taker_fee_side,
            self.filled(order.hash()),
        )?;

        Ok(TraderState {
            maker_balance,
            maker_allowance,
            maker_fee_balance,
            maker_fee_allowance,
            taker_balance,
            taker_allowance,
            taker_fee_balance,
            taker_fee_allowance,
            order_taker_asset_filled_amount,
        })
    }
}
