//! Calldata classification: parse a decoded Exchange method call into a
//! normalized `(method, orders, fill amounts)` tuple.

use ethabi::{Contract, Token};
use once_cell::sync::Lazy;
use strum_macros::{EnumString, IntoStaticStr};
use thiserror::Error;
use web3::types::{Bytes, U256};

use crate::{
    ethereum::{ChainInfo, EXCHANGE_ABI},
    orders::{Order, SignedOrder},
    require,
};

static EXCHANGE: Lazy<Contract> =
    Lazy::new(|| Contract::load(EXCHANGE_ABI).expect("invalid exchange ABI"));

/// The Exchange methods a coordinator request may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
pub enum ExchangeMethod {
    #[strum(serialize = "fillOrder")]
    FillOrder,
    #[strum(serialize = "fillOrKillOrder")]
    FillOrKillOrder,
    #[strum(serialize = "batchFillOrders")]
    BatchFillOrders,
    #[strum(serialize = "batchFillOrKillOrders")]
    BatchFillOrKillOrders,
    #[strum(serialize = "batchFillOrdersNoThrow")]
    BatchFillOrdersNoThrow,
    #[strum(serialize = "marketSellOrdersFillOrKill")]
    MarketSellOrdersFillOrKill,
    #[strum(serialize = "marketSellOrdersNoThrow")]
    MarketSellOrdersNoThrow,
    #[strum(serialize = "marketBuyOrdersFillOrKill")]
    MarketBuyOrdersFillOrKill,
    #[strum(serialize = "marketBuyOrdersNoThrow")]
    MarketBuyOrdersNoThrow,
    #[strum(serialize = "cancelOrder")]
    CancelOrder,
    #[strum(serialize = "batchCancelOrders")]
    BatchCancelOrders,
}

impl ExchangeMethod {
    pub const fn is_cancellation(self) -> bool {
        matches!(self, Self::CancelOrder | Self::BatchCancelOrders)
    }

    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// How taker asset fill amounts derive from the calldata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillAmounts {
    /// Direct per-order amounts (`fillOrder`, `batchFill*`).
    Direct(Vec<U256>),
    /// Derived from a total taker asset amount against per-order caps.
    MarketSell(U256),
    /// Derived from a total maker asset amount against per-order caps.
    MarketBuy(U256),
    /// Cancellation path; no amounts.
    Cancellation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCall {
    pub method:       ExchangeMethod,
    pub orders:       Vec<SignedOrder>,
    pub fill_amounts: FillAmounts,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("calldata does not decode as an Exchange method call")]
    MalformedCalldata,
    #[error("Exchange method {0} is not approvable by the coordinator")]
    UnsupportedFunction(String),
}

impl From<ethabi::Error> for DecodeError {
    fn from(_: ethabi::Error) -> Self {
        Self::MalformedCalldata
    }
}

/// Decode Exchange calldata and decorate the parsed orders with the chain's
/// canonical exchange address and chain id.
pub fn decode_call(data: &[u8], chain: &ChainInfo) -> Result<DecodedCall, DecodeError> {
    require!(data.len() >= 4, DecodeError::MalformedCalldata);
    let function = EXCHANGE
        .functions()
        .find(|function| {
            let input_types = function
                .inputs
                .iter()
                .map(|p| p.kind.to_string())
                .collect::<Vec<_>>()
                .join(",");
            let signature = format!("{}({})", function.name, input_types);
            let hash = sha3::Keccak256::digest(signature.as_bytes());
            hash[..4] == data[..4]
        })
        .ok_or(DecodeError::MalformedCalldata)?;
    let method = function
        .name
        .parse::<ExchangeMethod>()
        .map_err(|_| DecodeError::UnsupportedFunction(function.name.clone()))?;
    let tokens = function.decode_input(&data[4..])?;

    let mut call = match method {
        ExchangeMethod::FillOrder | ExchangeMethod::FillOrKillOrder => {
            let (order, amount, signature) = three(tokens)?;
            DecodedCall {
                method,
                orders: vec![signed_order(order, signature)?],
                fill_amounts: FillAmounts::Direct(vec![uint(amount)?]),
            }
        }
        ExchangeMethod::BatchFillOrders
        | ExchangeMethod::BatchFillOrKillOrders
        | ExchangeMethod::BatchFillOrdersNoThrow => {
            let (orders, amounts, signatures) = three(tokens)?;
            let amounts = array(amounts)?
                .into_iter()
                .map(uint)
                .collect::<Result<Vec<_>, _>>()?;
            let orders = signed_orders(orders, signatures)?;
            require!(orders.len() == amounts.len(), DecodeError::MalformedCalldata);
            DecodedCall {
                method,
                orders,
                fill_amounts: FillAmounts::Direct(amounts),
            }
        }
        ExchangeMethod::MarketSellOrdersFillOrKill | ExchangeMethod::MarketSellOrdersNoThrow => {
            let (orders, total, signatures) = three(tokens)?;
            DecodedCall {
                method,
                orders: signed_orders(orders, signatures)?,
                fill_amounts: FillAmounts::MarketSell(uint(total)?),
            }
        }
        ExchangeMethod::MarketBuyOrdersFillOrKill | ExchangeMethod::MarketBuyOrdersNoThrow => {
            let (orders, total, signatures) = three(tokens)?;
            DecodedCall {
                method,
                orders: signed_orders(orders, signatures)?,
                fill_amounts: FillAmounts::MarketBuy(uint(total)?),
            }
        }
        ExchangeMethod::CancelOrder => {
            let order = one(tokens)?;
            DecodedCall {
                method,
                orders: vec![signed_order(order, Token::Bytes(vec![]))?],
                fill_amounts: FillAmounts::Cancellation,
            }
        }
        ExchangeMethod::BatchCancelOrders => {
            let orders = one(tokens)?;
            let orders = array(orders)?
                .into_iter()
                .map(|order| signed_order(order, Token::Bytes(vec![])))
                .collect::<Result<Vec<_>, _>>()?;
            DecodedCall {
                method,
                orders,
                fill_amounts: FillAmounts::Cancellation,
            }
        }
    };

    // Calldata orders omit the exchange address; decorate before hashing.
    for signed_order in &mut call.orders {
        signed_order.order.exchange_address = chain.exchange;
        signed_order.order.chain_id = chain.chain_id;
    }
    Ok(call)
}

/// Market-sell derivation: spread a total taker asset amount over the orders
/// in calldata order, capping each at its remaining fillable amount.
pub fn derive_market_sell_amounts(caps: &[U256], total: U256) -> Vec<U256> {
    let mut remaining = total;
    caps.iter()
        .map(|cap| {
            let fill = remaining.min(*cap);
            remaining = remaining - fill;
            fill
        })
        .collect()
}

/// Market-buy derivation: convert the total maker asset amount through each
/// order's exchange rate, capping at the remaining fillable amount and
/// converting the residual back to the maker side.
pub fn derive_market_buy_amounts(orders: &[SignedOrder], caps: &[U256], total: U256) -> Vec<U256> {
    let mut remaining = total;
    orders
        .iter()
        .zip(caps)
        .map(|(signed_order, cap)| {
            let order = &signed_order.order;
            let taker_amount = order.taker_fill_amount(remaining);
            let fill = taker_amount.min(*cap);
            remaining = order.maker_fill_amount(taker_amount - fill);
            fill
        })
        .collect()
}

fn one(tokens: Vec<Token>) -> Result<Token, DecodeError> {
    let mut iter = tokens.into_iter();
    match (iter.next(), iter.next()) {
        (Some(token), None) => Ok(token),
        _ => Err(DecodeError::MalformedCalldata),
    }
}

fn three(tokens: Vec<Token>) -> Result<(Token, Token, Token), DecodeError> {
    let mut iter = tokens.into_iter();
    match (iter.next(), iter.next(), iter.next(), iter.next()) {
        (Some(first), Some(second), Some(third), None) => Ok((first, second, third)),
        _ => Err(DecodeError::MalformedCalldata),
    }
}

fn uint(token: Token) -> Result<U256, DecodeError> {
    token.into_uint().ok_or(DecodeError::MalformedCalldata)
}

fn array(token: Token) -> Result<Vec<Token>, DecodeError> {
    match token {
        Token::Array(tokens) => Ok(tokens),
        _ => Err(DecodeError::MalformedCalldata),
    }
}

fn bytes(token: Token) -> Result<Vec<u8>, DecodeError> {
    token.into_bytes().ok_or(DecodeError::MalformedCalldata)
}

// uint256 expirations beyond u64 cannot be represented; treat as malformed
// rather than letting a truncation wrap into the past.
fn expiration_seconds(value: U256) -> Result<u64, DecodeError> {
    require!(
        value <= U256::from(u64::MAX),
        DecodeError::MalformedCalldata
    );
    Ok(value.low_u64())
}

fn signed_orders(orders: Token, signatures: Token) -> Result<Vec<SignedOrder>, DecodeError> {
    let orders = array(orders)?;
    let signatures = array(signatures)?;
    require!(
        orders.len() == signatures.len(),
        DecodeError::MalformedCalldata
    );
    orders
        .into_iter()
        .zip(signatures)
        .map(|(order, signature)| signed_order(order, signature))
        .collect()
}

fn signed_order(order: Token, signature: Token) -> Result<SignedOrder, DecodeError> {
    let tokens = match order {
        Token::Tuple(tokens) => tokens,
        _ => return Err(DecodeError::MalformedCalldata),
    };
    let mut iter = tokens.into_iter();
    let mut next = || iter.next().ok_or(DecodeError::MalformedCalldata);
    let order = Order {
        maker_address:           next()?
            .into_address()
            .ok_or(DecodeError::MalformedCalldata)?,
        taker_address:           next()?
            .into_address()
            .ok_or(DecodeError::MalformedCalldata)?,
        fee_recipient_address:   next()?
            .into_address()
            .ok_or(DecodeError::MalformedCalldata)?,
        sender_address:          next()?
            .into_address()
            .ok_or(DecodeError::MalformedCalldata)?,
        maker_asset_amount:      uint(next()?)?,
        taker_asset_amount:      uint(next()?)?,
        maker_fee:               uint(next()?)?,
        taker_fee:               uint(next()?)?,
        expiration_time_seconds: expiration_seconds(uint(next()?)?)?,
        salt:                    uint(next()?)?,
        maker_asset_data:        Bytes(bytes(next()?)?),
        taker_asset_data:        Bytes(bytes(next()?)?),
        maker_fee_asset_data:    Bytes(bytes(next()?)?),
        taker_fee_asset_data:    Bytes(bytes(next()?)?),
        // Decorated by the caller
        exchange_address:        Default::default(),
        chain_id:                0,
    };
    Ok(SignedOrder {
        order,
        signature: Bytes(bytes(signature)?),
    })
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    pub fn order_tokens(signed_order: &SignedOrder) -> Token {
        let order = &signed_order.order;
        Token::Tuple(vec![
            Token::Address(order.maker_address),
            Token::Address(order.taker_address),
            Token::Address(order.fee_recipient_address),
            Token::Address(order.sender_address),
            Token::Uint(order.maker_asset_amount),
            Token::Uint(order.taker_asset_amount),
            Token::Uint(order.maker_fee),
            Token::Uint(order.taker_fee),
            Token::Uint(order.expiration_time_seconds.into()),
            Token::Uint(order.salt),
            Token::Bytes(order.maker_asset_data.0.clone()),
            Token::Bytes(order.taker_asset_data.0.clone()),
            Token::Bytes(order.maker_fee_asset_data.0.clone()),
            Token::Bytes(order.taker_fee_asset_data.0.clone()),
        ])
    }

    pub fn encode_call(name: &str, tokens: &[Token]) -> Vec<u8> {
        EXCHANGE
            .function(name)
            .unwrap()
            .encode_input(tokens)
            .unwrap()
    }

    /// `fillOrder`-style calldata for a single order.
    pub fn encode_single(name: &str, signed_order: &SignedOrder, amount: U256) -> Vec<u8> {
        encode_call(name, &[
            order_tokens(signed_order),
            Token::Uint(amount),
            Token::Bytes(signed_order.signature.0.clone()),
        ])
    }

    /// `batchFillOrders`-style calldata.
    pub fn encode_batch(name: &str, signed_orders: &[SignedOrder], amounts: &[U256]) -> Vec<u8> {
        encode_call(name, &[
            Token::Array(signed_orders.iter().map(order_tokens).collect()),
            Token::Array(amounts.iter().copied().map(Token::Uint).collect()),
            Token::Array(
                signed_orders
                    .iter()
                    .map(|order| Token::Bytes(order.signature.0.clone()))
                    .collect(),
            ),
        ])
    }

    /// `marketSellOrdersNoThrow`-style calldata with a single total.
    pub fn encode_market(name: &str, signed_orders: &[SignedOrder], total: U256) -> Vec<u8> {
        encode_call(name, &[
            Token::Array(signed_orders.iter().map(order_tokens).collect()),
            Token::Uint(total),
            Token::Array(
                signed_orders
                    .iter()
                    .map(|order| Token::Bytes(order.signature.0.clone()))
                    .collect(),
            ),
        ])
    }

    /// `cancelOrder` calldata.
    pub fn encode_cancel(signed_order: &SignedOrder) -> Vec<u8> {
        encode_call("cancelOrder", &[order_tokens(signed_order)])
    }

    /// `batchCancelOrders` calldata.
    pub fn encode_batch_cancel(signed_orders: &[SignedOrder]) -> Vec<u8> {
        encode_call("batchCancelOrders", &[Token::Array(
            signed_orders.iter().map(order_tokens).collect(),
        )])
    }
}
