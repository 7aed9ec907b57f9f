//! Remaining fillable taker asset amount from an on-chain state snapshot.

use core::cmp::min;

use web3::types::U256;

use crate::{ethereum::TraderState, orders::Order, utils::math::mul_div_floor};

/// The taker asset amount the order can still absorb on-chain: the minimum
/// of what the order has left and what the traders' balances, allowances and
/// fee funding support.
pub fn remaining_fillable_amount(order: &Order, state: &TraderState) -> U256 {
    let mut fillable = order
        .taker_asset_amount
        .saturating_sub(state.order_taker_asset_filled_amount);

    if !order.taker_address.is_zero() {
        fillable = min(fillable, min(state.taker_balance, state.taker_allowance));
    }

    fillable = min(
        fillable,
        order.taker_fill_amount(min(state.maker_balance, state.maker_allowance)),
    );

    if !order.taker_fee.is_zero() {
        fillable = min(
            fillable,
            mul_div_floor(
                min(state.taker_fee_balance, state.taker_fee_allowance),
                order.taker_asset_amount,
                order.taker_fee,
            ),
        );
    }

    if !order.maker_fee.is_zero() {
        fillable = min(
            fillable,
            mul_div_floor(
                min(state.maker_fee_balance, state.maker_fee_allowance),
                order.taker_asset_amount,
                order.maker_fee,
            ),
        );
    }

    fillable
}
