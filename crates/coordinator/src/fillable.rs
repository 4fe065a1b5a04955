//! Computes how much taker asset an order can still absorb, given a snapshot
//! of on-chain trader state.

use crate::conversions::{big_uint_to_u256_saturating, u256_to_big_uint};
use model::order::Order;
use primitive_types::U256;

/// `floor(amount · numerator / denominator)`, or zero for a zero denominator.
///
/// The product is computed over unbounded integers so extreme exchange rates
/// cannot overflow; a quotient beyond `U256` saturates, which is harmless
/// because every caller feeds the result into a minimum.
fn scale_ratio(amount: U256, numerator: U256, denominator: U256) -> U256 {
    if denominator.is_zero() {
        return U256::zero();
    }
    let product = u256_to_big_uint(&amount) * u256_to_big_uint(&numerator);
    big_uint_to_u256_saturating(&(product / u256_to_big_uint(&denominator)))
}

/// Converts a maker-asset amount into the equivalent taker-asset amount at the
/// order's exchange rate, rounding down.
pub fn taker_fill_amount(order: &Order, maker_amount: U256) -> U256 {
    scale_ratio(
        maker_amount,
        order.taker_asset_amount,
        order.maker_asset_amount,
    )
}

/// Converts a taker-asset amount into the equivalent maker-asset amount at the
/// order's exchange rate, rounding down.
pub fn maker_fill_amount(order: &Order, taker_amount: U256) -> U256 {
    scale_ratio(
        taker_amount,
        order.maker_asset_amount,
        order.taker_asset_amount,
    )
}

/// A snapshot of the on-chain state bounding an order's fillability, as
/// returned by the chain oracle.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct OrderState {
    pub maker_balance: U256,
    pub maker_allowance: U256,
    pub maker_fee_balance: U256,
    pub maker_fee_allowance: U256,
    pub taker_balance: U256,
    pub taker_allowance: U256,
    pub taker_fee_balance: U256,
    pub taker_fee_allowance: U256,
    /// Taker-asset amount already settled on chain for this order.
    pub taker_asset_filled_amount: U256,
}

/// The remaining taker-asset amount the order can absorb on chain: the
/// minimum over every binding constraint.
pub fn remaining_fillable_amount(order: &Order, state: &OrderState) -> U256 {
    let mut candidates = Vec::with_capacity(5);

    // A designated taker bounds the fill by their own funds.
    if !order.is_open_taker() {
        candidates.push(state.taker_balance.min(state.taker_allowance));
    }

    // The maker's funds, converted to the taker side of the order.
    candidates.push(taker_fill_amount(
        order,
        state.maker_balance.min(state.maker_allowance),
    ));

    // Fees scale linearly with the filled amount, so fee funds bound the fill
    // at `funds · takerAssetAmount / fee`.
    if !order.taker_fee.is_zero() {
        candidates.push(scale_ratio(
            state.taker_fee_balance.min(state.taker_fee_allowance),
            order.taker_asset_amount,
            order.taker_fee,
        ));
    }
    if !order.maker_fee.is_zero() {
        candidates.push(scale_ratio(
            state.maker_fee_balance.min(state.maker_fee_allowance),
            order.taker_asset_amount,
            order.maker_fee,
        ));
    }

    candidates.push(
        order
            .taker_asset_amount
            .saturating_sub(state.taker_asset_filled_amount),
    );

    // The vector is never empty: the last candidate is unconditional.
    candidates.into_iter().min().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::order::OrderBuilder;
    use primitive_types::H160;

    fn order() -> Order {
        OrderBuilder::default()
            .with_maker_asset_amount(200.into())
            .with_taker_asset_amount(100.into())
            .build()
    }

    fn ample_state() -> OrderState {
        OrderState {
            maker_balance: 1_000_000.into(),
            maker_allowance: 1_000_000.into(),
            taker_balance: 1_000_000.into(),
            taker_allowance: 1_000_000.into(),
            maker_fee_balance: 1_000_000.into(),
            maker_fee_allowance: 1_000_000.into(),
            taker_fee_balance: 1_000_000.into(),
            taker_fee_allowance: 1_000_000.into(),
            taker_asset_filled_amount: 0.into(),
        }
    }

    #[test]
    fn fill_amount_conversions_floor() {
        let order = order();
        // 2 maker units per taker unit.
        assert_eq!(taker_fill_amount(&order, 150.into()), U256::from(75));
        assert_eq!(maker_fill_amount(&order, 75.into()), U256::from(150));
        // 3 maker units convert to 1.5 taker units, floored.
        assert_eq!(taker_fill_amount(&order, 3.into()), U256::from(1));
    }

    #[test]
    fn zero_denominator_is_zero() {
        let degenerate = OrderBuilder::default()
            .with_taker_asset_amount(100.into())
            .build();
        assert_eq!(taker_fill_amount(&degenerate, 100.into()), U256::zero());
    }

    #[test]
    fn unconstrained_order_is_bounded_by_remaining_amount() {
        assert_eq!(
            remaining_fillable_amount(&order(), &ample_state()),
            U256::from(100)
        );
    }

    #[test]
    fn partially_filled_order() {
        let state = OrderState {
            taker_asset_filled_amount: 30.into(),
            ..ample_state()
        };
        assert_eq!(remaining_fillable_amount(&order(), &state), U256::from(70));
    }

    #[test]
    fn overfilled_order_saturates_to_zero() {
        let state = OrderState {
            taker_asset_filled_amount: 130.into(),
            ..ample_state()
        };
        assert_eq!(remaining_fillable_amount(&order(), &state), U256::zero());
    }

    #[test]
    fn maker_funds_bound_the_fill() {
        // Maker can cover only 80 maker units = 40 taker units.
        let state = OrderState {
            maker_balance: 80.into(),
            ..ample_state()
        };
        assert_eq!(remaining_fillable_amount(&order(), &state), U256::from(40));
        // Allowance binds the same way.
        let state = OrderState {
            maker_allowance: 80.into(),
            ..ample_state()
        };
        assert_eq!(remaining_fillable_amount(&order(), &state), U256::from(40));
    }

    #[test]
    fn designated_taker_funds_bound_the_fill() {
        let order = OrderBuilder::default()
            .with_maker_asset_amount(200.into())
            .with_taker_asset_amount(100.into())
            .with_taker(H160::from_low_u64_be(7))
            .build();
        let state = OrderState {
            taker_balance: 25.into(),
            ..ample_state()
        };
        assert_eq!(remaining_fillable_amount(&order, &state), U256::from(25));
        // An open-taker order ignores the taker-side snapshot.
        let open = self::order();
        assert_eq!(remaining_fillable_amount(&open, &state), U256::from(100));
    }

    #[test]
    fn fee_funds_bound_the_fill() {
        // takerFee of 10 over the full 100: fee funds of 4 allow a fill of 40.
        let order = OrderBuilder::default()
            .with_maker_asset_amount(200.into())
            .with_taker_asset_amount(100.into())
            .with_taker_fee(10.into())
            .build();
        let state = OrderState {
            taker_fee_balance: 4.into(),
            ..ample_state()
        };
        assert_eq!(remaining_fillable_amount(&order, &state), U256::from(40));

        let order = OrderBuilder::default()
            .with_maker_asset_amount(200.into())
            .with_taker_asset_amount(100.into())
            .with_maker_fee(50.into())
            .build();
        let state = OrderState {
            maker_fee_allowance: 10.into(),
            ..ample_state()
        };
        assert_eq!(remaining_fillable_amount(&order, &state), U256::from(20));
    }

    #[test]
    fn starved_maker_is_zero() {
        let state = OrderState {
            maker_balance: 0.into(),
            ..ample_state()
        };
        assert_eq!(remaining_fillable_amount(&order(), &state), U256::zero());
    }
}
