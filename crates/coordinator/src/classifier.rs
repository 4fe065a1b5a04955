//! Normalizes decoded exchange calls into `(function, orders, fillAmounts)`
//! tuples. Market orders have no per-order amounts in calldata; their fills
//! are derived from the remaining fillable amount of each order.

use crate::{
    decoder::{ExchangeCall, ExchangeFunction},
    fillable::{self, remaining_fillable_amount},
    oracle::OrderStateFetching,
};
use anyhow::{Context, Result};
use model::order::Order;
use primitive_types::{H160, U256};

/// A fill request normalized so that every order is paired with the
/// taker-asset amount the calldata asks to fill.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClassifiedFill {
    pub function: ExchangeFunction,
    pub orders: Vec<Order>,
    pub taker_asset_fill_amounts: Vec<U256>,
}

/// Classifies a non-cancellation call. Consults the chain oracle only for
/// market methods, whose amounts depend on current fillability.
///
/// # Panics
///
/// Panics when called with a cancellation; the engine routes those separately.
pub async fn classify_fill(
    call: ExchangeCall,
    order_states: &dyn OrderStateFetching,
    taker: H160,
) -> Result<ClassifiedFill> {
    match call {
        ExchangeCall::Fill {
            function,
            orders,
            taker_asset_fill_amounts,
        } => Ok(ClassifiedFill {
            function,
            orders,
            taker_asset_fill_amounts,
        }),
        ExchangeCall::MarketSell {
            function,
            orders,
            taker_asset_sell_amount,
        } => {
            let caps = fillable_caps(&orders, order_states, taker).await?;
            let taker_asset_fill_amounts = derive_market_sell_amounts(taker_asset_sell_amount, &caps);
            Ok(ClassifiedFill {
                function,
                orders,
                taker_asset_fill_amounts,
            })
        }
        ExchangeCall::MarketBuy {
            function,
            orders,
            maker_asset_buy_amount,
        } => {
            let caps = fillable_caps(&orders, order_states, taker).await?;
            let taker_asset_fill_amounts =
                derive_market_buy_amounts(&orders, maker_asset_buy_amount, &caps);
            Ok(ClassifiedFill {
                function,
                orders,
                taker_asset_fill_amounts,
            })
        }
        ExchangeCall::Cancellation { .. } => {
            unreachable!("cancellations are not fills")
        }
    }
}

async fn fillable_caps(
    orders: &[Order],
    order_states: &dyn OrderStateFetching,
    taker: H160,
) -> Result<Vec<U256>> {
    let states = order_states
        .fetch(orders, taker)
        .await
        .context("failed to read order states from chain")?;
    Ok(orders
        .iter()
        .zip(&states)
        .map(|(order, state)| remaining_fillable_amount(order, state))
        .collect())
}

/// Splits a taker-asset total over the orders in calldata order. The sum of
/// the result never exceeds `total` and exhausts it iff the caps allow.
pub fn derive_market_sell_amounts(total: U256, remaining_fillable: &[U256]) -> Vec<U256> {
    let mut remaining = total;
    remaining_fillable
        .iter()
        .map(|cap| {
            let fill = remaining.min(*cap);
            remaining -= fill;
            fill
        })
        .collect()
}

/// Walks a maker-asset total through the orders, converting through each
/// order's own exchange rate. The unfilled taker-side residual converts back
/// to maker units so later orders see correct maker-side accounting.
pub fn derive_market_buy_amounts(
    orders: &[Order],
    total_maker_amount: U256,
    remaining_fillable: &[U256],
) -> Vec<U256> {
    let mut remaining_maker = total_maker_amount;
    orders
        .iter()
        .zip(remaining_fillable)
        .map(|(order, cap)| {
            let taker_amount = fillable::taker_fill_amount(order, remaining_maker);
            let fill = taker_amount.min(*cap);
            remaining_maker = fillable::maker_fill_amount(order, taker_amount - fill);
            fill
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fillable::OrderState, oracle::MockOrderStateFetching};
    use model::order::OrderBuilder;

    #[test]
    fn market_sell_splits_in_calldata_order() {
        let caps = [40.into(), 30.into(), 50.into()];
        assert_eq!(
            derive_market_sell_amounts(100.into(), &caps),
            vec![U256::from(40), U256::from(30), U256::from(30)]
        );
    }

    #[test]
    fn market_sell_is_total_preserving() {
        let caps = [40.into(), 30.into()];
        let fills = derive_market_sell_amounts(100.into(), &caps);
        // Caps sum to less than the requested total: everything fillable is used.
        assert_eq!(fills, vec![U256::from(40), U256::from(30)]);

        let fills = derive_market_sell_amounts(50.into(), &caps);
        assert_eq!(fills.iter().fold(U256::zero(), |a, b| a + *b), 50.into());
    }

    #[test]
    fn market_sell_exhaustion_yields_zero_amounts() {
        let caps = [100.into(), 30.into()];
        assert_eq!(
            derive_market_sell_amounts(80.into(), &caps),
            vec![U256::from(80), U256::zero()]
        );
    }

    #[test]
    fn market_buy_converts_through_order_rates() {
        // Two maker units per taker unit, capped at 30 taker units.
        let first = OrderBuilder::default()
            .with_maker_asset_amount(200.into())
            .with_taker_asset_amount(100.into())
            .build();
        // One maker unit per taker unit, effectively uncapped.
        let second = OrderBuilder::default()
            .with_maker_asset_amount(100.into())
            .with_taker_asset_amount(100.into())
            .build();
        let fills = derive_market_buy_amounts(
            &[first, second],
            150.into(),
            &[30.into(), 1000.into()],
        );
        // 150 maker units are 75 taker units of the first order; its cap of 30
        // leaves a 45-taker-unit residual, which is 90 maker units, which the
        // second order fills one to one.
        assert_eq!(fills, vec![U256::from(30), U256::from(90)]);
    }

    #[tokio::test]
    async fn classify_direct_fill_skips_the_oracle() {
        let call = ExchangeCall::Fill {
            function: ExchangeFunction::FillOrder,
            orders: vec![OrderBuilder::default().build()],
            taker_asset_fill_amounts: vec![40.into()],
        };
        // A mock with no expectations panics when touched.
        let oracle = MockOrderStateFetching::new();
        let classified = classify_fill(call, &oracle, H160::zero()).await.unwrap();
        assert_eq!(classified.taker_asset_fill_amounts, vec![U256::from(40)]);
    }

    #[tokio::test]
    async fn classify_market_sell_uses_fillable_caps() {
        let order = |salt: u64| {
            OrderBuilder::default()
                .with_maker_asset_amount(100.into())
                .with_taker_asset_amount(100.into())
                .with_salt(salt.into())
                .build()
        };
        let call = ExchangeCall::MarketSell {
            function: ExchangeFunction::MarketSellOrdersNoThrow,
            orders: vec![order(1), order(2)],
            taker_asset_sell_amount: 70.into(),
        };
        let mut oracle = MockOrderStateFetching::new();
        oracle.expect_fetch().times(1).returning(|orders, _| {
            Ok(orders
                .iter()
                .map(|_| OrderState {
                    maker_balance: 40.into(),
                    maker_allowance: 40.into(),
                    ..Default::default()
                })
                .collect())
        });
        let classified = classify_fill(call, &oracle, H160::zero()).await.unwrap();
        // Each order's maker funds cap it at 40 taker units.
        assert_eq!(
            classified.taker_asset_fill_amounts,
            vec![U256::from(40), U256::from(30)]
        );
    }
}
