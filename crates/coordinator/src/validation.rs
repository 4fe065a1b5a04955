//! The request validator: partitions a fill request's orders into an approved
//! set and a refused set. Refusals are data, not errors; the validator only
//! fails on repository I/O problems.

use crate::storage::Storage;
use anyhow::Result;
use model::{order::Order, time};
use primitive_types::{H160, H256, U256};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum RefusalReason {
    /// The maker retracted the order off-chain.
    SoftCancelled,
    /// The taker's cumulative requested amount would exceed the order's
    /// `takerAssetAmount`.
    LedgerExceeded,
    Expired,
    /// The requested amount is zero, e.g. because a market derivation
    /// exhausted its input before reaching this order.
    Redundant,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRefusal {
    pub order_hash: H256,
    pub reason: RefusalReason,
}

/// The validator's output: indices into the request's order list on the
/// approved side, refusals with reasons on the other.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Partition {
    pub approved: Vec<usize>,
    pub refused: Vec<OrderRefusal>,
}

impl Partition {
    /// Unions this partition with a later one over the same orders. An order
    /// stays approved only if both passes approved it; refusals accumulate
    /// (first reason wins for an order refused twice).
    pub fn merge(self, later: Partition) -> Partition {
        let mut refused = self.refused;
        for refusal in later.refused {
            if !refused.iter().any(|r| r.order_hash == refusal.order_hash) {
                refused.push(refusal);
            }
        }
        let approved = self
            .approved
            .into_iter()
            .filter(|index| later.approved.contains(index))
            .collect();
        Partition { approved, refused }
    }
}

pub struct RequestValidator {
    storage: Arc<dyn Storage>,
}

impl RequestValidator {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Applies the validation contract over the request's orders. `orders`,
    /// `order_hashes` and `fill_amounts` run in parallel.
    pub async fn partition(
        &self,
        taker: H160,
        orders: &[Order],
        order_hashes: &[H256],
        fill_amounts: &[U256],
    ) -> Result<Partition> {
        debug_assert_eq!(orders.len(), order_hashes.len());
        debug_assert_eq!(orders.len(), fill_amounts.len());

        let soft_cancelled = self.storage.soft_cancelled_subset(order_hashes).await?;
        let requested = self
            .storage
            .requested_fill_amounts(taker, order_hashes)
            .await?;
        let now = U256::from(time::now_in_epoch_seconds());

        // Amounts approved earlier in this same request, so a duplicated
        // order hash cannot pass the ledger check twice.
        let mut pending: HashMap<H256, U256> = HashMap::new();
        let mut partition = Partition::default();

        for (index, ((order, order_hash), fill_amount)) in
            orders.iter().zip(order_hashes).zip(fill_amounts).enumerate()
        {
            let refuse = |reason| OrderRefusal {
                order_hash: *order_hash,
                reason,
            };

            if soft_cancelled.contains(order_hash) {
                partition.refused.push(refuse(RefusalReason::SoftCancelled));
                continue;
            }
            if order.expiration_time_seconds < now {
                partition.refused.push(refuse(RefusalReason::Expired));
                continue;
            }
            // Zero amounts are classified before the ledger check: an order a
            // market derivation never reached is redundant, not exceeded.
            if fill_amount.is_zero() {
                partition.refused.push(refuse(RefusalReason::Redundant));
                continue;
            }

            let prior = requested.get(order_hash).copied().unwrap_or_default();
            let pending_amount = pending.entry(*order_hash).or_default();
            let cumulative = prior
                .checked_add(*pending_amount)
                .and_then(|sum| sum.checked_add(*fill_amount));
            match cumulative {
                Some(total) if total <= order.taker_asset_amount => {
                    *pending_amount += *fill_amount;
                    partition.approved.push(index);
                }
                _ => partition.refused.push(refuse(RefusalReason::LedgerExceeded)),
            }
        }

        Ok(partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStorage;
    use model::order::OrderBuilder;

    fn order(taker_asset_amount: u64) -> Order {
        OrderBuilder::default()
            .with_taker_asset_amount(taker_asset_amount.into())
            .with_expiration_time_seconds(U256::MAX)
            .build()
    }

    fn hash(byte: u8) -> H256 {
        H256([byte; 32])
    }

    fn taker() -> H160 {
        H160::from_low_u64_be(7)
    }

    #[tokio::test]
    async fn approves_within_ledger() {
        let validator = RequestValidator::new(Arc::new(InMemoryStorage::default()));
        let partition = validator
            .partition(taker(), &[order(100)], &[hash(1)], &[40.into()])
            .await
            .unwrap();
        assert_eq!(partition.approved, vec![0]);
        assert!(partition.refused.is_empty());
    }

    #[tokio::test]
    async fn refuses_soft_cancelled_before_ledger() {
        let storage = Arc::new(InMemoryStorage::default());
        storage.add_soft_cancels(&[hash(1)]).await.unwrap();
        let validator = RequestValidator::new(storage);
        // The amount would also exceed the ledger; soft-cancel wins.
        let partition = validator
            .partition(taker(), &[order(100)], &[hash(1)], &[500.into()])
            .await
            .unwrap();
        assert_eq!(
            partition.refused,
            vec![OrderRefusal {
                order_hash: hash(1),
                reason: RefusalReason::SoftCancelled
            }]
        );
    }

    #[tokio::test]
    async fn refuses_expired_orders() {
        let validator = RequestValidator::new(Arc::new(InMemoryStorage::default()));
        let expired = OrderBuilder::default()
            .with_taker_asset_amount(100.into())
            .with_expiration_time_seconds(1.into())
            .build();
        let partition = validator
            .partition(taker(), &[expired], &[hash(1)], &[40.into()])
            .await
            .unwrap();
        assert_eq!(partition.refused[0].reason, RefusalReason::Expired);
    }

    #[tokio::test]
    async fn zero_amount_is_redundant_not_ledger_exceeded() {
        let storage = Arc::new(InMemoryStorage::default());
        // The taker already exhausted the order completely.
        assert!(storage
            .try_reserve_fill(hash(1), taker(), 100.into(), 100.into())
            .await
            .unwrap());
        let validator = RequestValidator::new(storage);
        let partition = validator
            .partition(taker(), &[order(100)], &[hash(1)], &[0.into()])
            .await
            .unwrap();
        assert_eq!(partition.refused[0].reason, RefusalReason::Redundant);
    }

    #[tokio::test]
    async fn refuses_when_prior_requests_exhaust_the_order() {
        let storage = Arc::new(InMemoryStorage::default());
        assert!(storage
            .try_reserve_fill(hash(1), taker(), 40.into(), 100.into())
            .await
            .unwrap());
        let validator = RequestValidator::new(storage);
        let partition = validator
            .partition(taker(), &[order(100)], &[hash(1)], &[70.into()])
            .await
            .unwrap();
        assert_eq!(partition.refused[0].reason, RefusalReason::LedgerExceeded);

        // Another taker is unaffected.
        let partition = validator
            .partition(H160::from_low_u64_be(8), &[order(100)], &[hash(1)], &[70.into()])
            .await
            .unwrap();
        assert_eq!(partition.approved, vec![0]);
    }

    #[tokio::test]
    async fn duplicated_order_cannot_double_spend_within_one_request() {
        let validator = RequestValidator::new(Arc::new(InMemoryStorage::default()));
        let orders = [order(100), order(100)];
        let hashes = [hash(1), hash(1)];
        let partition = validator
            .partition(taker(), &orders, &hashes, &[60.into(), 60.into()])
            .await
            .unwrap();
        assert_eq!(partition.approved, vec![0]);
        assert_eq!(partition.refused[0].reason, RefusalReason::LedgerExceeded);
    }

    #[test]
    fn merge_keeps_only_doubly_approved_orders() {
        let first = Partition {
            approved: vec![0, 1, 2],
            refused: vec![OrderRefusal {
                order_hash: hash(3),
                reason: RefusalReason::Expired,
            }],
        };
        let second = Partition {
            approved: vec![0, 2],
            refused: vec![
                OrderRefusal {
                    order_hash: hash(1),
                    reason: RefusalReason::SoftCancelled,
                },
                OrderRefusal {
                    order_hash: hash(3),
                    reason: RefusalReason::SoftCancelled,
                },
            ],
        };
        let merged = first.merge(second);
        assert_eq!(merged.approved, vec![0, 2]);
        assert_eq!(merged.refused.len(), 2);
        // The first pass's reason wins for the doubly refused order.
        assert_eq!(
            merged
                .refused
                .iter()
                .find(|refusal| refusal.order_hash == hash(3))
                .unwrap()
                .reason,
            RefusalReason::Expired
        );
    }
}
