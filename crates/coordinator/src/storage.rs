//! The repository of mutable coordinator state: soft-cancels, the per-taker
//! fill ledger, seen meta-transactions and outstanding fill approvals.

pub mod memory;

use anyhow::Result;
use model::{signature::TaggedSignature, transaction::SignedZeroExTransaction, order::Order, u256_decimal};
use primitive_types::{H160, H256, U256};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Everything persisted about an approved meta-transaction. Recomputing the
/// approval digest from these fields and recovering the stored signatures must
/// yield the coordinator's fee-recipient addresses, which makes every issued
/// approval auditable from storage alone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransactionRecord {
    pub transaction_hash: H256,
    pub signed_transaction: SignedZeroExTransaction,
    pub tx_origin: H160,
    pub approval_signatures: Vec<TaggedSignature>,
    pub approval_expiration_time_seconds: U256,
    /// The approved orders, in calldata order.
    pub orders: Vec<Order>,
    pub taker_asset_fill_amounts: Vec<U256>,
}

/// One outstanding approval for a single order, returned to makers on
/// cancellation so they can see which in-flight fills may still settle.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FillApprovalRecord {
    pub order_hash: H256,
    #[serde(with = "u256_decimal")]
    pub taker_asset_fill_amount: U256,
    pub approval_signatures: Vec<TaggedSignature>,
    #[serde(with = "u256_decimal")]
    pub expiration_time_seconds: U256,
}

#[derive(Debug, Error)]
pub enum InsertionError {
    #[error("duplicated record")]
    DuplicatedRecord,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The coordinator's mutable state: soft-cancels, the fill ledger, seen
/// transactions and outstanding approvals.
///
/// Implementations must make `try_reserve_fill` atomic per
/// `(order_hash, taker)`: two concurrent requests may otherwise both observe
/// the pre-state, both pass the ledger check and cumulatively exceed the
/// order's `takerAssetAmount`.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// The subset of the given hashes that has been soft-cancelled, in input
    /// order.
    async fn soft_cancelled_subset(&self, order_hashes: &[H256]) -> Result<HashSet<H256>>;

    /// Marks all given orders soft-cancelled. Atomic from the caller's
    /// perspective; soft-cancels are never removed.
    async fn add_soft_cancels(&self, order_hashes: &[H256]) -> Result<()>;

    /// Cumulative taker-asset amounts this taker has already had approved,
    /// per order hash. Missing entries mean zero.
    async fn requested_fill_amounts(
        &self,
        taker: H160,
        order_hashes: &[H256],
    ) -> Result<HashMap<H256, U256>>;

    /// Atomically adds `amount` to the taker's ledger entry for the order iff
    /// the new cumulative total stays within `max`. Returns whether the
    /// reservation was made. Ledger entries are never decremented.
    async fn try_reserve_fill(
        &self,
        order_hash: H256,
        taker: H160,
        amount: U256,
        max: U256,
    ) -> Result<bool>;

    async fn has_transaction(&self, transaction_hash: H256) -> Result<bool>;

    /// Records an approved meta-transaction. A hash can never reappear with
    /// different contents: re-insertion fails with
    /// [`InsertionError::DuplicatedRecord`].
    async fn insert_transaction(&self, record: TransactionRecord) -> Result<(), InsertionError>;

    /// Associates outstanding fill approvals with the orders they cover.
    async fn insert_fill_approvals(&self, records: Vec<FillApprovalRecord>) -> Result<()>;

    /// All fill approvals for the given orders expiring at or after
    /// `min_expiration`.
    async fn outstanding_fill_approvals(
        &self,
        order_hashes: &[H256],
        min_expiration: U256,
    ) -> Result<Vec<FillApprovalRecord>>;
}
