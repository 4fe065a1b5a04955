//! Process-local storage. A single mutex over all tables trivially provides
//! the atomicity the `Storage` contract demands.

use super::{FillApprovalRecord, InsertionError, Storage, TransactionRecord};
use anyhow::Result;
use primitive_types::{H160, H256, U256};
use std::{
    collections::{hash_map::Entry, HashMap, HashSet},
    sync::Mutex,
};

#[derive(Default)]
pub struct InMemoryStorage(Mutex<Tables>);

#[derive(Default)]
struct Tables {
    soft_cancels: HashSet<H256>,
    fill_ledger: HashMap<(H256, H160), U256>,
    transactions: HashMap<H256, TransactionRecord>,
    fill_approvals: HashMap<H256, Vec<FillApprovalRecord>>,
}

#[async_trait::async_trait]
impl Storage for InMemoryStorage {
    async fn soft_cancelled_subset(&self, order_hashes: &[H256]) -> Result<HashSet<H256>> {
        let tables = self.0.lock().unwrap();
        Ok(order_hashes
            .iter()
            .filter(|hash| tables.soft_cancels.contains(hash))
            .copied()
            .collect())
    }

    async fn add_soft_cancels(&self, order_hashes: &[H256]) -> Result<()> {
        let mut tables = self.0.lock().unwrap();
        tables.soft_cancels.extend(order_hashes.iter().copied());
        Ok(())
    }

    async fn requested_fill_amounts(
        &self,
        taker: H160,
        order_hashes: &[H256],
    ) -> Result<HashMap<H256, U256>> {
        let tables = self.0.lock().unwrap();
        Ok(order_hashes
            .iter()
            .filter_map(|hash| {
                tables
                    .fill_ledger
                    .get(&(*hash, taker))
                    .map(|amount| (*hash, *amount))
            })
            .collect())
    }

    async fn try_reserve_fill(
        &self,
        order_hash: H256,
        taker: H160,
        amount: U256,
        max: U256,
    ) -> Result<bool> {
        let mut tables = self.0.lock().unwrap();
        let entry = tables.fill_ledger.entry((order_hash, taker)).or_default();
        match entry.checked_add(amount) {
            Some(total) if total <= max => {
                *entry = total;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn has_transaction(&self, transaction_hash: H256) -> Result<bool> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .transactions
            .contains_key(&transaction_hash))
    }

    async fn insert_transaction(&self, record: TransactionRecord) -> Result<(), InsertionError> {
        let mut tables = self.0.lock().unwrap();
        match tables.transactions.entry(record.transaction_hash) {
            Entry::Occupied(_) => Err(InsertionError::DuplicatedRecord),
            Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(())
            }
        }
    }

    async fn insert_fill_approvals(&self, records: Vec<FillApprovalRecord>) -> Result<()> {
        let mut tables = self.0.lock().unwrap();
        for record in records {
            tables
                .fill_approvals
                .entry(record.order_hash)
                .or_default()
                .push(record);
        }
        Ok(())
    }

    async fn outstanding_fill_approvals(
        &self,
        order_hashes: &[H256],
        min_expiration: U256,
    ) -> Result<Vec<FillApprovalRecord>> {
        let tables = self.0.lock().unwrap();
        Ok(order_hashes
            .iter()
            .flat_map(|hash| tables.fill_approvals.get(hash).into_iter().flatten())
            .filter(|record| record.expiration_time_seconds >= min_expiration)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> H256 {
        H256([byte; 32])
    }

    fn taker(byte: u8) -> H160 {
        H160([byte; 20])
    }

    #[tokio::test]
    async fn soft_cancels_are_monotonic() {
        let storage = InMemoryStorage::default();
        let hashes = [hash(1), hash(2), hash(3)];
        assert!(storage
            .soft_cancelled_subset(&hashes)
            .await
            .unwrap()
            .is_empty());

        storage.add_soft_cancels(&hashes[..2]).await.unwrap();
        let subset = storage.soft_cancelled_subset(&hashes).await.unwrap();
        assert_eq!(subset, [hash(1), hash(2)].into_iter().collect());

        // Re-adding is a no-op, nothing is ever removed.
        storage.add_soft_cancels(&hashes[..1]).await.unwrap();
        let subset = storage.soft_cancelled_subset(&hashes).await.unwrap();
        assert_eq!(subset.len(), 2);
    }

    #[tokio::test]
    async fn ledger_reservation_respects_max() {
        let storage = InMemoryStorage::default();
        let (order, alice, bob) = (hash(1), taker(1), taker(2));

        assert!(storage
            .try_reserve_fill(order, alice, 40.into(), 100.into())
            .await
            .unwrap());
        assert!(storage
            .try_reserve_fill(order, alice, 60.into(), 100.into())
            .await
            .unwrap());
        // 40 + 60 + 1 > 100
        assert!(!storage
            .try_reserve_fill(order, alice, 1.into(), 100.into())
            .await
            .unwrap());
        // The ledger is per taker.
        assert!(storage
            .try_reserve_fill(order, bob, 100.into(), 100.into())
            .await
            .unwrap());

        let amounts = storage
            .requested_fill_amounts(alice, &[order])
            .await
            .unwrap();
        assert_eq!(amounts[&order], U256::from(100));
    }

    #[tokio::test]
    async fn ledger_reservation_handles_overflow() {
        let storage = InMemoryStorage::default();
        let (order, alice) = (hash(1), taker(1));
        assert!(storage
            .try_reserve_fill(order, alice, U256::MAX, U256::MAX)
            .await
            .unwrap());
        assert!(!storage
            .try_reserve_fill(order, alice, 1.into(), U256::MAX)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn transactions_insert_once() {
        let storage = InMemoryStorage::default();
        let record = TransactionRecord {
            transaction_hash: hash(7),
            signed_transaction: Default::default(),
            tx_origin: taker(1),
            approval_signatures: vec![],
            approval_expiration_time_seconds: 100.into(),
            orders: vec![],
            taker_asset_fill_amounts: vec![],
        };

        assert!(!storage.has_transaction(hash(7)).await.unwrap());
        storage.insert_transaction(record.clone()).await.unwrap();
        assert!(storage.has_transaction(hash(7)).await.unwrap());
        assert!(matches!(
            storage.insert_transaction(record).await,
            Err(InsertionError::DuplicatedRecord)
        ));
    }

    #[tokio::test]
    async fn outstanding_approvals_filter_by_expiration() {
        let storage = InMemoryStorage::default();
        let record = |order_hash, expiration: u64| FillApprovalRecord {
            order_hash,
            taker_asset_fill_amount: 10.into(),
            approval_signatures: vec![],
            expiration_time_seconds: expiration.into(),
        };
        storage
            .insert_fill_approvals(vec![
                record(hash(1), 100),
                record(hash(1), 200),
                record(hash(2), 300),
            ])
            .await
            .unwrap();

        let outstanding = storage
            .outstanding_fill_approvals(&[hash(1), hash(2)], 150.into())
            .await
            .unwrap();
        assert_eq!(outstanding.len(), 2);
        assert!(outstanding
            .iter()
            .all(|record| record.expiration_time_seconds >= 150.into()));
    }
}
