//! Lifecycle events and their best-effort fanout to subscribers.

use crate::storage::FillApprovalRecord;
use model::{order::Order, u256_decimal};
use primitive_types::{H256, U256};
use serde::Serialize;
use serde_with::serde_as;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::broadcast;

/// Events are serialized as `{"type": ..., "data": ...}` on the wire.
#[serde_as]
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordinatorEvent {
    #[serde(rename_all = "camelCase")]
    FillRequestReceived { transaction_hash: H256 },
    #[serde(rename_all = "camelCase")]
    FillRequestAccepted {
        approval_hash: H256,
        function_name: String,
        /// A representative of the approved batch: its first order.
        order: Order,
        #[serde_as(as = "Vec<u256_decimal::DecimalU256>")]
        taker_asset_fill_amounts: Vec<U256>,
        approved_order_hashes: Vec<H256>,
        #[serde(with = "u256_decimal")]
        approval_expiration_time_seconds: U256,
    },
    #[serde(rename_all = "camelCase")]
    CancelRequestAccepted {
        cancelled_order_hashes: Vec<H256>,
        outstanding_fill_signatures: Vec<FillApprovalRecord>,
    },
}

/// Per-chain broadcast fanout. Delivery is best effort: events published with
/// nobody listening, or past a lagging subscriber's buffer, are dropped.
#[derive(Clone)]
pub struct EventBus {
    senders: Arc<HashMap<u64, broadcast::Sender<CoordinatorEvent>>>,
}

impl EventBus {
    const CHANNEL_CAPACITY: usize = 256;

    pub fn new(chain_ids: impl IntoIterator<Item = u64>) -> Self {
        let senders = chain_ids
            .into_iter()
            .map(|chain_id| {
                let (sender, _) = broadcast::channel(Self::CHANNEL_CAPACITY);
                (chain_id, sender)
            })
            .collect();
        Self {
            senders: Arc::new(senders),
        }
    }

    pub fn publish(&self, chain_id: u64, event: CoordinatorEvent) {
        if let Some(sender) = self.senders.get(&chain_id) {
            // An error just means there are no subscribers right now.
            let _ = sender.send(event);
        }
    }

    pub fn subscribe(&self, chain_id: u64) -> Option<broadcast::Receiver<CoordinatorEvent>> {
        self.senders.get(&chain_id).map(|sender| sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fanout_is_per_chain() {
        let bus = EventBus::new([1, 42]);
        let mut mainnet = bus.subscribe(1).unwrap();
        let mut testnet = bus.subscribe(42).unwrap();

        bus.publish(
            1,
            CoordinatorEvent::FillRequestReceived {
                transaction_hash: H256([1; 32]),
            },
        );

        assert!(matches!(
            mainnet.recv().await,
            Ok(CoordinatorEvent::FillRequestReceived { transaction_hash }) if transaction_hash == H256([1; 32])
        ));
        assert!(matches!(
            testnet.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::new([1]);
        bus.publish(
            1,
            CoordinatorEvent::FillRequestReceived {
                transaction_hash: H256::zero(),
            },
        );
        // Unknown chains are ignored rather than panicking.
        bus.publish(
            99,
            CoordinatorEvent::FillRequestReceived {
                transaction_hash: H256::zero(),
            },
        );
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = CoordinatorEvent::FillRequestReceived {
            transaction_hash: H256([0xab; 32]),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "FILL_REQUEST_RECEIVED");
        assert_eq!(
            json["data"]["transactionHash"],
            format!("0x{}", "ab".repeat(32))
        );
    }
}
