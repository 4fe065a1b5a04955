//! The approval engine: the request state machine turning signed
//! meta-transactions into coordinator approvals.
//!
//! A fill request runs decode → classify → validate → delay → re-validate →
//! sign → persist → broadcast. The selective delay between the two validation
//! passes gives subscribed takers equal notice of the pending fill; the second
//! pass observes every soft-cancel committed while the request slept.

use crate::{
    classifier::{self, ClassifiedFill},
    decoder::{self, DecodeError, ExchangeCall},
    events::{CoordinatorEvent, EventBus},
    oracle::OrderStateFetching,
    storage::{FillApprovalRecord, InsertionError, Storage, TransactionRecord},
    validation::{OrderRefusal, RefusalReason, RequestValidator},
};
use anyhow::Context;
use model::{
    approval::CoordinatorApproval, order::Order, signature::TaggedSignature, time,
    transaction::SignedZeroExTransaction, u256_decimal, DomainSeparator,
};
use primitive_types::{H160, H256, U256};
use secp256k1::SecretKey;
use serde::Serialize;
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use thiserror::Error;
use web3::signing::SecretKeyRef;

/// Everything the engine needs to serve one chain. Constructed once at
/// startup and never mutated.
pub struct ChainContext {
    pub chain_id: u64,
    pub exchange_address: H160,
    pub exchange_domain: DomainSeparator,
    pub coordinator_domain: DomainSeparator,
    /// Fee-recipient signing keys by address. The keys are process-lifetime
    /// secrets and must never leave the process.
    pub fee_recipients: HashMap<H160, SecretKey>,
    pub order_states: Arc<dyn OrderStateFetching>,
}

impl fmt::Debug for ChainContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainContext")
            .field("chain_id", &self.chain_id)
            .field("exchange_address", &self.exchange_address)
            .field(
                "fee_recipients",
                &self.fee_recipients.keys().collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

#[derive(prometheus_metric_storage::MetricStorage, Clone, Debug)]
#[metric(subsystem = "engine")]
struct Metrics {
    /// Number of handled transaction requests by outcome.
    #[metric(labels("outcome"))]
    requests: prometheus::IntCounterVec,

    /// Number of per-order refusals by reason.
    #[metric(labels("reason"))]
    refusals: prometheus::IntCounterVec,
}

impl Metrics {
    fn get() -> &'static Self {
        Self::instance(observe::metrics::get_storage_registry())
            .expect("unexpected error getting metrics instance")
    }

    fn on_request(outcome: &str) {
        Self::get().requests.with_label_values(&[outcome]).inc();
    }

    fn on_refusals(refused: &[OrderRefusal]) {
        for refusal in refused {
            let reason = match refusal.reason {
                RefusalReason::SoftCancelled => "soft_cancelled",
                RefusalReason::LedgerExceeded => "ledger_exceeded",
                RefusalReason::Expired => "expired",
                RefusalReason::Redundant => "redundant",
            };
            Self::get().refusals.with_label_values(&[reason]).inc();
        }
    }
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("unknown chain id {0}")]
    UnknownChain(u64),
    #[error("meta-transaction signature does not recover to the signer")]
    InvalidTransactionSignature,
    #[error("failed to decode exchange call: {0}")]
    DecodingFailed(DecodeError),
    #[error("exchange function {0} cannot be coordinated")]
    InvalidFunctionCall(String),
    #[error("no orders with a coordinator fee recipient included")]
    NoCoordinatorOrdersIncluded,
    #[error("transaction {0:?} was already used")]
    TransactionAlreadyUsed(H256),
    #[error("only the maker can cancel orders")]
    OnlyMakerCanCancelOrders,
    #[error("transaction expires after the approval would, at {approval_expiration}")]
    TransactionExpirationTooHigh { approval_expiration: U256 },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<DecodeError> for RequestError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::UncoordinatedFunction(name) => Self::InvalidFunctionCall(name),
            other => Self::DecodingFailed(other),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FillOutcome {
    pub approval_hash: H256,
    pub approved_order_hashes: Vec<H256>,
    pub orders_refused_approval: Vec<OrderRefusal>,
    /// One signature per distinct fee recipient among the approved orders.
    /// Empty when every order was refused.
    pub signatures: Vec<TaggedSignature>,
    #[serde(with = "u256_decimal")]
    pub expiration_time_seconds: U256,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationOutcome {
    pub zerox_order_hashes: Vec<H256>,
    pub outstanding_fill_signatures: Vec<FillApprovalRecord>,
}

#[derive(Clone, Debug)]
pub enum RequestOutcome {
    Fill(FillOutcome),
    Cancellation(CancellationOutcome),
}

pub struct Coordinator {
    chains: HashMap<u64, ChainContext>,
    storage: Arc<dyn Storage>,
    validator: RequestValidator,
    events: EventBus,
    selective_delay: Duration,
    approval_duration: Duration,
}

impl Coordinator {
    pub fn new(
        chains: Vec<ChainContext>,
        storage: Arc<dyn Storage>,
        events: EventBus,
        selective_delay: Duration,
        approval_duration: Duration,
    ) -> Self {
        Self {
            chains: chains
                .into_iter()
                .map(|chain| (chain.chain_id, chain))
                .collect(),
            validator: RequestValidator::new(storage.clone()),
            storage,
            events,
            selective_delay,
            approval_duration,
        }
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.chains.keys().copied()
    }

    /// Handles one `request_transaction` POST: a fill or a cancellation.
    pub async fn handle_request(
        &self,
        chain_id: u64,
        signed_transaction: SignedZeroExTransaction,
        tx_origin: H160,
    ) -> Result<RequestOutcome, RequestError> {
        let chain = self
            .chains
            .get(&chain_id)
            .ok_or(RequestError::UnknownChain(chain_id))?;

        let result = self
            .handle_request_inner(chain, &signed_transaction, tx_origin)
            .await;
        match &result {
            Ok(RequestOutcome::Fill(_)) => Metrics::on_request("fill"),
            Ok(RequestOutcome::Cancellation(_)) => Metrics::on_request("cancellation"),
            Err(RequestError::Internal(err)) => {
                tracing::error!(?err, "internal error handling request");
                Metrics::on_request("internal_error");
            }
            Err(err) => {
                tracing::debug!(?err, "rejected request");
                Metrics::on_request("rejected");
            }
        }
        result
    }

    async fn handle_request_inner(
        &self,
        chain: &ChainContext,
        signed_transaction: &SignedZeroExTransaction,
        tx_origin: H160,
    ) -> Result<RequestOutcome, RequestError> {
        let call = decoder::decode_exchange_call(
            &signed_transaction.transaction.data,
            chain.chain_id,
            chain.exchange_address,
        )?;

        // A forged signer address would corrupt the per-taker fill ledger, so
        // the signature check is not optional.
        signed_transaction
            .verify_signer(&chain.exchange_domain)
            .ok_or(RequestError::InvalidTransactionSignature)?;

        let call = retain_coordinator_orders(chain, call)?;

        if call.function().is_cancellation() {
            self.handle_cancellation(chain, signed_transaction, call)
                .await
                .map(RequestOutcome::Cancellation)
        } else {
            self.handle_fill(chain, signed_transaction, tx_origin, call)
                .await
                .map(RequestOutcome::Fill)
        }
    }

    async fn handle_fill(
        &self,
        chain: &ChainContext,
        signed_transaction: &SignedZeroExTransaction,
        tx_origin: H160,
        call: ExchangeCall,
    ) -> Result<FillOutcome, RequestError> {
        let transaction = &signed_transaction.transaction;
        let taker = transaction.signer_address;
        let transaction_hash = transaction.hash(&chain.exchange_domain);

        // Replaying a used transaction under a new txOrigin would steal the
        // original origin's broadcast rights.
        if self
            .storage
            .has_transaction(transaction_hash)
            .await
            .context("transaction lookup failed")?
        {
            return Err(RequestError::TransactionAlreadyUsed(transaction_hash));
        }

        let ClassifiedFill {
            function,
            orders,
            taker_asset_fill_amounts,
        } = classifier::classify_fill(call, chain.order_states.as_ref(), taker).await?;

        let order_hashes: Vec<H256> = orders
            .iter()
            .map(|order| order.hash(&chain.exchange_domain))
            .collect();

        let partition = self
            .validator
            .partition(taker, &orders, &order_hashes, &taker_asset_fill_amounts)
            .await?;

        self.events.publish(
            chain.chain_id,
            CoordinatorEvent::FillRequestReceived { transaction_hash },
        );

        let partition = if self.selective_delay.is_zero() {
            partition
        } else {
            tokio::time::sleep(self.selective_delay).await;
            // Liveness may have changed while we slept; an order passes only
            // if both passes approved it.
            let revalidated = self
                .validator
                .partition(taker, &orders, &order_hashes, &taker_asset_fill_amounts)
                .await?;
            partition.merge(revalidated)
        };

        let approval_expiration = U256::from(time::now_in_epoch_seconds())
            + U256::from(self.approval_duration.as_secs());
        if approval_expiration < transaction.expiration_time_seconds {
            return Err(RequestError::TransactionExpirationTooHigh { approval_expiration });
        }

        // Commit the ledger reservations through the storage's atomic
        // conditional add. An order losing a commit race against a concurrent
        // request joins the refused set instead of failing the request.
        let mut refused = partition.refused;
        let mut approved = Vec::with_capacity(partition.approved.len());
        for index in partition.approved {
            let reserved = self
                .storage
                .try_reserve_fill(
                    order_hashes[index],
                    taker,
                    taker_asset_fill_amounts[index],
                    orders[index].taker_asset_amount,
                )
                .await
                .context("ledger reservation failed")?;
            if reserved {
                approved.push(index);
            } else {
                refused.push(OrderRefusal {
                    order_hash: order_hashes[index],
                    reason: RefusalReason::LedgerExceeded,
                });
            }
        }

        let approved_order_hashes: Vec<H256> =
            approved.iter().map(|&index| order_hashes[index]).collect();
        let approval = CoordinatorApproval {
            order_hashes: approved_order_hashes.clone(),
            tx_origin,
            approval_expiration_time_seconds: approval_expiration,
        };
        let approval_hash = approval.hash(&chain.coordinator_domain);

        let mut signatures = Vec::new();
        if !approved.is_empty() {
            for recipient in
                distinct_fee_recipients(approved.iter().map(|&index| &orders[index]))
            {
                // The coordinator-order filter guarantees the recipient is
                // configured; a missing key is a config bug, not bad input.
                let key = chain.fee_recipients.get(&recipient).with_context(|| {
                    format!("no key configured for fee recipient {recipient:?}")
                })?;
                signatures.push(approval.sign(&chain.coordinator_domain, SecretKeyRef::new(key)));
            }

            let approved_orders: Vec<Order> =
                approved.iter().map(|&index| orders[index].clone()).collect();
            let approved_amounts: Vec<U256> = approved
                .iter()
                .map(|&index| taker_asset_fill_amounts[index])
                .collect();

            self.storage
                .insert_transaction(TransactionRecord {
                    transaction_hash,
                    signed_transaction: signed_transaction.clone(),
                    tx_origin,
                    approval_signatures: signatures.clone(),
                    approval_expiration_time_seconds: approval_expiration,
                    orders: approved_orders.clone(),
                    taker_asset_fill_amounts: approved_amounts.clone(),
                })
                .await
                .map_err(|err| match err {
                    InsertionError::DuplicatedRecord => {
                        RequestError::TransactionAlreadyUsed(transaction_hash)
                    }
                    InsertionError::Other(err) => {
                        RequestError::Internal(err.context("transaction insert failed"))
                    }
                })?;
            self.storage
                .insert_fill_approvals(
                    approved
                        .iter()
                        .map(|&index| FillApprovalRecord {
                            order_hash: order_hashes[index],
                            taker_asset_fill_amount: taker_asset_fill_amounts[index],
                            approval_signatures: signatures.clone(),
                            expiration_time_seconds: approval_expiration,
                        })
                        .collect(),
                )
                .await
                .context("fill approval insert failed")?;

            self.events.publish(
                chain.chain_id,
                CoordinatorEvent::FillRequestAccepted {
                    approval_hash,
                    function_name: function.name().to_string(),
                    order: approved_orders[0].clone(),
                    taker_asset_fill_amounts: approved_amounts,
                    approved_order_hashes: approved_order_hashes.clone(),
                    approval_expiration_time_seconds: approval_expiration,
                },
            );
        }

        Metrics::on_refusals(&refused);
        tracing::debug!(
            ?transaction_hash,
            approved = approved_order_hashes.len(),
            refused = refused.len(),
            "fill request handled"
        );

        Ok(FillOutcome {
            approval_hash,
            approved_order_hashes,
            orders_refused_approval: refused,
            signatures,
            expiration_time_seconds: approval_expiration,
        })
    }

    async fn handle_cancellation(
        &self,
        chain: &ChainContext,
        signed_transaction: &SignedZeroExTransaction,
        call: ExchangeCall,
    ) -> Result<CancellationOutcome, RequestError> {
        let signer = signed_transaction.transaction.signer_address;
        let orders = match call {
            ExchangeCall::Cancellation { orders, .. } => orders,
            _ => unreachable!("routed by is_cancellation"),
        };
        if orders.iter().any(|order| order.maker_address != signer) {
            return Err(RequestError::OnlyMakerCanCancelOrders);
        }

        let order_hashes: Vec<H256> = orders
            .iter()
            .map(|order| order.hash(&chain.exchange_domain))
            .collect();
        self.storage
            .add_soft_cancels(&order_hashes)
            .await
            .context("soft cancel insert failed")?;

        // Approvals issued before the cancellation may still settle until
        // they expire; surface them to the maker and to subscribers.
        let now = U256::from(time::now_in_epoch_seconds());
        let outstanding = self
            .storage
            .outstanding_fill_approvals(&order_hashes, now)
            .await
            .context("outstanding approval lookup failed")?;

        self.events.publish(
            chain.chain_id,
            CoordinatorEvent::CancelRequestAccepted {
                cancelled_order_hashes: order_hashes.clone(),
                outstanding_fill_signatures: outstanding.clone(),
            },
        );
        tracing::debug!(cancelled = order_hashes.len(), "cancel request handled");

        Ok(CancellationOutcome {
            zerox_order_hashes: order_hashes,
            outstanding_fill_signatures: outstanding,
        })
    }

    /// The soft-cancel lookup endpoint: the subset of the given hashes that
    /// is soft-cancelled, in input order.
    pub async fn soft_cancelled_orders(&self, order_hashes: &[H256]) -> anyhow::Result<Vec<H256>> {
        let subset = self.storage.soft_cancelled_subset(order_hashes).await?;
        Ok(order_hashes
            .iter()
            .filter(|hash| subset.contains(hash))
            .copied()
            .collect())
    }
}

/// Drops orders naming a fee recipient this coordinator has no key for; the
/// chain's verifier would never accept our approval for them anyway.
fn retain_coordinator_orders(
    chain: &ChainContext,
    call: ExchangeCall,
) -> Result<ExchangeCall, RequestError> {
    let keep = |order: &Order| {
        chain
            .fee_recipients
            .contains_key(&order.fee_recipient_address)
    };
    let call = match call {
        ExchangeCall::Fill {
            function,
            orders,
            taker_asset_fill_amounts,
        } => {
            let (orders, taker_asset_fill_amounts) = orders
                .into_iter()
                .zip(taker_asset_fill_amounts)
                .filter(|(order, _)| keep(order))
                .unzip();
            ExchangeCall::Fill {
                function,
                orders,
                taker_asset_fill_amounts,
            }
        }
        ExchangeCall::MarketSell {
            function,
            orders,
            taker_asset_sell_amount,
        } => ExchangeCall::MarketSell {
            function,
            orders: orders.into_iter().filter(keep).collect(),
            taker_asset_sell_amount,
        },
        ExchangeCall::MarketBuy {
            function,
            orders,
            maker_asset_buy_amount,
        } => ExchangeCall::MarketBuy {
            function,
            orders: orders.into_iter().filter(keep).collect(),
            maker_asset_buy_amount,
        },
        ExchangeCall::Cancellation { function, orders } => ExchangeCall::Cancellation {
            function,
            orders: orders.into_iter().filter(keep).collect(),
        },
    };
    if call.orders().is_empty() {
        return Err(RequestError::NoCoordinatorOrdersIncluded);
    }
    Ok(call)
}

/// Fee recipients of the given orders, deduplicated, in first-appearance
/// order.
fn distinct_fee_recipients<'a>(orders: impl Iterator<Item = &'a Order>) -> Vec<H160> {
    let mut recipients = Vec::new();
    for order in orders {
        if !recipients.contains(&order.fee_recipient_address) {
            recipients.push(order.fee_recipient_address);
        }
    }
    recipients
}
