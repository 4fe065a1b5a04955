//! Reads the on-chain state bounding order fillability: ERC-20 balances and
//! asset-proxy allowances for both sides of an order, and the exchange's
//! settled fill amount.

use crate::{decoder::EXCHANGE_ABI, fillable::OrderState};
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use model::order::Order;
use primitive_types::{H160, U256};
use web3::{
    contract::{Contract, Options},
    ethabi,
    transports::Http,
    Web3,
};

/// The asset-proxy id prefixing ERC-20 asset data.
pub const ERC20_PROXY_ID: [u8; 4] = [0xf4, 0x72, 0x61, 0xb0];

/// Extracts the token address from ERC-20 asset data:
/// `proxyId (4) ‖ token address (32, left-padded)`.
pub fn decode_erc20_asset_data(asset_data: &[u8]) -> Option<H160> {
    if asset_data.len() != 36 || asset_data[..4] != ERC20_PROXY_ID {
        return None;
    }
    let token = &asset_data[4..];
    // The first 12 bytes of the padded word must be zero.
    if token[..12].iter().any(|byte| *byte != 0) {
        return None;
    }
    Some(H160::from_slice(&token[12..]))
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait OrderStateFetching: Send + Sync {
    /// One state snapshot per order, in input order. `taker` is the account
    /// requesting the fill; it stands in for the taker side of open-taker
    /// orders.
    async fn fetch(&self, orders: &[Order], taker: H160) -> Result<Vec<OrderState>>;
}

lazy_static! {
    static ref ERC20_ABI: ethabi::Contract =
        ethabi::Contract::load(include_bytes!("../abi/erc20.json").as_slice())
            .expect("embedded erc20 abi is valid");
}

/// JSON-RPC implementation over a single chain.
pub struct Web3OrderStateFetcher {
    web3: Web3<Http>,
    exchange: Contract<Http>,
    asset_proxy: H160,
}

impl Web3OrderStateFetcher {
    pub fn new(web3: Web3<Http>, exchange_address: H160, asset_proxy: H160) -> Self {
        let exchange = Contract::new(web3.eth(), exchange_address, EXCHANGE_ABI.clone());
        Self {
            web3,
            exchange,
            asset_proxy,
        }
    }

    fn erc20(&self, token: H160) -> Contract<Http> {
        Contract::new(self.web3.eth(), token, ERC20_ABI.clone())
    }

    async fn balance_and_allowance(&self, token: H160, owner: H160) -> Result<(U256, U256)> {
        let contract = self.erc20(token);
        let balance = contract.query::<U256, _, _, _>(
            "balanceOf",
            (owner,),
            None,
            Options::default(),
            None,
        );
        let allowance = contract.query::<U256, _, _, _>(
            "allowance",
            (owner, self.asset_proxy),
            None,
            Options::default(),
            None,
        );
        let (balance, allowance) = futures::try_join!(balance, allowance)
            .with_context(|| format!("erc20 state query failed for token {token:?}"))?;
        Ok((balance, allowance))
    }

    async fn order_state(&self, order: &Order, taker: H160) -> Result<OrderState> {
        let maker_token = decode_erc20_asset_data(&order.maker_asset_data)
            .context("maker asset data is not erc20")?;
        let taker_token = decode_erc20_asset_data(&order.taker_asset_data)
            .context("taker asset data is not erc20")?;
        let taker_account = if order.is_open_taker() {
            taker
        } else {
            order.taker_address
        };

        let mut state = OrderState::default();
        (state.maker_balance, state.maker_allowance) = self
            .balance_and_allowance(maker_token, order.maker_address)
            .await?;
        (state.taker_balance, state.taker_allowance) =
            self.balance_and_allowance(taker_token, taker_account).await?;
        if !order.maker_fee.is_zero() {
            let fee_token = decode_erc20_asset_data(&order.maker_fee_asset_data)
                .context("maker fee asset data is not erc20")?;
            (state.maker_fee_balance, state.maker_fee_allowance) = self
                .balance_and_allowance(fee_token, order.maker_address)
                .await?;
        }
        if !order.taker_fee.is_zero() {
            let fee_token = decode_erc20_asset_data(&order.taker_fee_asset_data)
                .context("taker fee asset data is not erc20")?;
            (state.taker_fee_balance, state.taker_fee_allowance) =
                self.balance_and_allowance(fee_token, taker_account).await?;
        }

        let exchange_domain =
            model::DomainSeparator::new_exchange(order.chain_id, order.exchange_address);
        state.taker_asset_filled_amount = self
            .exchange
            .query::<U256, _, _, _>(
                "filled",
                (order.hash(&exchange_domain),),
                None,
                Options::default(),
                None,
            )
            .await
            .context("exchange filled query failed")?;

        Ok(state)
    }
}

#[async_trait::async_trait]
impl OrderStateFetching for Web3OrderStateFetcher {
    async fn fetch(&self, orders: &[Order], taker: H160) -> Result<Vec<OrderState>> {
        futures::future::try_join_all(
            orders.iter().map(|order| self.order_state(order, taker)),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_erc20_asset_data() {
        let token = H160([0xaa; 20]);
        let mut data = ERC20_PROXY_ID.to_vec();
        data.extend_from_slice(&[0u8; 12]);
        data.extend_from_slice(token.as_fixed_bytes());
        assert_eq!(decode_erc20_asset_data(&data), Some(token));
    }

    #[test]
    fn rejects_foreign_proxies_and_bad_padding() {
        // ERC-721 proxy id.
        let mut data = vec![0x02, 0x57, 0x17, 0x92];
        data.extend_from_slice(&[0u8; 32]);
        assert_eq!(decode_erc20_asset_data(&data), None);

        let mut data = ERC20_PROXY_ID.to_vec();
        data.extend_from_slice(&[1u8; 32]);
        assert_eq!(decode_erc20_asset_data(&data), None);

        assert_eq!(decode_erc20_asset_data(&ERC20_PROXY_ID), None);
        assert_eq!(decode_erc20_asset_data(&[]), None);
    }
}
