//! Decodes meta-transaction calldata against the exchange ABI and normalizes
//! it into the calls the coordinator knows how to approve.

use lazy_static::lazy_static;
use model::order::Order;
use primitive_types::{H160, U256};
use thiserror::Error;
use web3::ethabi::{self, Token};

lazy_static! {
    /// The exchange ABI, restricted to the functions the coordinator touches.
    pub static ref EXCHANGE_ABI: ethabi::Contract =
        ethabi::Contract::load(include_bytes!("../abi/exchange.json").as_slice())
            .expect("embedded exchange abi is valid");
}

/// The eleven exchange methods the coordinator issues approvals (or
/// soft-cancels) for.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ExchangeFunction {
    FillOrder,
    FillOrKillOrder,
    BatchFillOrders,
    BatchFillOrKillOrders,
    BatchFillOrdersNoThrow,
    MarketSellOrdersFillOrKill,
    MarketSellOrdersNoThrow,
    MarketBuyOrdersFillOrKill,
    MarketBuyOrdersNoThrow,
    CancelOrder,
    BatchCancelOrders,
}

impl ExchangeFunction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FillOrder => "fillOrder",
            Self::FillOrKillOrder => "fillOrKillOrder",
            Self::BatchFillOrders => "batchFillOrders",
            Self::BatchFillOrKillOrders => "batchFillOrKillOrders",
            Self::BatchFillOrdersNoThrow => "batchFillOrdersNoThrow",
            Self::MarketSellOrdersFillOrKill => "marketSellOrdersFillOrKill",
            Self::MarketSellOrdersNoThrow => "marketSellOrdersNoThrow",
            Self::MarketBuyOrdersFillOrKill => "marketBuyOrdersFillOrKill",
            Self::MarketBuyOrdersNoThrow => "marketBuyOrdersNoThrow",
            Self::CancelOrder => "cancelOrder",
            Self::BatchCancelOrders => "batchCancelOrders",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "fillOrder" => Some(Self::FillOrder),
            "fillOrKillOrder" => Some(Self::FillOrKillOrder),
            "batchFillOrders" => Some(Self::BatchFillOrders),
            "batchFillOrKillOrders" => Some(Self::BatchFillOrKillOrders),
            "batchFillOrdersNoThrow" => Some(Self::BatchFillOrdersNoThrow),
            "marketSellOrdersFillOrKill" => Some(Self::MarketSellOrdersFillOrKill),
            "marketSellOrdersNoThrow" => Some(Self::MarketSellOrdersNoThrow),
            "marketBuyOrdersFillOrKill" => Some(Self::MarketBuyOrdersFillOrKill),
            "marketBuyOrdersNoThrow" => Some(Self::MarketBuyOrdersNoThrow),
            "cancelOrder" => Some(Self::CancelOrder),
            "batchCancelOrders" => Some(Self::BatchCancelOrders),
            _ => None,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::CancelOrder | Self::BatchCancelOrders)
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no exchange function with this selector")]
    UnknownSelector,
    /// The selector belongs to the exchange but the coordinator does not
    /// approve calls to it.
    #[error("exchange function {0} cannot be coordinated")]
    UncoordinatedFunction(String),
    #[error("malformed exchange calldata")]
    Malformed,
    #[error("failed to decode exchange calldata: {0}")]
    Abi(#[from] ethabi::Error),
}

/// A decoded exchange call with its orders decorated with the chain's
/// canonical exchange address, chain id and maker signatures.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExchangeCall {
    /// Fill methods whose per-order taker-asset amounts appear directly in
    /// calldata.
    Fill {
        function: ExchangeFunction,
        orders: Vec<Order>,
        taker_asset_fill_amounts: Vec<U256>,
    },
    /// Market sells: a taker-asset total to be split over the orders.
    MarketSell {
        function: ExchangeFunction,
        orders: Vec<Order>,
        taker_asset_sell_amount: U256,
    },
    /// Market buys: a maker-asset total converting through each order's rate.
    MarketBuy {
        function: ExchangeFunction,
        orders: Vec<Order>,
        maker_asset_buy_amount: U256,
    },
    Cancellation {
        function: ExchangeFunction,
        orders: Vec<Order>,
    },
}

impl ExchangeCall {
    pub fn function(&self) -> ExchangeFunction {
        match self {
            Self::Fill { function, .. }
            | Self::MarketSell { function, .. }
            | Self::MarketBuy { function, .. }
            | Self::Cancellation { function, .. } => *function,
        }
    }

    pub fn orders(&self) -> &[Order] {
        match self {
            Self::Fill { orders, .. }
            | Self::MarketSell { orders, .. }
            | Self::MarketBuy { orders, .. }
            | Self::Cancellation { orders, .. } => orders,
        }
    }
}

pub fn decode_exchange_call(
    data: &[u8],
    chain_id: u64,
    exchange_address: H160,
) -> Result<ExchangeCall, DecodeError> {
    let selector = data.get(..4).ok_or(DecodeError::Malformed)?;
    let function = EXCHANGE_ABI
        .functions()
        .find(|function| function.short_signature() == selector)
        .ok_or(DecodeError::UnknownSelector)?;
    let kind = ExchangeFunction::from_name(&function.name)
        .ok_or_else(|| DecodeError::UncoordinatedFunction(function.name.clone()))?;
    let tokens = function.decode_input(&data[4..])?;
    let decorate = |order: Token, signature| order_from_token(order, chain_id, exchange_address, signature);

    match kind {
        ExchangeFunction::FillOrder | ExchangeFunction::FillOrKillOrder => {
            let [order, amount, signature] = expect_tokens(tokens)?;
            Ok(ExchangeCall::Fill {
                function: kind,
                orders: vec![decorate(order, as_bytes(signature)?)?],
                taker_asset_fill_amounts: vec![as_uint(amount)?],
            })
        }
        ExchangeFunction::BatchFillOrders
        | ExchangeFunction::BatchFillOrKillOrders
        | ExchangeFunction::BatchFillOrdersNoThrow => {
            let [orders, amounts, signatures] = expect_tokens(tokens)?;
            let orders = zip_signed_orders(orders, signatures, chain_id, exchange_address)?;
            let taker_asset_fill_amounts = as_array(amounts)?
                .into_iter()
                .map(as_uint)
                .collect::<Result<Vec<_>, _>>()?;
            if taker_asset_fill_amounts.len() != orders.len() {
                return Err(DecodeError::Malformed);
            }
            Ok(ExchangeCall::Fill {
                function: kind,
                orders,
                taker_asset_fill_amounts,
            })
        }
        ExchangeFunction::MarketSellOrdersFillOrKill | ExchangeFunction::MarketSellOrdersNoThrow => {
            let [orders, amount, signatures] = expect_tokens(tokens)?;
            Ok(ExchangeCall::MarketSell {
                function: kind,
                orders: zip_signed_orders(orders, signatures, chain_id, exchange_address)?,
                taker_asset_sell_amount: as_uint(amount)?,
            })
        }
        ExchangeFunction::MarketBuyOrdersFillOrKill | ExchangeFunction::MarketBuyOrdersNoThrow => {
            let [orders, amount, signatures] = expect_tokens(tokens)?;
            Ok(ExchangeCall::MarketBuy {
                function: kind,
                orders: zip_signed_orders(orders, signatures, chain_id, exchange_address)?,
                maker_asset_buy_amount: as_uint(amount)?,
            })
        }
        ExchangeFunction::CancelOrder => {
            let [order] = expect_tokens(tokens)?;
            Ok(ExchangeCall::Cancellation {
                function: kind,
                orders: vec![decorate(order, Vec::new())?],
            })
        }
        ExchangeFunction::BatchCancelOrders => {
            let [orders] = expect_tokens(tokens)?;
            let orders = as_array(orders)?
                .into_iter()
                .map(|order| order_from_token(order, chain_id, exchange_address, Vec::new()))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ExchangeCall::Cancellation {
                function: kind,
                orders,
            })
        }
    }
}

fn expect_tokens<const N: usize>(tokens: Vec<Token>) -> Result<[Token; N], DecodeError> {
    <[Token; N]>::try_from(tokens).map_err(|_| DecodeError::Malformed)
}

fn zip_signed_orders(
    orders: Token,
    signatures: Token,
    chain_id: u64,
    exchange_address: H160,
) -> Result<Vec<Order>, DecodeError> {
    let orders = as_array(orders)?;
    let signatures = as_array(signatures)?
        .into_iter()
        .map(as_bytes)
        .collect::<Result<Vec<_>, _>>()?;
    if signatures.len() != orders.len() {
        return Err(DecodeError::Malformed);
    }
    orders
        .into_iter()
        .zip(signatures)
        .map(|(order, signature)| order_from_token(order, chain_id, exchange_address, signature))
        .collect()
}

fn order_from_token(
    token: Token,
    chain_id: u64,
    exchange_address: H160,
    signature: Vec<u8>,
) -> Result<Order, DecodeError> {
    let fields: [Token; 14] = match token {
        Token::Tuple(fields) => expect_tokens(fields)?,
        _ => return Err(DecodeError::Malformed),
    };
    let [maker_address, taker_address, fee_recipient_address, sender_address, maker_asset_amount, taker_asset_amount, maker_fee, taker_fee, expiration_time_seconds, salt, maker_asset_data, taker_asset_data, maker_fee_asset_data, taker_fee_asset_data] =
        fields;
    Ok(Order {
        maker_address: as_address(maker_address)?,
        taker_address: as_address(taker_address)?,
        fee_recipient_address: as_address(fee_recipient_address)?,
        sender_address: as_address(sender_address)?,
        maker_asset_amount: as_uint(maker_asset_amount)?,
        taker_asset_amount: as_uint(taker_asset_amount)?,
        maker_fee: as_uint(maker_fee)?,
        taker_fee: as_uint(taker_fee)?,
        expiration_time_seconds: as_uint(expiration_time_seconds)?,
        salt: as_uint(salt)?,
        maker_asset_data: as_bytes(maker_asset_data)?,
        taker_asset_data: as_bytes(taker_asset_data)?,
        maker_fee_asset_data: as_bytes(maker_fee_asset_data)?,
        taker_fee_asset_data: as_bytes(taker_fee_asset_data)?,
        exchange_address,
        chain_id,
        signature,
    })
}

fn as_address(token: Token) -> Result<H160, DecodeError> {
    match token {
        Token::Address(address) => Ok(address),
        _ => Err(DecodeError::Malformed),
    }
}

fn as_uint(token: Token) -> Result<U256, DecodeError> {
    match token {
        Token::Uint(uint) => Ok(uint),
        _ => Err(DecodeError::Malformed),
    }
}

fn as_bytes(token: Token) -> Result<Vec<u8>, DecodeError> {
    match token {
        Token::Bytes(bytes) => Ok(bytes),
        _ => Err(DecodeError::Malformed),
    }
}

fn as_array(token: Token) -> Result<Vec<Token>, DecodeError> {
    match token {
        Token::Array(tokens) => Ok(tokens),
        _ => Err(DecodeError::Malformed),
    }
}
