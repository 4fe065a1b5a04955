//! Limit orders as posted to the exchange contract, together with their
//! EIP-712 identity.

use crate::{bytes_hex, signature::hashed_eip712_message, u256_decimal, DomainSeparator};
use hex_literal::hex;
use primitive_types::{H160, H256, U256};
use serde::{Deserialize, Serialize};
use web3::signing;

/// An off-chain limit order authored by a maker.
///
/// Orders are immutable; all mutable state about an order (soft-cancels, the
/// fill ledger) lives in the coordinator's storage keyed by the order hash.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub maker_address: H160,
    /// The account allowed to fill the order. The null address means anyone.
    pub taker_address: H160,
    pub fee_recipient_address: H160,
    pub sender_address: H160,
    #[serde(with = "u256_decimal")]
    pub maker_asset_amount: U256,
    #[serde(with = "u256_decimal")]
    pub taker_asset_amount: U256,
    #[serde(with = "u256_decimal")]
    pub maker_fee: U256,
    #[serde(with = "u256_decimal")]
    pub taker_fee: U256,
    #[serde(with = "u256_decimal")]
    pub expiration_time_seconds: U256,
    #[serde(with = "u256_decimal")]
    pub salt: U256,
    #[serde(with = "bytes_hex")]
    pub maker_asset_data: Vec<u8>,
    #[serde(with = "bytes_hex")]
    pub taker_asset_data: Vec<u8>,
    #[serde(with = "bytes_hex")]
    pub maker_fee_asset_data: Vec<u8>,
    #[serde(with = "bytes_hex")]
    pub taker_fee_asset_data: Vec<u8>,
    pub exchange_address: H160,
    pub chain_id: u64,
    /// The maker's signature over the order hash. Verified by the exchange
    /// contract on settlement, carried here for completeness.
    #[serde(with = "bytes_hex")]
    pub signature: Vec<u8>,
}

impl Order {
    /// The EIP-712 type hash of the 14-field order struct. Computed with:
    /// `keccak256("Order(address makerAddress,address takerAddress,address
    /// feeRecipientAddress,address senderAddress,uint256 makerAssetAmount,
    /// uint256 takerAssetAmount,uint256 makerFee,uint256 takerFee,
    /// uint256 expirationTimeSeconds,uint256 salt,bytes makerAssetData,
    /// bytes takerAssetData,bytes makerFeeAssetData,bytes takerFeeAssetData)")`.
    pub const TYPE_HASH: [u8; 32] =
        hex!("f80322eb8376aafb64eadf8f0d7623f22130fd9491a221e902b713cb984a7534");

    /// Returns the value of hashStruct() over the order as defined by EIP-712.
    ///
    /// https://eips.ethereum.org/EIPS/eip-712#definition-of-hashstruct
    pub fn hash_struct(&self) -> [u8; 32] {
        let mut hash_data = [0u8; 480];
        hash_data[0..32].copy_from_slice(&Self::TYPE_HASH);
        // Some slots are not assigned (stay 0) because all values are extended to 256 bits.
        hash_data[44..64].copy_from_slice(self.maker_address.as_fixed_bytes());
        hash_data[76..96].copy_from_slice(self.taker_address.as_fixed_bytes());
        hash_data[108..128].copy_from_slice(self.fee_recipient_address.as_fixed_bytes());
        hash_data[140..160].copy_from_slice(self.sender_address.as_fixed_bytes());
        self.maker_asset_amount.to_big_endian(&mut hash_data[160..192]);
        self.taker_asset_amount.to_big_endian(&mut hash_data[192..224]);
        self.maker_fee.to_big_endian(&mut hash_data[224..256]);
        self.taker_fee.to_big_endian(&mut hash_data[256..288]);
        self.expiration_time_seconds
            .to_big_endian(&mut hash_data[288..320]);
        self.salt.to_big_endian(&mut hash_data[320..352]);
        hash_data[352..384].copy_from_slice(&signing::keccak256(&self.maker_asset_data));
        hash_data[384..416].copy_from_slice(&signing::keccak256(&self.taker_asset_data));
        hash_data[416..448].copy_from_slice(&signing::keccak256(&self.maker_fee_asset_data));
        hash_data[448..480].copy_from_slice(&signing::keccak256(&self.taker_fee_asset_data));
        signing::keccak256(&hash_data)
    }

    /// The order's identity: its EIP-712 digest under the exchange domain of
    /// the chain it lives on.
    pub fn hash(&self, domain: &DomainSeparator) -> H256 {
        H256(hashed_eip712_message(domain, &self.hash_struct()))
    }

    /// Whether any taker may fill this order.
    pub fn is_open_taker(&self) -> bool {
        self.taker_address.is_zero()
    }
}

#[derive(Clone, Default, Debug)]
pub struct OrderBuilder(Order);

impl OrderBuilder {
    pub fn with_maker(mut self, maker: H160) -> Self {
        self.0.maker_address = maker;
        self
    }

    pub fn with_taker(mut self, taker: H160) -> Self {
        self.0.taker_address = taker;
        self
    }

    pub fn with_fee_recipient(mut self, fee_recipient: H160) -> Self {
        self.0.fee_recipient_address = fee_recipient;
        self
    }

    pub fn with_sender(mut self, sender: H160) -> Self {
        self.0.sender_address = sender;
        self
    }

    pub fn with_maker_asset_amount(mut self, amount: U256) -> Self {
        self.0.maker_asset_amount = amount;
        self
    }

    pub fn with_taker_asset_amount(mut self, amount: U256) -> Self {
        self.0.taker_asset_amount = amount;
        self
    }

    pub fn with_maker_fee(mut self, fee: U256) -> Self {
        self.0.maker_fee = fee;
        self
    }

    pub fn with_taker_fee(mut self, fee: U256) -> Self {
        self.0.taker_fee = fee;
        self
    }

    pub fn with_expiration_time_seconds(mut self, expiration: U256) -> Self {
        self.0.expiration_time_seconds = expiration;
        self
    }

    pub fn with_salt(mut self, salt: U256) -> Self {
        self.0.salt = salt;
        self
    }

    pub fn with_maker_asset_data(mut self, data: Vec<u8>) -> Self {
        self.0.maker_asset_data = data;
        self
    }

    pub fn with_taker_asset_data(mut self, data: Vec<u8>) -> Self {
        self.0.taker_asset_data = data;
        self
    }

    pub fn with_chain(mut self, chain_id: u64, exchange: H160) -> Self {
        self.0.chain_id = chain_id;
        self.0.exchange_address = exchange;
        self
    }

    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.0.signature = signature;
        self
    }

    pub fn build(self) -> Order {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn erc20_asset_data(token: H160) -> Vec<u8> {
        let mut data = vec![0xf4, 0x72, 0x61, 0xb0];
        data.extend_from_slice(&[0u8; 12]);
        data.extend_from_slice(token.as_fixed_bytes());
        data
    }

    fn fixture() -> Order {
        OrderBuilder::default()
            .with_maker(H160([0x11; 20]))
            .with_taker(H160([0x22; 20]))
            .with_fee_recipient(H160([0x33; 20]))
            .with_maker_asset_amount(1_000_000_000_000_000_000u64.into())
            .with_taker_asset_amount(2_000_000_000_000_000_000u64.into())
            .with_maker_fee(1000.into())
            .with_taker_fee(2000.into())
            .with_expiration_time_seconds(1_630_000_000.into())
            .with_salt(123_456_789.into())
            .with_maker_asset_data(erc20_asset_data(H160([0xaa; 20])))
            .with_taker_asset_data(erc20_asset_data(H160([0xbb; 20])))
            .with_chain(1, hex!("61935cbdd02287b511119ddb11aeb42f1593b7ef").into())
            .build()
    }

    #[test]
    fn hash_struct_known_value() {
        assert_eq!(
            fixture().hash_struct(),
            hex!("3a8261c6dd6f09ed891179892e6d652bd2429380401380339bfefa65b7368dd3")
        );
    }

    #[test]
    fn order_hash_known_value() {
        let order = fixture();
        let domain = DomainSeparator::new_exchange(order.chain_id, order.exchange_address);
        assert_eq!(
            order.hash(&domain),
            H256(hex!(
                "e0c3aaa8009f0741889c8d86307df510dabfd3e5a5ebd30355f108e27612976c"
            ))
        );
    }

    #[test]
    fn hashing_is_deterministic_and_signature_independent() {
        let domain = DomainSeparator::new_exchange(1, H160::from_low_u64_be(1));
        let order = fixture();
        let mut signed = order.clone();
        signed.signature = vec![0x05; 66];
        assert_eq!(order.hash(&domain), signed.hash(&domain));
    }

    #[test]
    fn serde_roundtrip_camel_case() {
        let order = fixture();
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(
            json["makerAssetAmount"],
            serde_json::json!("1000000000000000000")
        );
        assert_eq!(
            json["makerAssetData"],
            serde_json::json!("0xf47261b0000000000000000000000000aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
        );
        let roundtripped: Order = serde_json::from_value(json).unwrap();
        assert_eq!(roundtripped, order);
    }

    #[test]
    fn open_taker() {
        let mut order = fixture();
        assert!(!order.is_open_taker());
        order.taker_address = H160::zero();
        assert!(order.is_open_taker());
    }
}
