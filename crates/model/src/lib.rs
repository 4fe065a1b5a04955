//! Domain types shared between the coordinator's API surface and its approval
//! engine, together with the EIP-712 hashing they are identified by.

pub mod approval;
pub mod bytes_hex;
pub mod order;
pub mod signature;
pub mod time;
pub mod transaction;
pub mod u256_decimal;

use hex::{FromHex, FromHexError};
use lazy_static::lazy_static;
use primitive_types::{H160, U256};
use std::fmt;
use web3::signing;

#[derive(Copy, Clone, Default, Eq, PartialEq)]
pub struct DomainSeparator(pub [u8; 32]);

impl std::str::FromStr for DomainSeparator {
    type Err = FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(FromHex::from_hex(s)?))
    }
}

impl std::fmt::Debug for DomainSeparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hex = [0u8; 64];
        // Unwrap because we know the length is correct.
        hex::encode_to_slice(self.0, &mut hex).unwrap();
        // Unwrap because we know it is valid utf8.
        f.write_str(std::str::from_utf8(&hex).unwrap())
    }
}

lazy_static! {
    /// The EIP-712 domain type used for computing domain separators.
    static ref DOMAIN_TYPE_HASH: [u8; 32] = signing::keccak256(
        b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
    );

    /// The EIP-712 domain name of the exchange contract, under which orders
    /// and meta-transactions are hashed.
    static ref EXCHANGE_DOMAIN_NAME: [u8; 32] = signing::keccak256(b"0x Protocol");

    /// The EIP-712 domain name of the coordinator, under which approvals are
    /// hashed.
    static ref COORDINATOR_DOMAIN_NAME: [u8; 32] = signing::keccak256(b"0x Protocol Coordinator");

    /// The protocol version shared by both domains.
    static ref DOMAIN_VERSION: [u8; 32] = signing::keccak256(b"3.0.0");
}

impl DomainSeparator {
    fn with_name(name: &[u8; 32], chain_id: u64, verifying_contract: H160) -> Self {
        let mut data = [0u8; 160];
        data[0..32].copy_from_slice(&*DOMAIN_TYPE_HASH);
        data[32..64].copy_from_slice(name);
        data[64..96].copy_from_slice(&*DOMAIN_VERSION);
        U256::from(chain_id).to_big_endian(&mut data[96..128]);
        data[140..160].copy_from_slice(verifying_contract.as_fixed_bytes());
        Self(signing::keccak256(&data))
    }

    /// The domain of the exchange contract on the given chain. Orders and
    /// meta-transactions are identified by digests under this domain.
    pub fn new_exchange(chain_id: u64, exchange: H160) -> Self {
        Self::with_name(&EXCHANGE_DOMAIN_NAME, chain_id, exchange)
    }

    /// The domain of the coordinator contract on the given chain. Approvals
    /// are hashed and signed under this domain.
    pub fn new_coordinator(chain_id: u64, coordinator: H160) -> Self {
        Self::with_name(&COORDINATOR_DOMAIN_NAME, chain_id, coordinator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use std::str::FromStr;

    #[test]
    fn domain_separator_from_str() {
        assert!(DomainSeparator::from_str(
            "aa81d881b1adbbf115e15b849cb9cdc643cad3c6a90f30eb505954af943247e6"
        )
        .is_ok());
    }

    #[test]
    fn exchange_domain_separator_mainnet() {
        let exchange: H160 = hex!("61935cbdd02287b511119ddb11aeb42f1593b7ef").into();
        let separator = DomainSeparator::new_exchange(1, exchange);
        let expected = DomainSeparator(hex!(
            "aa81d881b1adbbf115e15b849cb9cdc643cad3c6a90f30eb505954af943247e6"
        ));
        assert_eq!(separator, expected);
    }

    #[test]
    fn coordinator_domain_separator_mainnet() {
        let coordinator: H160 = hex!("38a795580d0f687706f8ca29954e26f778acae5f").into();
        let separator = DomainSeparator::new_coordinator(1, coordinator);
        let expected = DomainSeparator(hex!(
            "e358873b01e356804f0cafa32d85a6ddd9765f4d149746b9608ac211d9147aed"
        ));
        assert_eq!(separator, expected);
    }

    #[test]
    fn domains_differ_per_chain_and_contract() {
        let contract = H160::from_low_u64_be(0x1337);
        let a = DomainSeparator::new_exchange(1, contract);
        let b = DomainSeparator::new_exchange(42, contract);
        let c = DomainSeparator::new_coordinator(1, contract);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
