//! Meta-transactions: signed intents to call the exchange contract, broadcast
//! by a `txOrigin` on behalf of the signer.

use crate::{
    bytes_hex,
    signature::{hashed_eip712_message, TaggedSignature},
    u256_decimal, DomainSeparator,
};
use hex_literal::hex;
use primitive_types::{H160, H256, U256};
use serde::{Deserialize, Serialize};
use web3::signing;

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZeroExTransaction {
    #[serde(with = "u256_decimal")]
    pub salt: U256,
    #[serde(with = "u256_decimal")]
    pub expiration_time_seconds: U256,
    #[serde(with = "u256_decimal")]
    pub gas_price: U256,
    pub signer_address: H160,
    /// ABI-encoded exchange call.
    #[serde(with = "bytes_hex")]
    pub data: Vec<u8>,
}

impl ZeroExTransaction {
    /// Computed with: `keccak256("ZeroExTransaction(uint256 salt,uint256
    /// expirationTimeSeconds,uint256 gasPrice,address signerAddress,bytes data)")`.
    pub const TYPE_HASH: [u8; 32] =
        hex!("ec69816980a3a3ca4554410e60253953e9ff375ba4536a98adfa15cc71541508");

    pub fn hash_struct(&self) -> [u8; 32] {
        let mut hash_data = [0u8; 192];
        hash_data[0..32].copy_from_slice(&Self::TYPE_HASH);
        self.salt.to_big_endian(&mut hash_data[32..64]);
        self.expiration_time_seconds
            .to_big_endian(&mut hash_data[64..96]);
        self.gas_price.to_big_endian(&mut hash_data[96..128]);
        hash_data[140..160].copy_from_slice(self.signer_address.as_fixed_bytes());
        hash_data[160..192].copy_from_slice(&signing::keccak256(&self.data));
        signing::keccak256(&hash_data)
    }

    /// The transaction's identity: its EIP-712 digest under the exchange
    /// domain of the chain it targets.
    pub fn hash(&self, domain: &DomainSeparator) -> H256 {
        H256(hashed_eip712_message(domain, &self.hash_struct()))
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedZeroExTransaction {
    #[serde(flatten)]
    pub transaction: ZeroExTransaction,
    /// Tagged 66-byte signature over the transaction hash.
    #[serde(with = "bytes_hex")]
    pub signature: Vec<u8>,
}

impl SignedZeroExTransaction {
    /// Recovers the signer from the signature and verifies it matches
    /// `signerAddress`. Returns the recovered signer on success.
    pub fn verify_signer(&self, domain: &DomainSeparator) -> Option<H160> {
        let signature = TaggedSignature::from_bytes(&self.signature)?;
        let recovered = signature.recover(domain, &self.transaction.hash_struct())?;
        (recovered == self.transaction.signer_address).then_some(recovered)
    }
}
