//! Coordinator approvals: the typed-data artifact that authorizes a
//! `txOrigin` to broadcast a fill of the listed orders before a deadline.

use crate::{
    signature::{hashed_eip712_message, EcdsaSigningScheme, TaggedSignature},
    DomainSeparator,
};
use hex_literal::hex;
use primitive_types::{H160, H256, U256};
use web3::signing::{self, SecretKeyRef};

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CoordinatorApproval {
    /// Hashes of the approved orders, in calldata order.
    pub order_hashes: Vec<H256>,
    /// The account permitted to broadcast the fill.
    pub tx_origin: H160,
    pub approval_expiration_time_seconds: U256,
}

impl CoordinatorApproval {
    /// Computed with: `keccak256("CoordinatorApproval(bytes32[]
    /// zeroxOrderHashes,address txOrigin,uint256 approvalExpirationTimeSeconds)")`.
    pub const TYPE_HASH: [u8; 32] =
        hex!("00299877d73f791bcbdcaa109992a075a4ca417ff2752cdd66a90aac51953d25");

    pub fn hash_struct(&self) -> [u8; 32] {
        // Dynamic array rule: hash the concatenation of the array members.
        let mut encoded_hashes = Vec::with_capacity(32 * self.order_hashes.len());
        for order_hash in &self.order_hashes {
            encoded_hashes.extend_from_slice(order_hash.as_bytes());
        }
        let array_hash = signing::keccak256(&encoded_hashes);

        let mut hash_data = [0u8; 128];
        hash_data[0..32].copy_from_slice(&Self::TYPE_HASH);
        hash_data[32..64].copy_from_slice(&array_hash);
        hash_data[76..96].copy_from_slice(self.tx_origin.as_fixed_bytes());
        self.approval_expiration_time_seconds
            .to_big_endian(&mut hash_data[96..128]);
        signing::keccak256(&hash_data)
    }

    /// The EIP-712 digest under the coordinator domain. This is the message
    /// each fee-recipient key signs.
    pub fn hash(&self, domain: &DomainSeparator) -> H256 {
        H256(hashed_eip712_message(domain, &self.hash_struct()))
    }

    /// Signs the approval with a fee-recipient key. The wire format tags the
    /// signature as EIP-712.
    pub fn sign(&self, domain: &DomainSeparator, key: SecretKeyRef) -> TaggedSignature {
        TaggedSignature::sign(
            EcdsaSigningScheme::Eip712,
            domain,
            &self.hash_struct(),
            key,
        )
    }
}
