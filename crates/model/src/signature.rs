//! ECDSA signatures in the exchange protocol's tagged wire format.
//!
//! A signature is 66 bytes on the wire: `v (1) ‖ r (32) ‖ s (32) ‖ tag (1)`,
//! hex-encoded with a `0x` prefix. The trailing tag byte selects the scheme
//! the digest was signed under.

use crate::DomainSeparator;
use primitive_types::{H160, H256};
use serde::{de, Deserialize, Serialize};
use std::fmt;
use web3::{
    signing::{self, Key, SecretKeyRef},
    types::Recovery,
};

/// Signature-type tag for EIP-712 signatures.
pub const EIP712_SIGNATURE_TAG: u8 = 0x05;
/// Signature-type tag for `eth_sign` style signatures.
pub const ETH_SIGN_SIGNATURE_TAG: u8 = 0x06;

#[derive(Eq, PartialEq, Clone, Copy, Debug, Hash)]
pub enum EcdsaSigningScheme {
    Eip712,
    EthSign,
}

impl EcdsaSigningScheme {
    pub fn tag(&self) -> u8 {
        match self {
            Self::Eip712 => EIP712_SIGNATURE_TAG,
            Self::EthSign => ETH_SIGN_SIGNATURE_TAG,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            EIP712_SIGNATURE_TAG => Some(Self::Eip712),
            ETH_SIGN_SIGNATURE_TAG => Some(Self::EthSign),
            _ => None,
        }
    }
}

/// The EIP-712 signing digest: `keccak256(0x1901 ‖ domainSeparator ‖ structHash)`.
pub fn hashed_eip712_message(
    domain_separator: &DomainSeparator,
    struct_hash: &[u8; 32],
) -> [u8; 32] {
    let mut message = [0u8; 66];
    message[0..2].copy_from_slice(&[0x19, 0x01]);
    message[2..34].copy_from_slice(&domain_separator.0);
    message[34..66].copy_from_slice(struct_hash);
    signing::keccak256(&message)
}

fn hashed_ethsign_message(domain_separator: &DomainSeparator, struct_hash: &[u8; 32]) -> [u8; 32] {
    let mut message = [0u8; 60];
    message[..28].copy_from_slice(b"\x19Ethereum Signed Message:\n32");
    message[28..].copy_from_slice(&hashed_eip712_message(domain_separator, struct_hash));
    signing::keccak256(&message)
}

fn hashed_signing_message(
    signing_scheme: EcdsaSigningScheme,
    domain_separator: &DomainSeparator,
    struct_hash: &[u8; 32],
) -> [u8; 32] {
    match signing_scheme {
        EcdsaSigningScheme::Eip712 => hashed_eip712_message(domain_separator, struct_hash),
        EcdsaSigningScheme::EthSign => hashed_ethsign_message(domain_separator, struct_hash),
    }
}

#[derive(Eq, PartialEq, Clone, Copy, Debug, Default, Hash)]
pub struct EcdsaSignature {
    pub r: H256,
    pub s: H256,
    pub v: u8,
}

impl EcdsaSignature {
    pub fn recover(
        &self,
        signing_scheme: EcdsaSigningScheme,
        domain_separator: &DomainSeparator,
        struct_hash: &[u8; 32],
    ) -> Option<H160> {
        let message = hashed_signing_message(signing_scheme, domain_separator, struct_hash);
        let recovery = Recovery::new(message, self.v as u64, self.r, self.s);
        let (signature, recovery_id) = recovery.as_signature()?;
        signing::recover(&message, &signature, recovery_id).ok()
    }

    pub fn sign(
        signing_scheme: EcdsaSigningScheme,
        domain_separator: &DomainSeparator,
        struct_hash: &[u8; 32],
        key: SecretKeyRef,
    ) -> Self {
        let message = hashed_signing_message(signing_scheme, domain_separator, struct_hash);
        // Unwrap because the only error is for invalid messages which we don't create.
        let signature = key.sign(&message, None).unwrap();
        Self {
            v: signature.v as u8,
            r: signature.r,
            s: signature.s,
        }
    }
}

/// An ECDSA signature together with the scheme tag it carries on the wire.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Hash)]
pub struct TaggedSignature {
    pub signature: EcdsaSignature,
    pub scheme: EcdsaSigningScheme,
}

impl TaggedSignature {
    /// `v ‖ r ‖ s ‖ tag`
    pub fn to_bytes(&self) -> [u8; 66] {
        let mut bytes = [0u8; 66];
        bytes[0] = self.signature.v;
        bytes[1..33].copy_from_slice(self.signature.r.as_bytes());
        bytes[33..65].copy_from_slice(self.signature.s.as_bytes());
        bytes[65] = self.scheme.tag();
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes = <&[u8; 66]>::try_from(bytes).ok()?;
        Some(Self {
            signature: EcdsaSignature {
                v: bytes[0],
                r: H256::from_slice(&bytes[1..33]),
                s: H256::from_slice(&bytes[33..65]),
            },
            scheme: EcdsaSigningScheme::from_tag(bytes[65])?,
        })
    }

    pub fn sign(
        signing_scheme: EcdsaSigningScheme,
        domain_separator: &DomainSeparator,
        struct_hash: &[u8; 32],
        key: SecretKeyRef,
    ) -> Self {
        Self {
            signature: EcdsaSignature::sign(signing_scheme, domain_separator, struct_hash, key),
            scheme: signing_scheme,
        }
    }

    pub fn recover(
        &self,
        domain_separator: &DomainSeparator,
        struct_hash: &[u8; 32],
    ) -> Option<H160> {
        self.signature
            .recover(self.scheme, domain_separator, struct_hash)
    }
}

impl Serialize for TaggedSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut bytes = [0u8; 2 + 66 * 2];
        bytes[..2].copy_from_slice(b"0x");
        // Can only fail if the buffer size does not match but we know it is correct.
        hex::encode_to_slice(self.to_bytes(), &mut bytes[2..]).unwrap();
        // Hex encoding is always valid utf8.
        serializer.serialize_str(std::str::from_utf8(&bytes).unwrap())
    }
}

impl<'de> Deserialize<'de> for TaggedSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor;
        impl de::Visitor<'_> for Visitor {
            type Value = TaggedSignature;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(
                    formatter,
                    "a hex encoded 66 byte signature ordered as v, r, s, tag"
                )
            }

            fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let s = s.strip_prefix("0x").ok_or_else(|| {
                    de::Error::custom(format!("signature {s:?} does not start with '0x'"))
                })?;
                let mut bytes = [0u8; 66];
                hex::decode_to_slice(s, &mut bytes).map_err(|err| {
                    de::Error::custom(format!("failed to decode {s:?} as hex signature: {err}"))
                })?;
                TaggedSignature::from_bytes(&bytes)
                    .ok_or_else(|| de::Error::custom("unknown signature-type tag"))
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::SecretKey;

    fn test_key() -> SecretKey {
        SecretKey::from_slice(&[0x42; 32]).unwrap()
    }

    #[test]
    fn sign_and_recover_eip712() {
        let key = test_key();
        let domain = DomainSeparator([0x11; 32]);
        let struct_hash = [0x22; 32];
        let signature = TaggedSignature::sign(
            EcdsaSigningScheme::Eip712,
            &domain,
            &struct_hash,
            SecretKeyRef::new(&key),
        );
        let recovered = signature.recover(&domain, &struct_hash).unwrap();
        assert_eq!(recovered, SecretKeyRef::new(&key).address());
    }

    #[test]
    fn sign_and_recover_ethsign() {
        let key = test_key();
        let domain = DomainSeparator([0x11; 32]);
        let struct_hash = [0x22; 32];
        let signature = TaggedSignature::sign(
            EcdsaSigningScheme::EthSign,
            &domain,
            &struct_hash,
            SecretKeyRef::new(&key),
        );
        let recovered = signature.recover(&domain, &struct_hash).unwrap();
        assert_eq!(recovered, SecretKeyRef::new(&key).address());
    }

    #[test]
    fn wire_format_tags() {
        let key = test_key();
        let signature = TaggedSignature::sign(
            EcdsaSigningScheme::Eip712,
            &DomainSeparator::default(),
            &[0u8; 32],
            SecretKeyRef::new(&key),
        );
        let bytes = signature.to_bytes();
        assert_eq!(bytes.len(), 66);
        assert_eq!(bytes[65], EIP712_SIGNATURE_TAG);
        assert_eq!(TaggedSignature::from_bytes(&bytes), Some(signature));
    }

    #[test]
    fn rejects_unknown_tag() {
        let mut bytes = [0u8; 66];
        bytes[65] = 0x01;
        assert_eq!(TaggedSignature::from_bytes(&bytes), None);
    }

    #[test]
    fn serde_roundtrip() {
        let key = test_key();
        let signature = TaggedSignature::sign(
            EcdsaSigningScheme::Eip712,
            &DomainSeparator([0x33; 32]),
            &[0x44; 32],
            SecretKeyRef::new(&key),
        );
        let json = serde_json::to_value(signature).unwrap();
        let string = json.as_str().unwrap();
        assert!(string.starts_with("0x"));
        assert!(string.ends_with("05"));
        assert_eq!(string.len(), 2 + 66 * 2);
        let deserialized: TaggedSignature = serde_json::from_value(json).unwrap();
        assert_eq!(deserialized, signature);
    }
}
