//! Serialization of U256 as decimal strings, matching how the protocol's JSON
//! payloads carry asset amounts.

use primitive_types::U256;
use serde::de::Visitor as _;
use serde::{de, Deserialize, Deserializer, Serializer};
use serde_with::{DeserializeAs, SerializeAs};
use std::{borrow::Cow, fmt};

pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl de::Visitor<'_> for Visitor {
        type Value = U256;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "a u256 encoded as a decimal string")
        }

        fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            U256::from_dec_str(s).map_err(|err| {
                de::Error::custom(format!("failed to decode {s:?} as decimal u256: {err}"))
            })
        }
    }

    // Deserialize into a Cow first so borrowed and owned strings both work.
    let s = Cow::<str>::deserialize(deserializer)?;
    Visitor.visit_str(&s)
}

/// `serde_with` adapter for nested uses such as `Vec<U256>`.
pub struct DecimalU256;

impl SerializeAs<U256> for DecimalU256 {
    fn serialize_as<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialize(value, serializer)
    }
}

impl<'de> DeserializeAs<'de, U256> for DecimalU256 {
    fn deserialize_as<D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize(deserializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize, serde::Serialize, Eq, PartialEq)]
    struct S {
        #[serde(with = "super")]
        value: U256,
    }

    #[test]
    fn roundtrip() {
        let orig = S { value: U256::from_dec_str("115792089237316195423570985008687907853269984665640564039457584007913129639935").unwrap() };
        let serialized = serde_json::to_value(&orig).unwrap();
        assert_eq!(
            serialized,
            serde_json::json!({
                "value": "115792089237316195423570985008687907853269984665640564039457584007913129639935"
            })
        );
        let deserialized: S = serde_json::from_value(serialized).unwrap();
        assert_eq!(orig, deserialized);
    }

    #[test]
    fn rejects_hex_and_numbers() {
        assert!(serde_json::from_value::<S>(serde_json::json!({"value": "0x10"})).is_err());
        assert!(serde_json::from_value::<S>(serde_json::json!({"value": 16})).is_err());
    }
}
