//! Conversions between `U256` and unbounded integers for overflow-free
//! multiply-then-divide arithmetic.

use anyhow::{ensure, Result};
use num::BigUint;
use primitive_types::U256;

pub fn u256_to_big_uint(input: &U256) -> BigUint {
    let mut bytes = [0; 32];
    input.to_big_endian(&mut bytes);
    BigUint::from_bytes_be(&bytes)
}

pub fn big_uint_to_u256(input: &BigUint) -> Result<U256> {
    let bytes = input.to_bytes_be();
    ensure!(bytes.len() <= 32, "too large");
    Ok(U256::from_big_endian(&bytes))
}

/// Like [`big_uint_to_u256`] but clamps values beyond 2²⁵⁶ − 1. Useful for
/// intermediate candidates that only ever feed a minimum.
pub fn big_uint_to_u256_saturating(input: &BigUint) -> U256 {
    big_uint_to_u256(input).unwrap_or(U256::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num::One;

    #[test]
    fn u256_roundtrip() {
        for value in [U256::zero(), U256::one(), U256::MAX, U256::from(1_000_000_007u64)] {
            assert_eq!(big_uint_to_u256(&u256_to_big_uint(&value)).unwrap(), value);
        }
    }

    #[test]
    fn too_large_to_fit() {
        let too_large = u256_to_big_uint(&U256::MAX) + BigUint::one();
        assert!(big_uint_to_u256(&too_large).is_err());
        assert_eq!(big_uint_to_u256_saturating(&too_large), U256::MAX);
    }
}
