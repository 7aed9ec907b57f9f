use std::borrow::Cow;

use serde::{
    de::{Deserialize, Deserializer, Error, SeqAccess, Visitor},
    ser::{SerializeSeq, Serializer},
};
use web3::types::U256;

fn try_hex(str: &str) -> Option<&str> {
    if str.len() >= 2 && (&str[..2] == "0x" || &str[..2] == "0X") {
        Some(&str[2..])
    } else {
        None
    }
}

/// Serialize using [`ToString`], which for numbers gives a decimal string.
pub fn to_string<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: ToString,
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

pub fn u64_from_str<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let str = <Cow<'de, str>>::deserialize(deserializer)?;
    try_hex(&str)
        .map_or_else(|| str.parse(), |hex| u64::from_str_radix(hex, 16))
        .map_err(D::Error::custom)
}

pub fn u256_from_str<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    let str = <Cow<'de, str>>::deserialize(deserializer)?;
    try_hex(&str).map_or_else(
        || U256::from_dec_str(&str).map_err(D::Error::custom),
        |hex| U256::from_str_radix(hex, 16).map_err(D::Error::custom),
    )
}

pub mod u64_dec {
    pub use super::{to_string as serialize, u64_from_str as deserialize};
}

pub mod u256_dec {
    pub use super::{to_string as serialize, u256_from_str as deserialize};
}

/// Decimal-string encoding for sequences of [`U256`] values.
pub mod u256_vec_dec {
    use super::*;

    pub fn serialize<S: Serializer>(values: &[U256], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&value.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<U256>, D::Error> {
        struct VecVisitor;

        impl<'de> Visitor<'de> for VecVisitor {
            type Value = Vec<U256>;

            fn expecting(&self, formatter: &mut core::fmt::Formatter) -> core::fmt::Result {
                formatter.write_str("a sequence of decimal or 0x-prefixed integer strings")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut values = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(str) = seq.next_element::<Cow<str>>()? {
                    let value = try_hex(&str).map_or_else(
                        || U256::from_dec_str(&str).map_err(A::Error::custom),
                        |hex| U256::from_str_radix(hex, 16).map_err(A::Error::custom),
                    )?;
                    values.push(value);
                }
                Ok(values)
            }
        }

        deserializer.deserialize_seq(VecVisitor)
    }
}
