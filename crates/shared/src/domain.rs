use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("invalid {kind}: expected 0x-prefixed {expected_len} byte hex, got '{raw}'")]
    InvalidHex {
        kind: &'static str,
        expected_len: usize,
        raw: String,
    },
    #[error("invalid chain id '{0}'")]
    InvalidChainId(String),
}

/// Lowercase `0x`-prefixed hex of a fixed byte width.
macro_rules! hex_newtype {
    ($name:ident, $len:expr, $kind:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> Result<Self, DomainError> {
                let invalid = || DomainError::InvalidHex {
                    kind: $kind,
                    expected_len: $len,
                    raw: raw.to_string(),
                };
                let trimmed = raw.trim();
                let digits = trimmed
                    .strip_prefix("0x")
                    .or_else(|| trimmed.strip_prefix("0X"))
                    .ok_or_else(invalid)?;
                if digits.len() != $len * 2 {
                    return Err(invalid());
                }
                hex::decode(digits).map_err(|_| invalid())?;
                Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
            }

            pub fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(format!("0x{}", hex::encode(bytes)))
            }

            pub fn to_bytes(&self) -> [u8; $len] {
                let mut out = [0u8; $len];
                // Construction guarantees valid hex of the declared width.
                if let Ok(decoded) = hex::decode(&self.0[2..]) {
                    out.copy_from_slice(&decoded);
                }
                out
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_newtype!(AccountAddress, 20, "account address");
hex_newtype!(TxHash, 32, "transaction hash");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

impl ChainId {
    /// Accepts both the `0x`-hex form wallets emit and plain decimal.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        let parsed = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(digits) => u64::from_str_radix(digits, 16),
            None => trimmed.parse::<u64>(),
        };
        parsed
            .map(Self)
            .map_err(|_| DomainError::InvalidChainId(raw.to_string()))
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub index: usize,
    pub name: String,
    pub vote_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_address_is_normalized_to_lowercase() {
        let address = AccountAddress::parse("0xABCDEFabcdef0123456789ABCDEF0123456789ab")
            .expect("valid address");
        assert_eq!(address.as_str(), "0xabcdefabcdef0123456789abcdef0123456789ab");
        assert_eq!(AccountAddress::from_bytes(address.to_bytes()), address);
    }

    #[test]
    fn account_address_rejects_bad_input() {
        assert!(AccountAddress::parse("abcdefabcdef0123456789abcdef0123456789ab").is_err());
        assert!(AccountAddress::parse("0x1234").is_err());
        assert!(AccountAddress::parse("0xzzcdefabcdef0123456789abcdef0123456789ab").is_err());
    }

    #[test]
    fn tx_hash_round_trips_through_json() {
        let raw = format!("\"0x{}\"", "11".repeat(32));
        let hash: TxHash = serde_json::from_str(&raw).expect("decode");
        assert_eq!(serde_json::to_string(&hash).expect("encode"), raw);
    }

    #[test]
    fn chain_id_accepts_hex_and_decimal() {
        assert_eq!(ChainId::parse("0x539").expect("hex"), ChainId(1337));
        assert_eq!(ChainId::parse("11155111").expect("dec"), ChainId(11_155_111));
        assert_eq!(ChainId(1).to_string(), "0x1");
        assert!(ChainId::parse("mainnet").is_err());
    }
}
