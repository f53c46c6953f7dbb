//! Domain primitives: TimeMs, Address, RiskTier.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn since(&self, earlier: TimeMs) -> i64 {
        self.0.saturating_sub(earlier.0).max(0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid address {0:?}: expected 0x followed by 40 hex characters")]
pub struct AddressParseError(pub String);

/// EVM account or contract address, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Create an Address without validation, normalizing case.
    pub fn new(addr: String) -> Self {
        Address(addr.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 20 address bytes, for ABI encoding.
    pub fn to_bytes(&self) -> Result<[u8; 20], AddressParseError> {
        let digits = self.0.strip_prefix("0x").unwrap_or(&self.0);
        let mut out = [0u8; 20];
        hex::decode_to_slice(digits, &mut out).map_err(|_| AddressParseError(self.0.clone()))?;
        Ok(out)
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let valid = trimmed.len() == 42
            && (trimmed.starts_with("0x") || trimmed.starts_with("0X"))
            && trimmed[2..].chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(AddressParseError(s.to_string()));
        }
        Ok(Address::new(trimmed.to_string()))
    }
}

impl TryFrom<String> for Address {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User-selected risk tier. On chain it is a `uint8` (0, 1, 2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    /// Higher win probability, smaller payouts.
    #[default]
    Low,
    Medium,
    /// Lower win probability, bigger payouts.
    Aggressive,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid risk tier: {0}")]
pub struct RiskTierParseError(pub String);

impl RiskTier {
    pub fn from_u8(level: u8) -> Option<Self> {
        match level {
            0 => Some(RiskTier::Low),
            1 => Some(RiskTier::Medium),
            2 => Some(RiskTier::Aggressive),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            RiskTier::Low => 0,
            RiskTier::Medium => 1,
            RiskTier::Aggressive => 2,
        }
    }
}

impl FromStr for RiskTier {
    type Err = RiskTierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" | "0" => Ok(RiskTier::Low),
            "MEDIUM" | "1" => Ok(RiskTier::Medium),
            "AGGRESSIVE" | "HIGH" | "2" => Ok(RiskTier::Aggressive),
            _ => Err(RiskTierParseError(s.to_string())),
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskTier::Low => write!(f, "LOW"),
            RiskTier::Medium => write!(f, "MEDIUM"),
            RiskTier::Aggressive => write!(f, "AGGRESSIVE"),
        }
    }
}
