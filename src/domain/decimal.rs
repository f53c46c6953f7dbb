//! Lossless decimal type for vault amounts.
//!
//! On-chain amounts arrive as 18-decimal fixed-point integers. They are
//! converted once at the data source boundary and carried as `Decimal`
//! everywhere else, so optimistic sums never drift the way float math does.

use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of fractional digits used by every vault token amount.
pub const TOKEN_DECIMALS: u32 = 18;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FixedPointError {
    #[error("fixed-point value {0} does not fit a decimal")]
    Overflow(u128),
    #[error("amount {0} is negative")]
    Negative(String),
    #[error("amount {0} has more than {1} fractional digits")]
    TooPrecise(String, u32),
    #[error("amount {0} does not fit a 128-bit integer")]
    TooLarge(String),
}

/// Lossless decimal numeric type for vault amounts.
///
/// Serializes to a JSON string so clients never see a float.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::str")] RustDecimal);

impl Decimal {
    pub fn new(value: RustDecimal) -> Self {
        Decimal(value)
    }

    /// Parse a Decimal from a string losslessly.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s.trim()).map(Decimal)
    }

    /// Format without exponent notation or trailing zeros.
    pub fn to_canonical_string(&self) -> String {
        format!("{}", self.0.normalize())
    }

    /// Convert a raw fixed-point integer (e.g. wei) into a decimal amount.
    pub fn from_fixed_point(raw: u128, decimals: u32) -> Result<Self, FixedPointError> {
        let signed = i128::try_from(raw).map_err(|_| FixedPointError::Overflow(raw))?;
        RustDecimal::try_from_i128_with_scale(signed, decimals)
            .map(Decimal)
            .map_err(|_| FixedPointError::Overflow(raw))
    }

    /// Convert an amount back into its raw fixed-point integer.
    pub fn to_fixed_point(&self, decimals: u32) -> Result<u128, FixedPointError> {
        if self.0.is_sign_negative() && !self.0.is_zero() {
            return Err(FixedPointError::Negative(self.to_canonical_string()));
        }
        let normalized = self.0.normalize();
        if normalized.scale() > decimals {
            return Err(FixedPointError::TooPrecise(
                self.to_canonical_string(),
                decimals,
            ));
        }
        // mantissa * 10^(decimals - scale), done in integer space to avoid
        // the 28-digit decimal ceiling.
        let mantissa = u128::try_from(normalized.mantissa())
            .map_err(|_| FixedPointError::Negative(self.to_canonical_string()))?;
        let shift = decimals - normalized.scale();
        10u128
            .checked_pow(shift)
            .and_then(|factor| mantissa.checked_mul(factor))
            .ok_or_else(|| FixedPointError::TooLarge(self.to_canonical_string()))
    }

    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the value is > 0.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    pub fn hundred() -> Self {
        Decimal(RustDecimal::ONE_HUNDRED)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

impl From<u64> for Decimal {
    fn from(value: u64) -> Self {
        Decimal(RustDecimal::from(value))
    }
}

impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Decimal {
    fn add_assign(&mut self, rhs: Decimal) {
        self.0 += rhs.0;
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl std::ops::Div for Decimal {
    type Output = Decimal;

    fn div(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 / rhs.0)
    }
}

impl std::iter::Sum for Decimal {
    fn sum<I: Iterator<Item = Decimal>>(iter: I) -> Self {
        iter.fold(Decimal::zero(), |acc, d| acc + d)
    }
}
