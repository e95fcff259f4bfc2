//! Human-readable currency amounts.
//!
//! Route prices are usually written the way people write money (`"$0.001"`).
//! [`MoneyAmount`] parses those strings exactly with [`rust_decimal`] and
//! scales them into a token's smallest unit.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::proto::TokenAmount;

/// Largest decimal scale supported when converting to smallest units.
pub const MAX_DECIMALS: u8 = 18;

/// Errors from parsing or scaling a money amount.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyAmountError {
    /// The string is not a decimal number.
    #[error("invalid money amount {0:?}")]
    Invalid(String),
    /// The amount is zero or negative.
    #[error("money amount must be positive")]
    NotPositive,
    /// The amount has more fractional digits than the asset can represent.
    #[error("amount {amount} has more than {decimals} fractional digits")]
    TooPrecise {
        /// The offending amount.
        amount: Decimal,
        /// The asset's decimal scale.
        decimals: u8,
    },
    /// The asset's decimal scale is unsupported.
    #[error("asset decimals {0} exceed the supported maximum of {MAX_DECIMALS}")]
    DecimalsOutOfRange(u8),
    /// The scaled amount does not fit.
    #[error("amount overflows when scaled to {0} decimals")]
    Overflow(u8),
}

/// A positive fiat amount such as `$0.001`.
///
/// Accepts an optional leading `$`, and `_` or `,` digit separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MoneyAmount(Decimal);

impl MoneyAmount {
    /// Returns the amount as a decimal.
    #[must_use]
    pub const fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Converts the amount into smallest units of an asset with `decimals`
    /// fractional digits.
    ///
    /// # Errors
    ///
    /// Fails if the amount cannot be represented exactly at that scale.
    pub fn to_token_amount(&self, decimals: u8) -> Result<TokenAmount, MoneyAmountError> {
        if decimals > MAX_DECIMALS {
            return Err(MoneyAmountError::DecimalsOutOfRange(decimals));
        }
        let normalized = self.0.normalize();
        if normalized.scale() > u32::from(decimals) {
            return Err(MoneyAmountError::TooPrecise {
                amount: normalized,
                decimals,
            });
        }
        let factor = Decimal::from(10u64.pow(u32::from(decimals)));
        let scaled = normalized
            .checked_mul(factor)
            .ok_or(MoneyAmountError::Overflow(decimals))?;
        scaled
            .trunc()
            .to_u128()
            .map(TokenAmount::new)
            .ok_or(MoneyAmountError::Overflow(decimals))
    }
}

impl FromStr for MoneyAmount {
    type Err = MoneyAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits: String = trimmed
            .strip_prefix('$')
            .unwrap_or(trimmed)
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != ',')
            .collect();
        let value = Decimal::from_str_exact(&digits)
            .map_err(|_| MoneyAmountError::Invalid(s.to_owned()))?;
        if value <= Decimal::ZERO {
            return Err(MoneyAmountError::NotPositive);
        }
        Ok(Self(value))
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0.normalize())
    }
}

impl Serialize for MoneyAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MoneyAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
