//! Money type with exact decimal arithmetic
//!
//! The clinic bills in a single currency, so `Money` is a thin wrapper over
//! `rust_decimal::Decimal`. Decimal values are always finite, which is what
//! the ledger relies on when it sums line items and payments.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub, Neg};
use std::str::FromStr;
use thiserror::Error;

/// Number of decimal places kept internally
const INTERNAL_SCALE: u32 = 4;

/// Number of decimal places used for display
const DISPLAY_SCALE: usize = 2;

/// Digits a stored amount may carry, matching `NUMERIC(14,4)` columns
const LEDGER_PRECISION: u32 = 14;

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Overflow during calculation")]
    Overflow,

    #[error("Amount {0} is outside the ledger range")]
    OutOfRange(String),
}

/// A monetary amount
///
/// Amounts are stored with 4 decimal places. Equality and ordering compare
/// the numeric value, so `50` and `50.00` are the same amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Creates a new Money value
    pub fn new(amount: Decimal) -> Self {
        Self(amount.round_dp(INTERNAL_SCALE).normalize())
    }

    /// Creates Money from an integer amount in minor units (cents)
    pub fn from_minor(minor_units: i64) -> Self {
        Self::new(Decimal::new(minor_units, 2))
    }

    /// Creates a zero amount
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns the amount
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is positive
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Returns true if the amount is negative
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Checked addition that reports overflow instead of panicking
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.0
            .checked_add(other.0)
            .map(Self::new)
            .ok_or(MoneyError::Overflow)
    }

    /// Checked subtraction that reports overflow instead of panicking
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.0
            .checked_sub(other.0)
            .map(Self::new)
            .ok_or(MoneyError::Overflow)
    }

    /// Sums an iterator of amounts, reporting overflow
    pub fn checked_sum<'a, I>(amounts: I) -> Result<Money, MoneyError>
    where
        I: IntoIterator<Item = &'a Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }

    /// Largest magnitude the ledger can store, 9999999999.9999
    pub fn ledger_limit() -> Money {
        let max_digits = 10i64.pow(LEDGER_PRECISION) - 1;
        Money(Decimal::new(max_digits, INTERNAL_SCALE))
    }

    /// Returns the amount unchanged if the ledger can store it
    pub fn within_ledger_range(self) -> Result<Money, MoneyError> {
        if self.0.abs() <= Self::ledger_limit().0 {
            Ok(self)
        } else {
            Err(MoneyError::OutOfRange(self.0.to_string()))
        }
    }

    /// Returns the larger of zero and `self`
    pub fn clamp_non_negative(&self) -> Self {
        if self.is_negative() {
            Self::zero()
        } else {
            *self
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.dp$}", self.0, dp = DISPLAY_SCALE)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .map(Self::new)
            .map_err(|e| MoneyError::InvalidAmount(format!("{}: {}", s, e)))
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self::new(amount)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Decimal {
        money.0
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.0 + other.0)
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.0 - other.0)
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_creation() {
        let m = Money::new(dec!(100.50));
        assert_eq!(m.amount(), dec!(100.50));
    }

    #[test]
    fn test_ledger_range() {
        assert_eq!(Money::ledger_limit().amount(), dec!(9999999999.9999));
        assert!(Money::ledger_limit().within_ledger_range().is_ok());
        assert!((-Money::ledger_limit()).within_ledger_range().is_ok());
        assert!(matches!(
            Money::new(dec!(10000000000)).within_ledger_range(),
            Err(MoneyError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_money_from_minor() {
        let m = Money::from_minor(10050);
        assert_eq!(m.amount(), dec!(100.50));
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::new(dec!(100.00));
        let b = Money::new(dec!(50.00));

        assert_eq!((a + b).amount(), dec!(150.00));
        assert_eq!((a - b).amount(), dec!(50.00));
    }

    #[test]
    fn test_scale_does_not_affect_equality() {
        assert_eq!(Money::new(dec!(50)), Money::new(dec!(50.00)));
    }

    #[test]
    fn test_display_uses_two_places() {
        assert_eq!(Money::new(dec!(20)).to_string(), "20.00");
        assert_eq!(Money::new(dec!(19.5)).to_string(), "19.50");
    }

    #[test]
    fn test_checked_add_overflow() {
        let max = Money::new(Decimal::MAX);
        assert_eq!(max.checked_add(&Money::new(Decimal::MAX)), Err(MoneyError::Overflow));
    }
}
