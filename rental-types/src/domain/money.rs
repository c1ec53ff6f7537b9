//! Decimal money values and the minor-unit codec used at the provider boundary.
//!
//! All arithmetic inside the engine happens on [`Decimal`] amounts. Rounding
//! only happens in [`to_minor_units`], when an amount crosses into the
//! provider's integer representation.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::error::DomainError;

/// ISO 4217 codes whose smallest unit is the whole unit.
///
/// The provider expects these amounts without any x100 scaling.
pub const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

/// A three-letter, upper-case ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "EUR")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parses and normalizes a currency code.
    pub fn new(code: &str) -> Result<Self, DomainError> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::InvalidCurrency(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the currency has no minor unit.
    pub fn is_zero_decimal(&self) -> bool {
        ZERO_DECIMAL_CURRENCIES.contains(&self.0.as_str())
    }

    /// Number of decimal places the provider uses for this currency.
    pub fn decimal_places(&self) -> u32 {
        if self.is_zero_decimal() { 0 } else { 2 }
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Converts a decimal amount into provider minor units.
///
/// Zero-decimal currencies round to the nearest whole unit; every other
/// currency is scaled by 100 and rounded. Midpoints round away from zero.
pub fn to_minor_units(amount: Decimal, currency: &CurrencyCode) -> Result<i64, DomainError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(DomainError::NegativeAmount);
    }

    let scaled = if currency.is_zero_decimal() {
        amount
    } else {
        amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(DomainError::AmountOutOfRange)?
    };

    scaled
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(DomainError::AmountOutOfRange)
}

/// Converts provider minor units back into a decimal amount.
pub fn from_minor_units(units: i64, currency: &CurrencyCode) -> Decimal {
    if currency.is_zero_decimal() {
        Decimal::from(units)
    } else {
        Decimal::new(units, 2)
    }
}

/// A decimal amount tagged with its currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Money {
    #[schema(value_type = String, example = "49.99")]
    amount: Decimal,
    currency: CurrencyCode,
}

impl Money {
    /// Creates a new non-negative Money value.
    pub fn new(amount: Decimal, currency: CurrencyCode) -> Result<Self, DomainError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Self { amount, currency })
    }

    pub fn zero(currency: CurrencyCode) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Builds a Money value from provider minor units.
    pub fn from_minor(units: i64, currency: CurrencyCode) -> Result<Self, DomainError> {
        Self::new(from_minor_units(units, &currency), currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns the amount in provider minor units.
    pub fn to_minor(&self) -> Result<i64, DomainError> {
        to_minor_units(self.amount, &self.currency)
    }

    /// Checked addition - returns error if currencies don't match.
    pub fn checked_add(&self, other: &Money) -> Result<Money, DomainError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(DomainError::AmountOutOfRange)?;
        Ok(Money {
            amount,
            currency: self.currency.clone(),
        })
    }

    /// Subtraction that floors at zero, for "amount still due" style figures.
    pub fn saturating_sub(&self, other: &Money) -> Result<Money, DomainError> {
        self.ensure_same_currency(other)?;
        let amount = (self.amount - other.amount).max(Decimal::ZERO);
        Ok(Money {
            amount,
            currency: self.currency.clone(),
        })
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), DomainError> {
        if self.currency != other.currency {
            return Err(DomainError::CurrencyMismatch {
                expected: self.currency.clone(),
                got: other.currency.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let places = self.currency.decimal_places();
        write!(
            f,
            "{} {}",
            self.amount
                .round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero),
            self.currency
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eur() -> CurrencyCode {
        CurrencyCode::new("eur").unwrap()
    }

    fn jpy() -> CurrencyCode {
        CurrencyCode::new("JPY").unwrap()
    }

    #[test]
    fn test_currency_code_is_normalized() {
        assert_eq!(eur().as_str(), "EUR");
        assert!(CurrencyCode::new("EU").is_err());
        assert!(CurrencyCode::new("E1R").is_err());
    }

    #[test]
    fn test_standard_currency_round_trip() {
        let amount = Decimal::new(4999, 2);
        let units = to_minor_units(amount, &eur()).unwrap();
        assert_eq!(units, 4999);
        assert_eq!(from_minor_units(units, &eur()), amount);
    }

    #[test]
    fn test_zero_decimal_round_trip() {
        let amount = Decimal::from(5000);
        let units = to_minor_units(amount, &jpy()).unwrap();
        assert_eq!(units, 5000);
        assert_eq!(from_minor_units(units, &jpy()), amount);
    }

    #[test]
    fn test_zero_decimal_rounds_to_whole_units() {
        assert_eq!(to_minor_units(Decimal::new(12345, 1), &jpy()).unwrap(), 1235);
        assert_eq!(to_minor_units(Decimal::new(12344, 1), &jpy()).unwrap(), 1234);
    }

    #[test]
    fn test_standard_currency_rounds_half_away_from_zero() {
        assert_eq!(to_minor_units(Decimal::new(10005, 3), &eur()).unwrap(), 1001);
        assert_eq!(to_minor_units(Decimal::new(10004, 3), &eur()).unwrap(), 1000);
    }

    #[test]
    fn test_negative_amount_is_rejected() {
        let result = to_minor_units(Decimal::new(-100, 2), &eur());
        assert!(matches!(result, Err(DomainError::NegativeAmount)));
    }

    #[test]
    fn test_currency_mismatch() {
        let a = Money::new(Decimal::from(10), eur()).unwrap();
        let b = Money::new(Decimal::from(10), jpy()).unwrap();
        assert!(matches!(
            a.checked_add(&b),
            Err(DomainError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_saturating_sub_floors_at_zero() {
        let due = Money::new(Decimal::from(50), eur()).unwrap();
        let paid = Money::new(Decimal::from(80), eur()).unwrap();
        assert!(due.saturating_sub(&paid).unwrap().is_zero());
    }

    #[test]
    fn test_money_display() {
        let money = Money::new(Decimal::new(1050, 2), eur()).unwrap();
        assert_eq!(money.to_string(), "10.50 EUR");
    }
}
