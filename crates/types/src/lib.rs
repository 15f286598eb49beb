//! Small validated value types shared across the clinic crates.

use serde::{Deserialize, Serialize};

/// Errors that can occur when creating validated value types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypeError {
    /// The input text was empty or contained only whitespace
    #[error("text cannot be empty")]
    EmptyText,
    /// A monetary amount was negative where only non-negative amounts are meaningful
    #[error("amount cannot be negative: {0}")]
    NegativeAmount(i64),
    /// A monetary calculation exceeded the representable range
    #[error("amount overflow")]
    Overflow,
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction, so
/// `"  CBC "` and `"CBC"` produce the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::EmptyText`] if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TypeError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TypeError::EmptyText);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// A monetary amount in integer minor units (paise, cents).
///
/// Bills are totalled once at creation; holding amounts as integers keeps
/// `grand_total = subtotal - discount + gst_amount` exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Money(i64);

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let minor = i64::deserialize(deserializer)?;
        Money::from_minor(minor).map_err(serde::de::Error::custom)
    }
}

impl Money {
    pub const ZERO: Money = Money(0);

    /// Creates a non-negative amount from minor units.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::NegativeAmount`] for values below zero.
    pub fn from_minor(minor: i64) -> Result<Self, TypeError> {
        if minor < 0 {
            return Err(TypeError::NegativeAmount(minor));
        }
        Ok(Self(minor))
    }

    pub fn minor(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Money) -> Result<Money, TypeError> {
        self.0.checked_add(other.0).map(Money).ok_or(TypeError::Overflow)
    }

    /// Subtracts `other`, refusing to go below zero.
    pub fn checked_sub(self, other: Money) -> Result<Money, TypeError> {
        let value = self.0.checked_sub(other.0).ok_or(TypeError::Overflow)?;
        Money::from_minor(value)
    }

    pub fn checked_mul(self, quantity: u32) -> Result<Money, TypeError> {
        self.0
            .checked_mul(i64::from(quantity))
            .map(Money)
            .ok_or(TypeError::Overflow)
    }

    /// Applies a rate expressed in basis points (1800 = 18%), rounding half up.
    pub fn apply_basis_points(self, bps: u32) -> Result<Money, TypeError> {
        let scaled = i128::from(self.0) * i128::from(bps);
        let rounded = (scaled + 5_000) / 10_000;
        i64::try_from(rounded).map(Money).map_err(|_| TypeError::Overflow)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}
