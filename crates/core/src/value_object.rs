//! Value objects: equality by value, not identity.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::UserId;

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. To
/// "modify" one, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Non-negative monetary amount in cents.
///
/// Prices are never negative, so the representation is unsigned and all
/// arithmetic is checked.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    pub fn cents(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Price of `quantity` units at this unit price.
    pub fn checked_mul(self, quantity: u64) -> Option<Money> {
        self.0.checked_mul(quantity).map(Money)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Money {
    type Err = DomainError;

    /// Accepts `12`, `12.5`, `12.50` and the comma form `12,50`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let invalid = || DomainError::validation(format!("invalid amount: '{raw}'"));

        let normalized = raw.replace(',', ".");
        let (units, fraction) = match normalized.split_once('.') {
            Some((u, f)) => (u, f),
            None => (normalized.as_str(), ""),
        };

        if units.is_empty() || !units.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if normalized.contains('.') && (fraction.is_empty() || fraction.len() > 2) {
            return Err(invalid());
        }
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let units: u64 = units.parse().map_err(|_| invalid())?;
        let cents: u64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<u64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };

        units
            .checked_mul(100)
            .and_then(|c| c.checked_add(cents))
            .map(Money)
            .ok_or_else(invalid)
    }
}

/// Who performed an operation (recorded on movements and orders).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

impl ValueObject for Actor {}

impl Actor {
    /// Build an actor from a display name; the name must not be blank.
    pub fn named(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("actor name cannot be empty"));
        }
        Ok(Self { name, user_id: None })
    }

    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_amount_forms() {
        assert_eq!("12".parse::<Money>().unwrap(), Money::from_cents(1200));
        assert_eq!("12.5".parse::<Money>().unwrap(), Money::from_cents(1250));
        assert_eq!("12.50".parse::<Money>().unwrap(), Money::from_cents(1250));
        assert_eq!("12,05".parse::<Money>().unwrap(), Money::from_cents(1205));
        assert_eq!(" 0.99 ".parse::<Money>().unwrap(), Money::from_cents(99));
    }

    #[test]
    fn rejects_malformed_amounts() {
        for bad in ["", "-1", "1.234", "abc", "1.", ".5", "1.2.3", "1e3"] {
            assert!(bad.parse::<Money>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn displays_with_two_decimals() {
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(123456).to_string(), "1234.56");
    }

    #[test]
    fn multiplication_is_checked() {
        assert_eq!(Money::from_cents(250).checked_mul(4), Some(Money::from_cents(1000)));
        assert_eq!(Money::from_cents(u64::MAX).checked_mul(2), None);
    }

    #[test]
    fn serializes_as_integer_cents() {
        let json = serde_json::to_string(&Money::from_cents(1999)).unwrap();
        assert_eq!(json, "1999");
    }

    #[test]
    fn actor_name_is_trimmed_and_required() {
        assert_eq!(Actor::named("  Ana ").unwrap().name, "Ana");
        assert!(Actor::named("   ").is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: displayed amounts parse back to the same value.
            #[test]
            fn display_parses_back(cents in 0u64..10_000_000_000) {
                let money = Money::from_cents(cents);
                prop_assert_eq!(money.to_string().parse::<Money>().unwrap(), money);
            }
        }
    }
}
