//! Money in minor units (cents).

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Non-negative amount of money in minor currency units.
///
/// Arithmetic is checked: overflow is reported as an invariant violation
/// instead of wrapping.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::invariant("money overflow"))
    }

    /// `self × quantity`; quantity must be positive.
    pub fn times(self, quantity: i64) -> DomainResult<Money> {
        let qty = u64::try_from(quantity)
            .map_err(|_| DomainError::validation("quantity must not be negative"))?;
        self.0
            .checked_mul(qty)
            .map(Money)
            .ok_or_else(|| DomainError::invariant("money overflow"))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_as_decimal() {
        assert_eq!(Money::from_cents(3500).to_string(), "35.00");
        assert_eq!(Money::from_cents(7).to_string(), "0.07");
    }

    #[test]
    fn times_rejects_negative_quantity() {
        assert!(Money::from_cents(100).times(-1).is_err());
    }

    #[test]
    fn overflow_is_an_invariant_violation() {
        let err = Money::from_cents(u64::MAX).checked_add(Money::from_cents(1)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
