use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, DomainResult, Entity, Money, PaymentId, UserId};

use crate::OrderStatus;

/// Payment status lifecycle.
///
/// `pending` settles exactly once, to `completed` or `failed`. A completed
/// payment may later be `refunded`. Nothing moves back to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    #[serde(alias = "verified")]
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Completed) | (Pending, Failed) | (Completed, Refunded)
        )
    }

    /// Order status that follows this payment status.
    pub fn cascades_to(self) -> Option<OrderStatus> {
        match self {
            PaymentStatus::Pending => None,
            PaymentStatus::Completed => Some(OrderStatus::Confirmed),
            PaymentStatus::Failed => Some(OrderStatus::PaymentFailed),
            PaymentStatus::Refunded => Some(OrderStatus::Cancelled),
        }
    }
}

impl core::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" | "verified" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(DomainError::validation(format!(
                "invalid status '{other}', must be one of: pending, completed, failed, refunded"
            ))),
        }
    }
}

/// Payment method label ("card", "cash", ...). Opaque; no gateway behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentMethod(String);

impl PaymentMethod {
    pub const DEFAULT: &'static str = "card";
    const MAX_LEN: usize = 32;

    pub fn parse(raw: &str) -> DomainResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("payment method cannot be empty"));
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(DomainError::validation("payment method is too long"));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PaymentMethod {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub user_id: UserId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn pending(
        user_id: UserId,
        amount: Money,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if amount == Money::ZERO {
            return Err(DomainError::validation("amount must be greater than zero"));
        }
        Ok(Self {
            id: PaymentId::new(),
            user_id,
            amount,
            method,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn transition(&mut self, next: PaymentStatus, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::illegal_transition("payment", self.status, next));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for Payment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Payment {
        Payment::pending(UserId::new(), Money::from_cents(100), PaymentMethod::default(), Utc::now())
            .unwrap()
    }

    #[test]
    fn default_method_is_card() {
        assert_eq!(pending().method.as_str(), "card");
        assert_eq!(PaymentMethod::parse(" PayPal ").unwrap().as_str(), "paypal");
        assert!(PaymentMethod::parse("").is_err());
    }

    #[test]
    fn verify_twice_is_rejected() {
        let mut p = pending();
        p.transition(PaymentStatus::Completed, Utc::now()).unwrap();
        let err = p.transition(PaymentStatus::Completed, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::IllegalTransition { .. }));
    }

    #[test]
    fn failed_payment_cannot_be_verified() {
        let mut p = pending();
        p.transition(PaymentStatus::Failed, Utc::now()).unwrap();
        assert!(p.transition(PaymentStatus::Completed, Utc::now()).is_err());
        assert_eq!(p.status, PaymentStatus::Failed);
    }

    #[test]
    fn only_completed_payments_refund() {
        let mut p = pending();
        assert!(p.transition(PaymentStatus::Refunded, Utc::now()).is_err());
        p.transition(PaymentStatus::Completed, Utc::now()).unwrap();
        p.transition(PaymentStatus::Refunded, Utc::now()).unwrap();
        assert!(p.transition(PaymentStatus::Refunded, Utc::now()).is_err());
    }

    #[test]
    fn verified_is_accepted_as_completed() {
        assert_eq!("verified".parse::<PaymentStatus>().unwrap(), PaymentStatus::Completed);
        let s: PaymentStatus = serde_json::from_str("\"verified\"").unwrap();
        assert_eq!(s, PaymentStatus::Completed);
    }

    #[test]
    fn settlement_cascades_match_order_lifecycle() {
        for s in [PaymentStatus::Completed, PaymentStatus::Failed, PaymentStatus::Refunded] {
            assert!(s.cascades_to().is_some());
        }
        assert_eq!(PaymentStatus::Pending.cascades_to(), None);
    }
}
