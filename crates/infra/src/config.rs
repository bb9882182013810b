//! Runtime configuration for the storefront services.
//!
//! Values come from the environment once at startup; anything unparsable is a
//! startup error, never a silent default.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use storefront_sales::PaymentMethod;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    pub fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

/// What checkout does with the order and payment it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementMode {
    /// Confirm the order and complete the payment inside the checkout
    /// transaction.
    #[default]
    Immediate,
    /// Leave both `pending`; an operator settles them later.
    Deferred,
}

impl core::str::FromStr for SettlementMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(SettlementMode::Immediate),
            "deferred" => Ok(SettlementMode::Deferred),
            other => Err(ConfigError::invalid(
                "CHECKOUT_SETTLEMENT",
                format!("'{other}' (expected immediate or deferred)"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopConfig {
    /// Longest a unit of work waits for a contended row before giving up
    /// with a retryable conflict.
    pub lock_timeout: Duration,
    pub settlement: SettlementMode,
    pub default_payment_method: PaymentMethod,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(5_000),
            settlement: SettlementMode::Immediate,
            default_payment_method: PaymentMethod::default(),
        }
    }
}

impl ShopConfig {
    /// Read `LOCK_TIMEOUT_MS`, `CHECKOUT_SETTLEMENT` and `DEFAULT_PAYMENT_METHOD`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ShopConfig::from_env`] with an injectable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("LOCK_TIMEOUT_MS") {
            let ms: u64 = raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid("LOCK_TIMEOUT_MS", format!("{e}")))?;
            if ms == 0 {
                return Err(ConfigError::invalid("LOCK_TIMEOUT_MS", "must be positive"));
            }
            config.lock_timeout = Duration::from_millis(ms);
        }

        if let Some(raw) = lookup("CHECKOUT_SETTLEMENT") {
            config.settlement = raw.parse()?;
        }

        if let Some(raw) = lookup("DEFAULT_PAYMENT_METHOD") {
            config.default_payment_method = PaymentMethod::parse(&raw)
                .map_err(|e| ConfigError::invalid("DEFAULT_PAYMENT_METHOD", e.to_string()))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = ShopConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ShopConfig::default());
        assert_eq!(config.default_payment_method.as_str(), "card");
    }

    #[test]
    fn reads_all_keys() {
        let config = ShopConfig::from_lookup(lookup(&[
            ("LOCK_TIMEOUT_MS", "250"),
            ("CHECKOUT_SETTLEMENT", "Deferred"),
            ("DEFAULT_PAYMENT_METHOD", "cash"),
        ]))
        .unwrap();
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert_eq!(config.settlement, SettlementMode::Deferred);
        assert_eq!(config.default_payment_method.as_str(), "cash");
    }

    #[test]
    fn rejects_garbage() {
        assert!(ShopConfig::from_lookup(lookup(&[("LOCK_TIMEOUT_MS", "soon")])).is_err());
        assert!(ShopConfig::from_lookup(lookup(&[("LOCK_TIMEOUT_MS", "0")])).is_err());
        assert!(ShopConfig::from_lookup(lookup(&[("CHECKOUT_SETTLEMENT", "later")])).is_err());
    }
}
