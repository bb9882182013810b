//! Process configuration for the API binary.

use std::net::SocketAddr;

use storefront_infra::{ConfigError, ShopConfig};

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// `None` runs on the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub run_migrations: bool,
    pub shop: ShopConfig,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| ConfigError::invalid("BIND_ADDR", format!("{e}")))?;

        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::invalid("DB_MAX_CONNECTIONS", format!("'{raw}' is not a positive integer")))?,
            None => 10,
        };

        let run_migrations = match lookup("RUN_MIGRATIONS").as_deref().map(str::trim) {
            None | Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(other) => {
                return Err(ConfigError::invalid(
                    "RUN_MIGRATIONS",
                    format!("'{other}' (expected true or false)"),
                ));
            }
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            database_url,
            max_connections,
            run_migrations,
            shop: ShopConfig::from_lookup(&lookup)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<ApiConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_run_in_memory_on_8080() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.database_url.is_none());
        assert_eq!(config.max_connections, 10);
        assert!(config.run_migrations);
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
    }

    #[test]
    fn invalid_values_fail_with_the_key_name() {
        let err = config(&[("DB_MAX_CONNECTIONS", "zero")]).unwrap_err();
        assert!(err.to_string().contains("DB_MAX_CONNECTIONS"));

        let err = config(&[("RUN_MIGRATIONS", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("RUN_MIGRATIONS"));

        let err = config(&[("CHECKOUT_SETTLEMENT", "later")]).unwrap_err();
        assert!(err.to_string().contains("CHECKOUT_SETTLEMENT"));
    }
}
