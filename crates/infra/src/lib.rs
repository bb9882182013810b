//! Infrastructure layer: storage backends, configuration, and the services
//! that run every storefront operation inside one storage unit of work.

pub mod config;
pub mod error;
pub mod services;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, SettlementMode, ShopConfig};
pub use error::{ShopError, ShopResult};
pub use store::{InMemoryShopStore, PgShopStore, ShopStore, ShopTx, StoreError, StoreResult};
