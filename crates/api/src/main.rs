use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use storefront_api::config::ApiConfig;
use storefront_infra::{InMemoryShopStore, PgShopStore, ShopStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    storefront_observability::init();

    let config = ApiConfig::from_env().context("invalid configuration")?;

    let store: Arc<dyn ShopStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
                .await
                .context("failed to connect to DATABASE_URL")?;
            let store = PgShopStore::new(pool, config.shop.lock_timeout);
            if config.run_migrations {
                store.migrate().await.context("failed to apply schema")?;
            }
            tracing::info!(max_connections = config.max_connections, "using postgres store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store");
            Arc::new(InMemoryShopStore::new(config.shop.lock_timeout))
        }
    };

    let app = storefront_api::app::build_app(config.jwt_secret.clone(), store, config.shop.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        settlement = ?config.shop.settlement,
        "listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
