//! Stationery store - storefront API and Kara catalog sync
//!
//! `stationery-store` serves the API. `stationery-store sync` runs one full
//! catalog sync and exits, for cron-style schedulers.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stationery_store::api::{self, AppState};
use stationery_store::catalog::{CatalogSource, KaraClient};
use stationery_store::config::StoreConfig;
use stationery_store::events::EventPublisher;
use stationery_store::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = StoreConfig::from_env()?;
    let store = connect_store(&config).await?;
    let source: Arc<dyn CatalogSource> = Arc::new(KaraClient::new(&config.kara)?);
    let events = EventPublisher::new(connect_nats(config.nats_url.as_deref()).await);
    let state = AppState::new(store, source, events, &config);

    match std::env::args().nth(1).as_deref() {
        None | Some("serve") => serve(state, &config).await,
        Some("sync") => {
            let report = state.reconciler.full_sync().await;
            let failed = report.failed_entities();
            if failed.is_empty() {
                Ok(())
            } else {
                anyhow::bail!("catalog sync failed for {failed:?}")
            }
        }
        Some(other) => anyhow::bail!("unknown command {other:?}, expected `serve` or `sync`"),
    }
}

async fn serve(state: AppState, config: &StoreConfig) -> Result<()> {
    let app = api::router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;
    tracing::info!("Stationery store listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn connect_store(config: &StoreConfig) -> Result<Arc<dyn Store>> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    };
    let pool = PgPoolOptions::new().max_connections(10).connect(url).await.context("connecting to Postgres")?;
    let store = PgStore::new(pool);
    store.migrate().await.context("running migrations")?;
    Ok(Arc::new(store))
}

async fn connect_nats(url: Option<&str>) -> Option<async_nats::Client> {
    let url = url?;
    match async_nats::connect(url).await {
        Ok(client) => {
            tracing::info!(url, "Connected to NATS");
            Some(client)
        }
        Err(e) => {
            tracing::warn!(error = %e, url, "NATS unavailable, events stay in-process");
            None
        }
    }
}
