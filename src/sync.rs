//! Catalog reconciler.
//!
//! Pulls Kara records and upserts them keyed on the external id. A failing
//! record is counted and logged; the rest of the batch carries on. A full run
//! walks the entity types in foreign-key order, and an entity type whose
//! fetch fails is reported as failed without stopping the others. Every run
//! of an entity type appends one sync log entry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{
    BrandRecord, CatalogError, CatalogSource, CategoryRecord, Fetched, PriceRecord, ProductRecord, RejectedRecord, StockRecord,
};
use crate::domain::events::{DomainEvent, SyncEvent};
use crate::domain::{slugify, Money, Sku};
use crate::events::EventPublisher;
use crate::store::{
    BrandUpsert, CategoryUpsert, InventoryUpsert, PriceUpsert, ProductUpsert, Store, SyncLogEntry, SyncStatus,
};
use crate::{Result, StoreError};

pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Failures listed in a sync log entry's detail before it is cut short.
const LOG_DETAIL_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Categories,
    Brands,
    Products,
    Prices,
    Inventory,
}

impl EntityType {
    /// Foreign-key order: referenced types come first.
    pub const ALL: [EntityType; 5] = [Self::Categories, Self::Brands, Self::Products, Self::Prices, Self::Inventory];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::Brands => "brands",
            Self::Products => "products",
            Self::Prices => "prices",
            Self::Inventory => "inventory",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// One batch of upstream records of a single entity type.
#[derive(Debug, Clone)]
pub enum ExternalBatch {
    Categories(Vec<CategoryRecord>),
    Brands(Vec<BrandRecord>),
    Products(Vec<ProductRecord>),
    Prices(Vec<PriceRecord>),
    Inventory(Vec<StockRecord>),
}

impl ExternalBatch {
    pub fn entity(&self) -> EntityType {
        match self {
            Self::Categories(_) => EntityType::Categories,
            Self::Brands(_) => EntityType::Brands,
            Self::Products(_) => EntityType::Products,
            Self::Prices(_) => EntityType::Prices,
            Self::Inventory(_) => EntityType::Inventory,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    pub external_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub entity: EntityType,
    pub status: SyncStatus,
    pub synced: u32,
    pub failed: u32,
    pub errors: Vec<RecordFailure>,
    /// Set when the batch could not be fetched or prepared at all.
    pub fetch_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullSyncReport {
    pub reports: Vec<SyncReport>,
    pub synced: u32,
    pub failed: u32,
}

impl FullSyncReport {
    pub fn failed_entities(&self) -> Vec<EntityType> {
        self.reports.iter().filter(|r| r.status == SyncStatus::Failed).map(|r| r.entity).collect()
    }
}

type Outcome<T> = (String, Result<T>);

pub struct Reconciler {
    source: Arc<dyn CatalogSource>,
    store: Arc<dyn Store>,
    events: EventPublisher,
    concurrency: usize,
    fetch_timeout: Duration,
}

impl Reconciler {
    pub fn new(source: Arc<dyn CatalogSource>, store: Arc<dyn Store>, events: EventPublisher) -> Self {
        Self { source, store, events, concurrency: DEFAULT_CONCURRENCY, fetch_timeout: DEFAULT_FETCH_TIMEOUT }
    }

    /// Record upserts in flight at once within one entity type.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Upper bound on a single upstream fetch.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Sync every entity type in dependency order.
    pub async fn full_sync(&self) -> FullSyncReport {
        tracing::info!("Starting full catalog sync");
        let mut reports = Vec::with_capacity(EntityType::ALL.len());
        for entity in EntityType::ALL {
            reports.push(self.sync_entity(entity).await);
        }

        let report = FullSyncReport {
            synced: reports.iter().map(|r| r.synced).sum(),
            failed: reports.iter().map(|r| r.failed).sum(),
            reports,
        };
        let failed_entities = report.failed_entities();
        tracing::info!(synced = report.synced, failed = report.failed, ?failed_entities, "Full catalog sync finished");

        self.events
            .publish(DomainEvent::Sync(SyncEvent::Completed {
                synced: report.synced,
                failed: report.failed,
                failed_entities: failed_entities.iter().map(|e| e.as_str().to_string()).collect(),
            }))
            .await;
        report
    }

    /// Fetch one entity type from upstream and reconcile it.
    pub async fn sync_entity(&self, entity: EntityType) -> SyncReport {
        let started_at = Utc::now();
        match self.fetch(entity).await {
            Ok((batch, rejected)) => self.reconcile_from(batch, rejected, started_at).await,
            Err(e) => {
                tracing::error!(%entity, error = %e, "Fetch from Kara failed");
                self.fail_whole(entity, started_at, e.to_string()).await
            }
        }
    }

    /// Upsert a batch that is already in hand.
    pub async fn reconcile(&self, batch: ExternalBatch) -> SyncReport {
        self.reconcile_from(batch, Vec::new(), Utc::now()).await
    }

    pub async fn recent_logs(&self, limit: i64) -> Result<Vec<SyncLogEntry>> { self.store.list_sync_logs(limit).await }

    async fn fetch(&self, entity: EntityType) -> std::result::Result<(ExternalBatch, Vec<RejectedRecord>), CatalogError> {
        let source = self.source.as_ref();
        match entity {
            EntityType::Categories => self.bounded(source.fetch_categories()).await.map(|f| split(f, ExternalBatch::Categories)),
            EntityType::Brands => self.bounded(source.fetch_brands()).await.map(|f| split(f, ExternalBatch::Brands)),
            EntityType::Products => self.bounded(source.fetch_products()).await.map(|f| split(f, ExternalBatch::Products)),
            EntityType::Prices => self.bounded(source.fetch_prices()).await.map(|f| split(f, ExternalBatch::Prices)),
            EntityType::Inventory => self.bounded(source.fetch_inventory()).await.map(|f| split(f, ExternalBatch::Inventory)),
        }
    }

    async fn bounded<T, F>(&self, fetch: F) -> std::result::Result<T, CatalogError>
    where
        F: Future<Output = std::result::Result<T, CatalogError>>,
    {
        tokio::time::timeout(self.fetch_timeout, fetch)
            .await
            .unwrap_or(Err(CatalogError::Timeout(self.fetch_timeout)))
    }

    /// Upsert `batch`; records that never decoded count as failures of the run.
    async fn reconcile_from(&self, batch: ExternalBatch, rejected: Vec<RejectedRecord>, started_at: DateTime<Utc>) -> SyncReport {
        let entity = batch.entity();
        let outcomes = match batch {
            ExternalBatch::Categories(records) => self.sync_categories(records).await,
            ExternalBatch::Brands(records) => self.sync_brands(records).await,
            ExternalBatch::Products(records) => self.sync_products(records).await,
            ExternalBatch::Prices(records) => self.sync_prices(records, started_at).await,
            ExternalBatch::Inventory(records) => self.sync_inventory(records).await,
        };
        match outcomes {
            Ok(outcomes) => {
                let undecodable = rejected
                    .into_iter()
                    .map(|r| (r.key, Err(StoreError::Validation(format!("malformed record: {}", r.error)))));
                self.finish(entity, started_at, undecodable.chain(outcomes).collect()).await
            }
            Err(e) => {
                tracing::error!(%entity, error = %e, "Could not prepare batch");
                self.fail_whole(entity, started_at, e.to_string()).await
            }
        }
    }

    async fn upsert_all<T, F, Fut>(&self, records: Vec<T>, upsert: F) -> Vec<Outcome<()>>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Outcome<()>>,
    {
        stream::iter(records).map(upsert).buffer_unordered(self.concurrency).collect().await
    }

    async fn sync_categories(&self, records: Vec<CategoryRecord>) -> Result<Vec<Outcome<()>>> {
        let mut known = self.store.category_ids_by_external().await?;
        let store = self.store.as_ref();

        // Pass 1: upsert everything, linking parents that already exist locally.
        let first: Vec<(CategoryRecord, Result<Uuid>)> = {
            let known = &known;
            stream::iter(records)
                .map(|record| async move {
                    let parent_id = record.parent_id.as_ref().and_then(|p| known.get(p.as_str()).copied());
                    let input = CategoryUpsert {
                        external_id: record.id.to_string(),
                        name: record.name.trim().to_string(),
                        slug: slugify(&record.name, record.id.as_str()),
                        description: record.description.clone(),
                        parent_id,
                        is_active: record.is_active,
                    };
                    let result = store.upsert_category(&input).await.map(|c| c.id);
                    (record, result)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await
        };

        for (record, result) in &first {
            if let Ok(id) = result {
                known.insert(record.id.to_string(), *id);
            }
        }

        // Pass 2: parents that arrived later in the same batch.
        let mut outcomes = Vec::with_capacity(first.len());
        for (record, result) in first {
            let external_id = record.id.to_string();
            let id = match result {
                Ok(id) => id,
                Err(e) => {
                    outcomes.push((external_id, Err(e)));
                    continue;
                }
            };
            let Some(parent) = record.parent_id else {
                outcomes.push((external_id, Ok(())));
                continue;
            };
            let outcome = match known.get(parent.as_str()) {
                Some(&parent_id) => store.set_category_parent(id, Some(parent_id)).await,
                None => {
                    tracing::warn!(category = %external_id, %parent, "Parent category unknown, left unlinked");
                    Ok(())
                }
            };
            outcomes.push((external_id, outcome));
        }
        Ok(outcomes)
    }

    async fn sync_brands(&self, records: Vec<BrandRecord>) -> Result<Vec<Outcome<()>>> {
        let store = self.store.as_ref();
        Ok(self
            .upsert_all(records, |record| async move {
                let input = BrandUpsert {
                    external_id: record.id.to_string(),
                    name: record.name.trim().to_string(),
                    slug: slugify(&record.name, record.id.as_str()),
                    description: record.description,
                    country: record.country,
                    is_active: record.is_active,
                };
                let result = store.upsert_brand(&input).await.map(|_| ());
                (input.external_id, result)
            })
            .await)
    }

    async fn sync_products(&self, records: Vec<ProductRecord>) -> Result<Vec<Outcome<()>>> {
        let categories = self.store.category_ids_by_external().await?;
        let brands = self.store.brand_ids_by_external().await?;
        let (store, categories, brands) = (self.store.as_ref(), &categories, &brands);

        Ok(self
            .upsert_all(records, |record| async move {
                let external_id = record.id.to_string();
                let result = async {
                    let input = product_input(&record, categories, brands)?;
                    store.upsert_product(&input).await.map(|_| ())
                }
                .await;
                (external_id, result)
            })
            .await)
    }

    async fn sync_prices(&self, records: Vec<PriceRecord>, started_at: DateTime<Utc>) -> Result<Vec<Outcome<()>>> {
        let products = self.store.product_ids_by_external().await?;
        let (store, products) = (self.store.as_ref(), &products);

        Ok(self
            .upsert_all(records, |record| async move {
                let key = format!("{}/{}/{}", record.product_id, record.price_type, record.min_quantity);
                let result = async {
                    let product_id = lookup(products, "product", record.product_id.as_str())?;
                    if record.price < Decimal::ZERO {
                        return Err(StoreError::Validation(format!("negative price {}", record.price)));
                    }
                    if record.min_quantity < 1 {
                        return Err(StoreError::Validation(format!("min_quantity {} below 1", record.min_quantity)));
                    }
                    let input = PriceUpsert {
                        product_id,
                        tier: record.price_type,
                        price: Money::new(record.price),
                        compare_price: record.compare_price.map(Money::new),
                        min_quantity: record.min_quantity,
                        effective_from: record.effective_from.unwrap_or(started_at),
                    };
                    store.upsert_price(&input).await.map(|_| ())
                }
                .await;
                (key, result)
            })
            .await)
    }

    async fn sync_inventory(&self, records: Vec<StockRecord>) -> Result<Vec<Outcome<()>>> {
        let products = self.store.product_ids_by_external().await?;
        let (store, products) = (self.store.as_ref(), &products);

        Ok(self
            .upsert_all(records, |record| async move {
                let key = format!("{}@{}", record.product_id, record.warehouse_id);
                let result = async {
                    let product_id = lookup(products, "product", record.product_id.as_str())?;
                    if record.quantity < 0 {
                        return Err(StoreError::Validation(format!("negative quantity {}", record.quantity)));
                    }
                    let input = InventoryUpsert {
                        product_id,
                        warehouse_id: record.warehouse_id.to_string(),
                        on_hand: record.quantity,
                        min_stock_level: record.min_stock_level.max(0),
                    };
                    let stored = store.upsert_inventory(&input).await?;
                    if stored.on_hand < stored.reserved {
                        tracing::warn!(
                            %product_id,
                            warehouse = %stored.warehouse_id,
                            on_hand = stored.on_hand,
                            reserved = stored.reserved,
                            "Upstream stock is below local reservations"
                        );
                    } else if stored.is_low() {
                        tracing::info!(%product_id, warehouse = %stored.warehouse_id, available = stored.available(), "Stock at or below reorder level");
                    }
                    Ok(())
                }
                .await;
                (key, result)
            })
            .await)
    }

    async fn finish(&self, entity: EntityType, started_at: DateTime<Utc>, outcomes: Vec<Outcome<()>>) -> SyncReport {
        let mut synced = 0u32;
        let mut errors = Vec::new();
        for (external_id, result) in outcomes {
            match result {
                Ok(()) => synced += 1,
                Err(e) => {
                    tracing::error!(%entity, external_id = %external_id, error = %e, "Record failed to sync");
                    errors.push(RecordFailure { external_id, error: e.to_string() });
                }
            }
        }
        let failed = errors.len() as u32;
        let status = match (synced, failed) {
            (_, 0) => SyncStatus::Success,
            (0, _) => SyncStatus::Failed,
            _ => SyncStatus::Partial,
        };

        let detail = (!errors.is_empty()).then(|| {
            let mut parts: Vec<String> =
                errors.iter().take(LOG_DETAIL_LIMIT).map(|f| format!("{}: {}", f.external_id, f.error)).collect();
            if errors.len() > LOG_DETAIL_LIMIT {
                parts.push(format!("... and {} more", errors.len() - LOG_DETAIL_LIMIT));
            }
            parts.join("; ")
        });

        let report = SyncReport { entity, status, synced, failed, errors, fetch_error: None, started_at, finished_at: Utc::now() };
        self.write_log(&report, detail).await;
        tracing::info!(%entity, status = status.as_str(), synced, failed, "Entity sync finished");
        report
    }

    async fn fail_whole(&self, entity: EntityType, started_at: DateTime<Utc>, error: String) -> SyncReport {
        let report = SyncReport {
            entity,
            status: SyncStatus::Failed,
            synced: 0,
            failed: 0,
            errors: Vec::new(),
            fetch_error: Some(error.clone()),
            started_at,
            finished_at: Utc::now(),
        };
        self.write_log(&report, Some(error)).await;
        report
    }

    async fn write_log(&self, report: &SyncReport, error_detail: Option<String>) {
        let entry = SyncLogEntry {
            id: Uuid::now_v7(),
            entity_type: report.entity.as_str().to_string(),
            status: report.status,
            records_synced: report.synced as i32,
            records_failed: report.failed as i32,
            error_detail,
            started_at: report.started_at,
            finished_at: report.finished_at,
        };
        if let Err(e) = self.store.append_sync_log(&entry).await {
            tracing::error!(entity = %report.entity, error = %e, "Failed to write sync log");
        }
    }
}

fn split<T>(fetched: Fetched<T>, batch: fn(Vec<T>) -> ExternalBatch) -> (ExternalBatch, Vec<RejectedRecord>) {
    (batch(fetched.records), fetched.rejected)
}

fn lookup(ids: &HashMap<String, Uuid>, kind: &str, external_id: &str) -> Result<Uuid> {
    ids.get(external_id)
        .copied()
        .ok_or_else(|| StoreError::Validation(format!("unknown {kind} {external_id}")))
}

fn product_input(
    record: &ProductRecord,
    categories: &HashMap<String, Uuid>,
    brands: &HashMap<String, Uuid>,
) -> Result<ProductUpsert> {
    let sku = Sku::new(record.sku.clone()).map_err(|e| StoreError::Validation(format!("sku {:?}: {e}", record.sku)))?;
    let category_id = lookup(categories, "category", record.category_id.as_str())?;
    let brand_id = record.brand_id.as_ref().map(|b| lookup(brands, "brand", b.as_str())).transpose()?;
    if record.weight.is_some_and(|w| w < Decimal::ZERO) {
        return Err(StoreError::Validation("negative weight".into()));
    }
    Ok(ProductUpsert {
        external_id: record.id.to_string(),
        name: record.name.trim().to_string(),
        sku,
        barcode: record.barcode.clone().filter(|b| !b.trim().is_empty()),
        description: record.description.clone(),
        category_id,
        brand_id,
        is_active: record.is_active,
        weight: record.weight,
        dimensions: record.dimensions_text(),
    })
}
