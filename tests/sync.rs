mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use stationery_store::catalog::CatalogError;
use stationery_store::domain::events::{DomainEvent, SyncEvent};
use stationery_store::domain::{Money, PriceTier, UserClass};
use stationery_store::inventory::InventoryLedger;
use stationery_store::store::{Store, SyncStatus};
use stationery_store::sync::{EntityType, ExternalBatch};

use common::{price, product, stationery_catalog, stock, Catalog, TestShop};

#[tokio::test]
async fn full_sync_imports_every_entity_type() {
    let shop = TestShop::new(stationery_catalog());
    let mut events = shop.events.subscribe();

    let report = shop.reconciler.full_sync().await;

    assert_eq!(report.reports.len(), 5);
    assert!(report.reports.iter().all(|r| r.status == SyncStatus::Success));
    assert_eq!(report.synced, 2 + 1 + 2 + 5 + 3);
    assert_eq!(report.failed, 0);

    let products = shop.store.product_ids_by_external().await.unwrap();
    assert_eq!(products.len(), 2);

    let event = events.recv().await.unwrap();
    assert_matches!(event, DomainEvent::Sync(SyncEvent::Completed { synced: 13, failed: 0, .. }));
}

#[tokio::test]
async fn child_category_listed_before_parent_is_linked() {
    let shop = TestShop::synced().await;

    let categories = shop.store.list_categories().await.unwrap();
    let parent = categories.iter().find(|c| c.external_id.as_deref() == Some("1")).unwrap();
    let child = categories.iter().find(|c| c.external_id.as_deref() == Some("2")).unwrap();

    assert_eq!(child.parent_id, Some(parent.id));
    assert_eq!(parent.parent_id, None);
    assert_eq!(child.slug, "خودکار-2");
}

#[tokio::test]
async fn duplicate_sku_fails_one_record_and_keeps_the_rest() {
    let mut catalog = stationery_catalog();
    catalog.products = (0..10).map(|i| product(200 + i, &format!("SKU-{i}"), &format!("مداد {i}"), 1)).collect();
    catalog.products[7].sku = "SKU-3".into();
    let shop = TestShop::new(catalog);

    shop.reconciler.sync_entity(EntityType::Categories).await;
    let report = shop.reconciler.sync_entity(EntityType::Products).await;

    assert_eq!(report.status, SyncStatus::Partial);
    assert_eq!(report.synced, 9);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors.len(), 1);

    let logs = shop.store.list_sync_logs(10).await.unwrap();
    let log = logs.iter().find(|l| l.entity_type == "products").unwrap();
    assert_eq!(log.status, SyncStatus::Partial);
    assert_eq!((log.records_synced, log.records_failed), (9, 1));
    assert!(log.error_detail.as_deref().unwrap().contains("SKU-3"));
}

#[tokio::test]
async fn malformed_upstream_record_fails_alone() {
    let shop = TestShop::new(stationery_catalog());
    shop.kara.push_raw(EntityType::Prices, json!({"product_id": 101, "price_type": "special", "price": 40000}));
    shop.kara.push_raw(EntityType::Prices, json!({"product_id": 100, "price_type": "retail", "price": "n/a"}));

    let report = shop.reconciler.full_sync().await;
    let prices = report.reports.iter().find(|r| r.entity == EntityType::Prices).unwrap();

    assert_eq!(prices.status, SyncStatus::Partial);
    assert_eq!((prices.synced, prices.failed), (5, 2));
    assert!(prices.fetch_error.is_none());
    assert_eq!(prices.errors[0].external_id, "101");
    assert!(prices.errors[0].error.contains("special"));

    let logs = shop.store.list_sync_logs(10).await.unwrap();
    let log = logs.iter().find(|l| l.entity_type == "prices").unwrap();
    assert_eq!((log.records_synced, log.records_failed), (5, 2));

    let pen = shop.product_id("100").await;
    let listing = shop.products.get(pen, UserClass::B2c).await.unwrap();
    assert_eq!(listing.price, Some(Money::units(60_000)));
}

#[tokio::test]
async fn failed_fetch_does_not_stop_other_entity_types() {
    let shop = TestShop::new(stationery_catalog());
    shop.kara.fail(EntityType::Brands);

    let report = shop.reconciler.full_sync().await;

    assert_eq!(report.failed_entities(), vec![EntityType::Brands]);
    let brands = report.reports.iter().find(|r| r.entity == EntityType::Brands).unwrap();
    assert!(brands.fetch_error.as_deref().unwrap().contains("503"));

    // The pen references the missing brand; the notebook does not.
    let products = report.reports.iter().find(|r| r.entity == EntityType::Products).unwrap();
    assert_eq!(products.status, SyncStatus::Partial);
    assert_eq!((products.synced, products.failed), (1, 1));

    let logs = shop.store.list_sync_logs(10).await.unwrap();
    assert_eq!(logs.len(), 5);
    let brand_log = logs.iter().find(|l| l.entity_type == "brands").unwrap();
    assert_eq!(brand_log.status, SyncStatus::Failed);
}

#[tokio::test]
async fn slow_upstream_fetch_times_out() {
    let shop = TestShop::new(stationery_catalog());
    shop.kara.delay_by(Duration::from_millis(200));
    let reconciler = shop.reconciler.with_fetch_timeout(Duration::from_millis(20));

    let report = reconciler.sync_entity(EntityType::Categories).await;

    assert_eq!(report.status, SyncStatus::Failed);
    let expected = CatalogError::Timeout(Duration::from_millis(20)).to_string();
    assert_eq!(report.fetch_error.as_deref(), Some(expected.as_str()));
}

#[tokio::test]
async fn records_pointing_at_unknown_products_are_rejected() {
    let mut catalog = stationery_catalog();
    catalog.prices.push(price(999, PriceTier::Retail, 10_000, 1));
    catalog.inventory.push(stock(999, "1", 4));
    let shop = TestShop::new(catalog);

    let report = shop.reconciler.full_sync().await;

    let prices = report.reports.iter().find(|r| r.entity == EntityType::Prices).unwrap();
    assert_eq!((prices.synced, prices.failed), (5, 1));
    assert_eq!(prices.errors[0].external_id, "999/retail/1");
    let inventory = report.reports.iter().find(|r| r.entity == EntityType::Inventory).unwrap();
    assert_eq!((inventory.synced, inventory.failed), (3, 1));
}

#[tokio::test]
async fn resync_updates_on_hand_but_keeps_reservations() {
    let shop = TestShop::synced().await;
    let pen = shop.product_id("100").await;
    let ledger = InventoryLedger::new(shop.store.clone());

    let reservation = ledger.reserve(pen, 10).await.unwrap();
    assert_eq!(reservation.warehouse_id, "1");

    shop.kara.update(|c| c.inventory = vec![stock(100, "1", 40), stock(100, "2", 30), stock(101, "1", 5)]);
    shop.reconciler.sync_entity(EntityType::Inventory).await;

    let records = shop.store.inventory_for(&[pen]).await.unwrap();
    let first = records.iter().find(|r| r.warehouse_id == "1").unwrap();
    assert_eq!((first.on_hand, first.reserved), (40, 10));
    assert_eq!(ledger.available(pen).await.unwrap(), 30 + 30);
}

#[tokio::test]
async fn reconcile_accepts_a_batch_in_hand() {
    let shop = TestShop::new(Catalog::default());
    let report = shop
        .reconciler
        .reconcile(ExternalBatch::Categories(vec![common::category(5, "کاغذ A4", None)]))
        .await;

    assert_eq!(report.status, SyncStatus::Success);
    assert_eq!(report.synced, 1);
    let logs = shop.reconciler.recent_logs(5).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].entity_type, "categories");
}
