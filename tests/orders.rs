mod common;

use std::collections::HashSet;
use std::sync::Arc;

use assert_matches::assert_matches;
use futures::future::join_all;
use rust_decimal_macros::dec;
use stationery_store::domain::events::{DomainEvent, OrderEvent};
use stationery_store::domain::{CustomerInfo, Identity, Money, OrderStatus, PriceTier, ShippingInfo};
use stationery_store::inventory::InventoryLedger;
use stationery_store::orders::NewOrder;
use stationery_store::sync::EntityType;
use stationery_store::StoreError;

use common::{price, stationery_catalog, stock, Gate, GatedStore, TestShop};

fn checkout_details() -> NewOrder {
    NewOrder {
        customer: CustomerInfo { full_name: "سارا احمدی".into(), email: None, phone: "09121234567".into() },
        shipping: ShippingInfo {
            province: "تهران".into(),
            city: "تهران".into(),
            address: "خیابان ولیعصر، پلاک ۱۲".into(),
            postal_code: "1234567890".into(),
            notes: None,
        },
        payment_method: Default::default(),
    }
}

fn session(id: &str) -> Identity {
    Identity::Anonymous(id.into())
}

#[tokio::test]
async fn small_wholesale_cart_is_blocked_by_the_minimum_order() {
    let shop = TestShop::synced().await;
    let pen = shop.product_id("100").await;
    let buyer = Identity::Registered(shop.wholesale_buyer().await);

    shop.cart.add(&buyer, pen, 12, None).await.unwrap();
    let totals = shop.cart.get(&buyer).await.unwrap().totals;
    assert_eq!(totals.subtotal, Money::new(dec!(18000)));
    assert_eq!(totals.discount, Money::ZERO);
    assert_eq!(totals.tax, Money::new(dec!(1620)));
    assert_eq!(totals.grand_total, Money::new(dec!(19620)));
    assert!(!totals.can_checkout);

    let err = shop.orders.create(&buyer, checkout_details()).await.unwrap_err();
    assert_matches!(err, StoreError::BelowMinimumOrder { .. });
    if let StoreError::BelowMinimumOrder { subtotal, minimum } = err {
        assert_eq!(subtotal, Money::new(dec!(18000)));
        assert_eq!(minimum, Money::new(dec!(500000)));
    }
    assert_eq!(shop.cart.get(&buyer).await.unwrap().items.len(), 1);
}

#[tokio::test]
async fn empty_cart_cannot_check_out() {
    let shop = TestShop::synced().await;
    let err = shop.orders.create(&session("s-empty"), checkout_details()).await.unwrap_err();
    assert_matches!(err, StoreError::EmptyCart);
}

#[tokio::test]
async fn missing_shipping_details_are_rejected() {
    let shop = TestShop::synced().await;
    let pen = shop.product_id("100").await;
    let buyer = session("s-details");
    shop.cart.add(&buyer, pen, 2, None).await.unwrap();

    let mut details = checkout_details();
    details.shipping.postal_code = "  ".into();
    let err = shop.orders.create(&buyer, details).await.unwrap_err();
    assert_matches!(err, StoreError::Validation(msg) if msg.contains("postal_code"));
}

#[tokio::test]
async fn checkout_reserves_stock_and_clears_the_cart() {
    let shop = TestShop::synced().await;
    let pen = shop.product_id("100").await;
    let buyer = session("s-checkout");
    let mut events = shop.events.subscribe();

    shop.cart.add(&buyer, pen, 2, None).await.unwrap();
    let order = shop.orders.create(&buyer, checkout_details()).await.unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.subtotal, Money::new(dec!(120000)));
    assert_eq!(order.tax_amount, Money::new(dec!(10800)));
    assert_eq!(order.total_amount, Money::new(dec!(130800)));
    assert_eq!(order.total_items, 2);
    assert_eq!(order.total_weight, dec!(50));

    let number = order.order_number.as_str();
    assert_eq!(number.len(), "ORD-20261018-00001".len());
    assert!(number.starts_with("ORD-"));
    assert!(number.ends_with("-00001"));

    let item = &order.items[0];
    assert_eq!(item.product_sku, "PEN-100");
    assert_eq!(item.tier, PriceTier::Retail);
    assert_eq!(item.unit_price, Money::new(dec!(60000)));
    assert_eq!(item.total_price, Money::new(dec!(120000)));
    assert_eq!(item.warehouse_id.as_deref(), Some("1"));

    assert!(shop.cart.get(&buyer).await.unwrap().items.is_empty());
    let ledger = InventoryLedger::new(shop.store.clone());
    assert_eq!(ledger.available(pen).await.unwrap(), 78);

    let event = events.recv().await.unwrap();
    assert_matches!(event, DomainEvent::Order(OrderEvent::Created { order_id, .. }) if order_id == order.id);
}

#[tokio::test]
async fn failed_reservation_writes_nothing() {
    let shop = TestShop::synced().await;
    let pen = shop.product_id("100").await;
    let notebook = shop.product_id("101").await;
    let buyer = session("s-partial");

    shop.cart.add(&buyer, notebook, 2, None).await.unwrap();
    // Allowed in the cart (80 in total) but no single warehouse holds 60.
    shop.cart.add(&buyer, pen, 60, None).await.unwrap();

    let err = shop.orders.create(&buyer, checkout_details()).await.unwrap_err();
    assert_matches!(err, StoreError::InsufficientStock { requested: 60, .. });

    assert_eq!(shop.cart.get(&buyer).await.unwrap().items.len(), 2);
    assert!(shop.orders.list(&buyer, 1, 20).await.unwrap().is_empty());
    let ledger = InventoryLedger::new(shop.store.clone());
    assert_eq!(ledger.available(notebook).await.unwrap(), 5);
    assert_eq!(ledger.available(pen).await.unwrap(), 80);
}

#[tokio::test]
async fn placed_orders_keep_their_prices_after_a_resync() {
    let shop = TestShop::synced().await;
    let pen = shop.product_id("100").await;
    let buyer = session("s-snapshot");

    shop.cart.add(&buyer, pen, 2, None).await.unwrap();
    let order = shop.orders.create(&buyer, checkout_details()).await.unwrap();

    shop.kara.update(|c| c.prices[0] = price(100, PriceTier::Retail, 75_000, 1));
    shop.reconciler.sync_entity(EntityType::Prices).await;

    let stored = shop.orders.get(order.id).await.unwrap();
    assert_eq!(stored.items[0].unit_price, Money::new(dec!(60000)));
    assert_eq!(stored.total_amount, order.total_amount);

    let fresh = shop.cart.add(&buyer, pen, 1, None).await.unwrap();
    assert_eq!(fresh.unit_price, Money::new(dec!(75000)));
}

#[tokio::test]
async fn cancelling_releases_stock_until_shipped() {
    let shop = TestShop::synced().await;
    let pen = shop.product_id("100").await;
    let ledger = InventoryLedger::new(shop.store.clone());

    let first = session("s-cancel-1");
    shop.cart.add(&first, pen, 3, None).await.unwrap();
    let order = shop.orders.create(&first, checkout_details()).await.unwrap();
    assert_eq!(ledger.available(pen).await.unwrap(), 77);

    shop.orders.update_status(order.id, "confirmed").await.unwrap();
    shop.orders.update_status(order.id, "processing").await.unwrap();
    let cancelled = shop.orders.cancel(order.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(ledger.available(pen).await.unwrap(), 80);

    let second = session("s-cancel-2");
    shop.cart.add(&second, pen, 1, None).await.unwrap();
    let shipped = shop.orders.create(&second, checkout_details()).await.unwrap();
    for status in ["confirmed", "processing", "shipped"] {
        shop.orders.update_status(shipped.id, status).await.unwrap();
    }
    let err = shop.orders.cancel(shipped.id).await.unwrap_err();
    assert_matches!(err, StoreError::InvalidTransition { from: OrderStatus::Shipped, to: OrderStatus::Cancelled });
    assert_eq!(ledger.available(pen).await.unwrap(), 79);
}

#[tokio::test]
async fn status_changes_follow_the_transition_table() {
    let shop = TestShop::synced().await;
    let pen = shop.product_id("100").await;
    let buyer = session("s-status");
    shop.cart.add(&buyer, pen, 1, None).await.unwrap();
    let order = shop.orders.create(&buyer, checkout_details()).await.unwrap();

    let err = shop.orders.update_status(order.id, "shipped").await.unwrap_err();
    assert_matches!(err, StoreError::InvalidTransition { from: OrderStatus::Pending, to: OrderStatus::Shipped });
    assert_matches!(shop.orders.update_status(order.id, "lost").await, Err(StoreError::Validation(_)));

    for (status, expected) in [
        ("confirmed", OrderStatus::Confirmed),
        ("processing", OrderStatus::Processing),
        ("shipped", OrderStatus::Shipped),
        ("delivered", OrderStatus::Delivered),
        ("returned", OrderStatus::Returned),
    ] {
        assert_eq!(shop.orders.update_status(order.id, status).await.unwrap().status, expected);
    }
    let err = shop.orders.update_status(order.id, "confirmed").await.unwrap_err();
    assert_matches!(err, StoreError::InvalidTransition { from: OrderStatus::Returned, .. });
}

#[tokio::test]
async fn cancelled_status_update_goes_through_cancel() {
    let shop = TestShop::synced().await;
    let notebook = shop.product_id("101").await;
    let buyer = session("s-status-cancel");
    shop.cart.add(&buyer, notebook, 2, None).await.unwrap();
    let order = shop.orders.create(&buyer, checkout_details()).await.unwrap();

    let cancelled = shop.orders.update_status(order.id, "cancelled").await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    let ledger = InventoryLedger::new(shop.store.clone());
    assert_eq!(ledger.available(notebook).await.unwrap(), 5);
}

#[tokio::test]
async fn order_numbers_count_up_within_a_day() {
    let shop = TestShop::synced().await;
    let pen = shop.product_id("100").await;
    let buyer = session("s-numbers");

    let mut numbers = Vec::new();
    for _ in 0..2 {
        shop.cart.add(&buyer, pen, 1, None).await.unwrap();
        numbers.push(shop.orders.create(&buyer, checkout_details()).await.unwrap().order_number);
    }
    assert!(numbers[0].as_str().ends_with("-00001"));
    assert!(numbers[1].as_str().ends_with("-00002"));
}

#[tokio::test]
async fn orders_are_visible_to_their_owner_only() {
    let shop = TestShop::synced().await;
    let pen = shop.product_id("100").await;
    let owner = session("s-owner");
    shop.cart.add(&owner, pen, 1, None).await.unwrap();
    let order = shop.orders.create(&owner, checkout_details()).await.unwrap();

    assert_eq!(shop.orders.get_for(&owner, order.id).await.unwrap().id, order.id);
    let err = shop.orders.get_for(&session("s-other"), order.id).await.unwrap_err();
    assert_matches!(err, StoreError::NotFound { entity: "Order", .. });

    assert_eq!(shop.orders.list(&owner, 1, 20).await.unwrap().len(), 1);
    assert!(shop.orders.list(&session("s-other"), 1, 20).await.unwrap().is_empty());
}

#[tokio::test]
async fn last_unit_goes_to_exactly_one_checkout() {
    let mut catalog = stationery_catalog();
    catalog.inventory = vec![stock(100, "1", 1), stock(101, "1", 5)];
    let shop = TestShop::over(catalog, |store| Arc::new(GatedStore::new(store, Gate::OrderCommit, 3)));
    shop.reconciler.full_sync().await;
    let pen = shop.product_id("100").await;

    let buyers: Vec<Identity> = (0..3).map(|i| session(&format!("s-last-{i}"))).collect();
    for buyer in &buyers {
        shop.cart.add(buyer, pen, 1, None).await.unwrap();
    }

    let results = join_all(buyers.iter().map(|buyer| shop.orders.create(buyer, checkout_details()))).await;
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_matches!(err, StoreError::InsufficientStock { requested: 1, .. });
    }

    let ledger = InventoryLedger::new(shop.store.clone());
    assert_eq!(ledger.available(pen).await.unwrap(), 0);
    let mut carts_left = 0;
    for buyer in &buyers {
        carts_left += shop.cart.get(buyer).await.unwrap().items.len();
    }
    assert_eq!(carts_left, 2);
}

#[tokio::test]
async fn concurrent_checkouts_get_distinct_numbers() {
    let shop = TestShop::over(stationery_catalog(), |store| Arc::new(GatedStore::new(store, Gate::OrderCommit, 4)));
    shop.reconciler.full_sync().await;
    let pen = shop.product_id("100").await;

    let buyers: Vec<Identity> = (0..4).map(|i| session(&format!("s-number-{i}"))).collect();
    for buyer in &buyers {
        shop.cart.add(buyer, pen, 1, None).await.unwrap();
    }

    let orders = join_all(buyers.iter().map(|buyer| shop.orders.create(buyer, checkout_details()))).await;
    let numbers: HashSet<String> =
        orders.into_iter().map(|o| o.unwrap().order_number.as_str().to_owned()).collect();
    assert_eq!(numbers.len(), 4);
    for suffix in ["-00001", "-00002", "-00003", "-00004"] {
        assert!(numbers.iter().any(|n| n.ends_with(suffix)), "no order ends with {suffix}: {numbers:?}");
    }
}
