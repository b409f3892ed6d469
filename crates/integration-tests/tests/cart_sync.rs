//! Cart synchronization through the storefront facade.

#![allow(clippy::unwrap_used)]

use ojas_client::http::{ApiErrorKind, endpoints};
use ojas_core::{ProductId, Quantity, SyncState};
use ojas_integration_tests::{cart_body, product, storefront};
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::json;

#[tokio::test]
async fn test_adding_same_product_twice_sums_quantity_and_total() {
    let (storefront, mock) = storefront();
    mock.reply(Method::POST, endpoints::CART_ADD, 200, cart_body(&[(1, 500, 1)]));
    mock.reply(Method::POST, endpoints::CART_ADD, 200, cart_body(&[(1, 500, 3)]));
    let p1 = product(1, 500);

    storefront.cart().add_item(&p1, Quantity::ONE).await.unwrap();
    storefront
        .cart()
        .add_item(&p1, Quantity::new(2).unwrap())
        .await
        .unwrap();

    let cart = storefront.cart().snapshot();
    assert_eq!(cart.lines.len(), 1);
    assert_eq!(cart.line(ProductId::new(1)).unwrap().quantity.get(), 3);
    assert_eq!(cart.total_count(), 3);
    assert_eq!(cart.total_price(), Decimal::from(1500));
    assert_eq!(cart.total().to_string(), "₹1500.00");

    let bodies: Vec<_> = mock
        .requests_to(endpoints::CART_ADD)
        .iter()
        .map(|r| r.json_body().cloned().unwrap())
        .collect();
    assert_eq!(
        bodies,
        vec![
            json!({"product_id": 1, "quantity": 1}),
            json!({"product_id": 1, "quantity": 2})
        ]
    );
}

#[tokio::test]
async fn test_failed_add_rolls_back_to_identical_lines() {
    let (storefront, mock) = storefront();
    mock.reply(Method::GET, endpoints::CART, 200, cart_body(&[(4, 250, 2), (9, 90, 1)]));
    mock.reply(Method::POST, endpoints::CART_ADD, 503, json!({"detail": "Service unavailable"}));
    mock.fail(Method::POST, endpoints::CART_ADD);

    let before = storefront.cart().refresh().await.unwrap().lines;

    let err = storefront
        .cart()
        .add_item(&product(4, 250), Quantity::ONE)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ApiErrorKind::ServerFault);
    assert_eq!(storefront.cart().snapshot().lines, before);

    let err = storefront
        .cart()
        .add_item(&product(11, 40), Quantity::ONE)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ApiErrorKind::Network);

    let after = storefront.cart().snapshot();
    assert_eq!(after.lines, before);
    assert_eq!(after.sync_state, SyncState::Error);
}

#[tokio::test]
async fn test_late_confirmation_of_superseded_update_is_ignored() {
    let (storefront, mock) = storefront();
    mock.reply(Method::GET, endpoints::CART, 200, cart_body(&[(1, 500, 1)]));
    let first = mock.defer(Method::POST, endpoints::CART_UPDATE);
    let second = mock.defer(Method::POST, endpoints::CART_UPDATE);
    storefront.cart().refresh().await.unwrap();

    let op1 = tokio::spawn({
        let storefront = storefront.clone();
        async move { storefront.cart().update_quantity(ProductId::new(1), 4).await }
    });
    // refresh, CSRF bootstrap, first update
    mock.wait_for_requests(3).await;
    let op2 = tokio::spawn({
        let storefront = storefront.clone();
        async move { storefront.cart().update_quantity(ProductId::new(1), 2).await }
    });
    mock.wait_for_requests(4).await;

    second.respond(200, cart_body(&[(1, 500, 2)]));
    op2.await.unwrap().unwrap();
    first.respond(200, cart_body(&[(1, 500, 4)]));
    op1.await.unwrap().unwrap();

    let cart = storefront.cart().snapshot();
    assert_eq!(cart.line(ProductId::new(1)).unwrap().quantity.get(), 2);
    assert_eq!(cart.total_price(), Decimal::from(1000));
    assert_eq!(cart.sync_state, SyncState::Idle);
}

#[tokio::test]
async fn test_setting_quantity_to_zero_removes_line() {
    let (storefront, mock) = storefront();
    mock.reply(Method::GET, endpoints::CART, 200, cart_body(&[(1, 500, 1), (2, 300, 1)]));
    mock.reply(Method::POST, endpoints::CART_REMOVE, 200, cart_body(&[(2, 300, 1)]));
    storefront.cart().refresh().await.unwrap();

    let cart = storefront
        .cart()
        .update_quantity(ProductId::new(1), 0)
        .await
        .unwrap();

    assert!(cart.line(ProductId::new(1)).is_none());
    assert_eq!(cart.total_count(), 1);
    assert_eq!(mock.requests_to(endpoints::CART_REMOVE).len(), 1);
}

#[tokio::test]
async fn test_stock_conflict_refetches_cart() {
    let (storefront, mock) = storefront();
    mock.reply(Method::GET, endpoints::CART, 200, cart_body(&[(1, 500, 1)]));
    mock.reply(
        Method::POST,
        endpoints::CART_UPDATE,
        409,
        json!({"error": "Only 1 left in stock"}),
    );
    mock.reply(Method::GET, endpoints::CART, 200, cart_body(&[(1, 500, 1)]));
    storefront.cart().refresh().await.unwrap();

    let err = storefront
        .cart()
        .update_quantity(ProductId::new(1), 5)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ApiErrorKind::Conflict);
    assert_eq!(mock.requests_to(endpoints::CART).len(), 2);
    let cart = storefront.cart().snapshot();
    assert_eq!(cart.total_count(), 1);
    assert_eq!(cart.sync_state, SyncState::Idle);
}

#[tokio::test]
async fn test_subscribers_observe_optimistic_then_confirmed_state() {
    let (storefront, mock) = storefront();
    let pending = mock.defer(Method::POST, endpoints::CART_ADD);
    let mut rx = storefront.cart().subscribe();

    let add = tokio::spawn({
        let storefront = storefront.clone();
        async move {
            storefront
                .cart()
                .add_item(&product(3, 80), Quantity::new(2).unwrap())
                .await
        }
    });
    rx.changed().await.unwrap();
    {
        let optimistic = rx.borrow_and_update();
        assert_eq!(optimistic.total_count(), 2);
        assert_eq!(optimistic.sync_state, SyncState::Stale);
    }

    mock.wait_for_requests(2).await;
    pending.respond(200, cart_body(&[(3, 80, 2)]));
    add.await.unwrap().unwrap();

    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().sync_state, SyncState::Idle);
}
