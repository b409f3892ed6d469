//! Integration tests for the Ojasritu Wellness storefront client.
//!
//! The tests drive the public `Storefront` facade over the scripted
//! transport from `ojas_client::testing`, so they run without a backend.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p ojas-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `session_flows` - Sign-in, logout, re-validation and the route guard
//! - `cart_sync` - Optimistic cart changes against server confirmations
//! - `checkout` - Pre-booking and account endpoints

use std::sync::Arc;

use ojas_client::testing::MockTransport;
use ojas_client::{ClientConfig, Storefront};
use ojas_core::{Product, ProductId};
use rust_decimal::Decimal;
use serde_json::{Value, json};

/// A storefront over a fresh script that already serves CSRF tokens.
#[must_use]
pub fn storefront() -> (Storefront, Arc<MockTransport>) {
    let mock = MockTransport::new();
    mock.with_csrf();
    let storefront = Storefront::with_transport(ClientConfig::for_tests(), mock.clone());
    (storefront, mock)
}

/// The user the backend reports for a signed-in session.
#[must_use]
pub fn user_json() -> Value {
    json!({
        "id": 42,
        "username": "asha",
        "first_name": "Asha",
        "last_name": "Rao",
        "email": "asha@ojasritu.in"
    })
}

/// Cart payload with `(product_id, price, quantity)` lines.
#[must_use]
pub fn cart_body(lines: &[(i32, i64, u32)]) -> Value {
    let items: Vec<Value> = lines
        .iter()
        .map(|(id, price, quantity)| {
            json!({
                "product_id": id,
                "name": format!("Product {id}"),
                "price": format!("{price}.00"),
                "discount_price": null,
                "quantity": quantity,
                "image": null
            })
        })
        .collect();
    json!({ "items": items })
}

/// Catalog record for a product.
#[must_use]
pub fn product(id: i32, price: i64) -> Product {
    Product {
        id: ProductId::new(id),
        slug: format!("product-{id}"),
        name: format!("Product {id}"),
        price: Decimal::from(price),
        discount_price: None,
        image: None,
    }
}
