//! Conversions from backend cart payloads to `CartLine`s.
//!
//! Accepted shapes: `{"items": [...]}`, `{"lines": [...]}`, either of those
//! wrapped in `{"cart": ...}`, or a bare array of lines.

use std::collections::HashSet;

use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use ojas_core::{CartLine, ProductId, Quantity};

use crate::http::ApiError;

#[derive(Debug, Deserialize)]
struct LinePayload {
    #[serde(alias = "product")]
    product_id: ProductId,
    #[serde(default)]
    name: String,
    price: Decimal,
    #[serde(default)]
    discount_price: Option<Decimal>,
    quantity: u32,
    #[serde(default)]
    image: Option<String>,
}

/// Decode a cart snapshot, or `None` if the body does not carry one.
pub(super) fn decode(body: Value) -> Result<Option<Vec<CartLine>>, ApiError> {
    let items = match body {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut map) => {
            if let Some(cart) = map.remove("cart") {
                return decode(cart);
            }
            match map.remove("items").or_else(|| map.remove("lines")) {
                Some(items) => items,
                None => return Ok(None),
            }
        }
        _ => return Ok(None),
    };

    let payload: Vec<LinePayload> = serde_json::from_value(items).map_err(|e| {
        warn!(error = %e, "Unexpected cart payload");
        ApiError::malformed(StatusCode::OK, e)
    })?;
    Ok(Some(convert_lines(payload)))
}

/// Decode a body that must be a cart snapshot.
pub(super) fn decode_required(body: Value) -> Result<Vec<CartLine>, ApiError> {
    decode(body)?.ok_or_else(|| ApiError::malformed(StatusCode::OK, "response carries no cart"))
}

/// Drop empty lines and keep the first line per product.
fn convert_lines(payload: Vec<LinePayload>) -> Vec<CartLine> {
    let mut seen = HashSet::new();
    payload
        .into_iter()
        .filter_map(|line| {
            let quantity = Quantity::new(line.quantity)?;
            if !seen.insert(line.product_id) {
                warn!(product_id = %line.product_id, "Duplicate cart line from backend; keeping the first");
                return None;
            }
            Some(CartLine {
                product_id: line.product_id,
                name: line.name,
                unit_price: line.price,
                discount_price: line.discount_price,
                quantity,
                image_ref: line.image.filter(|url| !url.is_empty()),
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decode_items_with_string_and_number_prices() {
        let lines = decode_required(json!({
            "items": [
                {"product_id": 1, "name": "Triphala Churna", "price": "500.00", "quantity": 2},
                {"product_id": 2, "name": "Ashwagandha", "price": 450, "discount_price": "399.50",
                 "quantity": 1, "image": "/media/ashwagandha.jpg"}
            ]
        }))
        .unwrap();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].unit_price, Decimal::new(500, 0));
        assert_eq!(lines[0].quantity.get(), 2);
        assert_eq!(lines[1].effective_price(), Decimal::new(39_950, 2));
        assert_eq!(lines[1].image_ref.as_deref(), Some("/media/ashwagandha.jpg"));
    }

    #[test]
    fn test_decode_accepts_wrapped_and_bare_shapes() {
        let line = json!({"product": 4, "name": "Ghee", "price": "120", "quantity": 1});
        assert_eq!(decode_required(json!({"cart": {"lines": [line.clone()]}})).unwrap().len(), 1);
        assert_eq!(decode_required(json!([line])).unwrap().len(), 1);
    }

    #[test]
    fn test_decode_without_cart_is_none() {
        assert!(decode(json!({"message": "Added to cart"})).unwrap().is_none());
        assert!(decode(Value::Null).unwrap().is_none());
        assert!(decode_required(json!({"message": "ok"})).is_err());
    }

    #[test]
    fn test_decode_drops_empty_and_duplicate_lines() {
        let lines = decode_required(json!({"items": [
            {"product_id": 1, "name": "A", "price": "10", "quantity": 0},
            {"product_id": 2, "name": "B", "price": "10", "quantity": 3},
            {"product_id": 2, "name": "B again", "price": "10", "quantity": 9}
        ]}))
        .unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].name, "B");
        assert_eq!(lines[0].quantity.get(), 3);
    }

    #[test]
    fn test_decode_rejects_malformed_lines() {
        let err = decode(json!({"items": [{"product_id": "x", "price": "10", "quantity": 1}]}))
            .unwrap_err();
        assert_eq!(err.kind(), crate::http::ApiErrorKind::ServerFault);
    }
}
