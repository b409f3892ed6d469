//! Catalog product record.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ProductId;

/// A product as listed in the catalog.
///
/// Only the fields the cart needs to render an optimistic line are modelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    #[serde(default)]
    pub slug: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub discount_price: Option<Decimal>,
    #[serde(default)]
    pub image: Option<String>,
}

impl Product {
    /// Price a buyer actually pays per unit: the discount price when set.
    #[must_use]
    pub fn effective_price(&self) -> Decimal {
        self.discount_price.unwrap_or(self.price)
    }
}
