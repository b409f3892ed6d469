//! Cart snapshot types.
//!
//! `Cart` is the read model that views subscribe to. Totals are derived from
//! `lines` on every call and never stored, so they cannot drift from the
//! lines they summarize.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Price, Product, ProductId, Quantity, SyncState};

/// A single product entry in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    pub discount_price: Option<Decimal>,
    pub quantity: Quantity,
    pub image_ref: Option<String>,
}

impl CartLine {
    /// Build a line for a product that is not in the cart yet.
    #[must_use]
    pub fn from_product(product: &Product, quantity: Quantity) -> Self {
        Self {
            product_id: product.id,
            name: product.name.clone(),
            unit_price: product.price,
            discount_price: product.discount_price,
            quantity,
            image_ref: product.image.clone(),
        }
    }

    /// Price per unit after discount.
    #[must_use]
    pub fn effective_price(&self) -> Decimal {
        self.discount_price.unwrap_or(self.unit_price)
    }

    /// `quantity * effective price`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        Decimal::from(self.quantity.get()) * self.effective_price()
    }
}

/// The cart as currently known to this tab.
///
/// Lines are unique by `product_id` and keep insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cart {
    pub lines: Vec<CartLine>,
    pub sync_state: SyncState,
}

impl Cart {
    /// Sum of all line quantities.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity.get())).sum()
    }

    /// Sum of `quantity * effective price` over all lines.
    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Total price with currency, for display.
    #[must_use]
    pub fn total(&self) -> Price {
        Price::inr(self.total_price())
    }

    /// Look up the line for a product.
    #[must_use]
    pub fn line(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(id: i32, price: i64, discount: Option<i64>, qty: u32) -> CartLine {
        CartLine {
            product_id: ProductId::new(id),
            name: format!("Product {id}"),
            unit_price: Decimal::from(price),
            discount_price: discount.map(Decimal::from),
            quantity: Quantity::new(qty).unwrap(),
            image_ref: None,
        }
    }

    #[test]
    fn test_empty_cart_totals() {
        let cart = Cart::default();
        assert_eq!(cart.total_count(), 0);
        assert_eq!(cart.total_price(), Decimal::ZERO);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_totals_use_discount_price() {
        let cart = Cart {
            lines: vec![line(1, 500, None, 3), line(2, 900, Some(750), 2)],
            sync_state: SyncState::Idle,
        };
        assert_eq!(cart.total_count(), 5);
        assert_eq!(cart.total_price(), Decimal::from(1500 + 1500));
    }

    #[test]
    fn test_line_lookup() {
        let cart = Cart {
            lines: vec![line(1, 500, None, 1)],
            sync_state: SyncState::Idle,
        };
        assert!(cart.line(ProductId::new(1)).is_some());
        assert!(cart.line(ProductId::new(2)).is_none());
    }

    #[test]
    fn test_total_display() {
        let cart = Cart {
            lines: vec![line(1, 500, None, 3)],
            sync_state: SyncState::Idle,
        };
        assert_eq!(cart.total().to_string(), "\u{20b9}1500.00");
    }
}
