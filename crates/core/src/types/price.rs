//! Type-safe price representation using decimal arithmetic.
//!
//! The backend serializes prices as decimal strings; `rust_decimal` keeps
//! them exact so that `quantity * unit price` sums never drift the way
//! floating-point totals do.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (rupees, not paise).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Create a price in the store's default currency.
    #[must_use]
    pub fn inr(amount: Decimal) -> Self {
        Self::new(amount, CurrencyCode::default())
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:.2}", self.currency_code.symbol(), self.amount)
    }
}

/// ISO 4217 currency codes accepted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    INR,
    USD,
}

impl CurrencyCode {
    /// Display symbol for the currency.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::INR => "\u{20b9}",
            Self::USD => "$",
        }
    }
}
