//! Cart line quantity.

use core::fmt;
use core::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// Number of units on a cart line.
///
/// Always at least one: a line whose quantity would reach zero is removed
/// from the cart instead of being kept around empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(NonZeroU32);

impl Quantity {
    /// A single unit.
    pub const ONE: Self = Self(NonZeroU32::MIN);

    /// Create a quantity, returning `None` for zero.
    #[must_use]
    pub const fn new(value: u32) -> Option<Self> {
        match NonZeroU32::new(value) {
            Some(q) => Some(Self(q)),
            None => None,
        }
    }

    /// Get the number of units.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// Add units, saturating at `u32::MAX`.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0.get()))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self {
        q.get()
    }
}
