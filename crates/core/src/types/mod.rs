//! Core types for the storefront client.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod email;
pub mod id;
pub mod price;
pub mod product;
pub mod quantity;
pub mod status;
pub mod user;

pub use cart::{Cart, CartLine};
pub use email::{Email, EmailError};
pub use id::*;
pub use price::{CurrencyCode, Price};
pub use product::Product;
pub use quantity::Quantity;
pub use status::*;
pub use user::User;
