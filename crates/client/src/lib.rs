//! Ojasritu Wellness storefront client.
//!
//! Session and cart synchronization layer for the storefront: a CSRF-aware
//! HTTP access layer, a session store, an optimistic cart manager and the
//! facade that sequences flows across them.
//!
//! # Example
//!
//! ```rust,ignore
//! use ojas_client::{ClientConfig, Storefront, session::Credentials};
//!
//! let storefront = Storefront::new(ClientConfig::from_env()?)?;
//! storefront.login(&Credentials::new("asha@ojasritu.in", password)?).await?;
//! let cart = storefront.cart().snapshot();
//! println!("{} items, {}", cart.total_count(), cart.total());
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod account;
pub mod cart;
pub mod config;
pub mod error;
pub mod guard;
pub mod http;
pub mod session;
pub mod storefront;
pub mod telemetry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::ClientConfig;
pub use error::{AppError, Result};
pub use storefront::Storefront;
