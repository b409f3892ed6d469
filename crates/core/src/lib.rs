//! Ojasritu Wellness Core - Shared storefront types.
//!
//! This crate provides the types shared by the storefront client and its
//! tooling:
//! - `client` - Session and cart synchronization layer
//! - `cli` - Command-line driver for the client
//!
//! # Architecture
//!
//! The core crate contains only types and pure derivations - no I/O, no HTTP
//! clients, no async runtime. Cart totals live here so that every consumer
//! derives them the same way.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, emails, quantities, prices, cart and session types

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
