//! Unified error type for the storefront facade.
//!
//! Stores return their own error types (`ApiError`, `AuthError`); the
//! facade and the CLI work with `AppError`.

use thiserror::Error;

use crate::config::ConfigError;
use crate::http::{ApiError, ApiErrorKind, TransportError};
use crate::session::AuthError;

/// Application-level error type for the storefront client.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A backend call failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Sign-in failed or was superseded.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Checkout was attempted with nothing in the cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// Third-party sign-in is not configured.
    #[error("External sign-in is not configured")]
    ExternalLoginDisabled,

    /// Bad input caught before any request was sent.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AppError {
    /// Whether the session must be re-established before retrying.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Api(err) => err.is_unauthorized(),
            Self::Auth(AuthError::Api(err)) => err.kind() == ApiErrorKind::Unauthorized,
            _ => false,
        }
    }

    /// Message suitable for showing to the user.
    ///
    /// Server faults and local setup problems never expose details.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(_) | Self::Transport(_) => {
                "The store client is not configured correctly.".to_string()
            }
            Self::Api(err) => err.user_message(),
            Self::Auth(err) => err.user_message(),
            Self::EmptyCart => "Your cart is empty.".to_string(),
            Self::ExternalLoginDisabled => "Google sign-in is not available.".to_string(),
            Self::InvalidInput(msg) => msg.clone(),
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
