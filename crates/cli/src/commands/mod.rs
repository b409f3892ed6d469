//! CLI command implementations.

pub mod account;
pub mod cart;
pub mod session;

use ojas_client::AppError;
use ojas_core::EmailError;
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The storefront client failed.
    #[error("{}", .0.user_message())]
    Storefront(#[from] AppError),

    /// Writing output failed.
    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}
