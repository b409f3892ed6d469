//! Authentication error types.

use thiserror::Error;

use crate::http::ApiError;

/// Errors returned by sign-in operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The backend rejected or failed the exchange. Passed through exactly
    /// as the access layer classified it, so callers can tell a wrong
    /// password from a locked account from a dropped connection.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The exchange succeeded but a later logout or session expiry made
    /// its outcome stale; the session was left as the newer change set it.
    #[error("sign-in was superseded by a newer session change")]
    Superseded,
}

impl AuthError {
    /// Message suitable for the login form.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(err) => err.user_message(),
            Self::Superseded => "You were signed out while signing in. Please try again.".to_string(),
        }
    }

    /// The classified API error, if any.
    #[must_use]
    pub const fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            Self::Superseded => None,
        }
    }
}
