//! Classified API errors.

use core::fmt;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use super::transport::TransportError;

/// Message shown for any server fault; details stay in logs and Sentry.
const SERVER_FAULT_MESSAGE: &str = "Something went wrong on our side. Please try again.";

/// Failure category of a backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// 401: the session is invalid. Forces the session store to anonymous.
    Unauthorized,
    /// 403 not caused by a CSRF rejection.
    Forbidden,
    /// 400/422 and other client errors: bad input, shown to the form.
    Validation,
    /// 404.
    NotFound,
    /// 409: e.g. requested quantity exceeds stock.
    Conflict,
    /// No response at all. Never retried automatically.
    Network,
    /// 5xx or a response the client cannot make sense of.
    ServerFault,
}

impl ApiErrorKind {
    /// Classify an HTTP status. Returns `None` for success.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Option<Self> {
        if status.is_success() {
            return None;
        }
        Some(match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized,
            StatusCode::FORBIDDEN => Self::Forbidden,
            StatusCode::NOT_FOUND => Self::NotFound,
            StatusCode::CONFLICT => Self::Conflict,
            s if s.is_client_error() => Self::Validation,
            _ => Self::ServerFault,
        })
    }

    /// Failures where the server gave no verdict about the request itself.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Network | Self::ServerFault)
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::Validation => "Validation",
            Self::NotFound => "Not found",
            Self::Conflict => "Conflict",
            Self::Network => "Network",
            Self::ServerFault => "Server fault",
        }
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A classified failure from the HTTP access layer.
///
/// Carries the HTTP status (absent for network failures and local input
/// checks) and the decoded response payload so forms can show field errors.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} error: {detail}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub status: Option<u16>,
    pub payload: Option<Value>,
    detail: String,
}

impl ApiError {
    /// Build an error directly.
    pub fn new(kind: ApiErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            payload: None,
            detail: detail.into(),
        }
    }

    /// Classify a non-success response.
    #[must_use]
    pub fn from_response(status: StatusCode, payload: Value) -> Self {
        let kind = ApiErrorKind::from_status(status).unwrap_or(ApiErrorKind::ServerFault);
        let detail = payload_message(&payload).unwrap_or_else(|| status.to_string());
        Self {
            kind,
            status: Some(status.as_u16()),
            payload: (!payload.is_null()).then_some(payload),
            detail,
        }
    }

    /// A transport failure.
    #[must_use]
    pub fn network(err: &TransportError) -> Self {
        Self::new(ApiErrorKind::Network, err.to_string())
    }

    /// A success response whose body did not have the expected shape.
    pub fn malformed(status: StatusCode, err: impl fmt::Display) -> Self {
        Self {
            kind: ApiErrorKind::ServerFault,
            status: Some(status.as_u16()),
            payload: None,
            detail: format!("malformed response: {err}"),
        }
    }

    /// Input rejected locally, before any request was sent.
    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Validation, detail)
    }

    /// Error category.
    #[must_use]
    pub const fn kind(&self) -> ApiErrorKind {
        self.kind
    }

    /// Whether this is the uniform "session invalid" signal.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.kind == ApiErrorKind::Unauthorized
    }

    /// The most specific message suitable for display in a form.
    ///
    /// Server faults never expose their details.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self.kind {
            ApiErrorKind::ServerFault => SERVER_FAULT_MESSAGE.to_string(),
            ApiErrorKind::Network => {
                "Could not reach the store. Check your connection and try again.".to_string()
            }
            ApiErrorKind::Unauthorized => self
                .payload
                .as_ref()
                .and_then(payload_message)
                .unwrap_or_else(|| "Please sign in to continue.".to_string()),
            _ => self.detail.clone(),
        }
    }

    /// Whether the payload reports a CSRF failure.
    #[must_use]
    pub fn is_csrf_rejection(&self) -> bool {
        self.kind == ApiErrorKind::Forbidden
            && self
                .payload
                .as_ref()
                .is_some_and(|p| p.to_string().to_ascii_lowercase().contains("csrf"))
    }
}

/// Pick the most specific message out of an error payload.
///
/// Order: `error`, then `detail`, then `non_field_errors`, then the first
/// field error (`{"email": ["Enter a valid email address."]}`).
fn payload_message(payload: &Value) -> Option<String> {
    match payload {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(map) => {
            for key in ["error", "detail", "non_field_errors"] {
                if let Some(message) = map.get(key).and_then(first_text) {
                    return Some(message);
                }
            }
            map.iter()
                .find_map(|(field, value)| first_text(value).map(|m| format!("{field}: {m}")))
        }
        _ => None,
    }
}

fn first_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_text),
        _ => None,
    }
}
