//! Route guard for protected views.

use url::form_urlencoded;

use ojas_core::SessionStatus;

use crate::session::Session;

/// Outcome of a guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Granted,
    /// Send the visitor to the login view; `to` carries the intended
    /// destination as `next`.
    Redirect { to: String },
}

/// Whether a protected view may be entered.
#[must_use]
pub const fn can_enter(status: SessionStatus) -> bool {
    matches!(status, SessionStatus::Authenticated)
}

/// Check a protected view against the current session.
#[must_use]
pub fn guard(session: &Session, intended_path: &str, login_path: &str) -> Access {
    if can_enter(session.status()) {
        return Access::Granted;
    }
    let next: String = form_urlencoded::Serializer::new(String::new())
        .append_pair("next", intended_path)
        .finish();
    Access::Redirect {
        to: format!("{login_path}?{next}"),
    }
}
