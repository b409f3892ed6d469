//! Authenticated identity record.

use serde::{Deserialize, Serialize};

use super::{Email, UserId};

/// The identity the backend reports for an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: Email,
}

impl User {
    /// Name to greet the user with: first name, falling back to username.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.first_name.trim().is_empty() {
            &self.username
        } else {
            &self.first_name
        }
    }
}
