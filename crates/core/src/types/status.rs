//! Status enums for the client-side stores.

use serde::{Deserialize, Serialize};

/// Where the tab-scoped session currently stands.
///
/// Only [`SessionStatus::Authenticated`] ever carries a user. No status is
/// terminal; every state can be left through login, logout or
/// re-validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated,
    /// Re-validation could not reach a verdict (network or server fault).
    Error,
}

impl SessionStatus {
    /// Returns the status as a lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::Error => "error",
        }
    }
}

/// Whether the local cart agrees with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Local state matches the last server snapshot.
    #[default]
    Idle,
    /// A full re-fetch is in flight.
    Syncing,
    /// Optimistic mutations await server confirmation.
    Stale,
    /// The last mutation or fetch failed.
    Error,
}
