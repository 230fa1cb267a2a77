//! Wire-level records shared by the store and the remote service.
//!
//! DESIGN
//! ======
//! The remote service owns these schemas. Only the fields the store reads
//! are typed; everything else rides along in a flattened JSON map so a
//! round trip through local storage never loses columns.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// IDENTITY
// =============================================================================

/// Authenticated principal as returned by the remote auth service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user id, also the primary key of the matching profile row.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Remaining user record fields (`user_metadata`, `created_at`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identity {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), email: None, extra: Map::new() }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

// =============================================================================
// PROFILE
// =============================================================================

/// Application-level user record from the `profiles` table, keyed by identity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

// =============================================================================
// SESSION
// =============================================================================

/// Token session held by the remote client. Never persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<u64>,
    pub user: Identity,
}

fn default_token_type() -> String {
    "bearer".into()
}

impl Session {
    /// True once `expires_at` is at or before `now` (unix seconds).
    /// Sessions without an expiry never expire locally.
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Result of a sign-in or sign-up call. Sign-up without auto-confirm yields
/// a user and no session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuthResponse {
    pub user: Option<Identity>,
    pub session: Option<Session>,
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
