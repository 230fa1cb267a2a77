//! Remote auth and data service seams.
//!
//! DESIGN
//! ======
//! The store talks to the hosted backend only through [`AuthApi`] and
//! [`DataApi`]. `SupabaseClient` is the production implementation; tests
//! swap in mocks. Identity changes the store did not initiate (token refresh,
//! sign-out elsewhere) arrive as [`AuthEvent`]s on a broadcast channel.

pub mod supabase;

use tokio::sync::broadcast;

use crate::types::{AuthResponse, Session};

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by remote service calls.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The service answered with a non-success status.
    #[error("{}", message.as_deref().unwrap_or("remote service error"))]
    Service { status: u16, code: Option<String>, message: Option<String> },

    /// The request never produced a response (connect, timeout, TLS).
    #[error("request failed: {0}")]
    Request(String),

    /// The response body did not match the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl RemoteError {
    /// Text suitable for the user-facing error field. Falls back to
    /// `fallback` when the service supplied no message.
    #[must_use]
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Service { message, .. } => message
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(fallback)
                .to_string(),
            other => other.to_string(),
        }
    }
}

// =============================================================================
// AUTH EVENTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChangeEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// Session transition reported by the remote client.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthEvent {
    pub event: AuthChangeEvent,
    pub session: Option<Session>,
}

impl AuthEvent {
    #[must_use]
    pub fn new(event: AuthChangeEvent, session: Option<Session>) -> Self {
        Self { event, session }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self { event: AuthChangeEvent::SignedOut, session: None }
    }
}

// =============================================================================
// TRAITS
// =============================================================================

#[async_trait::async_trait]
pub trait AuthApi: Send + Sync {
    /// Password sign-in.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] for rejected credentials or transport failure.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthResponse, RemoteError>;

    /// Account creation. `metadata` is stored on the remote user record.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] if the service refuses the account or is unreachable.
    async fn sign_up(&self, email: &str, password: &str, metadata: serde_json::Value)
    -> Result<AuthResponse, RemoteError>;

    /// End the remote session.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] if the service could not revoke the session.
    async fn sign_out(&self) -> Result<(), RemoteError>;

    /// Subscribe to session transitions.
    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent>;
}

#[async_trait::async_trait]
pub trait DataApi: Send + Sync {
    /// Fetch exactly one row of `table` where `column` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] when zero or several rows match, or on transport failure.
    async fn select_single(&self, table: &str, column: &str, value: &str) -> Result<serde_json::Value, RemoteError>;
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
