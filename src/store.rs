//! Session store — who is signed in, and what is their profile.
//!
//! DESIGN
//! ======
//! `SessionStore` is a cloneable handle owned by the application root and
//! passed to whoever needs it. State lives in a `watch` channel: readers take
//! snapshots or subscribe, and every write goes through `set`, which applies
//! the mutation and writes the persisted subset in the same step.
//!
//! CONCURRENCY
//! ===========
//! Operations suspend only on remote calls. Explicit operations and the
//! auth-event listener may interleave freely; the last write wins. The one
//! guard is that a fetched profile is attached only to the identity it was
//! fetched for, so a profile never outlives (or crosses) its identity.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::persist::{self, STORAGE_KEY};
use crate::remote::{AuthApi, AuthEvent, DataApi, RemoteError};
use crate::storage::SessionStorage;
use crate::types::{AuthResponse, Identity, Profile};

/// Table holding one profile row per identity, keyed by `id`.
pub const PROFILES_TABLE: &str = "profiles";

const LOGIN_FAILED: &str = "Login failed";
const SIGNUP_FAILED: &str = "Signup failed";
const LOGOUT_FAILED: &str = "Logout failed";

// =============================================================================
// STATE
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionState {
    pub identity: Option<Identity>,
    /// Only ever present alongside `identity`, and for the same id.
    pub profile: Option<Profile>,
    /// True while a login or signup is in flight.
    pub is_loading: bool,
    /// Last login/signup/logout failure shown to the user.
    pub error: Option<String>,
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    state: watch::Sender<SessionState>,
    auth: Arc<dyn AuthApi>,
    data: Arc<dyn DataApi>,
    storage: Arc<dyn SessionStorage>,
}

impl SessionStore {
    /// Create the store, rehydrating identity and profile from `storage`.
    #[must_use]
    pub fn new(auth: Arc<dyn AuthApi>, data: Arc<dyn DataApi>, storage: Arc<dyn SessionStorage>) -> Self {
        let initial = rehydrate(storage.as_ref());
        let (state, _) = watch::channel(initial);
        Self { inner: Arc::new(Inner { state, auth, data, storage }) }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().identity.is_some()
    }

    pub(crate) fn auth(&self) -> &Arc<dyn AuthApi> {
        &self.inner.auth
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Password sign-in. Failures land in `error`; profile fetch failures do not.
    pub async fn login(&self, email: &str, password: &str) {
        self.begin_attempt();
        let result = self.inner.auth.sign_in_with_password(email, password).await;
        self.finish_attempt(result, LOGIN_FAILED).await;
    }

    /// Account creation. `name` travels as user metadata; the profile row is
    /// created server-side and fetched here like on login.
    pub async fn signup(&self, name: &str, email: &str, password: &str) {
        self.begin_attempt();
        let metadata = serde_json::json!({ "name": name });
        let result = self.inner.auth.sign_up(email, password, metadata).await;
        self.finish_attempt(result, SIGNUP_FAILED).await;
    }

    /// Remote sign-out. On failure the local identity is kept.
    pub async fn logout(&self) {
        match self.inner.auth.sign_out().await {
            Ok(()) => self.set(|s| {
                s.identity = None;
                s.profile = None;
                s.error = None;
            }),
            Err(e) => {
                warn!(error = %e, "logout failed");
                let message = e.user_message(LOGOUT_FAILED);
                self.set(|s| s.error = Some(message));
            }
        }
    }

    /// Load the profile row for the current identity. No-op when signed out.
    /// Errors are logged and swallowed.
    pub async fn fetch_profile(&self) {
        let Some(user_id) = self.current_identity_id() else {
            return;
        };

        let fetched = self
            .inner
            .data
            .select_single(PROFILES_TABLE, "id", &user_id)
            .await
            .and_then(|row| serde_json::from_value::<Profile>(row).map_err(|e| RemoteError::Decode(e.to_string())));

        match fetched {
            Ok(profile) => self.set(|s| {
                if s.identity.as_ref().is_some_and(|i| i.id == user_id) {
                    s.profile = Some(profile);
                } else {
                    debug!(%user_id, "dropping profile fetched for a replaced identity");
                }
            }),
            Err(e) => error!(error = %e, %user_id, "error fetching profile"),
        }
    }

    pub fn clear_error(&self) {
        self.set(|s| s.error = None);
    }

    /// Reconcile with a session transition reported by the remote service.
    pub async fn apply_auth_event(&self, event: AuthEvent) {
        match event.session {
            Some(session) => {
                debug!(event = ?event.event, user_id = %session.user.id, "remote session present");
                self.set_identity(session.user);
                self.fetch_profile().await;
            }
            None => {
                debug!(event = ?event.event, "remote session cleared");
                self.set(|s| {
                    s.identity = None;
                    s.profile = None;
                });
            }
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn begin_attempt(&self) {
        self.set(|s| {
            s.is_loading = true;
            s.error = None;
        });
    }

    async fn finish_attempt(&self, result: Result<AuthResponse, RemoteError>, fallback: &str) {
        match result {
            Ok(response) => {
                if let Some(user) = response.user {
                    self.set_identity(user);
                    self.fetch_profile().await;
                }
                self.set(|s| s.is_loading = false);
            }
            Err(e) => {
                warn!(error = %e, "{fallback}");
                let message = e.user_message(fallback);
                self.set(|s| {
                    s.error = Some(message);
                    s.is_loading = false;
                });
            }
        }
    }

    fn set_identity(&self, identity: Identity) {
        self.set(|s| {
            if s.identity.as_ref().is_some_and(|current| current.id != identity.id) {
                s.profile = None;
            }
            s.identity = Some(identity);
        });
    }

    fn current_identity_id(&self) -> Option<String> {
        self.inner.state.borrow().identity.as_ref().map(|i| i.id.clone())
    }

    /// Apply a mutation and write the persisted subset while the state is held,
    /// so storage never lags behind a later write.
    fn set(&self, mutate: impl FnOnce(&mut SessionState)) {
        let storage = self.inner.storage.as_ref();
        self.inner.state.send_modify(|state| {
            mutate(state);
            write_subset(storage, state);
        });
    }
}

fn rehydrate(storage: &dyn SessionStorage) -> SessionState {
    let raw = match storage.get_item(STORAGE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return SessionState::default(),
        Err(e) => {
            warn!(error = %e, "failed to read persisted session");
            return SessionState::default();
        }
    };
    match persist::decode(&raw) {
        Ok(persisted) => persisted.into_state(),
        Err(e) => {
            warn!(error = %e, "ignoring unreadable persisted session");
            SessionState::default()
        }
    }
}

fn write_subset(storage: &dyn SessionStorage, state: &SessionState) {
    let result = persist::encode(&persist::partialize(state)).and_then(|raw| storage.set_item(STORAGE_KEY, &raw));
    if let Err(e) = result {
        warn!(error = %e, "failed to persist session state");
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use tokio::sync::{Notify, broadcast};

    use super::*;
    use crate::storage::MemoryStorage;
    use crate::types::Session;

    #[must_use]
    pub fn identity(id: &str) -> Identity {
        Identity::new(id).with_email(format!("{id}@x.com"))
    }

    #[must_use]
    pub fn profile_row(id: &str, name: &str) -> serde_json::Value {
        serde_json::json!({ "id": id, "name": name })
    }

    #[must_use]
    pub fn signed_in(id: &str) -> AuthResponse {
        AuthResponse { user: Some(identity(id)), session: None }
    }

    #[must_use]
    pub fn session_for(id: &str) -> Session {
        Session {
            access_token: format!("at-{id}"),
            refresh_token: format!("rt-{id}"),
            token_type: "bearer".into(),
            expires_in: Some(3600),
            expires_at: None,
            user: identity(id),
        }
    }

    #[must_use]
    pub fn service_error(message: &str) -> RemoteError {
        RemoteError::Service { status: 400, code: None, message: Some(message.into()) }
    }

    /// Scripted auth service. Each call pops the next queued result; an
    /// empty queue answers with a generic failure.
    pub struct MockAuth {
        pub sign_in: Mutex<VecDeque<Result<AuthResponse, RemoteError>>>,
        pub sign_up: Mutex<VecDeque<Result<AuthResponse, RemoteError>>>,
        pub sign_out: Mutex<VecDeque<Result<(), RemoteError>>>,
        pub sign_up_metadata: Mutex<Vec<serde_json::Value>>,
        pub events: broadcast::Sender<AuthEvent>,
    }

    impl MockAuth {
        #[must_use]
        pub fn new() -> Self {
            let (events, _) = broadcast::channel(16);
            Self {
                sign_in: Mutex::new(VecDeque::new()),
                sign_up: Mutex::new(VecDeque::new()),
                sign_out: Mutex::new(VecDeque::new()),
                sign_up_metadata: Mutex::new(Vec::new()),
                events,
            }
        }

        pub fn push_sign_in(&self, result: Result<AuthResponse, RemoteError>) {
            self.sign_in.lock().unwrap().push_back(result);
        }

        pub fn push_sign_up(&self, result: Result<AuthResponse, RemoteError>) {
            self.sign_up.lock().unwrap().push_back(result);
        }

        pub fn push_sign_out(&self, result: Result<(), RemoteError>) {
            self.sign_out.lock().unwrap().push_back(result);
        }
    }

    fn unscripted() -> RemoteError {
        RemoteError::Service { status: 500, code: None, message: None }
    }

    #[async_trait::async_trait]
    impl AuthApi for MockAuth {
        async fn sign_in_with_password(&self, _email: &str, _password: &str) -> Result<AuthResponse, RemoteError> {
            self.sign_in.lock().unwrap().pop_front().unwrap_or_else(|| Err(unscripted()))
        }

        async fn sign_up(
            &self,
            _email: &str,
            _password: &str,
            metadata: serde_json::Value,
        ) -> Result<AuthResponse, RemoteError> {
            self.sign_up_metadata.lock().unwrap().push(metadata);
            self.sign_up.lock().unwrap().pop_front().unwrap_or_else(|| Err(unscripted()))
        }

        async fn sign_out(&self) -> Result<(), RemoteError> {
            self.sign_out.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }

        fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent> {
            self.events.subscribe()
        }
    }

    /// Scripted data service. With a gate installed, each fetch signals
    /// `started` and then waits for `release` before answering.
    pub struct MockData {
        pub rows: Mutex<VecDeque<Result<serde_json::Value, RemoteError>>>,
        pub requests: Mutex<Vec<(String, String, String)>>,
        pub gate: Option<(Arc<Notify>, Arc<Notify>)>,
    }

    impl MockData {
        #[must_use]
        pub fn new() -> Self {
            Self { rows: Mutex::new(VecDeque::new()), requests: Mutex::new(Vec::new()), gate: None }
        }

        #[must_use]
        pub fn gated(started: Arc<Notify>, release: Arc<Notify>) -> Self {
            Self { gate: Some((started, release)), ..Self::new() }
        }

        pub fn push_row(&self, result: Result<serde_json::Value, RemoteError>) {
            self.rows.lock().unwrap().push_back(result);
        }
    }

    #[async_trait::async_trait]
    impl DataApi for MockData {
        async fn select_single(
            &self,
            table: &str,
            column: &str,
            value: &str,
        ) -> Result<serde_json::Value, RemoteError> {
            self.requests
                .lock()
                .unwrap()
                .push((table.to_string(), column.to_string(), value.to_string()));
            if let Some((started, release)) = &self.gate {
                started.notify_one();
                release.notified().await;
            }
            self.rows
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(service_error("JSON object requested, multiple (or no) rows returned")))
        }
    }

    /// Store wired to fresh mocks and in-memory storage.
    #[must_use]
    pub fn test_store() -> (SessionStore, Arc<MockAuth>, Arc<MockData>, Arc<MemoryStorage>) {
        let auth = Arc::new(MockAuth::new());
        let data = Arc::new(MockData::new());
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStore::new(auth.clone(), data.clone(), storage.clone());
        (store, auth, data, storage)
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
