//! Supabase client — GoTrue auth and PostgREST single-row reads over HTTP.
//!
//! ARCHITECTURE
//! ============
//! The client owns the token session (access + refresh token). It is kept
//! in memory, persisted under its own storage key, and every transition is
//! broadcast as an [`AuthEvent`]. The session store never sees tokens, only
//! the identity carried by those events and responses.
//!
//! Pure parsing lives in `parse_auth_response` / `parse_error` for testability.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::Method;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{AuthApi, AuthChangeEvent, AuthEvent, DataApi, RemoteError};
use crate::config::AuthConfig;
use crate::storage::{SessionStorage, StorageError};
use crate::types::{AuthResponse, Identity, Session};

const EVENT_CHANNEL_CAPACITY: usize = 16;
const SINGLE_OBJECT_ACCEPT: &str = "application/vnd.pgrst.object+json";

// =============================================================================
// CLIENT
// =============================================================================

pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: Mutex<Option<Session>>,
    storage: Arc<dyn SessionStorage>,
    storage_key: String,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseClient {
    /// Build a client for the configured project. The persisted token
    /// session is not loaded until [`SupabaseClient::initialize`].
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::HttpClientBuild`] if the HTTP client cannot be built.
    pub fn new(config: &AuthConfig, storage: Arc<dyn SessionStorage>) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| RemoteError::HttpClientBuild(e.to_string()))?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            http,
            base_url: config.supabase_url.clone(),
            anon_key: config.anon_key.clone(),
            session: Mutex::new(None),
            storage,
            storage_key: storage_key_for(&config.supabase_url),
            events,
        })
    }

    /// Current token session, if signed in.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.lock_session().clone()
    }

    /// Restore the persisted token session, refreshing it if expired.
    ///
    /// The returned `InitialSession` event is also broadcast to current
    /// subscribers. A failed refresh yields an event without session.
    pub async fn initialize(&self) -> AuthEvent {
        let session = match self.load_session() {
            Some(stored) if stored.is_expired(now_secs()) => match self.refresh_with(&stored.refresh_token).await {
                Ok(fresh) => Some(fresh),
                Err(e) => {
                    warn!(error = %e, user_id = %stored.user.id, "stored session expired and refresh failed");
                    None
                }
            },
            other => other,
        };

        self.store_session(session.clone());
        let event = AuthEvent::new(AuthChangeEvent::InitialSession, session);
        let _ = self.events.send(event.clone());
        event
    }

    /// Exchange the refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no session or the service rejects the refresh token.
    pub async fn refresh_session(&self) -> Result<Session, RemoteError> {
        let refresh_token = self
            .session()
            .map(|s| s.refresh_token)
            .ok_or_else(session_missing)?;
        let session = self.refresh_with(&refresh_token).await?;
        self.commit(Some(session.clone()), AuthChangeEvent::TokenRefreshed);
        Ok(session)
    }

    async fn refresh_with(&self, refresh_token: &str) -> Result<Session, RemoteError> {
        let body = serde_json::json!({ "refresh_token": refresh_token });
        let text = self
            .send(
                self.request(Method::POST, "/auth/v1/token", None)
                    .query(&[("grant_type", "refresh_token")])
                    .json(&body),
            )
            .await?;
        parse_auth_response(&text)?
            .session
            .ok_or_else(|| RemoteError::Decode("refresh response carried no session".into()))
    }

    // -------------------------------------------------------------------------
    // Session bookkeeping
    // -------------------------------------------------------------------------

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn access_token(&self) -> Option<String> {
        self.lock_session().as_ref().map(|s| s.access_token.clone())
    }

    fn load_session(&self) -> Option<Session> {
        let raw = match self.storage.get_item(&self.storage_key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "failed to read stored auth session");
                return None;
            }
        };
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "discarding unreadable stored auth session");
                None
            }
        }
    }

    fn store_session(&self, session: Option<Session>) {
        let result = match &session {
            Some(s) => serde_json::to_string(s)
                .map_err(|e| StorageError::Encode(e.to_string()))
                .and_then(|raw| self.storage.set_item(&self.storage_key, &raw)),
            None => self.storage.remove_item(&self.storage_key),
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to persist auth session");
        }
        *self.lock_session() = session;
    }

    fn commit(&self, session: Option<Session>, event: AuthChangeEvent) {
        self.store_session(session.clone());
        let _ = self.events.send(AuthEvent::new(event, session));
    }

    // -------------------------------------------------------------------------
    // HTTP
    // -------------------------------------------------------------------------

    /// Authorization falls back to the anon key when no bearer is given.
    fn request(&self, method: Method, path: &str, bearer: Option<&str>) -> reqwest::RequestBuilder {
        let bearer = bearer.unwrap_or(&self.anon_key);
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {bearer}"))
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<String, RemoteError> {
        let response = builder
            .send()
            .await
            .map_err(|e| RemoteError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::Request(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(parse_error(status, &text));
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl AuthApi for SupabaseClient {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthResponse, RemoteError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let text = self
            .send(
                self.request(Method::POST, "/auth/v1/token", None)
                    .query(&[("grant_type", "password")])
                    .json(&body),
            )
            .await?;

        let response = parse_auth_response(&text)?;
        if let Some(session) = &response.session {
            info!(user_id = %session.user.id, "signed in");
            self.commit(Some(session.clone()), AuthChangeEvent::SignedIn);
        }
        Ok(response)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<AuthResponse, RemoteError> {
        let body = serde_json::json!({ "email": email, "password": password, "data": metadata });
        let text = self
            .send(self.request(Method::POST, "/auth/v1/signup", None).json(&body))
            .await?;

        let response = parse_auth_response(&text)?;
        match (&response.session, &response.user) {
            (Some(session), _) => {
                info!(user_id = %session.user.id, "signed up");
                self.commit(Some(session.clone()), AuthChangeEvent::SignedIn);
            }
            (None, Some(user)) => info!(user_id = %user.id, "signed up; awaiting email confirmation"),
            (None, None) => {}
        }
        Ok(response)
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        let Some(token) = self.access_token() else {
            debug!("sign out without session");
            self.commit(None, AuthChangeEvent::SignedOut);
            return Ok(());
        };

        match self
            .send(self.request(Method::POST, "/auth/v1/logout", Some(&token)))
            .await
        {
            Ok(_) => {}
            // Session already gone server-side; clear locally all the same.
            Err(RemoteError::Service { status: 401 | 404, .. }) => debug!("remote session already revoked"),
            Err(e) => return Err(e),
        }

        info!("signed out");
        self.commit(None, AuthChangeEvent::SignedOut);
        Ok(())
    }

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[async_trait::async_trait]
impl DataApi for SupabaseClient {
    async fn select_single(&self, table: &str, column: &str, value: &str) -> Result<Value, RemoteError> {
        let token = self.access_token();
        let filter = format!("eq.{value}");
        let text = self
            .send(
                self.request(Method::GET, &format!("/rest/v1/{table}"), token.as_deref())
                    .query(&[("select", "*"), (column, filter.as_str())])
                    .header("Accept", SINGLE_OBJECT_ACCEPT),
            )
            .await?;
        serde_json::from_str(&text).map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

// =============================================================================
// PARSING
// =============================================================================

/// Storage key for the token session: `sb-<project-ref>-auth-token`, where
/// the project ref is the first label of the URL host.
#[must_use]
pub fn storage_key_for(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let host = without_scheme
        .split(['/', ':'])
        .next()
        .unwrap_or_default();
    let project_ref = host.split('.').next().unwrap_or_default();
    format!("sb-{project_ref}-auth-token")
}

/// Decode a token or sign-up response. Token responses carry a full session;
/// sign-up without auto-confirm returns a bare user record.
fn parse_auth_response(body: &str) -> Result<AuthResponse, RemoteError> {
    let value: Value = serde_json::from_str(body).map_err(|e| RemoteError::Decode(e.to_string()))?;

    if value.get("access_token").is_some() {
        let session = with_expiry(
            serde_json::from_value::<Session>(value).map_err(|e| RemoteError::Decode(e.to_string()))?,
            now_secs(),
        );
        return Ok(AuthResponse { user: Some(session.user.clone()), session: Some(session) });
    }

    let user = match value {
        Value::Object(mut map) if map.contains_key("user") => map.remove("user").unwrap_or_default(),
        other => other,
    };
    if user.is_null() {
        return Ok(AuthResponse::default());
    }

    let user: Identity = serde_json::from_value(user).map_err(|e| RemoteError::Decode(e.to_string()))?;
    Ok(AuthResponse { user: Some(user), session: None })
}

/// Map an error body onto [`RemoteError::Service`]. GoTrue and PostgREST
/// disagree on field names, so the first present one wins.
fn parse_error(status: u16, body: &str) -> RemoteError {
    let value: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let message = ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_string);
    let code = ["error_code", "code"].iter().find_map(|key| {
        value.get(key).and_then(|v| {
            v.as_str()
                .map(str::to_string)
                .or_else(|| v.as_u64().map(|n| n.to_string()))
        })
    });
    RemoteError::Service { status, code, message }
}

fn with_expiry(mut session: Session, now: u64) -> Session {
    if session.expires_at.is_none() {
        session.expires_at = session.expires_in.map(|secs| now.saturating_add(secs));
    }
    session
}

fn session_missing() -> RemoteError {
    RemoteError::Service {
        status: 401,
        code: Some("session_missing".into()),
        message: Some("Auth session missing!".into()),
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

#[cfg(test)]
#[path = "supabase_test.rs"]
mod tests;
