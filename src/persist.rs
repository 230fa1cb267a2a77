//! Persisted subset of the session state.
//!
//! Only the allow-listed fields (`identity`, `profile`) are ever written.
//! Stored as `{"state":{"user":..,"profile":..},"version":0}` under
//! [`STORAGE_KEY`].

use serde::{Deserialize, Serialize};

use crate::storage::StorageError;
use crate::store::SessionState;
use crate::types::{Identity, Profile};

/// Namespace key for the persisted subset.
pub const STORAGE_KEY: &str = "auth-storage";

pub const PERSIST_VERSION: u32 = 0;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(rename = "user", default)]
    pub identity: Option<Identity>,
    #[serde(default)]
    pub profile: Option<Profile>,
}

impl PersistedSession {
    /// Rebuild a fresh session state. Transient flags start cleared, and a
    /// profile not belonging to the persisted identity is dropped.
    #[must_use]
    pub fn into_state(self) -> SessionState {
        let profile = match (&self.identity, self.profile) {
            (Some(identity), Some(profile)) if profile.id == identity.id => Some(profile),
            _ => None,
        };
        SessionState { identity: self.identity, profile, is_loading: false, error: None }
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    state: &'a PersistedSession,
    version: u32,
}

#[derive(Deserialize)]
struct Envelope {
    state: PersistedSession,
    #[serde(default)]
    version: u32,
}

/// Project the state onto the persisted allow-list.
#[must_use]
pub fn partialize(state: &SessionState) -> PersistedSession {
    PersistedSession { identity: state.identity.clone(), profile: state.profile.clone() }
}

/// # Errors
///
/// Returns [`StorageError::Encode`] if serialization fails.
pub fn encode(persisted: &PersistedSession) -> Result<String, StorageError> {
    serde_json::to_string(&EnvelopeRef { state: persisted, version: PERSIST_VERSION })
        .map_err(|e| StorageError::Encode(e.to_string()))
}

/// # Errors
///
/// Returns [`StorageError::Decode`] for malformed input and
/// [`StorageError::UnsupportedVersion`] for envelopes written by another schema version.
pub fn decode(raw: &str) -> Result<PersistedSession, StorageError> {
    let envelope: Envelope = serde_json::from_str(raw).map_err(|e| StorageError::Decode(e.to_string()))?;
    if envelope.version != PERSIST_VERSION {
        return Err(StorageError::UnsupportedVersion(envelope.version));
    }
    Ok(envelope.state)
}

#[cfg(test)]
#[path = "persist_test.rs"]
mod tests;
