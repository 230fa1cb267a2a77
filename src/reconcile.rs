//! Auth-event listener keeping the store in step with the remote session.
//!
//! DESIGN
//! ======
//! Subscribes once, before spawning, so no event sent after this call is
//! missed. Each event is applied in arrival order; explicit store operations
//! keep running concurrently and may overwrite (or be overwritten by) the
//! listener. A lagging receiver skips the dropped events and keeps going.

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::store::SessionStore;

/// Spawn the standing auth-event subscription. Returns a handle for shutdown.
pub fn spawn_auth_listener(store: SessionStore) -> JoinHandle<()> {
    let mut events = store.auth().on_auth_state_change();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => store.apply_auth_event(event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "auth listener lagged; events dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("auth event channel closed");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod tests;
