//! # authstore
//!
//! Client-side session state for apps backed by a hosted auth + database
//! service. Tracks the signed-in identity and its profile, persists that
//! pair to local storage, and follows session changes pushed by the remote
//! service.
//!
//! The store talks to the backend through the [`remote::AuthApi`] and
//! [`remote::DataApi`] seams; [`remote::supabase::SupabaseClient`] implements
//! both over HTTP.

pub mod config;
pub mod persist;
pub mod reconcile;
pub mod remote;
pub mod routes;
pub mod storage;
pub mod store;
pub mod types;

pub use reconcile::spawn_auth_listener;
pub use store::{SessionState, SessionStore};
