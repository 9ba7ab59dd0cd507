//! keepfs library: a single-tenant file server with per-account path ACLs.
//!
//! This crate provides the components for serving a directory over HTTP:
//! glob-pattern permissions, a live-reloaded JSON account store, Basic
//! authentication, `Want-Digest` negotiation and the request handler.

pub mod auth;
pub mod config;
pub mod digest;
pub mod errors;
pub mod handlers;
pub mod server;
pub mod store;

use crate::config::Config;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Account lookup, credential checks and the anonymous account.
    pub auth: auth::Auth,
}
