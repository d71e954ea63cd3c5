//! HTTP surface for gatehouse
//!
//! Exposes the publishing workflows over a JSON API, authenticates callers
//! with operator tokens or model API keys, and maps workflow errors onto
//! HTTP statuses.

#![deny(missing_docs)]

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;

pub use error::{Error, Result};
pub use server::{router, start_server, AppState, ServerConfig};
