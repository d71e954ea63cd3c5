//! Model publishing workflows for gatehouse
//!
//! Turns a ready model into an authenticated, rate-limited external endpoint
//! and back. The [`Publisher`] sequences the building blocks in this crate and
//! undoes completed steps when a later one fails.

#![deny(missing_docs)]

pub mod audit;
pub mod classifier;
pub mod config;
pub mod credentials;
pub mod docs;
pub mod error;
pub mod orchestrator;
pub mod ratelimit;
pub mod readiness;
pub mod records;
pub mod rollback;
pub mod routes;
pub mod tenants;
pub mod types;
pub mod validation;

pub use config::PlatformConfig;
pub use error::{PublishError, Violation};
pub use orchestrator::{PublishResult, Publisher};
pub use types::{
    KeyIdentity, ModelType, PublishConfig, PublishedModel, RateLimitConfig, UsageSample,
    UsageSummary,
};
