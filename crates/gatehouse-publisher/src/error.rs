//! Publishing error taxonomy
//!
//! Every error has a stable machine-readable code. Workflow step failures
//! wrap the store error that caused them; rollback failures never appear
//! here because they are logged and dropped.

use serde::Serialize;
use thiserror::Error;

/// A single failed validation check
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Request field the check concerns (e.g. "rateLimiting.requestsPerMinute")
    pub field: String,
    /// What is wrong
    pub message: String,
}

impl Violation {
    /// Create a violation
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors returned by publishing workflows
#[derive(Debug, Error)]
pub enum PublishError {
    /// The model to publish does not exist
    #[error("model {namespace}/{model} not found")]
    ModelNotFound {
        /// Model namespace
        namespace: String,
        /// Model name
        model: String,
        /// Every violation found alongside
        violations: Vec<Violation>,
    },

    /// The model exists but is not serving
    #[error("model {namespace}/{model} is not ready")]
    ModelNotReady {
        /// Model namespace
        namespace: String,
        /// Model name
        model: String,
        /// Every violation found alongside
        violations: Vec<Violation>,
    },

    /// Tenant id missing or malformed
    #[error("invalid tenant: {}", join(.violations))]
    InvalidTenant {
        /// The tenant violation
        violations: Vec<Violation>,
    },

    /// A record already exists for this model
    #[error("model {namespace}/{model} is already published")]
    AlreadyPublished {
        /// Model namespace
        namespace: String,
        /// Model name
        model: String,
    },

    /// No record exists for this model
    #[error("model {namespace}/{model} is not published")]
    NotPublished {
        /// Model namespace
        namespace: String,
        /// Model name
        model: String,
    },

    /// One or more request checks failed
    #[error("validation failed: {}", join(.violations))]
    ValidationFailed {
        /// Every failed check
        violations: Vec<Violation>,
    },

    /// Creating routing objects or merging the hostname failed
    #[error("gateway configuration failed: {source}")]
    GatewayConfigFailed {
        /// Underlying store error
        #[source]
        source: gatehouse_common::Error,
    },

    /// Creating the traffic policy failed
    #[error("rate limit configuration failed: {source}")]
    RateLimitConfigFailed {
        /// Underlying store error
        #[source]
        source: gatehouse_common::Error,
    },

    /// Issuing or rotating the credential failed
    #[error("API key generation failed: {source}")]
    ApiKeyGenerationFailed {
        /// Underlying store error
        #[source]
        source: gatehouse_common::Error,
    },

    /// Persisting the metadata record failed
    #[error("metadata storage failed: {source}")]
    MetadataStorageFailed {
        /// Underlying store error
        #[source]
        source: gatehouse_common::Error,
    },

    /// Key missing, unknown, inactive, or expired
    #[error("unauthorized")]
    Unauthorized,

    /// Store failure outside a compensated workflow step
    #[error("store error: {0}")]
    Store(#[from] gatehouse_common::Error),
}

impl PublishError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            PublishError::ModelNotFound { .. } => "MODEL_NOT_FOUND",
            PublishError::ModelNotReady { .. } => "MODEL_NOT_READY",
            PublishError::InvalidTenant { .. } => "INVALID_TENANT",
            PublishError::AlreadyPublished { .. } => "ALREADY_PUBLISHED",
            PublishError::NotPublished { .. } => "NOT_PUBLISHED",
            PublishError::ValidationFailed { .. } => "VALIDATION_FAILED",
            PublishError::GatewayConfigFailed { .. } => "GATEWAY_CONFIG_FAILED",
            PublishError::RateLimitConfigFailed { .. } => "RATE_LIMIT_CONFIG_FAILED",
            PublishError::ApiKeyGenerationFailed { .. } => "API_KEY_GENERATION_FAILED",
            PublishError::MetadataStorageFailed { .. } => "METADATA_STORAGE_FAILED",
            PublishError::Unauthorized => "UNAUTHORIZED",
            PublishError::Store(_) => "STORE_ERROR",
        }
    }

    /// Violations carried by validation-stage errors
    pub fn violations(&self) -> &[Violation] {
        match self {
            PublishError::ModelNotFound { violations, .. }
            | PublishError::ModelNotReady { violations, .. }
            | PublishError::InvalidTenant { violations }
            | PublishError::ValidationFailed { violations } => violations,
            _ => &[],
        }
    }

    /// Shorthand for [`PublishError::NotPublished`]
    pub fn not_published(namespace: &str, model: &str) -> Self {
        PublishError::NotPublished {
            namespace: namespace.to_string(),
            model: model.to_string(),
        }
    }
}
