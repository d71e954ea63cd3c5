//! Error types for store and resource operations
//!
//! Errors carry the resource kind and name they concern so that callers
//! higher up (the publishing workflow) can report which object failed.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for store-level operations
#[derive(Debug, Error)]
pub enum Error {
    /// The object already exists (create on a taken name)
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        /// Resource kind (e.g., "HTTPRoute")
        kind: String,
        /// Namespace of the object
        namespace: String,
        /// Object name
        name: String,
    },

    /// The object does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Resource kind
        kind: String,
        /// Namespace of the object
        namespace: String,
        /// Object name
        name: String,
    },

    /// Optimistic concurrency conflict (stale resourceVersion)
    #[error("conflict updating {kind} {namespace}/{name}")]
    Conflict {
        /// Resource kind
        kind: String,
        /// Namespace of the object
        namespace: String,
        /// Object name
        name: String,
    },

    /// Kubernetes API error not covered by the variants above
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Failure injected by a test store
    #[error("injected failure: {operation} {kind}")]
    InjectedFailure {
        /// Store operation that was failed
        operation: String,
        /// Resource kind the failure applied to
        kind: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "store", "lock")
        context: String,
    },
}

impl Error {
    /// Create an already-exists error
    pub fn already_exists(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Map a kube-rs error for a specific object onto the store taxonomy
    ///
    /// 404 becomes `NotFound`, 409 with reason `AlreadyExists` becomes
    /// `AlreadyExists`, any other 409 becomes `Conflict`.
    pub fn from_kube(kind: &str, namespace: &str, name: &str, err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(ae) if ae.code == 404 => Self::not_found(kind, namespace, name),
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                Self::already_exists(kind, namespace, name)
            }
            kube::Error::Api(ae) if ae.code == 409 => Self::conflict(kind, namespace, name),
            _ => Self::Kube { source: err },
        }
    }

    /// True when the object was absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// True when a create hit an existing object
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. })
    }

    /// True when a replace lost an optimistic concurrency race
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Check if this error is retryable
    ///
    /// Conflicts and transient API errors are retryable; existence errors
    /// and serialization errors need a different request to succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Conflict { .. } => true,
            Error::AlreadyExists { .. } => false,
            Error::NotFound { .. } => false,
            Error::Serialization { .. } => false,
            Error::InjectedFailure { .. } => false,
            Error::Internal { .. } => true,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}
