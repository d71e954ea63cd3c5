//! Common types for gatehouse: store adapter, typed gateway resources, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod lock;
pub mod mesh;
pub mod network;
pub mod retry;
pub mod store;
pub mod telemetry;

pub use error::Error;
pub use kube_utils::{HasApiResource, ObjectMeta, ResourceKind};
pub use store::{KubeResourceStore, ResourceStore};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace for gatehouse system resources (key index)
pub const GATEHOUSE_SYSTEM_NAMESPACE: &str = "gatehouse-system";

/// Standard Kubernetes label for the resource name
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Standard Kubernetes label for the managing controller
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_MANAGED_BY`] for objects created by gatehouse
pub const LABEL_MANAGED_BY_GATEHOUSE: &str = "gatehouse";

/// Label key naming which gatehouse component owns an object
pub const LABEL_COMPONENT: &str = "gatehouse.io/component";

/// Label key carrying the published model name
pub const LABEL_MODEL: &str = "gatehouse.io/model";

/// Label key carrying the owning tenant id
pub const LABEL_TENANT: &str = "gatehouse.io/tenant";

/// Label key carrying the model's namespace (for objects living elsewhere)
pub const LABEL_MODEL_NAMESPACE: &str = "gatehouse.io/model-namespace";

/// Component value for published-model metadata records
pub const COMPONENT_PUBLISHED_MODEL: &str = "published-model";

/// Component value for credential records
pub const COMPONENT_API_KEY: &str = "api-key";

/// Component value for key index entries
pub const COMPONENT_KEY_INDEX: &str = "key-index";

/// Component value for routing objects
pub const COMPONENT_ROUTE: &str = "route";

/// Component value for traffic policies
pub const COMPONENT_RATE_LIMIT: &str = "rate-limit";

/// Component value for audit records
pub const COMPONENT_AUDIT: &str = "audit";

/// Component value for usage records
pub const COMPONENT_USAGE: &str = "usage";
