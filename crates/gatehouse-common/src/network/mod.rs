//! Typed edge routing resources
//!
//! Builders for:
//! - Gateway API resources (Gateway, HTTPRoute, ReferenceGrant)
//! - Envoy Gateway extensions (Backend, BackendTrafficPolicy)
//! - Envoy AI Gateway resources (AIServiceBackend, AIGatewayRoute)
//!
//! All types implement [`HasApiResource`](crate::HasApiResource) and are
//! serialized to JSON only at the store boundary.

/// Implement `default_api_version()` and `default_kind()` for serde defaults
/// on types implementing `HasApiResource`.
macro_rules! impl_api_defaults {
    ($type:ty) => {
        impl $type {
            fn default_api_version() -> String {
                <Self as $crate::kube_utils::HasApiResource>::API_VERSION.to_string()
            }
            fn default_kind() -> String {
                <Self as $crate::kube_utils::HasApiResource>::KIND.to_string()
            }
        }
    };
}

pub mod ai_gateway;
pub mod envoy;
pub mod gateway_api;

use serde::{Deserialize, Serialize};

/// Reference from a policy or backend to another object by group/kind/name
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalObjectRef {
    /// API group ("" for core)
    pub group: String,
    /// Resource kind
    pub kind: String,
    /// Object name
    pub name: String,
}

impl LocalObjectRef {
    /// Reference an object of type `T` by name
    pub fn to<T: crate::HasApiResource>(name: impl Into<String>) -> Self {
        let (group, _) = crate::kube_utils::parse_api_version(T::API_VERSION);
        Self {
            group,
            kind: T::KIND.to_string(),
            name: name.into(),
        }
    }
}
