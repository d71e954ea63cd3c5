//! Shared Kubernetes resource helpers
//!
//! Typed resources are built as plain structs and serialized at the store
//! boundary. Each type knows its apiVersion and kind through [`HasApiResource`],
//! which is also how the store addresses the matching collection.

use std::collections::BTreeMap;

use kube::discovery::ApiResource;

// =============================================================================
// ObjectMeta - Canonical metadata for all built resources
// =============================================================================

/// Kubernetes ObjectMeta for resources built by gatehouse.
///
/// Automatically adds gatehouse management labels on construction. Unknown
/// metadata fields returned by the store (uid, managedFields, ...) are ignored
/// on deserialization.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace
    #[serde(default)]
    pub namespace: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Optimistic concurrency token, present on objects read from the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

impl ObjectMeta {
    /// Create new metadata with standard gatehouse labels
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let name = name.into();
        let mut labels = BTreeMap::new();
        labels.insert(crate::LABEL_NAME.to_string(), name.clone());
        labels.insert(
            crate::LABEL_MANAGED_BY.to_string(),
            crate::LABEL_MANAGED_BY_GATEHOUSE.to_string(),
        );
        Self {
            name,
            namespace: namespace.into(),
            labels,
            annotations: BTreeMap::new(),
            resource_version: None,
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Convert into the k8s-openapi metadata used by core types (ConfigMap, Secret)
    pub fn into_k8s(self) -> k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
        k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
            name: Some(self.name),
            namespace: Some(self.namespace),
            labels: (!self.labels.is_empty()).then_some(self.labels),
            annotations: (!self.annotations.is_empty()).then_some(self.annotations),
            resource_version: self.resource_version,
            ..Default::default()
        }
    }
}

// =============================================================================
// ResourceKind / HasApiResource
// =============================================================================

/// Static description of a resource collection in the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceKind {
    /// Full API version (e.g., "gateway.networking.k8s.io/v1", "v1")
    pub api_version: &'static str,
    /// Resource kind (e.g., "HTTPRoute")
    pub kind: &'static str,
    /// Whether objects of this kind live in a namespace
    pub namespaced: bool,
}

impl ResourceKind {
    /// Core ConfigMap (metadata, index, audit and usage records)
    pub const CONFIG_MAP: ResourceKind = ResourceKind::namespaced("v1", "ConfigMap");
    /// Core Secret (credential records)
    pub const SECRET: ResourceKind = ResourceKind::namespaced("v1", "Secret");
    /// Core Namespace (tenant registry)
    pub const NAMESPACE: ResourceKind = ResourceKind {
        api_version: "v1",
        kind: "Namespace",
        namespaced: false,
    };

    /// Describe a namespaced kind
    pub const fn namespaced(api_version: &'static str, kind: &'static str) -> Self {
        Self {
            api_version,
            kind,
            namespaced: true,
        }
    }

    /// Build the kube-rs ApiResource for this kind
    pub fn api_resource(&self) -> ApiResource {
        build_api_resource(self.api_version, self.kind)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}

/// Trait for types that have a known API group, version, and kind.
///
/// Implement this for resource builders so serialization and store access
/// always agree on the apiVersion.
///
/// # Example
/// ```ignore
/// impl HasApiResource for HttpRoute {
///     const API_VERSION: &'static str = "gateway.networking.k8s.io/v1";
///     const KIND: &'static str = "HTTPRoute";
/// }
///
/// store.create(HttpRoute::resource_kind(), ns, &value).await?;
/// ```
pub trait HasApiResource {
    /// Full API version (e.g., "gateway.networking.k8s.io/v1", "v1")
    const API_VERSION: &'static str;
    /// Resource kind (e.g., "HTTPRoute")
    const KIND: &'static str;

    /// Store descriptor for this (namespaced) type
    fn resource_kind() -> ResourceKind {
        ResourceKind::namespaced(Self::API_VERSION, Self::KIND)
    }

    /// Build an ApiResource from the type's constants.
    fn api_resource() -> ApiResource {
        build_api_resource(Self::API_VERSION, Self::KIND)
    }
}

/// Build an ApiResource from a known apiVersion and kind.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Split an apiVersion into (group, version)
///
/// ```
/// use gatehouse_common::kube_utils::parse_api_version;
///
/// assert_eq!(parse_api_version("gateway.networking.k8s.io/v1"), ("gateway.networking.k8s.io".to_string(), "v1".to_string()));
/// assert_eq!(parse_api_version("v1"), (String::new(), "v1".to_string()));
/// ```
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Kinds whose plural is not derivable by the simple rules below
const KIND_PLURALS: &[(&str, &str)] = &[
    ("backendtrafficpolicy", "backendtrafficpolicies"),
    ("aigatewayroute", "aigatewayroutes"),
    ("aiservicebackend", "aiservicebackends"),
];

/// Pluralize a Kubernetes resource kind
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    for (singular, plural) in KIND_PLURALS {
        if *singular == lower {
            return (*plural).to_string();
        }
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

// =============================================================================
// Naming
// =============================================================================

/// Maximum length of a DNS-1123 label
pub const MAX_NAME_LEN: usize = 63;

/// Compute a deterministic hash of the input string, returning a 16-char hex digest.
///
/// Uses truncated SHA-256 so names derived from it are stable across releases.
pub fn deterministic_hash(input: &str) -> String {
    use aws_lc_rs::digest;
    let hash = digest::digest(&digest::SHA256, input.as_bytes());
    hex_prefix(hash.as_ref(), 8)
}

/// Lowercase hex of the first `bytes` bytes of `data`
pub fn hex_prefix(data: &[u8], bytes: usize) -> String {
    data.iter()
        .take(bytes)
        .fold(String::with_capacity(bytes * 2), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// Build a DNS-1123 compliant object name from parts.
///
/// Parts are joined with `-`, lowercased, and non-alphanumerics replaced.
/// Names longer than 63 characters are truncated and suffixed with a
/// deterministic hash of the full name so distinct inputs stay distinct.
pub fn resource_name(parts: &[&str]) -> String {
    let joined = parts.join("-");
    let sanitized: String = joined
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let sanitized = sanitized.trim_matches('-').to_string();

    if sanitized.len() <= MAX_NAME_LEN {
        return sanitized;
    }

    let hash = deterministic_hash(&joined);
    let keep = MAX_NAME_LEN - hash.len() - 1;
    let prefix = sanitized[..keep].trim_end_matches('-');
    format!("{}-{}", prefix, hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_meta_carries_management_labels() {
        let meta = ObjectMeta::new("iris-route", "gateway");
        assert_eq!(meta.labels.get(crate::LABEL_NAME), Some(&"iris-route".to_string()));
        assert_eq!(
            meta.labels.get(crate::LABEL_MANAGED_BY),
            Some(&"gatehouse".to_string())
        );
        assert!(meta.resource_version.is_none());
    }

    #[test]
    fn object_meta_converts_to_k8s() {
        let meta = ObjectMeta::new("x", "ns").with_annotation("a", "b");
        let k8s = meta.into_k8s();
        assert_eq!(k8s.name.as_deref(), Some("x"));
        assert_eq!(k8s.namespace.as_deref(), Some("ns"));
        assert_eq!(
            k8s.annotations.and_then(|a| a.get("a").cloned()),
            Some("b".to_string())
        );
    }

    #[test]
    fn builds_api_resource_for_known_plurals() {
        let ar = build_api_resource("gateway.envoyproxy.io/v1alpha1", "BackendTrafficPolicy");
        assert_eq!(ar.group, "gateway.envoyproxy.io");
        assert_eq!(ar.version, "v1alpha1");
        assert_eq!(ar.plural, "backendtrafficpolicies");

        assert_eq!(pluralize_kind("HTTPRoute"), "httproutes");
        assert_eq!(pluralize_kind("ConfigMap"), "configmaps");
        assert_eq!(pluralize_kind("Gateway"), "gateways");
        assert_eq!(pluralize_kind("Backend"), "backends");
    }

    #[test]
    fn resource_name_sanitizes() {
        assert_eq!(resource_name(&["Team_A", "iris", "route"]), "team-a-iris-route");
    }

    #[test]
    fn resource_name_truncates_with_stable_hash() {
        let long = "m".repeat(80);
        let a = resource_name(&["tenant", &long, "route"]);
        let b = resource_name(&["tenant", &long, "route"]);
        assert_eq!(a, b);
        assert!(a.len() <= MAX_NAME_LEN);

        let c = resource_name(&["tenant", &long, "grant"]);
        assert_ne!(a, c);
    }

    #[test]
    fn deterministic_hash_is_16_hex_chars() {
        let h = deterministic_hash("iris");
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(h, deterministic_hash("iris"));
    }
}
