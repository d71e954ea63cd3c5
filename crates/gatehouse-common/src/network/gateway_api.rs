//! Gateway API types
//!
//! - **Gateway**: the shared edge gateway whose listeners carry public hostnames
//! - **HTTPRoute**: per-model routes for traditional (predict-style) models
//! - **ReferenceGrant**: cross-namespace permission into the mesh entry namespace

use serde::{Deserialize, Serialize};

use crate::kube_utils::{HasApiResource, ObjectMeta};

/// API group shared by all Gateway API kinds
pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";

// =============================================================================
// Gateway
// =============================================================================

/// Kubernetes Gateway API Gateway resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Gateway {
    /// API version (gateway.networking.k8s.io/v1)
    #[serde(default = "Gateway::default_api_version")]
    pub api_version: String,
    /// Resource kind (Gateway)
    #[serde(default = "Gateway::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Gateway specification
    pub spec: GatewaySpec,
}

impl HasApiResource for Gateway {
    const API_VERSION: &'static str = "gateway.networking.k8s.io/v1";
    const KIND: &'static str = "Gateway";
}

impl_api_defaults!(Gateway);

impl Gateway {
    /// Create a new Gateway
    pub fn new(metadata: ObjectMeta, spec: GatewaySpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// Gateway spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// GatewayClass name
    pub gateway_class_name: String,
    /// Listener configurations
    #[serde(default)]
    pub listeners: Vec<GatewayListener>,
}

/// Gateway listener configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayListener {
    /// Listener name
    pub name: String,
    /// Hostname filter; absent means the listener accepts every hostname
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Port number
    pub port: u16,
    /// Protocol (HTTP, HTTPS)
    pub protocol: String,
    /// TLS configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<GatewayTlsConfig>,
    /// Allowed routes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_routes: Option<AllowedRoutes>,
}

impl GatewayListener {
    /// Plain HTTP listener on port 80 for one hostname
    pub fn http(name: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hostname: Some(hostname.into()),
            port: 80,
            protocol: "HTTP".to_string(),
            tls: None,
            allowed_routes: Some(AllowedRoutes::all_namespaces()),
        }
    }

    /// TLS-terminating HTTPS listener on port 443 for one hostname
    pub fn https(
        name: impl Into<String>,
        hostname: impl Into<String>,
        tls_secret: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            hostname: Some(hostname.into()),
            port: 443,
            protocol: "HTTPS".to_string(),
            tls: Some(GatewayTlsConfig {
                mode: "Terminate".to_string(),
                certificate_refs: vec![CertificateRef {
                    kind: Some("Secret".to_string()),
                    name: tls_secret.into(),
                }],
            }),
            allowed_routes: Some(AllowedRoutes::all_namespaces()),
        }
    }

    /// Whether a request for `hostname` would be accepted by this listener
    pub fn covers(&self, hostname: &str) -> bool {
        hostname_matches(self.hostname.as_deref(), hostname)
    }
}

/// Whether a listener hostname filter accepts `hostname`
///
/// `None` accepts everything. A wildcard `*.example.com` matches any
/// subdomain but not `example.com` itself.
pub fn hostname_matches(pattern: Option<&str>, hostname: &str) -> bool {
    let hostname = hostname.to_ascii_lowercase();
    match pattern.map(str::to_ascii_lowercase) {
        None => true,
        Some(pattern) => match pattern.strip_prefix("*.") {
            Some(suffix) => hostname
                .strip_suffix(suffix)
                .and_then(|head| head.strip_suffix('.'))
                .is_some_and(|head| !head.is_empty()),
            None => pattern == hostname,
        },
    }
}

/// Gateway TLS configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayTlsConfig {
    /// TLS mode (Terminate, Passthrough)
    #[serde(default = "default_tls_mode")]
    pub mode: String,
    /// Certificate references
    #[serde(default)]
    pub certificate_refs: Vec<CertificateRef>,
}

fn default_tls_mode() -> String {
    "Terminate".to_string()
}

/// Reference to a TLS certificate secret
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRef {
    /// Resource kind (default: Secret)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Secret name
    pub name: String,
}

/// Allowed routes for a gateway listener
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllowedRoutes {
    /// Namespace selector
    pub namespaces: RouteNamespaces,
}

impl AllowedRoutes {
    /// Routes allowed from any namespace
    pub fn all_namespaces() -> Self {
        Self {
            namespaces: RouteNamespaces {
                from: "All".to_string(),
            },
        }
    }
}

/// Route namespace selector
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteNamespaces {
    /// Namespace selection mode (Same, All, Selector)
    pub from: String,
}

// =============================================================================
// HTTPRoute
// =============================================================================

/// Kubernetes Gateway API HTTPRoute resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    /// API version (gateway.networking.k8s.io/v1)
    #[serde(default = "HttpRoute::default_api_version")]
    pub api_version: String,
    /// Resource kind (HTTPRoute)
    #[serde(default = "HttpRoute::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// HTTPRoute specification
    pub spec: HttpRouteSpec,
}

impl HasApiResource for HttpRoute {
    const API_VERSION: &'static str = "gateway.networking.k8s.io/v1";
    const KIND: &'static str = "HTTPRoute";
}

impl_api_defaults!(HttpRoute);

impl HttpRoute {
    /// Create a new HTTPRoute
    pub fn new(metadata: ObjectMeta, spec: HttpRouteSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// HTTPRoute spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteSpec {
    /// Parent gateway references
    pub parent_refs: Vec<ParentRef>,
    /// Hostnames to match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,
    /// Routing rules
    pub rules: Vec<HttpRouteRule>,
}

/// Parent reference for route resources
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParentRef {
    /// API group (gateway.networking.k8s.io)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Resource kind (Gateway)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Gateway name
    pub name: String,
    /// Gateway namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Listener section name to bind to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

impl ParentRef {
    /// Reference a Gateway, binding to every listener that accepts the route
    pub fn gateway(name: &str, namespace: &str) -> Self {
        Self {
            group: Some(GATEWAY_API_GROUP.to_string()),
            kind: Some("Gateway".to_string()),
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            section_name: None,
        }
    }
}

/// HTTPRoute rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteRule {
    /// Request matches
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<HttpRouteMatch>,
    /// Filters applied before forwarding
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<HttpRouteFilter>,
    /// Backend references
    pub backend_refs: Vec<BackendRef>,
}

/// HTTP route match
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteMatch {
    /// Path match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<HttpPathMatch>,
    /// Header matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<HttpHeaderMatch>>,
}

/// HTTP path match
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpPathMatch {
    /// Match type (PathPrefix, Exact)
    #[serde(rename = "type")]
    pub type_: String,
    /// Path value
    pub value: String,
}

impl HttpPathMatch {
    /// Prefix match on `value`
    pub fn prefix(value: impl Into<String>) -> Self {
        Self {
            type_: "PathPrefix".to_string(),
            value: value.into(),
        }
    }
}

/// HTTP header match
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpHeaderMatch {
    /// Header name
    pub name: String,
    /// Header value
    pub value: String,
    /// Match type (Exact or RegularExpression)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

impl HttpHeaderMatch {
    /// Exact header value match
    pub fn exact(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            type_: Some("Exact".to_string()),
        }
    }

    /// Regular expression header value match
    pub fn regex(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: pattern.into(),
            type_: Some("RegularExpression".to_string()),
        }
    }
}

/// HTTPRoute filter
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteFilter {
    /// Filter type (URLRewrite, RequestHeaderModifier)
    #[serde(rename = "type")]
    pub type_: String,
    /// Rewrite configuration for URLRewrite
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_rewrite: Option<HttpUrlRewrite>,
    /// Header edits for RequestHeaderModifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_header_modifier: Option<HttpHeaderModifier>,
}

impl HttpRouteFilter {
    /// Rewrite the Host header and replace the matched path prefix
    pub fn url_rewrite(hostname: impl Into<String>, path_prefix: impl Into<String>) -> Self {
        Self {
            type_: "URLRewrite".to_string(),
            url_rewrite: Some(HttpUrlRewrite {
                hostname: Some(hostname.into()),
                path: Some(HttpPathModifier {
                    type_: "ReplacePrefixMatch".to_string(),
                    replace_prefix_match: Some(path_prefix.into()),
                }),
            }),
            request_header_modifier: None,
        }
    }

    /// Set request headers before forwarding
    pub fn set_headers(headers: Vec<HttpHeader>) -> Self {
        Self {
            type_: "RequestHeaderModifier".to_string(),
            url_rewrite: None,
            request_header_modifier: Some(HttpHeaderModifier { set: headers }),
        }
    }
}

/// URLRewrite filter body
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpUrlRewrite {
    /// Replacement Host header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Path modification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<HttpPathModifier>,
}

/// Path modifier for URLRewrite
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpPathModifier {
    /// Modifier type (ReplacePrefixMatch, ReplaceFullPath)
    #[serde(rename = "type")]
    pub type_: String,
    /// Replacement for the matched prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_prefix_match: Option<String>,
}

/// RequestHeaderModifier filter body
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpHeaderModifier {
    /// Headers to set, overwriting client-supplied values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub set: Vec<HttpHeader>,
}

/// Header name/value pair
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HttpHeader {
    /// Header name
    pub name: String,
    /// Header value
    pub value: String,
}

impl HttpHeader {
    /// Create a header pair
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Backend reference
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendRef {
    /// API group ("" for core Service)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Resource kind (Service, AIServiceBackend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Object name
    pub name: String,
    /// Namespace when different from the route's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Service port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl BackendRef {
    /// Reference a Service, possibly in another namespace
    pub fn service(name: &str, namespace: &str, port: u16) -> Self {
        Self {
            group: None,
            kind: Some("Service".to_string()),
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            port: Some(port),
        }
    }
}

// =============================================================================
// ReferenceGrant
// =============================================================================

/// Gateway API ReferenceGrant, living in the namespace being referenced
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceGrant {
    /// API version (gateway.networking.k8s.io/v1beta1)
    #[serde(default = "ReferenceGrant::default_api_version")]
    pub api_version: String,
    /// Resource kind (ReferenceGrant)
    #[serde(default = "ReferenceGrant::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Grant specification
    pub spec: ReferenceGrantSpec,
}

impl HasApiResource for ReferenceGrant {
    const API_VERSION: &'static str = "gateway.networking.k8s.io/v1beta1";
    const KIND: &'static str = "ReferenceGrant";
}

impl_api_defaults!(ReferenceGrant);

impl ReferenceGrant {
    /// Create a new ReferenceGrant
    pub fn new(metadata: ObjectMeta, spec: ReferenceGrantSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// ReferenceGrant spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReferenceGrantSpec {
    /// Objects allowed to reference
    pub from: Vec<ReferenceGrantFrom>,
    /// Objects that may be referenced
    pub to: Vec<ReferenceGrantTo>,
}

/// Source of a permitted reference
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReferenceGrantFrom {
    /// API group of the referencing kind
    pub group: String,
    /// Referencing kind
    pub kind: String,
    /// Namespace of the referencing objects
    pub namespace: String,
}

/// Target of a permitted reference
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReferenceGrantTo {
    /// API group of the target ("" for core)
    pub group: String,
    /// Target kind
    pub kind: String,
    /// Restrict to one object name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
