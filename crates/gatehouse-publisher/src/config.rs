//! Platform configuration
//!
//! Everything the workflows need to know about the surrounding platform:
//! where the edge gateway lives, how traffic enters the mesh, which namespaces
//! are tenants. The binary builds this from CLI flags and environment.

use std::time::Duration;

use gatehouse_common::mesh;

/// Platform-wide settings shared by all workflows
#[derive(Clone, Debug)]
pub struct PlatformConfig {
    /// Public hostname used when a publish request names none
    pub default_hostname: String,
    /// URL scheme advertised in external URLs
    pub external_scheme: String,
    /// Shared edge Gateway name
    pub gateway_name: String,
    /// Namespace of the edge Gateway and all per-model routing objects
    pub gateway_namespace: String,
    /// TLS secret for HTTPS listeners added by hostname merge
    pub tls_secret_name: String,
    /// Mesh entry Service routes forward to
    pub mesh_service: String,
    /// Namespace of the mesh entry Service
    pub mesh_namespace: String,
    /// Port of the mesh entry Service
    pub mesh_port: u16,
    /// Namespace holding the key index
    pub system_namespace: String,
    /// Namespace label identifying tenant namespaces
    pub tenant_label: String,
    /// Namespaces scanned when the tenant registry cannot be queried
    pub fallback_tenant_namespaces: Vec<String>,
    /// How long a tenant namespace listing is reused
    pub tenant_cache_ttl: Duration,
    /// Lifetime of issued keys; None = keys never expire
    pub key_ttl: Option<Duration>,
    /// Remove edge listeners for hostnames no published model uses anymore
    pub retract_unused_hostnames: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            default_hostname: "inference.platform.local".to_string(),
            external_scheme: "https".to_string(),
            gateway_name: mesh::EDGE_GATEWAY_NAME.to_string(),
            gateway_namespace: mesh::EDGE_GATEWAY_NAMESPACE.to_string(),
            tls_secret_name: mesh::EDGE_TLS_SECRET.to_string(),
            mesh_service: mesh::MESH_ENTRY_SERVICE.to_string(),
            mesh_namespace: mesh::MESH_ENTRY_NAMESPACE.to_string(),
            mesh_port: mesh::MESH_ENTRY_PORT,
            system_namespace: gatehouse_common::GATEHOUSE_SYSTEM_NAMESPACE.to_string(),
            tenant_label: gatehouse_common::LABEL_TENANT.to_string(),
            fallback_tenant_namespaces: vec!["default".to_string()],
            tenant_cache_ttl: Duration::from_secs(30),
            key_ttl: Some(Duration::from_secs(365 * 24 * 60 * 60)),
            retract_unused_hostnames: false,
        }
    }
}
