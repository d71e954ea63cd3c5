//! Edge gateway and service mesh constants
//!
//! Single source of truth for the names shared between the route builder,
//! the rate-limit policy builder and the request-time authenticator.

// =============================================================================
// Mesh entry point
// =============================================================================

/// Service that receives all north-south traffic into the mesh.
///
/// External routes never target model pods directly; they forward here and
/// rewrite the Host header to the model's internal serving hostname.
pub const MESH_ENTRY_SERVICE: &str = "istio-ingressgateway";

/// Namespace of [`MESH_ENTRY_SERVICE`]
pub const MESH_ENTRY_NAMESPACE: &str = "istio-system";

/// Plain HTTP port of [`MESH_ENTRY_SERVICE`]
pub const MESH_ENTRY_PORT: u16 = 80;

// =============================================================================
// Edge gateway
// =============================================================================

/// Shared edge Gateway carrying the public listeners
pub const EDGE_GATEWAY_NAME: &str = "ai-inference-gateway";

/// Namespace of the edge Gateway and of all per-model routing objects
pub const EDGE_GATEWAY_NAMESPACE: &str = "envoy-gateway-system";

/// Default TLS secret for HTTPS listeners added by hostname merge
pub const EDGE_TLS_SECRET: &str = "inference-gateway-tls";

/// Name prefix for listeners created by hostname merge.
///
/// Only listeners carrying this prefix are ever retracted.
pub const MANAGED_LISTENER_PREFIX: &str = "gh-";

// =============================================================================
// Headers
// =============================================================================

/// Dedicated API key header accepted alongside `Authorization: Bearer`
pub const API_KEY_HEADER: &str = "x-api-key";

/// Identity header: owning tenant
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Identity header: published model name
pub const MODEL_NAME_HEADER: &str = "x-model-name";

/// Identity header: published model namespace
pub const MODEL_NAMESPACE_HEADER: &str = "x-model-namespace";

/// Marker header keyed by the hourly token budget rule
pub const MODEL_TYPE_HEADER: &str = "x-model-type";

/// Header the AI gateway sets from the request body's `model` field
pub const AI_GATEWAY_MODEL_HEADER: &str = "x-ai-eg-model";

/// Regex an API key header value must satisfy on traditional routes
pub const API_KEY_HEADER_PATTERN: &str = "^[A-Za-z0-9_-]{43,}$";

// =============================================================================
// AI gateway token accounting
// =============================================================================

/// Dynamic metadata namespace the AI gateway writes token counts into
pub const AI_GATEWAY_METADATA_NAMESPACE: &str = "io.envoy.ai_gateway";

/// Metadata key carrying total tokens for a request
pub const LLM_TOTAL_TOKEN_KEY: &str = "llm_total_token";
