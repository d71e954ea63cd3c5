//! Envoy AI Gateway resources
//!
//! The AI gateway route cannot point at an arbitrary host, so OpenAI-compatible
//! models are reached through an [`AiServiceBackend`] that wraps an Envoy
//! Gateway `Backend` and declares the API schema.

use serde::{Deserialize, Serialize};

use super::gateway_api::ParentRef;
use super::LocalObjectRef;
use crate::kube_utils::{HasApiResource, ObjectMeta};

/// Schema name for OpenAI-compatible APIs
pub const OPENAI_SCHEMA: &str = "OpenAI";

/// API schema declaration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ApiSchema {
    /// Schema name (OpenAI, AWSBedrock)
    pub name: String,
}

impl ApiSchema {
    /// The OpenAI schema
    pub fn openai() -> Self {
        Self {
            name: OPENAI_SCHEMA.to_string(),
        }
    }
}

// =============================================================================
// AIServiceBackend
// =============================================================================

/// Envoy AI Gateway AIServiceBackend resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiServiceBackend {
    /// API version (aigateway.envoyproxy.io/v1alpha1)
    #[serde(default = "AiServiceBackend::default_api_version")]
    pub api_version: String,
    /// Resource kind (AIServiceBackend)
    #[serde(default = "AiServiceBackend::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Backend specification
    pub spec: AiServiceBackendSpec,
}

impl HasApiResource for AiServiceBackend {
    const API_VERSION: &'static str = "aigateway.envoyproxy.io/v1alpha1";
    const KIND: &'static str = "AIServiceBackend";
}

impl_api_defaults!(AiServiceBackend);

impl AiServiceBackend {
    /// OpenAI-schema backend wrapping an Envoy Gateway Backend
    pub fn openai(metadata: ObjectMeta, backend: LocalObjectRef) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec: AiServiceBackendSpec {
                schema: ApiSchema::openai(),
                backend_ref: backend,
            },
        }
    }
}

/// AIServiceBackend spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiServiceBackendSpec {
    /// API schema spoken by the backend
    pub schema: ApiSchema,
    /// The wrapped Envoy Gateway Backend
    pub backend_ref: LocalObjectRef,
}

// =============================================================================
// AIGatewayRoute
// =============================================================================

/// Envoy AI Gateway AIGatewayRoute resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiGatewayRoute {
    /// API version (aigateway.envoyproxy.io/v1alpha1)
    #[serde(default = "AiGatewayRoute::default_api_version")]
    pub api_version: String,
    /// Resource kind (AIGatewayRoute)
    #[serde(default = "AiGatewayRoute::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Route specification
    pub spec: AiGatewayRouteSpec,
}

impl HasApiResource for AiGatewayRoute {
    const API_VERSION: &'static str = "aigateway.envoyproxy.io/v1alpha1";
    const KIND: &'static str = "AIGatewayRoute";
}

impl_api_defaults!(AiGatewayRoute);

impl AiGatewayRoute {
    /// Create a new AIGatewayRoute
    pub fn new(metadata: ObjectMeta, spec: AiGatewayRouteSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// AIGatewayRoute spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiGatewayRouteSpec {
    /// Gateways this route attaches to
    pub parent_refs: Vec<ParentRef>,
    /// Input schema clients speak
    pub schema: ApiSchema,
    /// Routing rules
    pub rules: Vec<AiGatewayRouteRule>,
    /// Token accounting written to dynamic metadata
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub llm_request_costs: Vec<LlmRequestCost>,
}

/// AIGatewayRoute rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiGatewayRouteRule {
    /// Header matches
    pub matches: Vec<AiGatewayRouteMatch>,
    /// Target AIServiceBackends
    pub backend_refs: Vec<AiGatewayBackendRef>,
}

/// AIGatewayRoute match
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AiGatewayRouteMatch {
    /// Header conditions
    pub headers: Vec<super::gateway_api::HttpHeaderMatch>,
}

/// Reference to an AIServiceBackend
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AiGatewayBackendRef {
    /// AIServiceBackend name
    pub name: String,
}

/// Token cost extracted from responses
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LlmRequestCost {
    /// Dynamic metadata key to write
    pub metadata_key: String,
    /// Token kind (InputToken, OutputToken, TotalToken)
    #[serde(rename = "type")]
    pub type_: String,
}

impl LlmRequestCost {
    /// Total token count written under `metadata_key`
    pub fn total_tokens(metadata_key: impl Into<String>) -> Self {
        Self {
            metadata_key: metadata_key.into(),
            type_: "TotalToken".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::envoy::Backend;
    use crate::network::gateway_api::HttpHeaderMatch;

    #[test]
    fn service_backend_wraps_envoy_backend() {
        let backend = AiServiceBackend::openai(
            ObjectMeta::new("a-llama-ai-backend", "gw"),
            LocalObjectRef::to::<Backend>("a-llama-backend"),
        );
        let value = serde_json::to_value(&backend).expect("serializes");
        assert_eq!(value["kind"], "AIServiceBackend");
        assert_eq!(value["spec"]["schema"]["name"], "OpenAI");
        assert_eq!(value["spec"]["backendRef"]["kind"], "Backend");
        assert_eq!(value["spec"]["backendRef"]["group"], "gateway.envoyproxy.io");
    }

    #[test]
    fn route_matches_model_header() {
        let route = AiGatewayRoute::new(
            ObjectMeta::new("a-llama-route", "gw"),
            AiGatewayRouteSpec {
                parent_refs: vec![ParentRef::gateway("gw", "gw-ns")],
                schema: ApiSchema::openai(),
                rules: vec![AiGatewayRouteRule {
                    matches: vec![AiGatewayRouteMatch {
                        headers: vec![HttpHeaderMatch::exact("x-ai-eg-model", "llama")],
                    }],
                    backend_refs: vec![AiGatewayBackendRef {
                        name: "a-llama-ai-backend".to_string(),
                    }],
                }],
                llm_request_costs: vec![LlmRequestCost::total_tokens("llm_total_token")],
            },
        );
        let value = serde_json::to_value(&route).expect("serializes");
        let header = &value["spec"]["rules"][0]["matches"][0]["headers"][0];
        assert_eq!(header["name"], "x-ai-eg-model");
        assert_eq!(header["type"], "Exact");
        assert_eq!(value["spec"]["llmRequestCosts"][0]["type"], "TotalToken");
    }
}
