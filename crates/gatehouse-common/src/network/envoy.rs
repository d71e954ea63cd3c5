//! Envoy Gateway extension resources
//!
//! - **Backend**: an FQDN endpoint outside the Service abstraction, used to
//!   point AI gateway traffic at a model's resolved internal hostname
//! - **BackendTrafficPolicy**: global rate limiting attached to a route

use serde::{Deserialize, Serialize};

use super::LocalObjectRef;
use crate::kube_utils::{HasApiResource, ObjectMeta};

// =============================================================================
// Backend
// =============================================================================

/// Envoy Gateway Backend resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    /// API version (gateway.envoyproxy.io/v1alpha1)
    #[serde(default = "Backend::default_api_version")]
    pub api_version: String,
    /// Resource kind (Backend)
    #[serde(default = "Backend::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Backend specification
    pub spec: BackendSpec,
}

impl HasApiResource for Backend {
    const API_VERSION: &'static str = "gateway.envoyproxy.io/v1alpha1";
    const KIND: &'static str = "Backend";
}

impl_api_defaults!(Backend);

impl Backend {
    /// Backend with a single FQDN endpoint
    pub fn fqdn(metadata: ObjectMeta, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec: BackendSpec {
                endpoints: vec![BackendEndpoint {
                    fqdn: FqdnEndpoint {
                        hostname: hostname.into(),
                        port,
                    },
                }],
            },
        }
    }
}

/// Backend spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BackendSpec {
    /// Endpoints traffic may be sent to
    pub endpoints: Vec<BackendEndpoint>,
}

/// One backend endpoint
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BackendEndpoint {
    /// DNS name endpoint
    pub fqdn: FqdnEndpoint,
}

/// DNS name and port
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FqdnEndpoint {
    /// Hostname resolved by Envoy
    pub hostname: String,
    /// Port
    pub port: u16,
}

// =============================================================================
// BackendTrafficPolicy
// =============================================================================

/// Envoy Gateway BackendTrafficPolicy resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendTrafficPolicy {
    /// API version (gateway.envoyproxy.io/v1alpha1)
    #[serde(default = "BackendTrafficPolicy::default_api_version")]
    pub api_version: String,
    /// Resource kind (BackendTrafficPolicy)
    #[serde(default = "BackendTrafficPolicy::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Policy specification
    pub spec: BackendTrafficPolicySpec,
}

impl HasApiResource for BackendTrafficPolicy {
    const API_VERSION: &'static str = "gateway.envoyproxy.io/v1alpha1";
    const KIND: &'static str = "BackendTrafficPolicy";
}

impl_api_defaults!(BackendTrafficPolicy);

impl BackendTrafficPolicy {
    /// Global rate limit policy attached to one route
    pub fn global_rate_limit(
        metadata: ObjectMeta,
        target: LocalObjectRef,
        rules: Vec<RateLimitRule>,
    ) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec: BackendTrafficPolicySpec {
                target_refs: vec![target],
                rate_limit: RateLimitSpec {
                    type_: "Global".to_string(),
                    global: GlobalRateLimit { rules },
                },
            },
        }
    }
}

/// BackendTrafficPolicy spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendTrafficPolicySpec {
    /// Routes this policy attaches to
    pub target_refs: Vec<LocalObjectRef>,
    /// Rate limit configuration
    pub rate_limit: RateLimitSpec,
}

/// Rate limit configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RateLimitSpec {
    /// Limit type (Global, Local)
    #[serde(rename = "type")]
    pub type_: String,
    /// Global limit rules
    pub global: GlobalRateLimit,
}

/// Global rate limit rules
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GlobalRateLimit {
    /// Rules, evaluated independently
    pub rules: Vec<RateLimitRule>,
}

/// A single rate limit rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRule {
    /// Traffic the rule applies to; empty means all traffic
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub client_selectors: Vec<ClientSelector>,
    /// The limit
    pub limit: RateLimitValue,
    /// Per-request cost; absent means each request costs one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<RateLimitCost>,
}

/// Selects clients by request headers
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClientSelector {
    /// Header conditions, all of which must hold
    pub headers: Vec<HeaderSelector>,
}

/// Header condition inside a client selector
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HeaderSelector {
    /// Header name
    pub name: String,
    /// Match type (Exact, Distinct)
    #[serde(rename = "type")]
    pub type_: String,
    /// Value to match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl HeaderSelector {
    /// Exact header value match
    pub fn exact(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_: "Exact".to_string(),
            value: Some(value.into()),
        }
    }
}

/// Number of units per time unit
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RateLimitValue {
    /// Allowed units per `unit`
    pub requests: u64,
    /// Time unit (Second, Minute, Hour, Day)
    pub unit: String,
}

impl RateLimitValue {
    /// Limit per minute
    pub fn per_minute(requests: u64) -> Self {
        Self {
            requests,
            unit: "Minute".to_string(),
        }
    }

    /// Limit per hour
    pub fn per_hour(requests: u64) -> Self {
        Self {
            requests,
            unit: "Hour".to_string(),
        }
    }
}

/// Request and response cost for a rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RateLimitCost {
    /// Cost charged when the request arrives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<CostSpecifier>,
    /// Cost charged when the response completes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<CostSpecifier>,
}

/// Where a cost value comes from
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CostSpecifier {
    /// Source (Number, Metadata)
    pub from: String,
    /// Fixed cost when `from` is Number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    /// Dynamic metadata lookup when `from` is Metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataKey>,
}

impl CostSpecifier {
    /// Fixed cost
    pub fn number(n: u64) -> Self {
        Self {
            from: "Number".to_string(),
            number: Some(n),
            metadata: None,
        }
    }

    /// Cost read from Envoy dynamic metadata
    pub fn metadata(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            from: "Metadata".to_string(),
            number: None,
            metadata: Some(MetadataKey {
                namespace: namespace.into(),
                key: key.into(),
            }),
        }
    }
}

/// Envoy dynamic metadata key
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetadataKey {
    /// Metadata namespace
    pub namespace: String,
    /// Key within the namespace
    pub key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::gateway_api::HttpRoute;

    #[test]
    fn backend_serializes_fqdn_endpoint() {
        let backend = Backend::fqdn(ObjectMeta::new("b", "gw"), "llama.a.svc.cluster.local", 80);
        let value = serde_json::to_value(&backend).expect("backend serializes");
        assert_eq!(value["apiVersion"], "gateway.envoyproxy.io/v1alpha1");
        assert_eq!(
            value["spec"]["endpoints"][0]["fqdn"]["hostname"],
            "llama.a.svc.cluster.local"
        );
    }

    #[test]
    fn policy_targets_route_and_emits_costs() {
        let policy = BackendTrafficPolicy::global_rate_limit(
            ObjectMeta::new("p", "gw"),
            LocalObjectRef::to::<HttpRoute>("a-iris-route"),
            vec![
                RateLimitRule {
                    client_selectors: vec![],
                    limit: RateLimitValue::per_minute(100),
                    cost: None,
                },
                RateLimitRule {
                    client_selectors: vec![ClientSelector {
                        headers: vec![HeaderSelector::exact("x-model-type", "openai")],
                    }],
                    limit: RateLimitValue::per_hour(10_000),
                    cost: Some(RateLimitCost {
                        request: Some(CostSpecifier::number(0)),
                        response: Some(CostSpecifier::metadata(
                            "io.envoy.ai_gateway",
                            "llm_total_token",
                        )),
                    }),
                },
            ],
        );

        let value = serde_json::to_value(&policy).expect("policy serializes");
        assert_eq!(value["spec"]["targetRefs"][0]["kind"], "HTTPRoute");
        assert_eq!(value["spec"]["targetRefs"][0]["group"], "gateway.networking.k8s.io");
        assert_eq!(value["spec"]["rateLimit"]["type"], "Global");

        let rules = &value["spec"]["rateLimit"]["global"]["rules"];
        assert!(rules[0].get("clientSelectors").is_none());
        assert_eq!(rules[0]["limit"]["unit"], "Minute");
        assert_eq!(rules[1]["clientSelectors"][0]["headers"][0]["value"], "openai");
        assert_eq!(rules[1]["cost"]["request"]["number"], 0);
        assert_eq!(rules[1]["cost"]["response"]["metadata"]["key"], "llm_total_token");
    }
}
