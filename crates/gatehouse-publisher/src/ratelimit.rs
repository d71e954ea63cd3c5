//! Rate limit policy builder
//!
//! One BackendTrafficPolicy per published model, attached to the model's
//! route. The primary rule counts requests per minute. A configured hourly
//! token budget adds a second rule that charges each response by the token
//! count the AI gateway reports in its dynamic metadata.
//!
//! The policy always targets an HTTPRoute: for OpenAI-compatible models the
//! AI gateway generates one named after the AIGatewayRoute.

use std::sync::Arc;

use futures::FutureExt;
use gatehouse_common::kube_utils::resource_name;
use gatehouse_common::mesh::{
    AI_GATEWAY_METADATA_NAMESPACE, LLM_TOTAL_TOKEN_KEY, MODEL_TYPE_HEADER,
};
use gatehouse_common::network::envoy::{
    BackendTrafficPolicy, ClientSelector, CostSpecifier, HeaderSelector, RateLimitCost,
    RateLimitRule, RateLimitValue,
};
use gatehouse_common::network::gateway_api::HttpRoute;
use gatehouse_common::network::LocalObjectRef;
use gatehouse_common::store::{delete_if_present, to_value};
use gatehouse_common::{HasApiResource, ObjectMeta, ResourceStore, Result};
use serde_json::Value;
use tracing::{debug, info};

use crate::rollback::Compensator;
use crate::routes::RouteNames;
use crate::types::{ModelType, RateLimitConfig};

/// Name of a model's traffic policy
pub fn policy_name(namespace: &str, model: &str) -> String {
    resource_name(&[namespace, model, "ratelimit"])
}

/// Builds and applies per-model traffic policies
#[derive(Clone)]
pub struct RateLimitPolicyBuilder {
    store: Arc<dyn ResourceStore>,
    namespace: String,
}

impl RateLimitPolicyBuilder {
    /// Builder writing policies into the gateway namespace
    pub fn new(store: Arc<dyn ResourceStore>, gateway_namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: gateway_namespace.into(),
        }
    }

    /// Policy for a model
    pub fn build(
        &self,
        namespace: &str,
        model: &str,
        tenant: &str,
        model_type: ModelType,
        limits: &RateLimitConfig,
    ) -> BackendTrafficPolicy {
        let mut rules = vec![RateLimitRule {
            client_selectors: Vec::new(),
            limit: RateLimitValue::per_minute(u64::from(limits.requests_per_minute)),
            cost: None,
        }];

        if let Some(tokens) = limits.tokens_per_hour {
            rules.push(RateLimitRule {
                client_selectors: vec![ClientSelector {
                    headers: vec![HeaderSelector::exact(MODEL_TYPE_HEADER, model_type.as_str())],
                }],
                limit: RateLimitValue::per_hour(tokens),
                cost: Some(RateLimitCost {
                    request: Some(CostSpecifier::number(0)),
                    response: Some(CostSpecifier::metadata(
                        AI_GATEWAY_METADATA_NAMESPACE,
                        LLM_TOTAL_TOKEN_KEY,
                    )),
                }),
            });
        }

        let meta = ObjectMeta::new(policy_name(namespace, model), &self.namespace)
            .with_label(
                gatehouse_common::LABEL_COMPONENT,
                gatehouse_common::COMPONENT_RATE_LIMIT,
            )
            .with_label(gatehouse_common::LABEL_MODEL, model)
            .with_label(gatehouse_common::LABEL_MODEL_NAMESPACE, namespace)
            .with_label(gatehouse_common::LABEL_TENANT, tenant);

        let route = RouteNames::new(namespace, model).route;
        BackendTrafficPolicy::global_rate_limit(meta, LocalObjectRef::to::<HttpRoute>(route), rules)
    }

    /// Create the policy and register its deletion
    pub async fn create(
        &self,
        policy: &BackendTrafficPolicy,
        compensator: &mut Compensator,
    ) -> Result<()> {
        let kind = BackendTrafficPolicy::resource_kind();
        self.store
            .create(kind, &self.namespace, to_value(kind, policy)?)
            .await?;

        let store = self.store.clone();
        let namespace = self.namespace.clone();
        let name = policy.metadata.name.clone();
        info!(name = %name, rules = policy.spec.rate_limit.global.rules.len(), "created rate limit policy");
        compensator.push(format!("delete {kind} {namespace}/{name}"), move || {
            async move {
                delete_if_present(store.as_ref(), kind, &namespace, &name)
                    .await
                    .map(|_| ())
            }
            .boxed()
        });
        Ok(())
    }

    /// Replace an existing policy, or create it when absent
    ///
    /// Returns the object that was replaced so callers can put it back.
    pub async fn apply(&self, policy: &BackendTrafficPolicy) -> Result<Option<Value>> {
        let kind = BackendTrafficPolicy::resource_kind();
        let name = &policy.metadata.name;
        let mut value = to_value(kind, policy)?;

        match self.store.get(kind, &self.namespace, name).await? {
            Some(previous) => {
                if let Some(rv) = previous.pointer("/metadata/resourceVersion") {
                    value["metadata"]["resourceVersion"] = rv.clone();
                }
                self.store.replace(kind, &self.namespace, name, value).await?;
                debug!(name = %name, "replaced rate limit policy");
                Ok(Some(previous))
            }
            None => {
                self.store.create(kind, &self.namespace, value).await?;
                debug!(name = %name, "created missing rate limit policy");
                Ok(None)
            }
        }
    }

    /// Put back a policy returned by [`apply`](Self::apply)
    pub async fn restore(&self, name: &str, previous: Option<Value>) -> Result<()> {
        let kind = BackendTrafficPolicy::resource_kind();
        match previous {
            Some(mut value) => {
                if let Some(meta) = value.get_mut("metadata").and_then(Value::as_object_mut) {
                    meta.remove("resourceVersion");
                }
                self.store.replace(kind, &self.namespace, name, value).await?;
            }
            None => {
                delete_if_present(self.store.as_ref(), kind, &self.namespace, name).await?;
            }
        }
        Ok(())
    }

    /// Delete a model's policy; returns whether it existed
    pub async fn delete(&self, namespace: &str, model: &str) -> Result<bool> {
        delete_if_present(
            self.store.as_ref(),
            BackendTrafficPolicy::resource_kind(),
            &self.namespace,
            &policy_name(namespace, model),
        )
        .await
    }
}
