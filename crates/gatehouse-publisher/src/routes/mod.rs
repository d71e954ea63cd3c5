//! Route builder
//!
//! Two mutually exclusive shapes per published model:
//!
//! - **traditional**: one HTTPRoute matching the external path prefix and an
//!   API-key-shaped header, rewriting to the model's predict path on its
//!   resolved internal hostname and forwarding to the mesh entry Service.
//! - **openai**: the AI gateway route cannot target an arbitrary host, so a
//!   `Backend` at the internal hostname, an `AIServiceBackend` wrapping it
//!   and a `ReferenceGrant` into the mesh entry namespace are created first,
//!   then an `AIGatewayRoute` selecting the model by header.
//!
//! Both shapes merge the public hostname into the edge Gateway. Building is
//! pure; creation registers one compensation per object so a failure halfway
//! through an OpenAI route set is unwound object by object.

pub mod hostname;

use std::sync::Arc;

use futures::FutureExt;
use gatehouse_common::kube_utils::resource_name;
use gatehouse_common::mesh::{
    AI_GATEWAY_MODEL_HEADER, API_KEY_HEADER, API_KEY_HEADER_PATTERN, LLM_TOTAL_TOKEN_KEY,
    MODEL_NAMESPACE_HEADER, MODEL_NAME_HEADER, MODEL_TYPE_HEADER, TENANT_HEADER,
};
use gatehouse_common::network::ai_gateway::{
    AiGatewayBackendRef, AiGatewayRoute, AiGatewayRouteMatch, AiGatewayRouteRule,
    AiGatewayRouteSpec, AiServiceBackend, ApiSchema, LlmRequestCost,
};
use gatehouse_common::network::envoy::Backend;
use gatehouse_common::network::gateway_api::{
    BackendRef, HttpHeader, HttpHeaderMatch, HttpPathMatch, HttpRoute, HttpRouteFilter,
    HttpRouteMatch, HttpRouteRule, HttpRouteSpec, ParentRef, ReferenceGrant, ReferenceGrantFrom,
    ReferenceGrantSpec, ReferenceGrantTo,
};
use gatehouse_common::network::LocalObjectRef;
use gatehouse_common::store::{delete_if_present, to_value};
use gatehouse_common::{HasApiResource, ObjectMeta, ResourceKind, ResourceStore, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

pub use self::hostname::HostnameMerger;
use crate::config::PlatformConfig;
use crate::rollback::Compensator;
use crate::types::{ModelType, PublishedModel};

/// Default external path for a traditional model
pub fn default_path(namespace: &str, model: &str) -> String {
    format!("/{namespace}/models/{model}")
}

/// Native predict path served by the model
pub fn predict_path(model: &str) -> String {
    format!("/v1/models/{model}:predict")
}

/// Everything that determines a model's routing objects
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteTarget {
    /// Model namespace
    pub namespace: String,
    /// Model name
    pub model: String,
    /// Owning tenant
    pub tenant: String,
    /// Exposure shape
    pub model_type: ModelType,
    /// Public hostname on the edge Gateway
    pub public_hostname: String,
    /// External path prefix (traditional only)
    pub external_path: String,
    /// Hostname from the model's own status
    pub internal_hostname: String,
}

impl RouteTarget {
    /// Routing inputs recorded on a published model
    pub fn from_record(record: &PublishedModel) -> Self {
        Self {
            namespace: record.namespace.clone(),
            model: record.model_name.clone(),
            tenant: record.tenant_id.clone(),
            model_type: record.model_type,
            public_hostname: record.public_hostname.clone(),
            external_path: record.external_path.clone(),
            internal_hostname: record.internal_hostname.clone(),
        }
    }
}

/// Deterministic names of a model's routing objects
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteNames {
    /// HTTPRoute or AIGatewayRoute
    pub route: String,
    /// Envoy Gateway Backend
    pub backend: String,
    /// AIServiceBackend
    pub service_backend: String,
    /// ReferenceGrant in the mesh entry namespace
    pub grant: String,
}

impl RouteNames {
    /// Names for a model
    pub fn new(namespace: &str, model: &str) -> Self {
        Self {
            route: resource_name(&[namespace, model, "route"]),
            backend: resource_name(&[namespace, model, "backend"]),
            service_backend: resource_name(&[namespace, model, "ai-backend"]),
            grant: resource_name(&[namespace, model, "grant"]),
        }
    }
}

/// The four objects of an OpenAI-compatible route, in creation order
#[derive(Clone, Debug)]
pub struct OpenAiRouteSet {
    /// FQDN endpoint at the model's internal hostname
    pub backend: Backend,
    /// Schema-declaring wrapper the route points at
    pub service_backend: AiServiceBackend,
    /// Permission for the wrapper to reach the mesh entry Service
    pub grant: ReferenceGrant,
    /// Route selecting the model by header
    pub route: AiGatewayRoute,
}

/// Routing objects that existed at some point, for restoring after a failed update
#[derive(Clone, Debug, Default)]
pub struct RouteSnapshot {
    objects: Vec<(ResourceKind, String, Value)>,
}

impl RouteSnapshot {
    /// Number of captured objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether nothing was captured
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Builds, creates and deletes per-model routing objects
#[derive(Clone)]
pub struct RouteBuilder {
    store: Arc<dyn ResourceStore>,
    config: PlatformConfig,
    hostnames: HostnameMerger,
}

impl RouteBuilder {
    /// Builder for the configured platform
    pub fn new(store: Arc<dyn ResourceStore>, config: &PlatformConfig) -> Self {
        Self {
            hostnames: HostnameMerger::new(store.clone(), config),
            store,
            config: config.clone(),
        }
    }

    /// Hostname merger used by this builder
    pub fn hostnames(&self) -> &HostnameMerger {
        &self.hostnames
    }

    /// URL clients call
    ///
    /// OpenAI-compatible models are addressed by name in the request body, so
    /// their URL is the `/v1` base on the public hostname.
    pub fn external_url(&self, target: &RouteTarget) -> String {
        match target.model_type {
            ModelType::Traditional => format!(
                "{}://{}{}",
                self.config.external_scheme, target.public_hostname, target.external_path
            ),
            ModelType::OpenAi => format!(
                "{}://{}/v1",
                self.config.external_scheme, target.public_hostname
            ),
        }
    }

    fn meta(&self, name: &str, namespace: &str, target: &RouteTarget) -> ObjectMeta {
        ObjectMeta::new(name, namespace)
            .with_label(gatehouse_common::LABEL_COMPONENT, gatehouse_common::COMPONENT_ROUTE)
            .with_label(gatehouse_common::LABEL_MODEL, &target.model)
            .with_label(gatehouse_common::LABEL_MODEL_NAMESPACE, &target.namespace)
            .with_label(gatehouse_common::LABEL_TENANT, &target.tenant)
    }

    fn gateway_parent(&self) -> ParentRef {
        ParentRef::gateway(&self.config.gateway_name, &self.config.gateway_namespace)
    }

    /// HTTPRoute for a traditional model
    pub fn build_traditional(&self, target: &RouteTarget) -> HttpRoute {
        let names = RouteNames::new(&target.namespace, &target.model);
        let identity = vec![
            HttpHeader::new(TENANT_HEADER, &target.tenant),
            HttpHeader::new(MODEL_NAME_HEADER, &target.model),
            HttpHeader::new(MODEL_NAMESPACE_HEADER, &target.namespace),
            HttpHeader::new(MODEL_TYPE_HEADER, target.model_type.as_str()),
        ];

        HttpRoute::new(
            self.meta(&names.route, &self.config.gateway_namespace, target),
            HttpRouteSpec {
                parent_refs: vec![self.gateway_parent()],
                hostnames: vec![target.public_hostname.clone()],
                rules: vec![HttpRouteRule {
                    matches: vec![HttpRouteMatch {
                        path: Some(HttpPathMatch::prefix(&target.external_path)),
                        headers: Some(vec![HttpHeaderMatch::regex(
                            API_KEY_HEADER,
                            API_KEY_HEADER_PATTERN,
                        )]),
                    }],
                    filters: vec![
                        HttpRouteFilter::url_rewrite(
                            &target.internal_hostname,
                            predict_path(&target.model),
                        ),
                        HttpRouteFilter::set_headers(identity),
                    ],
                    backend_refs: vec![BackendRef::service(
                        &self.config.mesh_service,
                        &self.config.mesh_namespace,
                        self.config.mesh_port,
                    )],
                }],
            },
        )
    }

    /// Backend, wrapper, grant and route for an OpenAI-compatible model
    pub fn build_openai(&self, target: &RouteTarget) -> OpenAiRouteSet {
        let names = RouteNames::new(&target.namespace, &target.model);
        let gateway_ns = &self.config.gateway_namespace;

        let backend = Backend::fqdn(
            self.meta(&names.backend, gateway_ns, target),
            &target.internal_hostname,
            self.config.mesh_port,
        );

        let service_backend = AiServiceBackend::openai(
            self.meta(&names.service_backend, gateway_ns, target),
            LocalObjectRef::to::<Backend>(&names.backend),
        );

        let (wrapper_group, _) =
            gatehouse_common::kube_utils::parse_api_version(AiServiceBackend::API_VERSION);
        let grant = ReferenceGrant::new(
            self.meta(&names.grant, &self.config.mesh_namespace, target),
            ReferenceGrantSpec {
                from: vec![ReferenceGrantFrom {
                    group: wrapper_group,
                    kind: AiServiceBackend::KIND.to_string(),
                    namespace: gateway_ns.clone(),
                }],
                to: vec![ReferenceGrantTo {
                    group: String::new(),
                    kind: "Service".to_string(),
                    name: Some(self.config.mesh_service.clone()),
                }],
            },
        );

        let route = AiGatewayRoute::new(
            self.meta(&names.route, gateway_ns, target),
            AiGatewayRouteSpec {
                parent_refs: vec![self.gateway_parent()],
                schema: ApiSchema::openai(),
                rules: vec![AiGatewayRouteRule {
                    matches: vec![AiGatewayRouteMatch {
                        headers: vec![HttpHeaderMatch::exact(
                            AI_GATEWAY_MODEL_HEADER,
                            &target.model,
                        )],
                    }],
                    backend_refs: vec![AiGatewayBackendRef {
                        name: names.service_backend.clone(),
                    }],
                }],
                llm_request_costs: vec![LlmRequestCost::total_tokens(LLM_TOTAL_TOKEN_KEY)],
            },
        );

        OpenAiRouteSet {
            backend,
            service_backend,
            grant,
            route,
        }
    }

    /// Create the routing objects and merge the public hostname
    ///
    /// Each created object registers its own deletion on `compensator`. The
    /// hostname merge is not compensated: other models may already rely on
    /// listeners it adds. Returns the external URL.
    pub async fn create(&self, target: &RouteTarget, compensator: &mut Compensator) -> Result<String> {
        let gateway_ns = self.config.gateway_namespace.clone();
        match target.model_type {
            ModelType::Traditional => {
                let route = self.build_traditional(target);
                let value = to_value(HttpRoute::resource_kind(), &route)?;
                self.create_object(HttpRoute::resource_kind(), &gateway_ns, value, compensator)
                    .await?;
            }
            ModelType::OpenAi => {
                let set = self.build_openai(target);
                let objects = [
                    (
                        Backend::resource_kind(),
                        gateway_ns.clone(),
                        to_value(Backend::resource_kind(), &set.backend)?,
                    ),
                    (
                        AiServiceBackend::resource_kind(),
                        gateway_ns.clone(),
                        to_value(AiServiceBackend::resource_kind(), &set.service_backend)?,
                    ),
                    (
                        ReferenceGrant::resource_kind(),
                        self.config.mesh_namespace.clone(),
                        to_value(ReferenceGrant::resource_kind(), &set.grant)?,
                    ),
                    (
                        AiGatewayRoute::resource_kind(),
                        gateway_ns.clone(),
                        to_value(AiGatewayRoute::resource_kind(), &set.route)?,
                    ),
                ];
                for (kind, namespace, value) in objects {
                    self.create_object(kind, &namespace, value, compensator).await?;
                }
            }
        }

        self.hostnames.ensure(&target.public_hostname).await?;

        let url = self.external_url(target);
        info!(
            namespace = %target.namespace,
            model = %target.model,
            model_type = %target.model_type,
            url = %url,
            "created routes"
        );
        Ok(url)
    }

    async fn create_object(
        &self,
        kind: ResourceKind,
        namespace: &str,
        value: Value,
        compensator: &mut Compensator,
    ) -> Result<()> {
        let name = gatehouse_common::store::object_name(&value).to_string();
        self.store.create(kind, namespace, value).await?;
        debug!(kind = %kind, namespace = %namespace, name = %name, "created routing object");

        let store = self.store.clone();
        let namespace = namespace.to_string();
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

    /// Every object a model's routes may consist of, in creation order
    fn managed_objects(&self, namespace: &str, model: &str) -> [(ResourceKind, String, String); 5] {
        let names = RouteNames::new(namespace, model);
        let gateway_ns = &self.config.gateway_namespace;
        [
            (Backend::resource_kind(), gateway_ns.clone(), names.backend),
            (AiServiceBackend::resource_kind(), gateway_ns.clone(), names.service_backend),
            (ReferenceGrant::resource_kind(), self.config.mesh_namespace.clone(), names.grant),
            (AiGatewayRoute::resource_kind(), gateway_ns.clone(), names.route.clone()),
            (HttpRoute::resource_kind(), gateway_ns.clone(), names.route),
        ]
    }

    /// Delete a model's routing objects of either shape, newest first
    ///
    /// Absent objects are skipped. Every object is attempted; the first
    /// failure is returned afterwards. Listener hostnames are left in place.
    pub async fn delete(&self, namespace: &str, model: &str) -> Result<usize> {
        let mut removed = 0;
        let mut first_error = None;

        for (kind, ns, name) in self.managed_objects(namespace, model).into_iter().rev() {
            match delete_if_present(self.store.as_ref(), kind, &ns, &name).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(kind = %kind, namespace = %ns, name = %name, error = %e, "failed to delete routing object");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!(namespace = %namespace, model = %model, removed, "deleted routes");
                Ok(removed)
            }
        }
    }

    /// Capture a model's current routing objects
    pub async fn snapshot(&self, namespace: &str, model: &str) -> Result<RouteSnapshot> {
        let mut snapshot = RouteSnapshot::default();
        for (kind, ns, name) in self.managed_objects(namespace, model) {
            if let Some(value) = self.store.get(kind, &ns, &name).await? {
                snapshot.objects.push((kind, ns, value));
            }
        }
        Ok(snapshot)
    }

    /// Recreate captured objects after deleting whatever replaced them
    pub async fn restore(&self, namespace: &str, model: &str, snapshot: RouteSnapshot) -> Result<()> {
        self.delete(namespace, model).await?;
        for (kind, ns, mut value) in snapshot.objects {
            strip_server_fields(&mut value);
            self.store.create(kind, &ns, value).await?;
        }
        info!(namespace = %namespace, model = %model, "restored previous routes");
        Ok(())
    }
}

/// Drop fields the store assigns so an object can be created again
fn strip_server_fields(value: &mut Value) {
    if let Some(meta) = value.get_mut("metadata").and_then(Value::as_object_mut) {
        for field in [
            "resourceVersion",
            "uid",
            "creationTimestamp",
            "generation",
            "managedFields",
        ] {
            meta.remove(field);
        }
    }
    if let Some(obj) = value.as_object_mut() {
        obj.remove("status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_common::network::gateway_api::Gateway;
    use gatehouse_common::store::memory::{MemoryStore, StoreOp};
    use serde_json::json;

    fn target(model_type: ModelType) -> RouteTarget {
        RouteTarget {
            namespace: "a".into(),
            model: "iris".into(),
            tenant: "a".into(),
            model_type,
            public_hostname: "inference.platform.local".into(),
            external_path: default_path("a", "iris"),
            internal_hostname: "iris.a.svc.cluster.local".into(),
        }
    }

    fn setup() -> (Arc<MemoryStore>, RouteBuilder) {
        let store = Arc::new(MemoryStore::new());
        store.seed(
            Gateway::resource_kind(),
            "envoy-gateway-system",
            json!({"metadata": {"name": "ai-inference-gateway"}, "spec": {"gatewayClassName": "eg"}}),
        );
        let builder = RouteBuilder::new(store.clone(), &PlatformConfig::default());
        (store, builder)
    }

    #[test]
    fn traditional_route_rewrites_to_predict_path() {
        let (_, builder) = setup();
        let route = builder.build_traditional(&target(ModelType::Traditional));
        let value = serde_json::to_value(&route).unwrap();

        assert_eq!(value["metadata"]["name"], "a-iris-route");
        assert_eq!(value["metadata"]["namespace"], "envoy-gateway-system");
        let rule = &value["spec"]["rules"][0];
        assert_eq!(rule["matches"][0]["path"]["value"], "/a/models/iris");
        assert_eq!(rule["matches"][0]["headers"][0]["name"], "x-api-key");
        assert_eq!(rule["filters"][0]["urlRewrite"]["hostname"], "iris.a.svc.cluster.local");
        assert_eq!(
            rule["filters"][0]["urlRewrite"]["path"]["replacePrefixMatch"],
            "/v1/models/iris:predict"
        );
        let headers = &rule["filters"][1]["requestHeaderModifier"]["set"];
        assert_eq!(headers[0]["value"], "a");
        assert_eq!(headers[3]["value"], "traditional");
        assert_eq!(rule["backendRefs"][0]["name"], "istio-ingressgateway");
    }

    #[test]
    fn openai_set_chains_backend_wrapper_and_route() {
        let (_, builder) = setup();
        let set = builder.build_openai(&target(ModelType::OpenAi));

        assert_eq!(set.backend.spec.endpoints[0].fqdn.hostname, "iris.a.svc.cluster.local");
        assert_eq!(set.service_backend.spec.backend_ref.name, "a-iris-backend");
        assert_eq!(set.grant.metadata.namespace, "istio-system");
        assert_eq!(set.grant.spec.from[0].kind, "AIServiceBackend");
        assert_eq!(set.grant.spec.from[0].namespace, "envoy-gateway-system");
        assert_eq!(set.route.spec.rules[0].backend_refs[0].name, "a-iris-ai-backend");
        assert_eq!(set.route.spec.rules[0].matches[0].headers[0].value, "iris");
    }

    #[test]
    fn external_urls() {
        let (_, builder) = setup();
        assert_eq!(
            builder.external_url(&target(ModelType::Traditional)),
            "https://inference.platform.local/a/models/iris"
        );
        assert_eq!(
            builder.external_url(&target(ModelType::OpenAi)),
            "https://inference.platform.local/v1"
        );
    }

    #[tokio::test]
    async fn create_and_delete_openai_set() {
        let (store, builder) = setup();
        let mut comp = Compensator::new();
        builder.create(&target(ModelType::OpenAi), &mut comp).await.unwrap();
        assert_eq!(comp.len(), 4);
        assert!(store.contains(AiGatewayRoute::resource_kind(), "envoy-gateway-system", "a-iris-route"));
        assert!(store.contains(ReferenceGrant::resource_kind(), "istio-system", "a-iris-grant"));

        assert_eq!(builder.delete("a", "iris").await.unwrap(), 4);
        assert_eq!(builder.delete("a", "iris").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn partial_openai_set_is_unwound() {
        let (store, builder) = setup();
        store.fail_on(StoreOp::Create, ReferenceGrant::resource_kind());

        let mut comp = Compensator::new();
        builder
            .create(&target(ModelType::OpenAi), &mut comp)
            .await
            .unwrap_err();
        assert_eq!(comp.len(), 2);
        assert_eq!(comp.rollback().await, 0);
        assert_eq!(store.count(Backend::resource_kind()), 0);
        assert_eq!(store.count(AiServiceBackend::resource_kind()), 0);
    }

    #[tokio::test]
    async fn snapshot_restore_round_trip() {
        let (store, builder) = setup();
        builder
            .create(&target(ModelType::Traditional), &mut Compensator::new())
            .await
            .unwrap();

        let snapshot = builder.snapshot("a", "iris").await.unwrap();
        assert_eq!(snapshot.len(), 1);

        let mut moved = target(ModelType::Traditional);
        moved.external_path = "/elsewhere".into();
        builder.delete("a", "iris").await.unwrap();
        builder.create(&moved, &mut Compensator::new()).await.unwrap();

        builder.restore("a", "iris", snapshot).await.unwrap();
        let route = store
            .object(HttpRoute::resource_kind(), "envoy-gateway-system", "a-iris-route")
            .unwrap();
        assert_eq!(
            route["spec"]["rules"][0]["matches"][0]["path"]["value"],
            "/a/models/iris"
        );
    }
}
