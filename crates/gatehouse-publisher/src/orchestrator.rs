//! Publishing orchestrator
//!
//! Sequences the building blocks into all-or-nothing workflows:
//!
//! ```text
//! publish:   validate -> classify -> credential -> routes + hostname
//!            -> rate limit policy -> documentation -> record
//! update:    validate -> (routes if changed) -> (policy if changed) -> record
//! unpublish: credential -> routes -> policy -> record   (absence tolerated)
//! rotate:    credential -> record
//! ```
//!
//! Every completed mutating step registers a compensation. When a later step
//! fails the compensations run newest-first and the caller sees the original
//! error. Workflows for the same `{namespace}/{model}` are serialized by a
//! named lock held for the whole workflow.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::FutureExt;
use gatehouse_common::crd::InferenceService;
use gatehouse_common::lock::ResourceLocks;
use gatehouse_common::retry::{retry_when, RetryConfig};
use gatehouse_common::ResourceStore;
use tracing::{debug, info, instrument, warn};

use crate::audit::{AuditLog, UsageRecorder};
use crate::classifier;
use crate::config::PlatformConfig;
use crate::credentials::{ApiKey, CredentialManager};
use crate::docs::{self, KEY_PLACEHOLDER};
use crate::error::PublishError;
use crate::ratelimit::{policy_name, RateLimitPolicyBuilder};
use crate::readiness::{self, Readiness};
use crate::records::RecordStore;
use crate::rollback::Compensator;
use crate::routes::{default_path, RouteBuilder, RouteTarget};
use crate::tenants::TenantRegistry;
use crate::types::{
    AuditAction, AuditEvent, KeyIdentity, ModelType, PublishConfig, PublishStatus,
    PublishedModel, UsageCounters, UsageSample, UsageSummary,
};
use crate::validation::{validate, ValidationContext};

/// Result type for workflows
pub type PublishResult<T> = std::result::Result<T, PublishError>;

/// Entry point for every publishing workflow
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn ResourceStore>,
    config: PlatformConfig,
    credentials: CredentialManager,
    routes: RouteBuilder,
    rate_limits: RateLimitPolicyBuilder,
    records: RecordStore,
    audit: AuditLog,
    usage: UsageRecorder,
    locks: ResourceLocks,
}

impl Publisher {
    /// Publisher over `store` for the given platform
    pub fn new(store: Arc<dyn ResourceStore>, config: PlatformConfig) -> Self {
        let tenants = TenantRegistry::new(store.clone(), &config);
        Self {
            credentials: CredentialManager::new(store.clone(), &config, tenants),
            routes: RouteBuilder::new(store.clone(), &config),
            rate_limits: RateLimitPolicyBuilder::new(store.clone(), &config.gateway_namespace),
            records: RecordStore::new(store.clone()),
            audit: AuditLog::new(store.clone()),
            usage: UsageRecorder::new(store.clone()),
            locks: ResourceLocks::new(),
            store,
            config,
        }
    }

    /// Platform settings in effect
    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    // =========================================================================
    // Publish
    // =========================================================================

    /// Publish a ready model
    ///
    /// Returns the record with the cleartext key; the key is never returned
    /// again except by [`rotate_key`](Self::rotate_key).
    #[instrument(skip(self, request))]
    pub async fn publish(
        &self,
        namespace: &str,
        model: &str,
        request: PublishConfig,
    ) -> PublishResult<PublishedModel> {
        let _guard = self.locks.lock(namespace, model).await;

        if self.records.get(namespace, model).await?.is_some() {
            return Err(PublishError::AlreadyPublished {
                namespace: namespace.to_string(),
                model: model.to_string(),
            });
        }

        let readiness = readiness::check(self.store.as_ref(), namespace, model).await?;
        validate(
            ValidationContext {
                namespace,
                model,
                readiness: &readiness,
                existing: None,
            },
            &request,
        )?;
        let Readiness::Ready {
            internal_hostname,
            service,
        } = readiness
        else {
            return Err(not_ready(namespace, model));
        };

        let model_type = resolve_model_type(&request, &service);
        let target = RouteTarget {
            namespace: namespace.to_string(),
            model: model.to_string(),
            tenant: request.tenant_id.trim().to_string(),
            model_type,
            public_hostname: request
                .public_hostname
                .clone()
                .unwrap_or_else(|| self.config.default_hostname.clone()),
            external_path: request
                .external_path
                .clone()
                .unwrap_or_else(|| default_path(namespace, model)),
            internal_hostname,
        };

        let mut compensator = Compensator::new();
        match self.run_publish(&target, &request, &mut compensator).await {
            Ok(record) => {
                compensator.commit();
                info!(model_type = %model_type, url = %record.external_url, "published model");
                self.audit
                    .record(audit_event(AuditAction::Publish, &target.namespace, &target.model, Some(&target.tenant)))
                    .await;
                Ok(record)
            }
            Err(e) => {
                warn!(code = e.code(), error = %e, steps = compensator.len(), "publish failed, rolling back");
                compensator.rollback().await;
                let mut event = audit_event(
                    AuditAction::PublishFailed,
                    &target.namespace,
                    &target.model,
                    Some(&target.tenant),
                );
                event.details.insert("code".to_string(), e.code().to_string());
                self.audit.record(event).await;
                Err(e)
            }
        }
    }

    async fn run_publish(
        &self,
        target: &RouteTarget,
        request: &PublishConfig,
        compensator: &mut Compensator,
    ) -> PublishResult<PublishedModel> {
        let ns = target.namespace.as_str();
        let model = target.model.as_str();

        let issued = self
            .credentials
            .generate(&target.tenant, model, ns, target.model_type)
            .await
            .map_err(|source| PublishError::ApiKeyGenerationFailed { source })?;
        let credentials = self.credentials.clone();
        let (undo_ns, undo_model) = (ns.to_string(), model.to_string());
        compensator.push(format!("delete credential {ns}/{model}"), move || {
            async move { credentials.delete(&undo_ns, &undo_model).await.map(|_| ()) }.boxed()
        });

        let external_url = self
            .routes
            .create(target, compensator)
            .await
            .map_err(|source| PublishError::GatewayConfigFailed { source })?;

        let limits = request.limits();
        let policy = self
            .rate_limits
            .build(ns, model, &target.tenant, target.model_type, &limits);
        self.rate_limits
            .create(&policy, compensator)
            .await
            .map_err(|source| PublishError::RateLimitConfigFailed { source })?;

        let now = Utc::now();
        let mut record = PublishedModel {
            model_name: model.to_string(),
            namespace: ns.to_string(),
            tenant_id: target.tenant.clone(),
            model_type: target.model_type,
            documentation: docs::generate(target.model_type, model, &external_url, KEY_PLACEHOLDER),
            external_url,
            public_hostname: target.public_hostname.clone(),
            external_path: target.external_path.clone(),
            internal_hostname: target.internal_hostname.clone(),
            api_key_id: issued.record.key_id.clone(),
            api_key: None,
            rate_limiting: limits,
            status: PublishStatus::Published,
            created_at: now,
            updated_at: now,
            usage: UsageCounters::default(),
            metadata: request.metadata.clone(),
        };

        self.records.create(&record).await.map_err(|source| {
            if source.is_already_exists() {
                PublishError::AlreadyPublished {
                    namespace: ns.to_string(),
                    model: model.to_string(),
                }
            } else {
                PublishError::MetadataStorageFailed { source }
            }
        })?;

        with_key(&mut record, &issued.key);
        Ok(record)
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Reconfigure a published model
    ///
    /// Routes are rebuilt only when hostname, path or the model's internal
    /// hostname changed; the policy only when the limits changed. Absent
    /// hostname, path and metadata keep their current values.
    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        namespace: &str,
        model: &str,
        request: PublishConfig,
    ) -> PublishResult<PublishedModel> {
        let _guard = self.locks.lock(namespace, model).await;

        let stored = self
            .records
            .get(namespace, model)
            .await?
            .ok_or_else(|| PublishError::not_published(namespace, model))?;
        let existing = stored.record;

        let mut request = request;
        if request.rate_limiting.is_none() {
            request.rate_limiting = Some(existing.rate_limiting.clone());
        }

        let readiness = readiness::check(self.store.as_ref(), namespace, model).await?;
        validate(
            ValidationContext {
                namespace,
                model,
                readiness: &readiness,
                existing: Some(&existing),
            },
            &request,
        )?;
        let Readiness::Ready {
            internal_hostname, ..
        } = readiness
        else {
            return Err(not_ready(namespace, model));
        };

        let current = RouteTarget::from_record(&existing);
        let target = RouteTarget {
            public_hostname: request
                .public_hostname
                .clone()
                .unwrap_or_else(|| current.public_hostname.clone()),
            external_path: request
                .external_path
                .clone()
                .unwrap_or_else(|| current.external_path.clone()),
            internal_hostname,
            ..current.clone()
        };
        let route_changed = target != current;
        let policy_changed = request.limits() != existing.rate_limiting;

        let mut compensator = Compensator::new();
        let result = self
            .run_update(&existing, &target, &request, route_changed, policy_changed, &mut compensator)
            .await;
        let mut record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(code = e.code(), error = %e, "update failed, rolling back");
                compensator.rollback().await;
                return Err(e);
            }
        };

        if let Err(source) = self
            .records
            .replace(&record, stored.resource_version.clone())
            .await
        {
            compensator.rollback().await;
            return Err(PublishError::MetadataStorageFailed { source });
        }
        compensator.commit();

        if route_changed && current.public_hostname != target.public_hostname {
            self.retract_if_unused(&current.public_hostname).await;
        }

        let mut event = audit_event(AuditAction::Update, namespace, model, Some(&existing.tenant_id));
        event.details.insert("routesChanged".to_string(), route_changed.to_string());
        event.details.insert("rateLimitsChanged".to_string(), policy_changed.to_string());
        self.audit.record(event).await;

        info!(route_changed, policy_changed, "updated published model");
        record.api_key = None;
        Ok(record)
    }

    async fn run_update(
        &self,
        existing: &PublishedModel,
        target: &RouteTarget,
        request: &PublishConfig,
        route_changed: bool,
        policy_changed: bool,
        compensator: &mut Compensator,
    ) -> PublishResult<PublishedModel> {
        let ns = existing.namespace.as_str();
        let model = existing.model_name.as_str();
        let mut record = existing.clone();

        if route_changed {
            let snapshot = self
                .routes
                .snapshot(ns, model)
                .await
                .map_err(|source| PublishError::GatewayConfigFailed { source })?;
            self.routes
                .delete(ns, model)
                .await
                .map_err(|source| PublishError::GatewayConfigFailed { source })?;

            let routes = self.routes.clone();
            let (undo_ns, undo_model) = (ns.to_string(), model.to_string());
            compensator.push(format!("restore routes {ns}/{model}"), move || {
                async move { routes.restore(&undo_ns, &undo_model, snapshot).await }.boxed()
            });

            record.external_url = self
                .routes
                .create(target, compensator)
                .await
                .map_err(|source| PublishError::GatewayConfigFailed { source })?;
            record.public_hostname = target.public_hostname.clone();
            record.external_path = target.external_path.clone();
            record.internal_hostname = target.internal_hostname.clone();
            record.documentation =
                docs::generate(record.model_type, model, &record.external_url, KEY_PLACEHOLDER);
        } else {
            debug!("routing inputs unchanged, leaving routes in place");
        }

        if policy_changed {
            let limits = request.limits();
            let policy = self.rate_limits.build(
                ns,
                model,
                &existing.tenant_id,
                existing.model_type,
                &limits,
            );
            let previous = self
                .rate_limits
                .apply(&policy)
                .await
                .map_err(|source| PublishError::RateLimitConfigFailed { source })?;

            let rate_limits = self.rate_limits.clone();
            let name = policy_name(ns, model);
            compensator.push(format!("restore rate limit policy {name}"), move || {
                async move { rate_limits.restore(&name, previous).await }.boxed()
            });
            record.rate_limiting = limits;
        }

        if !request.metadata.is_empty() {
            record.metadata = request.metadata.clone();
        }
        record.status = PublishStatus::Published;
        record.updated_at = Utc::now();
        Ok(record)
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Read a published model
    pub async fn get(&self, namespace: &str, model: &str) -> PublishResult<PublishedModel> {
        self.records
            .get(namespace, model)
            .await?
            .map(|stored| stored.record)
            .ok_or_else(|| PublishError::not_published(namespace, model))
    }

    /// Published models in a namespace
    pub async fn list(&self, namespace: &str) -> PublishResult<Vec<PublishedModel>> {
        Ok(self.records.list(namespace).await?)
    }

    /// Published models in every namespace
    pub async fn list_all(&self) -> PublishResult<Vec<PublishedModel>> {
        Ok(self.records.list_all().await?)
    }

    // =========================================================================
    // Unpublish
    // =========================================================================

    /// Remove a model's credential, routes, policy and record
    ///
    /// Every step runs even when earlier ones fail or find nothing, so partial
    /// state left by an interrupted workflow is cleaned up. Returns
    /// `NotPublished` when there was no record, after cleaning up anyway.
    #[instrument(skip(self))]
    pub async fn unpublish(&self, namespace: &str, model: &str) -> PublishResult<PublishedModel> {
        let _guard = self.locks.lock(namespace, model).await;

        let existing = match self.records.get(namespace, model).await {
            Ok(stored) => stored.map(|s| s.record),
            Err(e) => {
                warn!(error = %e, "could not read record before unpublish");
                None
            }
        };

        let mut first_error = None;
        let mut note = |step: &str, result: gatehouse_common::Result<()>| {
            if let Err(e) = result {
                warn!(step, error = %e, "unpublish step failed");
                first_error.get_or_insert(e);
            }
        };

        note("credential", self.credentials.delete(namespace, model).await.map(|_| ()));
        note("routes", self.routes.delete(namespace, model).await.map(|_| ()));
        note("rate limit policy", self.rate_limits.delete(namespace, model).await.map(|_| ()));
        note("record", self.records.delete(namespace, model).await.map(|_| ()));

        if let Some(e) = first_error {
            return Err(PublishError::Store(e));
        }
        let Some(record) = existing else {
            debug!("no record found, cleanup finished");
            return Err(PublishError::not_published(namespace, model));
        };

        self.retract_if_unused(&record.public_hostname).await;
        self.audit
            .record(audit_event(AuditAction::Unpublish, namespace, model, Some(&record.tenant_id)))
            .await;
        info!("unpublished model");
        Ok(record)
    }

    /// Retract a hostname nobody publishes on anymore, when enabled
    async fn retract_if_unused(&self, hostname: &str) {
        if !self.config.retract_unused_hostnames {
            return;
        }
        let in_use = match self.records.list_all().await {
            Ok(records) => records
                .iter()
                .any(|r| r.public_hostname.eq_ignore_ascii_case(hostname)),
            Err(e) => {
                warn!(hostname = %hostname, error = %e, "cannot count hostname users, keeping listeners");
                return;
            }
        };
        if in_use {
            return;
        }
        if let Err(e) = self.routes.hostnames().retract(hostname).await {
            warn!(hostname = %hostname, error = %e, "failed to retract hostname");
        }
    }

    // =========================================================================
    // Keys
    // =========================================================================

    /// Replace a model's key; the old key stops working immediately
    #[instrument(skip(self))]
    pub async fn rotate_key(&self, namespace: &str, model: &str) -> PublishResult<PublishedModel> {
        let _guard = self.locks.lock(namespace, model).await;

        let stored = self
            .records
            .get(namespace, model)
            .await?
            .ok_or_else(|| PublishError::not_published(namespace, model))?;
        let mut record = stored.record;

        let issued = self
            .credentials
            .rotate(&record.tenant_id, model, namespace, record.model_type)
            .await
            .map_err(|source| PublishError::ApiKeyGenerationFailed { source })?;

        record.api_key_id = issued.record.key_id.clone();
        record.updated_at = Utc::now();
        if let Err(e) = self.records.replace(&record, stored.resource_version).await {
            warn!(error = %e, "key rotated but record update failed");
        }

        let mut event = audit_event(AuditAction::RotateKey, namespace, model, Some(&record.tenant_id));
        event.details.insert("keyId".to_string(), record.api_key_id.clone());
        self.audit.record(event).await;

        with_key(&mut record, &issued.key);
        Ok(record)
    }

    /// Resolve an inbound key to the identity it grants
    #[instrument(skip_all)]
    pub async fn validate_key(&self, raw_key: &str) -> PublishResult<KeyIdentity> {
        let key = ApiKey::from_client(raw_key);
        match self.credentials.validate(&key).await? {
            Some(record) => {
                self.credentials
                    .touch_last_used(&record.namespace, &record.model_name)
                    .await;
                debug!(namespace = %record.namespace, model = %record.model_name, "key accepted");
                Ok(KeyIdentity::from(&record))
            }
            None => Err(PublishError::Unauthorized),
        }
    }

    // =========================================================================
    // Usage
    // =========================================================================

    /// Record one request against a published model
    ///
    /// Recording is best-effort: failures are logged and yield `None`.
    pub async fn record_usage(
        &self,
        namespace: &str,
        model: &str,
        sample: UsageSample,
    ) -> PublishResult<Option<UsageSummary>> {
        if self.records.get(namespace, model).await?.is_none() {
            return Err(PublishError::not_published(namespace, model));
        }

        let summary = match self.usage.record(namespace, model, &sample).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(namespace = %namespace, model = %model, error = %e, "failed to record usage");
                return Ok(None);
            }
        };

        if let Err(e) = self.bump_counters(namespace, model, &sample).await {
            warn!(namespace = %namespace, model = %model, error = %e, "failed to update usage counters");
        }
        Ok(Some(summary))
    }

    async fn bump_counters(
        &self,
        namespace: &str,
        model: &str,
        sample: &UsageSample,
    ) -> gatehouse_common::Result<()> {
        retry_when(
            &RetryConfig::conflicts(),
            "usage_counters",
            gatehouse_common::Error::is_conflict,
            || self.bump_counters_once(namespace, model, sample),
        )
        .await
    }

    async fn bump_counters_once(
        &self,
        namespace: &str,
        model: &str,
        sample: &UsageSample,
    ) -> gatehouse_common::Result<()> {
        let Some(stored) = self.records.get(namespace, model).await? else {
            return Ok(());
        };
        let mut record = stored.record;
        record.usage.total_requests = record.usage.total_requests.saturating_add(1);
        record.usage.total_tokens = record.usage.total_tokens.saturating_add(sample.tokens);
        if sample.error {
            record.usage.total_errors = record.usage.total_errors.saturating_add(1);
        }
        record.usage.last_request_at = Some(sample.timestamp.unwrap_or_else(Utc::now));
        self.records.replace(&record, stored.resource_version).await
    }

    /// Usage summary for a day; empty when nothing was recorded
    pub async fn usage_summary(
        &self,
        namespace: &str,
        model: &str,
        date: NaiveDate,
    ) -> PublishResult<UsageSummary> {
        if self.records.get(namespace, model).await?.is_none() {
            return Err(PublishError::not_published(namespace, model));
        }
        Ok(self
            .usage
            .summary(namespace, model, date)
            .await?
            .unwrap_or_else(|| UsageSummary::empty(date.format("%Y-%m-%d").to_string())))
    }
}

fn resolve_model_type(request: &PublishConfig, service: &InferenceService) -> ModelType {
    request
        .model_type
        .as_deref()
        .and_then(ModelType::parse)
        .unwrap_or_else(|| classifier::classify(service).model_type)
}

fn not_ready(namespace: &str, model: &str) -> PublishError {
    PublishError::ModelNotReady {
        namespace: namespace.to_string(),
        model: model.to_string(),
        violations: Vec::new(),
    }
}

/// Attach the cleartext key and render the documentation with it
fn with_key(record: &mut PublishedModel, key: &ApiKey) {
    record.api_key = Some(key.as_str().to_string());
    record.documentation = docs::generate(
        record.model_type,
        &record.model_name,
        &record.external_url,
        key.as_str(),
    );
}

fn audit_event(action: AuditAction, namespace: &str, model: &str, tenant: Option<&str>) -> AuditEvent {
    AuditEvent {
        timestamp: Utc::now(),
        action,
        model: model.to_string(),
        namespace: namespace.to_string(),
        tenant_id: tenant.map(str::to_string),
        details: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_common::network::ai_gateway::{AiGatewayRoute, AiServiceBackend};
    use gatehouse_common::network::envoy::{Backend, BackendTrafficPolicy};
    use gatehouse_common::network::gateway_api::{Gateway, HttpRoute, ReferenceGrant};
    use gatehouse_common::store::memory::{MemoryStore, StoreOp};
    use gatehouse_common::{HasApiResource, ResourceKind};
    use serde_json::{json, Value};

    const GATEWAY_NS: &str = "envoy-gateway-system";

    fn model(name: &str, ready: bool, annotations: Value) -> Value {
        json!({
            "metadata": {"name": name, "namespace": "a", "annotations": annotations},
            "status": {
                "url": format!("http://{name}.a.example.com"),
                "conditions": [{"type": "Ready", "status": if ready { "True" } else { "False" }}]
            }
        })
    }

    fn setup() -> (Arc<MemoryStore>, Publisher) {
        let store = Arc::new(MemoryStore::new());
        store.seed(
            Gateway::resource_kind(),
            GATEWAY_NS,
            json!({"metadata": {"name": "ai-inference-gateway"}, "spec": {"gatewayClassName": "eg"}}),
        );
        store.seed(InferenceService::resource_kind(), "a", model("iris", true, json!({})));
        store.seed(
            InferenceService::resource_kind(),
            "a",
            model("llama", true, json!({"gatehouse.io/model-type": "openai"})),
        );
        store.seed(InferenceService::resource_kind(), "a", model("pending", false, json!({})));
        let config = PlatformConfig {
            fallback_tenant_namespaces: vec!["a".to_string()],
            ..Default::default()
        };
        let publisher = Publisher::new(store.clone(), config);
        (store, publisher)
    }

    fn request() -> PublishConfig {
        serde_json::from_value(json!({
            "tenantId": "a",
            "rateLimiting": {"requestsPerMinute": 100, "requestsPerHour": 5000}
        }))
        .unwrap()
    }

    fn resource_version(store: &MemoryStore, kind: ResourceKind, ns: &str, name: &str) -> Value {
        store.object(kind, ns, name).unwrap()["metadata"]["resourceVersion"].clone()
    }

    #[tokio::test]
    async fn publish_validate_and_rotate() {
        let (_, publisher) = setup();
        let published = publisher.publish("a", "iris", request()).await.unwrap();

        assert_eq!(published.model_type, ModelType::Traditional);
        assert!(published.external_url.starts_with("https://"));
        assert!(published.external_url.contains("/models/iris"));
        let key = published.api_key.clone().unwrap();
        assert!(published.documentation.examples[0].code.contains(&key));

        let identity = publisher.validate_key(&key).await.unwrap();
        assert_eq!(identity.tenant, "a");
        assert_eq!(identity.model, "iris");

        let rotated = publisher.rotate_key("a", "iris").await.unwrap();
        let new_key = rotated.api_key.unwrap();
        assert_ne!(new_key, key);
        assert_eq!(
            publisher.validate_key(&key).await.unwrap_err().code(),
            "UNAUTHORIZED"
        );
        assert_eq!(publisher.validate_key(&new_key).await.unwrap().model, "iris");

        let stored = publisher.get("a", "iris").await.unwrap();
        assert!(stored.api_key.is_none());
        assert_eq!(stored.api_key_id, rotated.api_key_id);
    }

    #[tokio::test]
    async fn double_publish_keeps_original_key() {
        let (_, publisher) = setup();
        let first = publisher.publish("a", "iris", request()).await.unwrap();
        let key = first.api_key.unwrap();

        let err = publisher.publish("a", "iris", request()).await.unwrap_err();
        assert_eq!(err.code(), "ALREADY_PUBLISHED");
        assert!(publisher.validate_key(&key).await.is_ok());
    }

    #[tokio::test]
    async fn not_ready_model_creates_nothing() {
        let (store, publisher) = setup();
        let err = publisher.publish("a", "pending", request()).await.unwrap_err();
        assert_eq!(err.code(), "MODEL_NOT_READY");

        assert_eq!(store.count(ResourceKind::SECRET), 0);
        assert_eq!(store.count(HttpRoute::resource_kind()), 0);
        assert_eq!(store.count(BackendTrafficPolicy::resource_kind()), 0);
    }

    #[tokio::test]
    async fn missing_model_is_not_found() {
        let (_, publisher) = setup();
        let err = publisher.publish("a", "ghost", request()).await.unwrap_err();
        assert_eq!(err.code(), "MODEL_NOT_FOUND");
    }

    #[tokio::test]
    async fn rate_limit_failure_rolls_back_earlier_steps() {
        let (store, publisher) = setup();
        store.fail_on(StoreOp::Create, BackendTrafficPolicy::resource_kind());

        let err = publisher.publish("a", "iris", request()).await.unwrap_err();
        assert_eq!(err.code(), "RATE_LIMIT_CONFIG_FAILED");

        assert!(!store.contains(ResourceKind::SECRET, "a", "iris-api-key"));
        assert!(!store.contains(HttpRoute::resource_kind(), GATEWAY_NS, "a-iris-route"));
        assert!(publisher.get("a", "iris").await.is_err());

        store.clear_failures();
        publisher.publish("a", "iris", request()).await.unwrap();
    }

    #[tokio::test]
    async fn config_map_failure_rolls_back_everything() {
        let (store, publisher) = setup();
        store.fail_on(StoreOp::Create, ResourceKind::CONFIG_MAP);

        let err = publisher.publish("a", "iris", request()).await.unwrap_err();
        assert!(matches!(
            err.code(),
            "API_KEY_GENERATION_FAILED" | "METADATA_STORAGE_FAILED"
        ));
        assert_eq!(store.count(ResourceKind::SECRET), 0);
        assert_eq!(store.count(HttpRoute::resource_kind()), 0);
        assert_eq!(store.count(BackendTrafficPolicy::resource_kind()), 0);
    }

    #[tokio::test]
    async fn unpublish_removes_everything_and_is_idempotent() {
        let (store, publisher) = setup();
        let published = publisher.publish("a", "iris", request()).await.unwrap();
        let key = published.api_key.unwrap();

        let removed = publisher.unpublish("a", "iris").await.unwrap();
        assert_eq!(removed.model_name, "iris");
        assert_eq!(store.count(ResourceKind::SECRET), 0);
        assert_eq!(store.count(HttpRoute::resource_kind()), 0);
        assert_eq!(store.count(BackendTrafficPolicy::resource_kind()), 0);
        assert!(publisher.validate_key(&key).await.is_err());

        let err = publisher.unpublish("a", "iris").await.unwrap_err();
        assert_eq!(err.code(), "NOT_PUBLISHED");
    }

    #[tokio::test]
    async fn model_type_is_immutable_on_update() {
        let (_, publisher) = setup();
        publisher.publish("a", "iris", request()).await.unwrap();

        let mut change = request();
        change.model_type = Some("openai".to_string());
        let err = publisher.update("a", "iris", change).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn rate_limit_only_update_leaves_routes_untouched() {
        let (store, publisher) = setup();
        publisher.publish("a", "iris", request()).await.unwrap();
        let route_rv = resource_version(&store, HttpRoute::resource_kind(), GATEWAY_NS, "a-iris-route");
        let gateway_rv =
            resource_version(&store, Gateway::resource_kind(), GATEWAY_NS, "ai-inference-gateway");

        let mut change = request();
        if let Some(limits) = change.rate_limiting.as_mut() {
            limits.requests_per_minute = 10;
        }
        let updated = publisher.update("a", "iris", change).await.unwrap();
        assert_eq!(updated.rate_limiting.requests_per_minute, 10);

        assert_eq!(
            resource_version(&store, HttpRoute::resource_kind(), GATEWAY_NS, "a-iris-route"),
            route_rv
        );
        assert_eq!(
            resource_version(&store, Gateway::resource_kind(), GATEWAY_NS, "ai-inference-gateway"),
            gateway_rv
        );
        let policy = store
            .object(BackendTrafficPolicy::resource_kind(), GATEWAY_NS, "a-iris-ratelimit")
            .unwrap();
        assert!(policy.to_string().contains("\"requests\":10"));
    }

    #[tokio::test]
    async fn update_without_limits_keeps_current_policy() {
        let (store, publisher) = setup();
        let mut initial = request();
        if let Some(limits) = initial.rate_limiting.as_mut() {
            limits.tokens_per_hour = Some(100_000);
        }
        publisher.publish("a", "iris", initial).await.unwrap();
        let policy_rv = resource_version(
            &store,
            BackendTrafficPolicy::resource_kind(),
            GATEWAY_NS,
            "a-iris-ratelimit",
        );

        let change: PublishConfig =
            serde_json::from_value(json!({"tenantId": "a", "metadata": {"owner": "ml"}})).unwrap();
        let updated = publisher.update("a", "iris", change).await.unwrap();

        assert_eq!(updated.rate_limiting.requests_per_minute, 100);
        assert_eq!(updated.rate_limiting.requests_per_hour, 5000);
        assert_eq!(updated.rate_limiting.tokens_per_hour, Some(100_000));
        assert_eq!(updated.metadata["owner"], "ml");
        assert_eq!(
            resource_version(
                &store,
                BackendTrafficPolicy::resource_kind(),
                GATEWAY_NS,
                "a-iris-ratelimit"
            ),
            policy_rv
        );
    }

    #[tokio::test]
    async fn path_update_rebuilds_route() {
        let (store, publisher) = setup();
        publisher.publish("a", "iris", request()).await.unwrap();

        let mut change = request();
        change.external_path = Some("/iris".to_string());
        let updated = publisher.update("a", "iris", change).await.unwrap();
        assert!(updated.external_url.ends_with("/iris"));

        let route = store
            .object(HttpRoute::resource_kind(), GATEWAY_NS, "a-iris-route")
            .unwrap();
        assert_eq!(route["spec"]["rules"][0]["matches"][0]["path"]["value"], "/iris");
        assert_eq!(publisher.get("a", "iris").await.unwrap().external_path, "/iris");
    }

    #[tokio::test]
    async fn failed_route_update_restores_previous_route() {
        let (store, publisher) = setup();
        publisher.publish("a", "iris", request()).await.unwrap();
        store.fail_on(StoreOp::Replace, Gateway::resource_kind());

        let mut change = request();
        change.public_hostname = Some("iris.example.com".to_string());
        let err = publisher.update("a", "iris", change).await.unwrap_err();
        assert_eq!(err.code(), "GATEWAY_CONFIG_FAILED");

        let record = publisher.get("a", "iris").await.unwrap();
        assert_eq!(record.public_hostname, "inference.platform.local");
        let route = store
            .object(HttpRoute::resource_kind(), GATEWAY_NS, "a-iris-route")
            .unwrap();
        assert_eq!(route["spec"]["hostnames"][0], "inference.platform.local");
    }

    #[tokio::test]
    async fn openai_publish_creates_backend_chain() {
        let (store, publisher) = setup();
        let published = publisher.publish("a", "llama", request()).await.unwrap();

        assert_eq!(published.model_type, ModelType::OpenAi);
        assert!(published.external_url.ends_with("/v1"));
        assert!(store.contains(Backend::resource_kind(), GATEWAY_NS, "a-llama-backend"));
        assert!(store.contains(AiServiceBackend::resource_kind(), GATEWAY_NS, "a-llama-ai-backend"));
        assert!(store.contains(ReferenceGrant::resource_kind(), "istio-system", "a-llama-grant"));
        assert!(store.contains(AiGatewayRoute::resource_kind(), GATEWAY_NS, "a-llama-route"));

        publisher.unpublish("a", "llama").await.unwrap();
        assert_eq!(store.count(AiGatewayRoute::resource_kind()), 0);
        assert_eq!(store.count(Backend::resource_kind()), 0);
        assert_eq!(store.count(ReferenceGrant::resource_kind()), 0);
    }

    #[tokio::test]
    async fn usage_updates_summary_and_counters() {
        let (_, publisher) = setup();
        publisher.publish("a", "iris", request()).await.unwrap();
        let sample = UsageSample {
            tokens: 12,
            latency_ms: 40,
            error: false,
            timestamp: None,
        };
        let summary = publisher
            .record_usage("a", "iris", sample.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.request_count, 1);

        let record = publisher.get("a", "iris").await.unwrap();
        assert_eq!(record.usage.total_requests, 1);
        assert_eq!(record.usage.total_tokens, 12);

        let today = Utc::now().date_naive();
        let read = publisher.usage_summary("a", "iris", today).await.unwrap();
        assert_eq!(read, summary);

        let err = publisher.record_usage("a", "ghost", sample).await.unwrap_err();
        assert_eq!(err.code(), "NOT_PUBLISHED");
    }

    #[tokio::test]
    async fn huge_token_counts_saturate() {
        let (_, publisher) = setup();
        publisher.publish("a", "iris", request()).await.unwrap();
        let sample = UsageSample {
            tokens: u64::MAX,
            latency_ms: 5,
            error: false,
            timestamp: None,
        };
        publisher
            .record_usage("a", "iris", sample.clone())
            .await
            .unwrap();
        let summary = publisher
            .record_usage("a", "iris", sample)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.total_tokens, u64::MAX);
        assert_eq!(summary.request_count, 2);

        let record = publisher.get("a", "iris").await.unwrap();
        assert_eq!(record.usage.total_tokens, u64::MAX);
        assert_eq!(record.usage.total_requests, 2);
    }

    #[tokio::test]
    async fn workflows_are_audited() {
        let (store, publisher) = setup();
        publisher.publish("a", "iris", request()).await.unwrap();
        publisher.rotate_key("a", "iris").await.unwrap();

        let today = Utc::now().date_naive();
        let events = AuditLog::new(store).events("a", "iris", today).await.unwrap();
        let actions: Vec<AuditAction> = events.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![AuditAction::Publish, AuditAction::RotateKey]);
    }

    #[tokio::test]
    async fn concurrent_publishes_yield_one_record() {
        let (store, publisher) = setup();
        let (first, second) = tokio::join!(
            publisher.publish("a", "iris", request()),
            publisher.publish("a", "iris", request()),
        );
        assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);
        assert_eq!(store.count(ResourceKind::SECRET), 1);
        assert_eq!(store.count(HttpRoute::resource_kind()), 1);
    }

    #[tokio::test]
    async fn retraction_removes_unused_hostname_listeners() {
        let (store, _) = setup();
        let publisher = Publisher::new(
            store.clone(),
            PlatformConfig {
                retract_unused_hostnames: true,
                fallback_tenant_namespaces: vec!["a".to_string()],
                ..Default::default()
            },
        );
        let mut req = request();
        req.public_hostname = Some("iris.example.com".to_string());
        publisher.publish("a", "iris", req).await.unwrap();
        let gateway = store
            .object(Gateway::resource_kind(), GATEWAY_NS, "ai-inference-gateway")
            .unwrap();
        assert!(gateway.to_string().contains("iris.example.com"));

        publisher.unpublish("a", "iris").await.unwrap();
        let gateway = store
            .object(Gateway::resource_kind(), GATEWAY_NS, "ai-inference-gateway")
            .unwrap();
        assert!(!gateway.to_string().contains("iris.example.com"));
    }
}
