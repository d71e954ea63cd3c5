//! Published model records
//!
//! One ConfigMap per published model, named deterministically from the model
//! so the create-fails-if-exists semantics of the store enforce "at most one
//! record per (namespace, model)". The cleartext key is never persisted here.

use std::collections::BTreeMap;
use std::sync::Arc;

use gatehouse_common::kube_utils::resource_name;
use gatehouse_common::store::{delete_if_present, from_value, to_value};
use gatehouse_common::{Error, ObjectMeta, ResourceKind, ResourceStore, Result};
use k8s_openapi::api::core::v1::ConfigMap;
use tracing::warn;

use crate::types::PublishedModel;

/// ConfigMap data key holding the JSON record
pub const RECORD_DATA_KEY: &str = "record.json";

/// A record together with the version it was read at
#[derive(Clone, Debug)]
pub struct StoredRecord {
    /// The record
    pub record: PublishedModel,
    /// Store version, for optimistic replace
    pub resource_version: Option<String>,
}

/// Reads and writes published model records
#[derive(Clone)]
pub struct RecordStore {
    store: Arc<dyn ResourceStore>,
}

impl RecordStore {
    /// Record store over `store`
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Object name of a model's record
    pub fn record_name(model: &str) -> String {
        resource_name(&["published-model", model])
    }

    fn selector() -> String {
        format!(
            "{}={}",
            gatehouse_common::LABEL_COMPONENT,
            gatehouse_common::COMPONENT_PUBLISHED_MODEL
        )
    }

    fn to_config_map(
        record: &PublishedModel,
        resource_version: Option<String>,
    ) -> Result<ConfigMap> {
        let mut persisted = record.clone();
        persisted.api_key = None;

        let mut meta = ObjectMeta::new(Self::record_name(&record.model_name), &record.namespace)
            .with_label(
                gatehouse_common::LABEL_COMPONENT,
                gatehouse_common::COMPONENT_PUBLISHED_MODEL,
            )
            .with_label(gatehouse_common::LABEL_MODEL, &record.model_name)
            .with_label(gatehouse_common::LABEL_TENANT, &record.tenant_id);
        meta.resource_version = resource_version;

        Ok(ConfigMap {
            metadata: meta.into_k8s(),
            data: Some(BTreeMap::from([(
                RECORD_DATA_KEY.to_string(),
                serde_json::to_string(&persisted)?,
            )])),
            ..Default::default()
        })
    }

    fn parse(cm: ConfigMap) -> Result<StoredRecord> {
        let resource_version = cm.metadata.resource_version.clone();
        let raw = cm
            .data
            .as_ref()
            .and_then(|d| d.get(RECORD_DATA_KEY))
            .ok_or_else(|| {
                Error::serialization_for_kind("ConfigMap", "record missing record.json")
            })?;
        let record = serde_json::from_str(raw)
            .map_err(|e| Error::serialization_for_kind("ConfigMap", e.to_string()))?;
        Ok(StoredRecord {
            record,
            resource_version,
        })
    }

    /// Read a model's record
    pub async fn get(&self, namespace: &str, model: &str) -> Result<Option<StoredRecord>> {
        let Some(value) = self
            .store
            .get(ResourceKind::CONFIG_MAP, namespace, &Self::record_name(model))
            .await?
        else {
            return Ok(None);
        };
        Self::parse(from_value(ResourceKind::CONFIG_MAP, value)?).map(Some)
    }

    /// Create a record; fails with `AlreadyExists` when one is present
    pub async fn create(&self, record: &PublishedModel) -> Result<()> {
        let cm = Self::to_config_map(record, None)?;
        self.store
            .create(
                ResourceKind::CONFIG_MAP,
                &record.namespace,
                to_value(ResourceKind::CONFIG_MAP, &cm)?,
            )
            .await?;
        Ok(())
    }

    /// Replace a record; `resource_version` guards against lost updates
    pub async fn replace(
        &self,
        record: &PublishedModel,
        resource_version: Option<String>,
    ) -> Result<()> {
        let cm = Self::to_config_map(record, resource_version)?;
        self.store
            .replace(
                ResourceKind::CONFIG_MAP,
                &record.namespace,
                &Self::record_name(&record.model_name),
                to_value(ResourceKind::CONFIG_MAP, &cm)?,
            )
            .await?;
        Ok(())
    }

    /// Delete a model's record; returns whether it existed
    pub async fn delete(&self, namespace: &str, model: &str) -> Result<bool> {
        delete_if_present(
            self.store.as_ref(),
            ResourceKind::CONFIG_MAP,
            namespace,
            &Self::record_name(model),
        )
        .await
    }

    /// Records in one namespace, sorted by model name
    pub async fn list(&self, namespace: &str) -> Result<Vec<PublishedModel>> {
        let items = self
            .store
            .list(ResourceKind::CONFIG_MAP, namespace, &Self::selector())
            .await?;
        Ok(Self::parse_all(items))
    }

    /// Records across every namespace, sorted by namespace then model
    pub async fn list_all(&self) -> Result<Vec<PublishedModel>> {
        let items = self
            .store
            .list_all(ResourceKind::CONFIG_MAP, &Self::selector())
            .await?;
        Ok(Self::parse_all(items))
    }

    /// Unreadable records are skipped so one bad object cannot hide the rest
    fn parse_all(items: Vec<serde_json::Value>) -> Vec<PublishedModel> {
        let mut records: Vec<PublishedModel> = items
            .into_iter()
            .filter_map(|value| {
                let name = gatehouse_common::store::object_name(&value).to_string();
                match from_value(ResourceKind::CONFIG_MAP, value).and_then(Self::parse) {
                    Ok(stored) => Some(stored.record),
                    Err(e) => {
                        warn!(name = %name, error = %e, "skipping unreadable published model record");
                        None
                    }
                }
            })
            .collect();
        records.sort_by(|a, b| {
            (a.namespace.as_str(), a.model_name.as_str())
                .cmp(&(b.namespace.as_str(), b.model_name.as_str()))
        });
        records
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{Documentation, ModelType, PublishStatus, RateLimitConfig, UsageCounters};
    use chrono::Utc;
    use gatehouse_common::store::memory::MemoryStore;
    use serde_json::json;

    pub(crate) fn record(namespace: &str, model: &str) -> PublishedModel {
        let now = Utc::now();
        PublishedModel {
            model_name: model.into(),
            namespace: namespace.into(),
            tenant_id: namespace.into(),
            model_type: ModelType::Traditional,
            external_url: format!("https://h/{namespace}/models/{model}"),
            public_hostname: "h".into(),
            external_path: format!("/{namespace}/models/{model}"),
            internal_hostname: format!("{model}.{namespace}.svc"),
            api_key_id: "k1".into(),
            api_key: Some("secret".into()),
            rate_limiting: RateLimitConfig::default(),
            status: PublishStatus::Published,
            created_at: now,
            updated_at: now,
            usage: UsageCounters::default(),
            documentation: Documentation {
                endpoint: String::new(),
                auth_header: String::new(),
                examples: Vec::new(),
            },
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn create_is_exclusive_and_strips_key() {
        let store = Arc::new(MemoryStore::new());
        let records = RecordStore::new(store.clone());
        records.create(&record("a", "iris")).await.unwrap();
        assert!(records.create(&record("a", "iris")).await.unwrap_err().is_already_exists());

        let stored = records.get("a", "iris").await.unwrap().unwrap();
        assert!(stored.record.api_key.is_none());
        assert!(stored.resource_version.is_some());
        let raw = store
            .object(ResourceKind::CONFIG_MAP, "a", "published-model-iris")
            .unwrap();
        assert!(!raw.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn replace_with_stale_version_conflicts() {
        let records = RecordStore::new(Arc::new(MemoryStore::new()));
        records.create(&record("a", "iris")).await.unwrap();
        let stored = records.get("a", "iris").await.unwrap().unwrap();

        records
            .replace(&stored.record, stored.resource_version.clone())
            .await
            .unwrap();
        let err = records
            .replace(&stored.record, stored.resource_version)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn lists_skip_unreadable_records() {
        let store = Arc::new(MemoryStore::new());
        let records = RecordStore::new(store.clone());
        records.create(&record("b", "zeta")).await.unwrap();
        records.create(&record("a", "iris")).await.unwrap();
        records.create(&record("a", "alpha")).await.unwrap();
        let labels = json!({
            gatehouse_common::LABEL_COMPONENT: gatehouse_common::COMPONENT_PUBLISHED_MODEL
        });
        store.seed(
            ResourceKind::CONFIG_MAP,
            "a",
            json!({
                "metadata": {"name": "published-model-broken", "labels": labels},
                "data": {"record.json": "{"}
            }),
        );

        let names: Vec<String> = records
            .list("a")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.model_name)
            .collect();
        assert_eq!(names, vec!["alpha", "iris"]);
        assert_eq!(records.list_all().await.unwrap().len(), 3);
        assert!(records.delete("a", "iris").await.unwrap());
        assert!(!records.delete("a", "iris").await.unwrap());
    }
}
