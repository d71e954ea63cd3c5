//! Reverse key index
//!
//! Maps a key hash to the (namespace, model) owning it, so validation is a
//! single read instead of a scan over every tenant. Entries live in the
//! system namespace and carry no secret material; a stale entry can never
//! authenticate because the owning credential record is always re-checked.

use std::collections::BTreeMap;
use std::sync::Arc;

use gatehouse_common::kube_utils::resource_name;
use gatehouse_common::store::{delete_if_present, from_value, to_value};
use gatehouse_common::{ObjectMeta, ResourceKind, ResourceStore, Result};
use k8s_openapi::api::core::v1::ConfigMap;

const NAMESPACE_KEY: &str = "namespace";
const MODEL_KEY: &str = "model";
const KEY_ID_KEY: &str = "keyId";

/// Where an indexed key belongs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    /// Model namespace
    pub namespace: String,
    /// Model name
    pub model: String,
    /// Key id at index time
    pub key_id: String,
}

/// Key hash → owner lookup table
#[derive(Clone)]
pub struct KeyIndex {
    store: Arc<dyn ResourceStore>,
    namespace: String,
}

impl KeyIndex {
    /// Index stored in `namespace`
    pub fn new(store: Arc<dyn ResourceStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// Object name for a hex key hash (first 128 bits of the SHA-256)
    pub fn entry_name(key_hash: &str) -> String {
        resource_name(&["key-index", key_hash.get(..32).unwrap_or(key_hash)])
    }

    /// Add an entry, failing if one already exists for this hash
    pub async fn insert(&self, key_hash: &str, entry: &IndexEntry) -> Result<()> {
        let name = Self::entry_name(key_hash);
        let meta = ObjectMeta::new(&name, &self.namespace)
            .with_label(gatehouse_common::LABEL_COMPONENT, gatehouse_common::COMPONENT_KEY_INDEX)
            .with_label(gatehouse_common::LABEL_MODEL, &entry.model)
            .with_label(gatehouse_common::LABEL_MODEL_NAMESPACE, &entry.namespace);

        let data = BTreeMap::from([
            (NAMESPACE_KEY.to_string(), entry.namespace.clone()),
            (MODEL_KEY.to_string(), entry.model.clone()),
            (KEY_ID_KEY.to_string(), entry.key_id.clone()),
        ]);
        let cm = ConfigMap {
            metadata: meta.into_k8s(),
            data: Some(data),
            ..Default::default()
        };

        self.store
            .create(
                ResourceKind::CONFIG_MAP,
                &self.namespace,
                to_value(ResourceKind::CONFIG_MAP, &cm)?,
            )
            .await?;
        Ok(())
    }

    /// Look up the owner of a key hash
    pub async fn lookup(&self, key_hash: &str) -> Result<Option<IndexEntry>> {
        let Some(value) = self
            .store
            .get(ResourceKind::CONFIG_MAP, &self.namespace, &Self::entry_name(key_hash))
            .await?
        else {
            return Ok(None);
        };

        let cm: ConfigMap = from_value(ResourceKind::CONFIG_MAP, value)?;
        let data = cm.data.unwrap_or_default();
        let field = |k: &str| data.get(k).cloned().unwrap_or_default();
        let entry = IndexEntry {
            namespace: field(NAMESPACE_KEY),
            model: field(MODEL_KEY),
            key_id: field(KEY_ID_KEY),
        };
        Ok((!entry.namespace.is_empty() && !entry.model.is_empty()).then_some(entry))
    }

    /// Remove the entry for a key hash; returns whether one existed
    pub async fn remove(&self, key_hash: &str) -> Result<bool> {
        delete_if_present(
            self.store.as_ref(),
            ResourceKind::CONFIG_MAP,
            &self.namespace,
            &Self::entry_name(key_hash),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_common::store::memory::MemoryStore;

    fn entry() -> IndexEntry {
        IndexEntry {
            namespace: "a".into(),
            model: "iris".into(),
            key_id: "k1".into(),
        }
    }

    #[test]
    fn entry_name_is_short_and_stable() {
        let hash = "ab".repeat(32);
        let name = KeyIndex::entry_name(&hash);
        assert_eq!(name, format!("key-index-{}", "ab".repeat(16)));
        assert!(name.len() <= 63);
    }

    #[tokio::test]
    async fn insert_lookup_remove() {
        let store = Arc::new(MemoryStore::new());
        let index = KeyIndex::new(store.clone(), "gatehouse-system");
        let hash = "07".repeat(32);

        index.insert(&hash, &entry()).await.unwrap();
        assert_eq!(index.lookup(&hash).await.unwrap(), Some(entry()));
        assert!(index.lookup(&"08".repeat(32)).await.unwrap().is_none());

        assert!(index.remove(&hash).await.unwrap());
        assert!(!index.remove(&hash).await.unwrap());
        assert!(index.lookup(&hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_fails() {
        let store = Arc::new(MemoryStore::new());
        let index = KeyIndex::new(store, "gatehouse-system");
        let hash = "01".repeat(32);
        index.insert(&hash, &entry()).await.unwrap();
        let err = index.insert(&hash, &entry()).await.unwrap_err();
        assert!(err.is_already_exists());
    }
}
