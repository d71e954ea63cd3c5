//! Resource store adapter
//!
//! Every object gatehouse manages (records, credentials, routes, policies)
//! goes through [`ResourceStore`]: create/get/replace/delete by name plus
//! label-based listing, with "already exists" and "not found" surfaced as
//! distinct errors. The production implementation talks to the Kubernetes API
//! through kube-rs dynamic objects; tests use the in-memory store.

#[cfg(any(test, feature = "memory-store"))]
pub mod memory;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

#[cfg(test)]
use mockall::automock;

use crate::kube_utils::ResourceKind;
use crate::{Error, Result};

/// Generic access to named, namespaced, labeled objects.
///
/// Objects are exchanged as JSON values; typed builders serialize at this
/// boundary. For cluster-scoped kinds the namespace argument is ignored.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Create an object, failing with `AlreadyExists` if the name is taken
    async fn create(&self, kind: ResourceKind, namespace: &str, object: Value) -> Result<Value>;

    /// Get an object by name, `None` when absent
    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<Option<Value>>;

    /// Replace an existing object
    ///
    /// Fails with `NotFound` if absent and `Conflict` when the object carries
    /// a stale `metadata.resourceVersion`.
    async fn replace(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        object: Value,
    ) -> Result<Value>;

    /// Delete an object by name, failing with `NotFound` if absent
    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<()>;

    /// List objects in one namespace matching a label selector ("" = all)
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Value>>;

    /// List objects across all namespaces matching a label selector
    async fn list_all(&self, kind: ResourceKind, label_selector: &str) -> Result<Vec<Value>>;
}

/// Serialize a typed resource for the store
pub fn to_value<T: Serialize>(kind: ResourceKind, object: &T) -> Result<Value> {
    serde_json::to_value(object)
        .map_err(|e| Error::serialization_for_kind(kind.kind, e.to_string()))
}

/// Deserialize a store object into a typed view
pub fn from_value<T: DeserializeOwned>(kind: ResourceKind, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::serialization_for_kind(kind.kind, e.to_string()))
}

/// Read `metadata.name` from a store object
pub fn object_name(object: &Value) -> &str {
    object
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

/// Delete an object, treating absence as success
///
/// Returns `true` when an object was actually removed.
pub async fn delete_if_present(
    store: &dyn ResourceStore,
    kind: ResourceKind,
    namespace: &str,
    name: &str,
) -> Result<bool> {
    match store.delete(kind, namespace, name).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => {
            trace!(kind = %kind, namespace = %namespace, name = %name, "already absent");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

// =============================================================================
// Kubernetes implementation
// =============================================================================

/// ResourceStore backed by the Kubernetes API server
pub struct KubeResourceStore {
    client: Client,
}

impl KubeResourceStore {
    /// Create a store wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: ResourceKind, namespace: &str) -> Api<DynamicObject> {
        let ar = kind.api_resource();
        if kind.namespaced {
            Api::namespaced_with(self.client.clone(), namespace, &ar)
        } else {
            Api::all_with(self.client.clone(), &ar)
        }
    }

    fn list_params(label_selector: &str) -> ListParams {
        if label_selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(label_selector)
        }
    }

    fn to_dynamic(kind: ResourceKind, object: Value) -> Result<DynamicObject> {
        from_value(kind, object)
    }
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn create(&self, kind: ResourceKind, namespace: &str, object: Value) -> Result<Value> {
        let name = object_name(&object).to_string();
        let obj = Self::to_dynamic(kind, object)?;
        debug!(kind = %kind, namespace = %namespace, name = %name, "creating object");
        let created = self
            .api(kind, namespace)
            .create(&PostParams::default(), &obj)
            .await
            .map_err(|e| Error::from_kube(kind.kind, namespace, &name, e))?;
        to_value(kind, &created)
    }

    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<Option<Value>> {
        let found = self
            .api(kind, namespace)
            .get_opt(name)
            .await
            .map_err(|e| Error::from_kube(kind.kind, namespace, name, e))?;
        found.map(|obj| to_value(kind, &obj)).transpose()
    }

    async fn replace(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        object: Value,
    ) -> Result<Value> {
        let obj = Self::to_dynamic(kind, object)?;
        debug!(kind = %kind, namespace = %namespace, name = %name, "replacing object");
        let replaced = self
            .api(kind, namespace)
            .replace(name, &PostParams::default(), &obj)
            .await
            .map_err(|e| Error::from_kube(kind.kind, namespace, name, e))?;
        to_value(kind, &replaced)
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<()> {
        debug!(kind = %kind, namespace = %namespace, name = %name, "deleting object");
        self.api(kind, namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| Error::from_kube(kind.kind, namespace, name, e))?;
        Ok(())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Value>> {
        let list = self
            .api(kind, namespace)
            .list(&Self::list_params(label_selector))
            .await
            .map_err(|e| Error::from_kube(kind.kind, namespace, "", e))?;
        list.items.iter().map(|obj| to_value(kind, obj)).collect()
    }

    async fn list_all(&self, kind: ResourceKind, label_selector: &str) -> Result<Vec<Value>> {
        let ar = kind.api_resource();
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        let list = api
            .list(&Self::list_params(label_selector))
            .await
            .map_err(|e| Error::from_kube(kind.kind, "", "", e))?;
        list.items.iter().map(|obj| to_value(kind, obj)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn delete_if_present_tolerates_absence() {
        let mut store = MockResourceStore::new();
        store
            .expect_delete()
            .returning(|kind, ns, name| Err(Error::not_found(kind.kind, ns, name)));

        let removed = delete_if_present(&store, ResourceKind::SECRET, "a", "iris-api-key")
            .await
            .expect("absence is not an error");
        assert!(!removed);
    }

    #[tokio::test]
    async fn delete_if_present_propagates_other_errors() {
        let mut store = MockResourceStore::new();
        store
            .expect_delete()
            .returning(|_, _, _| Err(Error::internal("store down")));

        let result = delete_if_present(&store, ResourceKind::SECRET, "a", "iris-api-key").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delete_if_present_reports_removal() {
        let mut store = MockResourceStore::new();
        store.expect_delete().times(1).returning(|_, _, _| Ok(()));

        let removed = delete_if_present(&store, ResourceKind::CONFIG_MAP, "a", "x")
            .await
            .expect("delete should succeed");
        assert!(removed);
    }

    #[test]
    fn object_name_reads_metadata() {
        let obj = json!({"metadata": {"name": "iris-route"}});
        assert_eq!(object_name(&obj), "iris-route");
        assert_eq!(object_name(&json!({})), "");
    }

    #[test]
    fn from_value_reports_kind_on_failure() {
        let err = from_value::<crate::ObjectMeta>(ResourceKind::SECRET, json!(42))
            .expect_err("number is not metadata");
        match err {
            Error::Serialization { kind, .. } => assert_eq!(kind.as_deref(), Some("Secret")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
