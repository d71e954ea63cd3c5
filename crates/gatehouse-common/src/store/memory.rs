//! In-memory ResourceStore for tests
//!
//! Mirrors the API server semantics the workflows rely on: create fails on a
//! taken name, replace checks `metadata.resourceVersion`, delete fails on an
//! absent name, and list filters by label selector. Individual operations can
//! be made to fail per kind to exercise rollback paths.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{object_name, ResourceStore};
use crate::kube_utils::ResourceKind;
use crate::{Error, Result};

/// Store operation, used to target injected failures
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    /// create
    Create,
    /// get
    Get,
    /// replace
    Replace,
    /// delete
    Delete,
    /// list and list_all
    List,
}

impl std::fmt::Display for StoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StoreOp::Create => "create",
            StoreOp::Get => "get",
            StoreOp::Replace => "replace",
            StoreOp::Delete => "delete",
            StoreOp::List => "list",
        };
        f.write_str(s)
    }
}

type ObjectKey = (String, String, String, String);

#[derive(Default)]
struct Inner {
    objects: BTreeMap<ObjectKey, Value>,
    failures: Vec<(StoreOp, ResourceKind)>,
    version: u64,
}

/// Thread-safe in-memory store. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `op` on `kind` fail until [`MemoryStore::clear_failures`]
    pub fn fail_on(&self, op: StoreOp, kind: ResourceKind) {
        self.inner.lock().failures.push((op, kind));
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        self.inner.lock().failures.clear();
    }

    /// Insert or overwrite an object directly, bypassing failure injection
    pub fn seed(&self, kind: ResourceKind, namespace: &str, object: Value) {
        let name = object_name(&object).to_string();
        let mut inner = self.inner.lock();
        let object = stamp(&mut inner, kind, namespace, object);
        inner.objects.insert(key(kind, namespace, &name), object);
    }

    /// Read an object directly, bypassing failure injection
    pub fn object(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<Value> {
        self.inner
            .lock()
            .objects
            .get(&key(kind, namespace, name))
            .cloned()
    }

    /// Whether an object exists
    pub fn contains(&self, kind: ResourceKind, namespace: &str, name: &str) -> bool {
        self.object(kind, namespace, name).is_some()
    }

    /// Number of stored objects of a kind across all namespaces
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.inner
            .lock()
            .objects
            .keys()
            .filter(|(api_version, k, _, _)| api_version == kind.api_version && k == kind.kind)
            .count()
    }

    fn check_failure(&self, op: StoreOp, kind: ResourceKind) -> Result<()> {
        let inner = self.inner.lock();
        if inner.failures.iter().any(|(o, k)| *o == op && *k == kind) {
            return Err(Error::InjectedFailure {
                operation: op.to_string(),
                kind: kind.kind.to_string(),
            });
        }
        Ok(())
    }

    fn collect(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<Value>> {
        self.check_failure(StoreOp::List, kind)?;
        let selector = parse_selector(label_selector)?;
        let inner = self.inner.lock();
        Ok(inner
            .objects
            .iter()
            .filter(|((api_version, k, ns, _), _)| {
                api_version == kind.api_version
                    && k == kind.kind
                    && namespace.map_or(true, |want| !kind.namespaced || ns == want)
            })
            .filter(|(_, obj)| selector.iter().all(|req| req.matches(obj)))
            .map(|(_, obj)| obj.clone())
            .collect())
    }
}

fn key(kind: ResourceKind, namespace: &str, name: &str) -> ObjectKey {
    let namespace = if kind.namespaced { namespace } else { "" };
    (
        kind.api_version.to_string(),
        kind.kind.to_string(),
        namespace.to_string(),
        name.to_string(),
    )
}

/// Fill in apiVersion/kind/namespace and bump resourceVersion
fn stamp(inner: &mut Inner, kind: ResourceKind, namespace: &str, mut object: Value) -> Value {
    inner.version += 1;
    if !object.is_object() {
        object = json!({});
    }
    object["apiVersion"] = json!(kind.api_version);
    object["kind"] = json!(kind.kind);
    if !object["metadata"].is_object() {
        object["metadata"] = json!({});
    }
    if kind.namespaced {
        object["metadata"]["namespace"] = json!(namespace);
    }
    object["metadata"]["resourceVersion"] = json!(inner.version.to_string());
    object
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn create(&self, kind: ResourceKind, namespace: &str, object: Value) -> Result<Value> {
        self.check_failure(StoreOp::Create, kind)?;
        let name = object_name(&object).to_string();
        let mut inner = self.inner.lock();
        let k = key(kind, namespace, &name);
        if inner.objects.contains_key(&k) {
            return Err(Error::already_exists(kind.kind, namespace, name));
        }
        let stored = stamp(&mut inner, kind, namespace, object);
        inner.objects.insert(k, stored.clone());
        Ok(stored)
    }

    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<Option<Value>> {
        self.check_failure(StoreOp::Get, kind)?;
        Ok(self.object(kind, namespace, name))
    }

    async fn replace(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        object: Value,
    ) -> Result<Value> {
        self.check_failure(StoreOp::Replace, kind)?;
        let mut inner = self.inner.lock();
        let k = key(kind, namespace, name);
        let current = inner
            .objects
            .get(&k)
            .ok_or_else(|| Error::not_found(kind.kind, namespace, name))?;

        let expected = object
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str);
        let actual = current
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str);
        if let Some(expected) = expected {
            if Some(expected) != actual {
                return Err(Error::conflict(kind.kind, namespace, name));
            }
        }

        let stored = stamp(&mut inner, kind, namespace, object);
        inner.objects.insert(k, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<()> {
        self.check_failure(StoreOp::Delete, kind)?;
        self.inner
            .lock()
            .objects
            .remove(&key(kind, namespace, name))
            .map(|_| ())
            .ok_or_else(|| Error::not_found(kind.kind, namespace, name))
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Value>> {
        self.collect(kind, Some(namespace), label_selector)
    }

    async fn list_all(&self, kind: ResourceKind, label_selector: &str) -> Result<Vec<Value>> {
        self.collect(kind, None, label_selector)
    }
}

// =============================================================================
// Label selectors
// =============================================================================

#[derive(Debug, PartialEq)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    Exists(String),
}

impl Requirement {
    fn matches(&self, object: &Value) -> bool {
        let label = |k: &str| {
            object
                .pointer("/metadata/labels")
                .and_then(|labels| labels.get(k))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        match self {
            Requirement::Equals(k, v) => label(k).as_deref() == Some(v.as_str()),
            Requirement::NotEquals(k, v) => label(k).as_deref() != Some(v.as_str()),
            Requirement::Exists(k) => label(k).is_some(),
        }
    }
}

/// Parse the equality subset of Kubernetes label selectors
fn parse_selector(selector: &str) -> Result<Vec<Requirement>> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|term| {
            if let Some((k, v)) = term.split_once("!=") {
                Ok(Requirement::NotEquals(k.trim().into(), v.trim().into()))
            } else if let Some((k, v)) = term.split_once("==") {
                Ok(Requirement::Equals(k.trim().into(), v.trim().into()))
            } else if let Some((k, v)) = term.split_once('=') {
                Ok(Requirement::Equals(k.trim().into(), v.trim().into()))
            } else if term.contains(char::is_whitespace) {
                Err(Error::internal_with_context(
                    "store",
                    format!("unsupported label selector term: {term}"),
                ))
            } else {
                Ok(Requirement::Exists(term.to_string()))
            }
        })
        .collect()
}
