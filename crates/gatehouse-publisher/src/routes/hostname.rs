//! Listener hostname merge
//!
//! The edge Gateway is shared by every published model. Hostnames are added
//! by read-modify-write on its listener list: when no existing listener
//! already covers the hostname (explicitly or through a wildcard), one HTTP
//! and one HTTPS listener are appended. Other listeners are written back
//! exactly as read, so concurrent publishers for different hostnames only ever race on the
//! resourceVersion, which is retried.

use std::sync::Arc;

use gatehouse_common::kube_utils::resource_name;
use gatehouse_common::mesh::MANAGED_LISTENER_PREFIX;
use gatehouse_common::network::gateway_api::{hostname_matches, Gateway, GatewayListener};
use gatehouse_common::retry::{retry_when, RetryConfig};
use gatehouse_common::{Error, HasApiResource, ResourceStore, Result};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::PlatformConfig;

/// Adds and removes public hostnames on the shared edge Gateway
#[derive(Clone)]
pub struct HostnameMerger {
    store: Arc<dyn ResourceStore>,
    gateway_name: String,
    gateway_namespace: String,
    tls_secret: String,
    retry: RetryConfig,
}

impl HostnameMerger {
    /// Merger for the configured edge Gateway
    pub fn new(store: Arc<dyn ResourceStore>, config: &PlatformConfig) -> Self {
        Self {
            store,
            gateway_name: config.gateway_name.clone(),
            gateway_namespace: config.gateway_namespace.clone(),
            tls_secret: config.tls_secret_name.clone(),
            retry: RetryConfig::conflicts(),
        }
    }

    /// Names of the listeners created for a hostname
    pub fn listener_names(hostname: &str) -> (String, String) {
        let prefix = MANAGED_LISTENER_PREFIX.trim_end_matches('-');
        (
            resource_name(&[prefix, "http", hostname]),
            resource_name(&[prefix, "https", hostname]),
        )
    }

    /// Make sure the Gateway accepts `hostname`
    ///
    /// Returns whether listeners were added. Idempotent.
    pub async fn ensure(&self, hostname: &str) -> Result<bool> {
        retry_when(&self.retry, "merge_hostname", Error::is_conflict, || {
            self.ensure_once(hostname)
        })
        .await
    }

    async fn ensure_once(&self, hostname: &str) -> Result<bool> {
        let mut gateway = self.read_gateway().await?;
        let mut listeners = raw_listeners(&gateway)?;

        if listeners
            .iter()
            .any(|l| hostname_matches(listener_hostname(l), hostname))
        {
            debug!(hostname = %hostname, "hostname already covered by a listener");
            return Ok(false);
        }

        let (http_name, https_name) = Self::listener_names(hostname);
        listeners.push(serde_json::to_value(GatewayListener::http(http_name, hostname))?);
        listeners.push(serde_json::to_value(GatewayListener::https(
            https_name,
            hostname,
            &self.tls_secret,
        ))?);
        self.write_listeners(&mut gateway, listeners).await?;

        info!(
            hostname = %hostname,
            gateway = %self.gateway_name,
            "added hostname listeners to edge gateway"
        );
        Ok(true)
    }

    /// Remove the listeners this system added for `hostname`
    ///
    /// Listeners created by anyone else are left alone even when they match.
    /// Returns whether anything was removed.
    pub async fn retract(&self, hostname: &str) -> Result<bool> {
        retry_when(&self.retry, "retract_hostname", Error::is_conflict, || {
            self.retract_once(hostname)
        })
        .await
    }

    async fn retract_once(&self, hostname: &str) -> Result<bool> {
        let mut gateway = self.read_gateway().await?;
        let listeners = raw_listeners(&gateway)?;
        let before = listeners.len();

        let kept: Vec<Value> = listeners
            .into_iter()
            .filter(|l| {
                let ours = l
                    .get("name")
                    .and_then(Value::as_str)
                    .is_some_and(|n| n.starts_with(MANAGED_LISTENER_PREFIX));
                let same_host =
                    listener_hostname(l).is_some_and(|h| h.eq_ignore_ascii_case(hostname));
                !(ours && same_host)
            })
            .collect();

        let removed = before - kept.len();
        if removed == 0 {
            return Ok(false);
        }
        self.write_listeners(&mut gateway, kept).await?;
        info!(hostname = %hostname, removed, "retracted hostname listeners");
        Ok(true)
    }

    async fn read_gateway(&self) -> Result<Value> {
        self.store
            .get(
                Gateway::resource_kind(),
                &self.gateway_namespace,
                &self.gateway_name,
            )
            .await?
            .ok_or_else(|| Error::not_found("Gateway", &self.gateway_namespace, &self.gateway_name))
    }

    /// Replace the listener list, keeping every other field of the object
    async fn write_listeners(&self, gateway: &mut Value, listeners: Vec<Value>) -> Result<()> {
        gateway["spec"]["listeners"] = Value::Array(listeners);
        self.store
            .replace(
                Gateway::resource_kind(),
                &self.gateway_namespace,
                &self.gateway_name,
                gateway.take(),
            )
            .await?;
        Ok(())
    }
}

/// Listener entries exactly as stored; fields we do not model survive the write
fn raw_listeners(gateway: &Value) -> Result<Vec<Value>> {
    match gateway.pointer("/spec/listeners") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(listeners)) => Ok(listeners.clone()),
        Some(_) => Err(Error::serialization_for_kind(
            "Gateway",
            "spec.listeners is not a list",
        )),
    }
}

fn listener_hostname(listener: &Value) -> Option<&str> {
    listener.get("hostname").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_common::store::memory::MemoryStore;
    use serde_json::json;

    fn seed_gateway(store: &MemoryStore, listeners: Value) {
        store.seed(
            Gateway::resource_kind(),
            "envoy-gateway-system",
            json!({
                "metadata": {"name": "ai-inference-gateway"},
                "spec": {"gatewayClassName": "eg", "listeners": listeners}
            }),
        );
    }

    fn raw(store: &MemoryStore) -> Vec<Value> {
        let gw = store
            .object(Gateway::resource_kind(), "envoy-gateway-system", "ai-inference-gateway")
            .unwrap();
        raw_listeners(&gw).unwrap()
    }

    fn listeners(store: &MemoryStore) -> Vec<GatewayListener> {
        raw(store)
            .into_iter()
            .map(|l| serde_json::from_value(l).unwrap())
            .collect()
    }

    fn merger(store: Arc<MemoryStore>) -> HostnameMerger {
        HostnameMerger::new(store, &PlatformConfig::default())
    }

    #[tokio::test]
    async fn appends_http_and_https_listeners() {
        let store = Arc::new(MemoryStore::new());
        seed_gateway(&store, json!([{"name": "http", "port": 80, "protocol": "HTTP", "hostname": "other.example.com"}]));

        assert!(merger(store.clone()).ensure("models.example.com").await.unwrap());

        let ls = listeners(&store);
        assert_eq!(ls.len(), 3);
        assert_eq!(ls[0].hostname.as_deref(), Some("other.example.com"));
        assert_eq!(ls[1].name, "gh-http-models-example-com");
        assert_eq!(ls[1].port, 80);
        assert_eq!(ls[2].port, 443);
        assert_eq!(ls[2].tls.as_ref().unwrap().certificate_refs[0].name, "inference-gateway-tls");
    }

    #[tokio::test]
    async fn merge_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        seed_gateway(&store, json!([]));
        let m = merger(store.clone());

        assert!(m.ensure("models.example.com").await.unwrap());
        assert!(!m.ensure("models.example.com").await.unwrap());
        assert_eq!(listeners(&store).len(), 2);
    }

    #[tokio::test]
    async fn wildcard_listener_covers_subdomain() {
        let store = Arc::new(MemoryStore::new());
        seed_gateway(&store, json!([{"name": "wild", "port": 443, "protocol": "HTTPS", "hostname": "*.example.com"}]));

        assert!(!merger(store.clone()).ensure("models.example.com").await.unwrap());
        assert_eq!(listeners(&store).len(), 1);
    }

    #[tokio::test]
    async fn missing_gateway_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let err = merger(store).ensure("models.example.com").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn retract_removes_only_managed_listeners() {
        let store = Arc::new(MemoryStore::new());
        seed_gateway(&store, json!([{"name": "manual", "port": 80, "protocol": "HTTP", "hostname": "models.example.com"}]));
        let m = merger(store.clone());

        // Covered by the manual listener, so nothing is added or retracted
        assert!(!m.ensure("models.example.com").await.unwrap());
        assert!(!m.retract("models.example.com").await.unwrap());

        m.ensure("b.example.com").await.unwrap();
        assert_eq!(listeners(&store).len(), 3);
        assert!(m.retract("b.example.com").await.unwrap());

        let ls = listeners(&store);
        assert_eq!(ls.len(), 1);
        assert_eq!(ls[0].name, "manual");
    }

    #[tokio::test]
    async fn foreign_listeners_survive_merge_and_retract() {
        let foreign = json!({
            "name": "team-x",
            "port": 443,
            "protocol": "HTTPS",
            "hostname": "x.example.com",
            "tls": {
                "mode": "Terminate",
                "certificateRefs": [{"group": "", "kind": "Secret", "name": "other-cert", "namespace": "certs"}],
                "options": {"gateway.envoyproxy.io/tls-min-version": "1.3"}
            },
            "allowedRoutes": {
                "namespaces": {"from": "Selector", "selector": {"matchLabels": {"team": "x"}}},
                "kinds": [{"group": "gateway.networking.k8s.io", "kind": "HTTPRoute"}]
            }
        });
        let kinds_only = json!({
            "name": "grpc",
            "port": 8443,
            "protocol": "HTTPS",
            "hostname": "grpc.example.com",
            "allowedRoutes": {"kinds": [{"kind": "GRPCRoute"}]}
        });
        let store = Arc::new(MemoryStore::new());
        seed_gateway(&store, json!([foreign.clone(), kinds_only.clone()]));
        let m = merger(store.clone());

        assert!(m.ensure("models.example.com").await.unwrap());
        let ls = raw(&store);
        assert_eq!(ls.len(), 4);
        assert_eq!(ls[0], foreign);
        assert_eq!(ls[1], kinds_only);

        assert!(m.retract("models.example.com").await.unwrap());
        assert_eq!(raw(&store), vec![foreign, kinds_only]);
    }
}
