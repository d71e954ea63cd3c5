//! Tenant registry
//!
//! Tenant namespaces are the namespaces carrying the tenant label. The listing
//! is cached for a short TTL; when the query fails or finds nothing, the
//! configured fallback list is used instead (and not cached).

use std::sync::Arc;
use std::time::{Duration, Instant};

use gatehouse_common::store::object_name;
use gatehouse_common::{ResourceKind, ResourceStore};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::PlatformConfig;

struct Cached {
    fetched_at: Instant,
    namespaces: Vec<String>,
}

/// Cached view of tenant namespaces. Clones share the cache.
#[derive(Clone)]
pub struct TenantRegistry {
    store: Arc<dyn ResourceStore>,
    label: String,
    fallback: Vec<String>,
    ttl: Duration,
    cache: Arc<RwLock<Option<Cached>>>,
}

impl TenantRegistry {
    /// Registry configured from platform settings
    pub fn new(store: Arc<dyn ResourceStore>, config: &PlatformConfig) -> Self {
        Self {
            store,
            label: config.tenant_label.clone(),
            fallback: config.fallback_tenant_namespaces.clone(),
            ttl: config.tenant_cache_ttl,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Namespaces whose credentials are scanned during key validation
    pub async fn namespaces(&self) -> Vec<String> {
        if let Some(cached) = self.cache.read().as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return cached.namespaces.clone();
            }
        }

        match self.store.list_all(ResourceKind::NAMESPACE, &self.label).await {
            Ok(items) if !items.is_empty() => {
                let mut namespaces: Vec<String> =
                    items.iter().map(|ns| object_name(ns).to_string()).collect();
                namespaces.sort();
                namespaces.dedup();
                debug!(count = namespaces.len(), "refreshed tenant namespaces");
                *self.cache.write() = Some(Cached {
                    fetched_at: Instant::now(),
                    namespaces: namespaces.clone(),
                });
                namespaces
            }
            Ok(_) => {
                debug!(label = %self.label, "no labeled tenant namespaces, using fallback list");
                self.fallback.clone()
            }
            Err(e) => {
                warn!(error = %e, "tenant namespace query failed, using fallback list");
                self.fallback.clone()
            }
        }
    }

    /// Drop the cached listing
    pub fn invalidate(&self) {
        *self.cache.write() = None;
    }
}
