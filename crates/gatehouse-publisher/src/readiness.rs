//! Model readiness
//!
//! A model is ready when its `Ready` condition is true. Models that report no
//! `Ready` condition at all but already expose a serving URL are treated as
//! ready too. Ready models must also report a hostname, since that is what
//! routes rewrite to.

use gatehouse_common::crd::InferenceService;
use gatehouse_common::store::from_value;
use gatehouse_common::{HasApiResource, ResourceStore, Result};
use tracing::debug;

/// Outcome of a readiness check
#[derive(Clone, Debug)]
pub enum Readiness {
    /// No such model
    Missing,
    /// The model exists but cannot take traffic yet
    NotReady {
        /// Why, from the Ready condition when available
        reason: String,
    },
    /// The model is serving
    Ready {
        /// Hostname from the model's own status
        internal_hostname: String,
        /// The model object, for classification
        service: Box<InferenceService>,
    },
}

impl Readiness {
    /// Whether the model is serving
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }
}

/// Decide readiness from a model object
pub fn assess(service: InferenceService) -> Readiness {
    let hostname = service.serving_hostname();

    let ready = match service.ready_condition() {
        Some(condition) if condition.is_true() => true,
        Some(condition) => {
            let reason = condition
                .message
                .clone()
                .or_else(|| condition.reason.clone())
                .unwrap_or_else(|| format!("Ready={}", condition.status));
            return Readiness::NotReady { reason };
        }
        None => hostname.is_some(),
    };

    match (ready, hostname) {
        (true, Some(internal_hostname)) => Readiness::Ready {
            internal_hostname,
            service: Box::new(service),
        },
        (true, None) => Readiness::NotReady {
            reason: "model reports Ready but no serving URL".to_string(),
        },
        (false, _) => Readiness::NotReady {
            reason: "no Ready condition reported".to_string(),
        },
    }
}

/// Read a model and decide readiness
pub async fn check(store: &dyn ResourceStore, namespace: &str, model: &str) -> Result<Readiness> {
    let Some(value) = store
        .get(InferenceService::resource_kind(), namespace, model)
        .await?
    else {
        debug!(namespace = %namespace, model = %model, "model not found");
        return Ok(Readiness::Missing);
    };

    let service: InferenceService = from_value(InferenceService::resource_kind(), value)?;
    let readiness = assess(service);
    debug!(namespace = %namespace, model = %model, ready = readiness.is_ready(), "assessed readiness");
    Ok(readiness)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_common::store::memory::MemoryStore;
    use serde_json::json;

    fn isvc(status: serde_json::Value) -> InferenceService {
        serde_json::from_value(json!({
            "metadata": {"name": "iris", "namespace": "a"},
            "status": status
        }))
        .unwrap()
    }

    #[test]
    fn ready_condition_true_is_ready() {
        let r = assess(isvc(json!({
            "url": "http://iris.a.example.com",
            "conditions": [{"type": "Ready", "status": "True"}]
        })));
        match r {
            Readiness::Ready { internal_hostname, .. } => {
                assert_eq!(internal_hostname, "iris.a.example.com")
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn ready_false_wins_over_url() {
        let r = assess(isvc(json!({
            "url": "http://iris.a.example.com",
            "conditions": [{"type": "Ready", "status": "False", "reason": "RevisionMissing"}]
        })));
        match r {
            Readiness::NotReady { reason } => assert_eq!(reason, "RevisionMissing"),
            other => panic!("expected not ready, got {other:?}"),
        }
    }

    #[test]
    fn url_without_conditions_counts_as_ready() {
        let r = assess(isvc(json!({"address": {"url": "http://iris.a.svc.cluster.local"}})));
        assert!(r.is_ready());
    }

    #[test]
    fn no_status_is_not_ready() {
        let r = assess(isvc(json!({})));
        assert!(!r.is_ready());
    }

    #[test]
    fn ready_without_url_is_not_routable() {
        let r = assess(isvc(json!({"conditions": [{"type": "Ready", "status": "True"}]})));
        assert!(matches!(r, Readiness::NotReady { .. }));
    }

    #[tokio::test]
    async fn missing_model() {
        let store = MemoryStore::new();
        let r = check(&store, "a", "iris").await.unwrap();
        assert!(matches!(r, Readiness::Missing));
    }

    #[tokio::test]
    async fn reads_model_from_store() {
        let store = MemoryStore::new();
        store.seed(
            InferenceService::resource_kind(),
            "a",
            json!({
                "metadata": {"name": "iris"},
                "status": {
                    "url": "http://iris.a.example.com",
                    "conditions": [{"type": "Ready", "status": "True"}]
                }
            }),
        );
        let r = check(&store, "a", "iris").await.unwrap();
        assert!(r.is_ready());
    }
}
