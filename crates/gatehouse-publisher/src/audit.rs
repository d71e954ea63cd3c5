//! Audit and usage records
//!
//! Both are append-only and partitioned by model and UTC day: one ConfigMap
//! per (model, day) in the model's namespace. Appends are read-modify-write
//! with optimistic concurrency, retried on conflict. Audit appends are
//! best-effort and never fail a workflow.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use gatehouse_common::kube_utils::resource_name;
use gatehouse_common::retry::{retry_when, RetryConfig};
use gatehouse_common::store::{from_value, to_value};
use gatehouse_common::{Error, ObjectMeta, ResourceKind, ResourceStore, Result};
use k8s_openapi::api::core::v1::ConfigMap;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::types::{AuditEvent, UsageSample, UsageSummary};

/// Audit ConfigMap data key
pub const EVENTS_DATA_KEY: &str = "events.json";
/// Usage ConfigMap data key for raw samples
pub const RECORDS_DATA_KEY: &str = "records.json";
/// Usage ConfigMap data key for the running summary
pub const SUMMARY_DATA_KEY: &str = "summary.json";

/// Raw samples kept per model per day; the summary keeps counting past this
pub const MAX_USAGE_RECORDS: usize = 5000;

fn day_suffix(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

fn parse_entry<T>(data: &BTreeMap<String, String>, key: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match data.get(key) {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| Error::serialization_for_kind("ConfigMap", format!("{key}: {e}"))),
        None => Ok(T::default()),
    }
}

/// One ConfigMap per (model, day), updated in place
#[derive(Clone)]
struct DailyLog {
    store: Arc<dyn ResourceStore>,
    component: &'static str,
    retry: RetryConfig,
}

impl DailyLog {
    fn name(&self, model: &str, date: NaiveDate) -> String {
        resource_name(&[self.component, model, &day_suffix(date)])
    }

    async fn read(
        &self,
        namespace: &str,
        model: &str,
        date: NaiveDate,
    ) -> Result<Option<BTreeMap<String, String>>> {
        let Some(value) = self
            .store
            .get(ResourceKind::CONFIG_MAP, namespace, &self.name(model, date))
            .await?
        else {
            return Ok(None);
        };
        let cm: ConfigMap = from_value(ResourceKind::CONFIG_MAP, value)?;
        Ok(Some(cm.data.unwrap_or_default()))
    }

    /// Apply `update` to the day's data, creating the object on first write
    async fn update<T, F>(
        &self,
        namespace: &str,
        model: &str,
        date: NaiveDate,
        update: F,
    ) -> Result<T>
    where
        F: Fn(&mut BTreeMap<String, String>) -> Result<T>,
    {
        let name = self.name(model, date);
        let retryable = |e: &Error| e.is_conflict() || e.is_already_exists();
        retry_when(&self.retry, self.component, retryable, || {
            self.update_once(namespace, model, &name, &update)
        })
        .await
    }

    async fn update_once<T, F>(
        &self,
        namespace: &str,
        model: &str,
        name: &str,
        update: &F,
    ) -> Result<T>
    where
        F: Fn(&mut BTreeMap<String, String>) -> Result<T>,
    {
        match self.store.get(ResourceKind::CONFIG_MAP, namespace, name).await? {
            Some(value) => {
                let mut cm: ConfigMap = from_value(ResourceKind::CONFIG_MAP, value)?;
                let out = update(cm.data.get_or_insert_with(BTreeMap::new))?;
                self.store
                    .replace(
                        ResourceKind::CONFIG_MAP,
                        namespace,
                        name,
                        to_value(ResourceKind::CONFIG_MAP, &cm)?,
                    )
                    .await?;
                Ok(out)
            }
            None => {
                let mut data = BTreeMap::new();
                let out = update(&mut data)?;
                let meta = ObjectMeta::new(name, namespace)
                    .with_label(gatehouse_common::LABEL_COMPONENT, self.component)
                    .with_label(gatehouse_common::LABEL_MODEL, model);
                let cm = ConfigMap {
                    metadata: meta.into_k8s(),
                    data: Some(data),
                    ..Default::default()
                };
                self.store
                    .create(
                        ResourceKind::CONFIG_MAP,
                        namespace,
                        to_value(ResourceKind::CONFIG_MAP, &cm)?,
                    )
                    .await?;
                Ok(out)
            }
        }
    }
}

// =============================================================================
// Audit
// =============================================================================

/// Append-only workflow audit trail
#[derive(Clone)]
pub struct AuditLog {
    log: DailyLog,
}

impl AuditLog {
    /// Audit log over `store`
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            log: DailyLog {
                store,
                component: gatehouse_common::COMPONENT_AUDIT,
                retry: RetryConfig::conflicts(),
            },
        }
    }

    /// Append an event; failures are logged and dropped
    pub async fn record(&self, event: AuditEvent) {
        if let Err(e) = self.append(&event).await {
            warn!(
                namespace = %event.namespace,
                model = %event.model,
                action = ?event.action,
                error = %e,
                "failed to append audit event"
            );
        }
    }

    async fn append(&self, event: &AuditEvent) -> Result<()> {
        let date = event.timestamp.date_naive();
        self.log
            .update(&event.namespace, &event.model, date, |data| {
                let mut events: Vec<AuditEvent> = parse_entry(data, EVENTS_DATA_KEY)?;
                events.push(event.clone());
                data.insert(EVENTS_DATA_KEY.to_string(), serde_json::to_string(&events)?);
                Ok(())
            })
            .await?;
        debug!(
            namespace = %event.namespace,
            model = %event.model,
            action = ?event.action,
            "audit event recorded"
        );
        Ok(())
    }

    /// Events recorded for a model on a day, oldest first
    pub async fn events(
        &self,
        namespace: &str,
        model: &str,
        date: NaiveDate,
    ) -> Result<Vec<AuditEvent>> {
        match self.log.read(namespace, model, date).await? {
            Some(data) => parse_entry(&data, EVENTS_DATA_KEY),
            None => Ok(Vec::new()),
        }
    }
}

// =============================================================================
// Usage
// =============================================================================

/// Per-day usage samples and running summary
#[derive(Clone)]
pub struct UsageRecorder {
    log: DailyLog,
}

impl UsageRecorder {
    /// Usage recorder over `store`
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            log: DailyLog {
                store,
                component: gatehouse_common::COMPONENT_USAGE,
                retry: RetryConfig::conflicts(),
            },
        }
    }

    /// Record one request and return the day's updated summary
    pub async fn record(
        &self,
        namespace: &str,
        model: &str,
        sample: &UsageSample,
    ) -> Result<UsageSummary> {
        let mut sample = sample.clone();
        let timestamp: DateTime<Utc> = *sample.timestamp.get_or_insert_with(Utc::now);
        let date = timestamp.date_naive();

        self.log
            .update(namespace, model, date, |data| {
                let mut records: Vec<UsageSample> = parse_entry(data, RECORDS_DATA_KEY)?;
                if records.len() < MAX_USAGE_RECORDS {
                    records.push(sample.clone());
                    data.insert(RECORDS_DATA_KEY.to_string(), serde_json::to_string(&records)?);
                }

                let mut summary = parse_entry::<Option<UsageSummary>>(data, SUMMARY_DATA_KEY)?
                    .unwrap_or_else(|| UsageSummary::empty(date.format("%Y-%m-%d").to_string()));
                summary.add(&sample);
                data.insert(SUMMARY_DATA_KEY.to_string(), serde_json::to_string(&summary)?);
                Ok(summary)
            })
            .await
    }

    /// The day's summary, if anything was recorded
    pub async fn summary(
        &self,
        namespace: &str,
        model: &str,
        date: NaiveDate,
    ) -> Result<Option<UsageSummary>> {
        let Some(data) = self.log.read(namespace, model, date).await? else {
            return Ok(None);
        };
        parse_entry(&data, SUMMARY_DATA_KEY)
    }
}
