//! Credential manager
//!
//! One active key per published model, stored as a Secret named after the
//! model together with its metadata record. Keys are 256 random bits,
//! URL-safe base64 encoded, and returned in cleartext exactly once (on
//! generate or rotate). Validation goes through the reverse [`index`] and
//! falls back to scanning tenant namespaces when the index has no entry.

pub mod index;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use gatehouse_common::kube_utils::{hex_prefix, resource_name};
use gatehouse_common::store::{delete_if_present, from_value, to_value};
use gatehouse_common::{Error, ObjectMeta, ResourceKind, ResourceStore, Result};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use serde_json::Value;
use tracing::{debug, info, warn};

use self::index::{IndexEntry, KeyIndex};
use crate::config::PlatformConfig;
use crate::tenants::TenantRegistry;
use crate::types::{ApiKeyRecord, ModelType};

/// Secret data key holding the cleartext key
pub const API_KEY_DATA_KEY: &str = "api-key";

/// Secret data key holding the JSON metadata record
pub const RECORD_DATA_KEY: &str = "record.json";

/// Number of random bytes in a key
const KEY_BYTES: usize = 32;

// =============================================================================
// ApiKey
// =============================================================================

/// A cleartext API key
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Generate a new random key
    pub fn generate() -> Result<Self> {
        let mut raw = [0u8; KEY_BYTES];
        aws_lc_rs::rand::fill(&mut raw)
            .map_err(|_| Error::internal_with_context("credentials", "random generation failed"))?;
        Ok(Self(URL_SAFE_NO_PAD.encode(raw)))
    }

    /// Wrap a key received from a client
    pub fn from_client(key: &str) -> Self {
        Self(key.trim().to_string())
    }

    /// The key as sent by clients
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex SHA-256 of the key
    pub fn hash(&self) -> String {
        use aws_lc_rs::digest::{digest, SHA256};
        let hash = digest(&SHA256, self.0.as_bytes());
        hex_prefix(hash.as_ref(), KEY_BYTES)
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ApiKey").field(&"<redacted>").finish()
    }
}

/// Constant-time comparison of two hex hashes
fn hashes_match(a: &str, b: &str) -> bool {
    aws_lc_rs::constant_time::verify_slices_are_equal(a.as_bytes(), b.as_bytes()).is_ok()
}

/// A freshly issued key and its record
#[derive(Debug)]
pub struct IssuedKey {
    /// Persisted metadata
    pub record: ApiKeyRecord,
    /// Cleartext key, never persisted outside the credential record
    pub key: ApiKey,
}

// =============================================================================
// CredentialManager
// =============================================================================

/// Issues, rotates, validates and removes per-model keys
#[derive(Clone)]
pub struct CredentialManager {
    store: Arc<dyn ResourceStore>,
    index: KeyIndex,
    tenants: TenantRegistry,
    key_ttl: Option<Duration>,
}

impl CredentialManager {
    /// Manager configured from platform settings
    pub fn new(
        store: Arc<dyn ResourceStore>,
        config: &PlatformConfig,
        tenants: TenantRegistry,
    ) -> Self {
        Self {
            index: KeyIndex::new(store.clone(), &config.system_namespace),
            store,
            tenants,
            key_ttl: config.key_ttl,
        }
    }

    /// Name of the credential record for a model
    pub fn secret_name(model: &str) -> String {
        resource_name(&[model, "api-key"])
    }

    fn new_record(
        &self,
        tenant: &str,
        model: &str,
        namespace: &str,
        model_type: ModelType,
        key: &ApiKey,
    ) -> ApiKeyRecord {
        let now = Utc::now();
        ApiKeyRecord {
            key_id: uuid::Uuid::new_v4().to_string(),
            key_hash: key.hash(),
            model_name: model.to_string(),
            namespace: namespace.to_string(),
            tenant_id: tenant.to_string(),
            model_type,
            created_at: now,
            expires_at: self
                .key_ttl
                .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
                .and_then(|ttl| now.checked_add_signed(ttl)),
            active: true,
            permissions: model_type.permissions(),
            last_used_at: None,
        }
    }

    fn build_secret(record: &ApiKeyRecord, key: &ApiKey) -> Result<Value> {
        let meta = ObjectMeta::new(Self::secret_name(&record.model_name), &record.namespace)
            .with_label(gatehouse_common::LABEL_COMPONENT, gatehouse_common::COMPONENT_API_KEY)
            .with_label(gatehouse_common::LABEL_MODEL, &record.model_name)
            .with_label(gatehouse_common::LABEL_TENANT, &record.tenant_id);

        let data = BTreeMap::from([
            (
                RECORD_DATA_KEY.to_string(),
                ByteString(serde_json::to_vec(record)?),
            ),
            (
                API_KEY_DATA_KEY.to_string(),
                ByteString(key.as_str().as_bytes().to_vec()),
            ),
        ]);
        let secret = Secret {
            metadata: meta.into_k8s(),
            type_: Some("Opaque".to_string()),
            data: Some(data),
            ..Default::default()
        };
        to_value(ResourceKind::SECRET, &secret)
    }

    fn parse_record(secret: &Secret) -> Result<ApiKeyRecord> {
        let bytes = secret
            .data
            .as_ref()
            .and_then(|d| d.get(RECORD_DATA_KEY))
            .ok_or_else(|| {
                Error::serialization_for_kind("Secret", "credential record missing record.json")
            })?;
        serde_json::from_slice(&bytes.0)
            .map_err(|e| Error::serialization_for_kind("Secret", e.to_string()))
    }

    /// Issue the first key for a model
    ///
    /// Fails with `AlreadyExists` when the model already has a credential
    /// record. A failed index write removes the record again.
    pub async fn generate(
        &self,
        tenant: &str,
        model: &str,
        namespace: &str,
        model_type: ModelType,
    ) -> Result<IssuedKey> {
        let key = ApiKey::generate()?;
        let record = self.new_record(tenant, model, namespace, model_type, &key);

        self.store
            .create(
                ResourceKind::SECRET,
                namespace,
                Self::build_secret(&record, &key)?,
            )
            .await?;

        if let Err(e) = self.index.insert(&record.key_hash, &index_entry(&record)).await {
            let name = Self::secret_name(model);
            if let Err(cleanup) =
                delete_if_present(self.store.as_ref(), ResourceKind::SECRET, namespace, &name).await
            {
                warn!(namespace = %namespace, model = %model, error = %cleanup, "failed to remove credential after index failure");
            }
            return Err(e);
        }

        info!(namespace = %namespace, model = %model, key_id = %record.key_id, "issued API key");
        Ok(IssuedKey { record, key })
    }

    /// Replace a model's key; the previous key stops validating immediately
    ///
    /// Issues a first key when none exists.
    pub async fn rotate(
        &self,
        tenant: &str,
        model: &str,
        namespace: &str,
        model_type: ModelType,
    ) -> Result<IssuedKey> {
        let name = Self::secret_name(model);
        let Some(existing) = self.store.get(ResourceKind::SECRET, namespace, &name).await? else {
            return self.generate(tenant, model, namespace, model_type).await;
        };
        let existing: Secret = from_value(ResourceKind::SECRET, existing)?;
        let previous = Self::parse_record(&existing)?;

        let key = ApiKey::generate()?;
        let record = self.new_record(tenant, model, namespace, model_type, &key);
        let mut secret = Self::build_secret(&record, &key)?;
        if let Some(rv) = &existing.metadata.resource_version {
            secret["metadata"]["resourceVersion"] = Value::String(rv.clone());
        }
        self.store
            .replace(ResourceKind::SECRET, namespace, &name, secret)
            .await?;

        if let Err(e) = self.index.insert(&record.key_hash, &index_entry(&record)).await {
            let mut restore = existing;
            restore.metadata.resource_version = None;
            let restored = match to_value(ResourceKind::SECRET, &restore) {
                Ok(value) => self
                    .store
                    .replace(ResourceKind::SECRET, namespace, &name, value)
                    .await
                    .map(|_| ()),
                Err(ser) => Err(ser),
            };
            if let Err(cleanup) = restored {
                warn!(namespace = %namespace, model = %model, error = %cleanup, "failed to restore previous credential");
            }
            return Err(e);
        }

        if let Err(e) = self.index.remove(&previous.key_hash).await {
            warn!(namespace = %namespace, model = %model, error = %e, "failed to remove stale key index entry");
        }

        info!(
            namespace = %namespace,
            model = %model,
            previous_key_id = %previous.key_id,
            key_id = %record.key_id,
            "rotated API key"
        );
        Ok(IssuedKey { record, key })
    }

    /// Read a model's credential metadata
    pub async fn get(&self, namespace: &str, model: &str) -> Result<Option<ApiKeyRecord>> {
        let Some(value) = self
            .store
            .get(ResourceKind::SECRET, namespace, &Self::secret_name(model))
            .await?
        else {
            return Ok(None);
        };
        let secret: Secret = from_value(ResourceKind::SECRET, value)?;
        Self::parse_record(&secret).map(Some)
    }

    /// Resolve a client key to its record
    ///
    /// Returns `None` for unknown, inactive, or expired keys.
    pub async fn validate(&self, key: &ApiKey) -> Result<Option<ApiKeyRecord>> {
        if key.as_str().is_empty() {
            return Ok(None);
        }
        let hash = key.hash();

        match self.index.lookup(&hash).await {
            Ok(Some(entry)) => {
                let record = self.get(&entry.namespace, &entry.model).await?;
                return Ok(record.filter(|r| self.accepts(r, &hash)));
            }
            Ok(None) => debug!("key not indexed, scanning tenant namespaces"),
            Err(e) => warn!(error = %e, "key index lookup failed, scanning tenant namespaces"),
        }

        self.scan(&hash).await
    }

    fn accepts(&self, record: &ApiKeyRecord, hash: &str) -> bool {
        if !hashes_match(&record.key_hash, hash) {
            return false;
        }
        let usable = record.is_usable(Utc::now());
        if !usable {
            debug!(namespace = %record.namespace, model = %record.model_name, "key inactive or expired");
        }
        usable
    }

    async fn scan(&self, hash: &str) -> Result<Option<ApiKeyRecord>> {
        let selector = format!(
            "{}={}",
            gatehouse_common::LABEL_COMPONENT,
            gatehouse_common::COMPONENT_API_KEY
        );
        for namespace in self.tenants.namespaces().await {
            let secrets = match self.store.list(ResourceKind::SECRET, &namespace, &selector).await {
                Ok(secrets) => secrets,
                Err(e) => {
                    warn!(namespace = %namespace, error = %e, "failed to list credentials");
                    continue;
                }
            };
            for value in secrets {
                let record = match from_value::<Secret>(ResourceKind::SECRET, value)
                    .and_then(|s| Self::parse_record(&s))
                {
                    Ok(record) => record,
                    Err(e) => {
                        debug!(namespace = %namespace, error = %e, "skipping unreadable credential");
                        continue;
                    }
                };
                if hashes_match(&record.key_hash, hash) {
                    return Ok(self.accepts(&record, hash).then_some(record));
                }
            }
        }
        Ok(None)
    }

    /// Record a successful use; failures are logged and dropped
    pub async fn touch_last_used(&self, namespace: &str, model: &str) {
        if let Err(e) = self.try_touch(namespace, model).await {
            warn!(namespace = %namespace, model = %model, error = %e, "failed to update key last-used time");
        }
    }

    async fn try_touch(&self, namespace: &str, model: &str) -> Result<()> {
        let name = Self::secret_name(model);
        let Some(value) = self.store.get(ResourceKind::SECRET, namespace, &name).await? else {
            return Ok(());
        };
        let mut secret: Secret = from_value(ResourceKind::SECRET, value)?;
        let mut record = Self::parse_record(&secret)?;
        record.last_used_at = Some(Utc::now());
        secret
            .data
            .get_or_insert_with(BTreeMap::new)
            .insert(RECORD_DATA_KEY.to_string(), ByteString(serde_json::to_vec(&record)?));
        self.store
            .replace(
                ResourceKind::SECRET,
                namespace,
                &name,
                to_value(ResourceKind::SECRET, &secret)?,
            )
            .await?;
        Ok(())
    }

    /// Remove a model's credential record and index entry
    ///
    /// Returns whether a credential record existed.
    pub async fn delete(&self, namespace: &str, model: &str) -> Result<bool> {
        let record = match self.get(namespace, model).await {
            Ok(record) => record,
            Err(e) if matches!(e, Error::Serialization { .. }) => {
                warn!(namespace = %namespace, model = %model, error = %e, "deleting unreadable credential");
                None
            }
            Err(e) => return Err(e),
        };

        let removed = delete_if_present(
            self.store.as_ref(),
            ResourceKind::SECRET,
            namespace,
            &Self::secret_name(model),
        )
        .await?;

        if let Some(record) = record {
            self.index.remove(&record.key_hash).await?;
        }
        Ok(removed)
    }
}

fn index_entry(record: &ApiKeyRecord) -> IndexEntry {
    IndexEntry {
        namespace: record.namespace.clone(),
        model: record.model_name.clone(),
        key_id: record.key_id.clone(),
    }
}
