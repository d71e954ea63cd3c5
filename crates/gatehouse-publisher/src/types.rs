//! Request, record and response types
//!
//! All types serialize in camelCase; they are both the HTTP wire format and
//! the persisted record format.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Model type
// =============================================================================

/// How a published model is exposed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    /// Single predict endpoint
    #[serde(rename = "traditional")]
    Traditional,
    /// OpenAI-compatible chat/completions/embeddings surface
    #[serde(rename = "openai")]
    OpenAi,
}

impl ModelType {
    /// Wire value ("traditional" or "openai")
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Traditional => "traditional",
            ModelType::OpenAi => "openai",
        }
    }

    /// Parse a wire value, accepting a few common spellings of "openai"
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "traditional" => Some(ModelType::Traditional),
            "openai" | "openai-compatible" | "openai_compatible" => Some(ModelType::OpenAi),
            _ => None,
        }
    }

    /// Permissions attached to keys for this model type
    pub fn permissions(&self) -> Vec<String> {
        let perms: &[&str] = match self {
            ModelType::Traditional => &["predict"],
            ModelType::OpenAi => &["chat", "completions", "embeddings", "models"],
        };
        perms.iter().map(|p| p.to_string()).collect()
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Publish request
// =============================================================================

/// Publish/update request body
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishConfig {
    /// Owning tenant (required)
    #[serde(default)]
    pub tenant_id: String,
    /// "traditional" or "openai"; classified from the model when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    /// Path prefix on the public hostname (traditional models only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_path: Option<String>,
    /// Public hostname; the platform default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_hostname: Option<String>,
    /// Traffic limits; platform defaults on publish, current limits on update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limiting: Option<RateLimitConfig>,
    /// Authentication flags
    #[serde(default)]
    pub authentication: AuthConfig,
    /// Free-form metadata stored with the record
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl PublishConfig {
    /// Requested limits, or the defaults when none were given
    pub fn limits(&self) -> RateLimitConfig {
        self.rate_limiting.clone().unwrap_or_default()
    }
}

/// Traffic limits for a published model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Requests allowed per minute
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Requests allowed per hour
    #[serde(default = "default_requests_per_hour")]
    pub requests_per_hour: u32,
    /// Token budget per hour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_per_hour: Option<u64>,
    /// Burst allowance (recorded; the edge limiter has no burst setting)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_limit: Option<u32>,
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_requests_per_hour() -> u32 {
    1000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            requests_per_hour: default_requests_per_hour(),
            tokens_per_hour: None,
            burst_limit: None,
        }
    }
}

/// Authentication flags
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Must be true; unauthenticated publishing is not supported
    #[serde(default = "default_true")]
    pub require_api_key: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            require_api_key: true,
        }
    }
}

// =============================================================================
// Published model record
// =============================================================================

/// Lifecycle state of a record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PublishStatus {
    /// Reachable through the edge gateway
    Published,
    /// A workflow failed and its partial effects were undone
    RolledBack,
}

/// Running usage counters on a record
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCounters {
    /// Requests recorded
    pub total_requests: u64,
    /// Tokens recorded
    pub total_tokens: u64,
    /// Failed requests recorded
    pub total_errors: u64,
    /// Time of the last recorded request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_request_at: Option<DateTime<Utc>>,
}

/// One published model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedModel {
    /// Model name
    pub model_name: String,
    /// Model namespace
    pub namespace: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Exposure type; fixed at first publish
    pub model_type: ModelType,
    /// URL clients call
    pub external_url: String,
    /// Public hostname the route binds to
    pub public_hostname: String,
    /// Effective external path (traditional models)
    pub external_path: String,
    /// Resolved internal serving hostname routes rewrite to
    pub internal_hostname: String,
    /// Id of the current key
    pub api_key_id: String,
    /// Cleartext key; only present in publish and rotate responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Traffic limits
    pub rate_limiting: RateLimitConfig,
    /// Lifecycle state
    pub status: PublishStatus,
    /// First publish time
    pub created_at: DateTime<Utc>,
    /// Last change time
    pub updated_at: DateTime<Utc>,
    /// Running usage counters
    #[serde(default)]
    pub usage: UsageCounters,
    /// Generated client documentation
    pub documentation: Documentation,
    /// Free-form metadata from the request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

// =============================================================================
// Credentials
// =============================================================================

/// Persisted credential metadata (the key itself is stored alongside, never here)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRecord {
    /// Key id
    pub key_id: String,
    /// Hex SHA-256 of the key
    pub key_hash: String,
    /// Owning model
    pub model_name: String,
    /// Owning model namespace
    pub namespace: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Model type at issue time
    pub model_type: ModelType,
    /// Issue time
    pub created_at: DateTime<Utc>,
    /// Expiry; None = never
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether the key may be used
    pub active: bool,
    /// Operations the key grants
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Last successful validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKeyRecord {
    /// Active and not past expiry at `now`
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |exp| now < exp)
    }
}

/// Identity resolved from a valid key
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyIdentity {
    /// Owning tenant
    pub tenant: String,
    /// Model the key belongs to
    pub model: String,
    /// Namespace of the model
    pub namespace: String,
    /// Model type
    pub model_type: ModelType,
    /// Key id
    pub key_id: String,
    /// Operations the key grants
    pub permissions: Vec<String>,
    /// Expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&ApiKeyRecord> for KeyIdentity {
    fn from(record: &ApiKeyRecord) -> Self {
        Self {
            tenant: record.tenant_id.clone(),
            model: record.model_name.clone(),
            namespace: record.namespace.clone(),
            model_type: record.model_type,
            key_id: record.key_id.clone(),
            permissions: record.permissions.clone(),
            expires_at: record.expires_at,
        }
    }
}

// =============================================================================
// Documentation
// =============================================================================

/// Client documentation for a published model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Documentation {
    /// Base URL
    pub endpoint: String,
    /// Header clients authenticate with
    pub auth_header: String,
    /// Ready-to-run examples
    pub examples: Vec<CodeExample>,
}

/// One example snippet
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeExample {
    /// What the example does
    pub title: String,
    /// Snippet language (curl, python)
    pub language: String,
    /// Snippet source
    pub code: String,
}

// =============================================================================
// Audit and usage
// =============================================================================

/// Audited workflow action
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Model published
    Publish,
    /// Published model reconfigured
    Update,
    /// Model unpublished
    Unpublish,
    /// Key rotated
    RotateKey,
    /// Publish failed and was rolled back
    PublishFailed,
}

/// Append-only audit entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Event time
    pub timestamp: DateTime<Utc>,
    /// What happened
    pub action: AuditAction,
    /// Model name
    pub model: String,
    /// Model namespace
    pub namespace: String,
    /// Tenant, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Extra context (error code, changed fields)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

/// One request reported by the gateway
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSample {
    /// Tokens consumed
    #[serde(default)]
    pub tokens: u64,
    /// End-to-end latency
    #[serde(default)]
    pub latency_ms: u64,
    /// Whether the request failed
    #[serde(default)]
    pub error: bool,
    /// Request time; now when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Per-day usage aggregate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    /// Day (YYYY-MM-DD)
    pub date: String,
    /// Requests recorded
    pub request_count: u64,
    /// Tokens recorded
    pub total_tokens: u64,
    /// Failed requests recorded
    pub error_count: u64,
    /// Running mean latency
    pub avg_latency_ms: f64,
}

impl UsageSummary {
    /// Empty summary for a day
    pub fn empty(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            request_count: 0,
            total_tokens: 0,
            error_count: 0,
            avg_latency_ms: 0.0,
        }
    }

    /// Fold one sample in
    pub fn add(&mut self, sample: &UsageSample) {
        self.request_count = self.request_count.saturating_add(1);
        self.total_tokens = self.total_tokens.saturating_add(sample.tokens);
        if sample.error {
            self.error_count = self.error_count.saturating_add(1);
        }
        let n = self.request_count as f64;
        self.avg_latency_ms += (sample.latency_ms as f64 - self.avg_latency_ms) / n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn model_type_wire_values() {
        assert_eq!(serde_json::to_value(ModelType::OpenAi).unwrap(), json!("openai"));
        assert_eq!(ModelType::parse("Traditional"), Some(ModelType::Traditional));
        assert_eq!(ModelType::parse("openai-compatible"), Some(ModelType::OpenAi));
        assert_eq!(ModelType::parse("llm"), None);
    }

    #[test]
    fn publish_config_defaults() {
        let config: PublishConfig = serde_json::from_value(json!({"tenantId": "a"})).unwrap();
        assert_eq!(config.tenant_id, "a");
        assert!(config.authentication.require_api_key);
        assert!(config.rate_limiting.is_none());
        assert_eq!(config.limits().requests_per_minute, 60);
        assert!(config.model_type.is_none());
    }

    #[test]
    fn publish_config_reads_camel_case() {
        let config: PublishConfig = serde_json::from_value(json!({
            "tenantId": "a",
            "modelType": "openai",
            "publicHostname": "api.example.com",
            "rateLimiting": {"requestsPerMinute": 100, "requestsPerHour": 5000, "tokensPerHour": 100000},
            "authentication": {"requireApiKey": false}
        }))
        .unwrap();
        assert_eq!(config.limits().tokens_per_hour, Some(100_000));
        assert!(!config.authentication.require_api_key);
        assert_eq!(config.public_hostname.as_deref(), Some("api.example.com"));
    }

    #[test]
    fn usage_summary_keeps_running_mean() {
        let mut summary = UsageSummary::empty("2026-01-01");
        for (latency, error) in [(100, false), (200, true), (300, false)] {
            summary.add(&UsageSample {
                tokens: 10,
                latency_ms: latency,
                error,
                timestamp: None,
            });
        }
        assert_eq!(summary.request_count, 3);
        assert_eq!(summary.total_tokens, 30);
        assert_eq!(summary.error_count, 1);
        assert!((summary.avg_latency_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn usage_summary_saturates() {
        let mut summary = UsageSummary::empty("2026-01-01");
        let sample = UsageSample {
            tokens: u64::MAX,
            latency_ms: 1,
            error: false,
            timestamp: None,
        };
        summary.add(&sample);
        summary.add(&sample);
        assert_eq!(summary.total_tokens, u64::MAX);
        assert_eq!(summary.request_count, 2);
    }

    #[test]
    fn expired_keys_are_unusable() {
        let now = Utc::now();
        let mut record = ApiKeyRecord {
            key_id: "k".into(),
            key_hash: "h".into(),
            model_name: "iris".into(),
            namespace: "a".into(),
            tenant_id: "a".into(),
            model_type: ModelType::Traditional,
            created_at: now,
            expires_at: Some(now - chrono::Duration::seconds(1)),
            active: true,
            permissions: vec![],
            last_used_at: None,
        };
        assert!(!record.is_usable(now));
        record.expires_at = None;
        assert!(record.is_usable(now));
        record.active = false;
        assert!(!record.is_usable(now));
    }
}
