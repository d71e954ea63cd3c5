//! HTTP handlers
//!
//! Thin adapters from requests to [`Publisher`](gatehouse_publisher::Publisher)
//! workflows. Mutations require an operator; reads are also open to holders
//! of a key belonging to the record's tenant.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{NaiveDate, Utc};
use gatehouse_common::mesh::{MODEL_NAMESPACE_HEADER, MODEL_NAME_HEADER, TENANT_HEADER};
use gatehouse_publisher::{KeyIdentity, PublishConfig, PublishedModel, UsageSample, UsageSummary};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::Identity;
use crate::error::{Error, Result};
use crate::server::AppState;

/// Published models listing
#[derive(Debug, Serialize, Deserialize)]
pub struct PublishedModelList {
    /// Records
    pub items: Vec<PublishedModel>,
    /// Number of records
    pub count: usize,
}

impl From<Vec<PublishedModel>> for PublishedModelList {
    fn from(items: Vec<PublishedModel>) -> Self {
        Self {
            count: items.len(),
            items,
        }
    }
}

/// Body of a key validation request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateKeyRequest {
    /// Key to check
    pub api_key: String,
}

/// Body of a successful key validation
#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateKeyResponse {
    /// Always true; invalid keys get 401
    pub valid: bool,
    /// Identity the key grants
    #[serde(flatten)]
    pub identity: KeyIdentity,
}

/// Result of recording usage
#[derive(Debug, Serialize, Deserialize)]
pub struct UsageRecorded {
    /// Whether the sample was stored
    pub recorded: bool,
    /// Day summary after the sample, when stored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<UsageSummary>,
}

/// Query of a usage summary request
#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    /// Day (YYYY-MM-DD); today when absent
    pub date: Option<String>,
}

fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| Error::BadRequest(e.body_text()))
}

/// POST .../publish
pub async fn publish(
    State(state): State<AppState>,
    Path((namespace, model)): Path<(String, String)>,
    identity: Identity,
    payload: std::result::Result<Json<PublishConfig>, JsonRejection>,
) -> Result<Json<PublishedModel>> {
    identity.require_operator()?;
    let request = body(payload)?;
    let record = state.publisher.publish(&namespace, &model, request).await?;
    Ok(Json(record))
}

/// PUT .../publish
pub async fn update(
    State(state): State<AppState>,
    Path((namespace, model)): Path<(String, String)>,
    identity: Identity,
    payload: std::result::Result<Json<PublishConfig>, JsonRejection>,
) -> Result<Json<PublishedModel>> {
    identity.require_operator()?;
    let request = body(payload)?;
    let record = state.publisher.update(&namespace, &model, request).await?;
    Ok(Json(record))
}

/// GET .../publish
pub async fn get_published(
    State(state): State<AppState>,
    Path((namespace, model)): Path<(String, String)>,
    identity: Identity,
) -> Result<Json<PublishedModel>> {
    let record = state.publisher.get(&namespace, &model).await?;
    if !identity.can_read_tenant(&record.tenant_id) {
        return Err(Error::Forbidden(format!(
            "model {namespace}/{model} belongs to another tenant"
        )));
    }
    Ok(Json(record))
}

/// DELETE .../publish
pub async fn unpublish(
    State(state): State<AppState>,
    Path((namespace, model)): Path<(String, String)>,
    identity: Identity,
) -> Result<Json<PublishedModel>> {
    identity.require_operator()?;
    let record = state.publisher.unpublish(&namespace, &model).await?;
    Ok(Json(record))
}

/// POST .../publish/rotate-key
pub async fn rotate_key(
    State(state): State<AppState>,
    Path((namespace, model)): Path<(String, String)>,
    identity: Identity,
) -> Result<Json<PublishedModel>> {
    identity.require_operator()?;
    let record = state.publisher.rotate_key(&namespace, &model).await?;
    Ok(Json(record))
}

/// GET /api/v1/namespaces/{namespace}/published-models
pub async fn list_namespace(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    identity: Identity,
) -> Result<Json<PublishedModelList>> {
    let records = state.publisher.list(&namespace).await?;
    let visible: Vec<PublishedModel> = records
        .into_iter()
        .filter(|r| identity.can_read_tenant(&r.tenant_id))
        .collect();
    Ok(Json(visible.into()))
}

/// GET /api/v1/published-models
pub async fn list_all(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<PublishedModelList>> {
    identity.require_operator()?;
    Ok(Json(state.publisher.list_all().await?.into()))
}

/// POST /api/v1/validate-key
pub async fn validate_key(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ValidateKeyRequest>, JsonRejection>,
) -> Result<Json<ValidateKeyResponse>> {
    let request = body(payload)?;
    let identity = state.publisher.validate_key(&request.api_key).await?;
    Ok(Json(ValidateKeyResponse {
        valid: true,
        identity,
    }))
}

/// GET /api/v1/auth/verify
///
/// External-authorization check for the gateway: answers 200 with identity
/// headers for a valid key, 401 otherwise. Operator tokens are not accepted.
pub async fn verify(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse> {
    let credential = crate::auth::extract_credential(&headers)
        .ok_or_else(|| Error::Unauthorized("missing credential".into()))?;
    let identity = state.publisher.validate_key(credential).await?;
    debug!(tenant = %identity.tenant, model = %identity.model, "verified request");
    Ok((
        StatusCode::OK,
        [
            (TENANT_HEADER, identity.tenant),
            (MODEL_NAME_HEADER, identity.model),
            (MODEL_NAMESPACE_HEADER, identity.namespace),
        ],
    ))
}

/// POST .../usage
pub async fn record_usage(
    State(state): State<AppState>,
    Path((namespace, model)): Path<(String, String)>,
    identity: Identity,
    payload: std::result::Result<Json<UsageSample>, JsonRejection>,
) -> Result<Json<UsageRecorded>> {
    identity.require_operator()?;
    let sample = body(payload)?;
    let summary = state
        .publisher
        .record_usage(&namespace, &model, sample)
        .await?;
    Ok(Json(UsageRecorded {
        recorded: summary.is_some(),
        summary,
    }))
}

/// GET .../usage?date=YYYY-MM-DD
pub async fn usage_summary(
    State(state): State<AppState>,
    Path((namespace, model)): Path<(String, String)>,
    Query(query): Query<UsageQuery>,
    identity: Identity,
) -> Result<Json<UsageSummary>> {
    identity.require_operator()?;
    let date = match query.date.as_deref() {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| Error::BadRequest(format!("date '{raw}' is not YYYY-MM-DD")))?,
        None => Utc::now().date_naive(),
    };
    Ok(Json(
        state
            .publisher
            .usage_summary(&namespace, &model, date)
            .await?,
    ))
}
