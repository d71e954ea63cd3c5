//! Publish request validation
//!
//! Pure checks run before anything is mutated. Every check runs and every
//! violation is reported; the error code is chosen by precedence:
//! missing model, then not-ready model, then a request whose only problem is
//! the tenant, then everything else.

use crate::error::{PublishError, Violation};
use crate::readiness::Readiness;
use crate::types::{ModelType, PublishConfig, PublishedModel};

const TENANT_FIELD: &str = "tenantId";
const MAX_TENANT_LEN: usize = 63;

/// What a request is validated against
#[derive(Clone, Copy, Debug)]
pub struct ValidationContext<'a> {
    /// Model namespace
    pub namespace: &'a str,
    /// Model name
    pub model: &'a str,
    /// Current readiness of the model
    pub readiness: &'a Readiness,
    /// Record being updated; None on first publish
    pub existing: Option<&'a PublishedModel>,
}

/// Validate a publish or update request
pub fn validate(ctx: ValidationContext<'_>, config: &PublishConfig) -> Result<(), PublishError> {
    let mut violations = Vec::new();

    let model_state = match ctx.readiness {
        Readiness::Missing => {
            violations.push(Violation::new(
                "model",
                format!("model {}/{} does not exist", ctx.namespace, ctx.model),
            ));
            Some(false)
        }
        Readiness::NotReady { reason } => {
            violations.push(Violation::new("model", format!("model is not ready: {reason}")));
            Some(true)
        }
        Readiness::Ready { .. } => None,
    };

    check_tenant(config, ctx.existing, &mut violations);
    check_model_type(config, ctx.existing, &mut violations);
    check_rate_limits(config, &mut violations);
    check_route(config, &mut violations);

    if !config.authentication.require_api_key {
        violations.push(Violation::new(
            "authentication.requireApiKey",
            "must be true; unauthenticated publishing is not supported",
        ));
    }

    if violations.is_empty() {
        return Ok(());
    }

    let namespace = ctx.namespace.to_string();
    let model = ctx.model.to_string();
    Err(match model_state {
        Some(false) => PublishError::ModelNotFound {
            namespace,
            model,
            violations,
        },
        Some(true) => PublishError::ModelNotReady {
            namespace,
            model,
            violations,
        },
        None if violations.iter().all(|v| v.field == TENANT_FIELD) => {
            PublishError::InvalidTenant { violations }
        }
        None => PublishError::ValidationFailed { violations },
    })
}

fn check_tenant(
    config: &PublishConfig,
    existing: Option<&PublishedModel>,
    violations: &mut Vec<Violation>,
) {
    let tenant = config.tenant_id.trim();
    if tenant.is_empty() {
        violations.push(Violation::new(TENANT_FIELD, "is required"));
        return;
    }
    if !is_dns_label(tenant) {
        violations.push(Violation::new(
            TENANT_FIELD,
            "must be a lowercase DNS label (a-z, 0-9, '-', at most 63 characters)",
        ));
        return;
    }
    if let Some(existing) = existing {
        if existing.tenant_id != tenant {
            violations.push(Violation::new(
                TENANT_FIELD,
                format!("cannot change from '{}' on a published model", existing.tenant_id),
            ));
        }
    }
}

fn is_dns_label(value: &str) -> bool {
    value.len() <= MAX_TENANT_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !value.starts_with('-')
        && !value.ends_with('-')
}

fn check_model_type(
    config: &PublishConfig,
    existing: Option<&PublishedModel>,
    violations: &mut Vec<Violation>,
) {
    let Some(requested) = config.model_type.as_deref() else {
        return;
    };
    let Some(parsed) = ModelType::parse(requested) else {
        violations.push(Violation::new(
            "modelType",
            format!("'{requested}' is not one of 'traditional', 'openai'"),
        ));
        return;
    };
    if let Some(existing) = existing {
        if existing.model_type != parsed {
            violations.push(Violation::new(
                "modelType",
                format!(
                    "cannot change from '{}' to '{}' on a published model",
                    existing.model_type, parsed
                ),
            ));
        }
    }
}

fn check_rate_limits(config: &PublishConfig, violations: &mut Vec<Violation>) {
    let limits = config.limits();
    if limits.requests_per_minute == 0 {
        violations.push(Violation::new(
            "rateLimiting.requestsPerMinute",
            "must be greater than 0",
        ));
    }
    if limits.requests_per_hour == 0 {
        violations.push(Violation::new(
            "rateLimiting.requestsPerHour",
            "must be greater than 0",
        ));
    }
    if limits.requests_per_minute > limits.requests_per_hour {
        violations.push(Violation::new(
            "rateLimiting.requestsPerMinute",
            format!(
                "{} exceeds requestsPerHour ({})",
                limits.requests_per_minute, limits.requests_per_hour
            ),
        ));
    }
    if limits.tokens_per_hour == Some(0) {
        violations.push(Violation::new(
            "rateLimiting.tokensPerHour",
            "must be greater than 0 when set",
        ));
    }
    if limits.burst_limit == Some(0) {
        violations.push(Violation::new(
            "rateLimiting.burstLimit",
            "must be greater than 0 when set",
        ));
    }
}

fn check_route(config: &PublishConfig, violations: &mut Vec<Violation>) {
    if let Some(path) = &config.external_path {
        if !path.starts_with('/') {
            violations.push(Violation::new("externalPath", "must begin with '/'"));
        } else if path.chars().any(|c| c.is_whitespace() || c == '?' || c == '#') {
            violations.push(Violation::new(
                "externalPath",
                "must not contain whitespace, a query or a fragment",
            ));
        }
    }

    if let Some(host) = &config.public_hostname {
        if host.trim().is_empty() {
            violations.push(Violation::new("publicHostname", "must not be empty"));
        } else if host.contains("://") {
            violations.push(Violation::new("publicHostname", "must not include a scheme"));
        } else if host.contains('/') {
            violations.push(Violation::new("publicHostname", "must not include a path"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RateLimitConfig;
    use gatehouse_common::crd::InferenceService;

    fn ready() -> Readiness {
        let service: InferenceService =
            serde_json::from_value(serde_json::json!({"metadata": {"name": "iris"}})).unwrap();
        Readiness::Ready {
            internal_hostname: "iris.a.svc".into(),
            service: Box::new(service),
        }
    }

    fn config() -> PublishConfig {
        PublishConfig {
            tenant_id: "a".into(),
            rate_limiting: Some(RateLimitConfig {
                requests_per_minute: 100,
                requests_per_hour: 5000,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn ctx(readiness: &Readiness) -> ValidationContext<'_> {
        ValidationContext {
            namespace: "a",
            model: "iris",
            readiness,
            existing: None,
        }
    }

    #[test]
    fn valid_request_passes() {
        let r = ready();
        validate(ctx(&r), &config()).unwrap();
    }

    #[test]
    fn collects_every_violation() {
        let r = ready();
        let mut c = config();
        c.external_path = Some("models/iris".into());
        c.public_hostname = Some("https://x.example.com".into());
        if let Some(limits) = c.rate_limiting.as_mut() {
            limits.requests_per_minute = 6000;
        }
        c.authentication.require_api_key = false;

        let err = validate(ctx(&r), &c).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
        let fields: Vec<&str> = err.violations().iter().map(|v| v.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "rateLimiting.requestsPerMinute",
                "externalPath",
                "publicHostname",
                "authentication.requireApiKey"
            ]
        );
    }

    #[test]
    fn not_ready_takes_precedence_and_keeps_other_violations() {
        let r = Readiness::NotReady {
            reason: "RevisionMissing".into(),
        };
        let mut c = config();
        c.tenant_id.clear();
        let err = validate(ctx(&r), &c).unwrap_err();
        assert_eq!(err.code(), "MODEL_NOT_READY");
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn missing_model_is_not_found() {
        let err = validate(ctx(&Readiness::Missing), &config()).unwrap_err();
        assert_eq!(err.code(), "MODEL_NOT_FOUND");
    }

    #[test]
    fn tenant_only_problem_is_invalid_tenant() {
        let r = ready();
        let mut c = config();
        c.tenant_id = "Tenant_A".into();
        assert_eq!(validate(ctx(&r), &c).unwrap_err().code(), "INVALID_TENANT");

        c.tenant_id = String::new();
        assert_eq!(validate(ctx(&r), &c).unwrap_err().code(), "INVALID_TENANT");
    }

    #[test]
    fn unknown_model_type_is_rejected() {
        let r = ready();
        let mut c = config();
        c.model_type = Some("llm".into());
        let err = validate(ctx(&r), &c).unwrap_err();
        assert_eq!(err.violations()[0].field, "modelType");
    }

    #[test]
    fn model_type_is_immutable_on_update() {
        let r = ready();
        let existing: PublishedModel = serde_json::from_value(serde_json::json!({
            "modelName": "iris", "namespace": "a", "tenantId": "a", "modelType": "traditional",
            "externalUrl": "https://h/a/models/iris", "publicHostname": "h",
            "externalPath": "/a/models/iris", "internalHostname": "iris.a.svc",
            "apiKeyId": "k", "rateLimiting": {}, "status": "published",
            "createdAt": "2026-01-01T00:00:00Z", "updatedAt": "2026-01-01T00:00:00Z",
            "documentation": {"endpoint": "", "authHeader": "", "examples": []}
        }))
        .unwrap();

        let mut c = config();
        c.model_type = Some("openai".into());
        let err = validate(
            ValidationContext {
                existing: Some(&existing),
                ..ctx(&r)
            },
            &c,
        )
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
        assert!(err.violations()[0].message.contains("cannot change"));

        c.model_type = Some("traditional".into());
        validate(
            ValidationContext {
                existing: Some(&existing),
                ..ctx(&r)
            },
            &c,
        )
        .unwrap();
    }
}
