//! Request-time authentication
//!
//! Callers present a credential either as `Authorization: Bearer <token>` or
//! in the `x-api-key` header. The credential is tried as an operator token
//! first, then as a published model's API key. Anything else is rejected;
//! store failures during key lookup reject too.

use std::sync::Arc;

use aws_lc_rs::constant_time::verify_slices_are_equal;
use aws_lc_rs::digest::{digest, SHA256};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use gatehouse_common::mesh::API_KEY_HEADER;
use gatehouse_publisher::{KeyIdentity, PublishError, Publisher};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::server::AppState;

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Credential from the bearer token or the API key header
pub fn extract_credential(headers: &HeaderMap) -> Option<&str> {
    extract_bearer_token(headers)
        .or_else(|| headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|c| !c.is_empty())
}

/// Who is calling
#[derive(Clone, Debug, PartialEq)]
pub enum Identity {
    /// Platform operator; may do anything
    Operator,
    /// Holder of a published model's key
    Tenant(KeyIdentity),
}

impl Identity {
    /// Whether this is an operator
    pub fn is_operator(&self) -> bool {
        matches!(self, Identity::Operator)
    }

    /// Fail unless this is an operator
    pub fn require_operator(&self) -> Result<()> {
        match self {
            Identity::Operator => Ok(()),
            Identity::Tenant(key) => Err(Error::Forbidden(format!(
                "tenant '{}' may not perform operator actions",
                key.tenant
            ))),
        }
    }

    /// Whether this caller may see records owned by `tenant`
    pub fn can_read_tenant(&self, tenant: &str) -> bool {
        match self {
            Identity::Operator => true,
            Identity::Tenant(key) => key.tenant == tenant,
        }
    }
}

/// Operator tokens first, then API keys
pub struct Authenticator {
    /// SHA-256 of each configured operator token
    operator_digests: Vec<Vec<u8>>,
    publisher: Arc<Publisher>,
}

impl Authenticator {
    /// Authenticator accepting the given operator tokens and any valid key
    pub fn new(operator_tokens: &[String], publisher: Arc<Publisher>) -> Self {
        let operator_digests = operator_tokens
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| digest(&SHA256, t.as_bytes()).as_ref().to_vec())
            .collect();
        Self {
            operator_digests,
            publisher,
        }
    }

    fn is_operator(&self, credential: &str) -> bool {
        let presented = digest(&SHA256, credential.as_bytes());
        // Compare against every token so timing does not reveal which matched
        self.operator_digests
            .iter()
            .fold(false, |found, expected| {
                verify_slices_are_equal(expected, presented.as_ref()).is_ok() | found
            })
    }

    /// Resolve a raw credential
    pub async fn validate(&self, credential: &str) -> Result<Identity> {
        if self.is_operator(credential) {
            debug!("operator token accepted");
            return Ok(Identity::Operator);
        }

        match self.publisher.validate_key(credential).await {
            Ok(key) => Ok(Identity::Tenant(key)),
            Err(PublishError::Unauthorized) => {
                Err(Error::Unauthorized("invalid credential".into()))
            }
            Err(e) => {
                warn!(error = %e, "key validation failed, rejecting request");
                Err(Error::Unauthorized("credential could not be verified".into()))
            }
        }
    }

    /// Resolve the credential carried by request headers
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity> {
        let credential = extract_credential(headers)
            .ok_or_else(|| Error::Unauthorized("missing credential".into()))?;
        self.validate(credential).await
    }
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        state.auth.authenticate(&parts.headers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use gatehouse_common::store::memory::MemoryStore;
    use gatehouse_publisher::PlatformConfig;

    fn authenticator(tokens: &[&str]) -> Authenticator {
        let publisher = Publisher::new(Arc::new(MemoryStore::new()), PlatformConfig::default());
        let tokens: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
        Authenticator::new(&tokens, Arc::new(publisher))
    }

    #[test]
    fn bearer_wins_over_key_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("from-header"));
        assert_eq!(extract_credential(&headers), Some("from-header"));

        headers.insert("authorization", HeaderValue::from_static("Bearer from-bearer"));
        assert_eq!(extract_credential(&headers), Some("from-bearer"));
    }

    #[test]
    fn blank_credentials_are_missing() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("   "));
        assert_eq!(extract_credential(&headers), None);
        assert_eq!(extract_credential(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn operator_token_is_accepted() {
        let auth = authenticator(&["op-1", "op-2"]);
        assert_eq!(auth.validate("op-2").await.unwrap(), Identity::Operator);
    }

    #[tokio::test]
    async fn unknown_credentials_fail_closed() {
        let auth = authenticator(&["op"]);
        assert!(matches!(
            auth.validate("nope").await,
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            auth.authenticate(&HeaderMap::new()).await,
            Err(Error::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn no_operator_tokens_means_no_operator() {
        let auth = authenticator(&[""]);
        assert!(auth.validate("").await.is_err());
    }

    #[test]
    fn tenants_only_read_their_own_records() {
        let key = KeyIdentity {
            tenant: "a".into(),
            model: "iris".into(),
            namespace: "a".into(),
            model_type: gatehouse_publisher::ModelType::Traditional,
            key_id: "k".into(),
            permissions: vec![],
            expires_at: None,
        };
        let identity = Identity::Tenant(key);
        assert!(identity.can_read_tenant("a"));
        assert!(!identity.can_read_tenant("b"));
        assert!(identity.require_operator().is_err());
        assert!(Identity::Operator.can_read_tenant("b"));
    }
}
