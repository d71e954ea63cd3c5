//! KServe InferenceService (read-only view)
//!
//! Only the fields gatehouse consumes are modelled; everything else in the
//! object is ignored on deserialization, and every modelled field is optional
//! so partially reconciled objects still parse.

use serde::{Deserialize, Serialize};

use crate::kube_utils::{HasApiResource, ObjectMeta};

/// KServe InferenceService
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceService {
    /// API version (serving.kserve.io/v1beta1)
    #[serde(default = "InferenceService::default_api_version")]
    pub api_version: String,
    /// Resource kind (InferenceService)
    #[serde(default = "InferenceService::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Serving specification
    #[serde(default)]
    pub spec: InferenceServiceSpec,
    /// Reconciled status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InferenceServiceStatus>,
}

impl HasApiResource for InferenceService {
    const API_VERSION: &'static str = "serving.kserve.io/v1beta1";
    const KIND: &'static str = "InferenceService";
}

impl InferenceService {
    fn default_api_version() -> String {
        Self::API_VERSION.to_string()
    }

    fn default_kind() -> String {
        Self::KIND.to_string()
    }

    /// Look up the `Ready` condition, if the controller has reported one
    pub fn ready_condition(&self) -> Option<&Condition> {
        self.status
            .as_ref()?
            .conditions
            .iter()
            .find(|c| c.type_ == "Ready")
    }

    /// URL the model is served at, preferring the routed URL over the
    /// cluster-local address
    pub fn serving_url(&self) -> Option<&str> {
        let status = self.status.as_ref()?;
        status
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| {
                status
                    .address
                    .as_ref()
                    .and_then(|a| a.url.as_deref())
                    .filter(|u| !u.is_empty())
            })
    }

    /// Hostname component of [`InferenceService::serving_url`]
    pub fn serving_hostname(&self) -> Option<String> {
        let url = self.serving_url()?;
        let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
        let host = rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default()
            .rsplit('@')
            .next()
            .unwrap_or_default();
        let host = host.split(':').next().unwrap_or_default();
        (!host.is_empty()).then(|| host.to_ascii_lowercase())
    }

    /// Image of the predictor: first explicit container, else the model's
    pub fn predictor_image(&self) -> Option<&str> {
        let predictor = &self.spec.predictor;
        predictor
            .containers
            .iter()
            .find_map(|c| c.image.as_deref())
            .or_else(|| predictor.model.as_ref().and_then(|m| m.image.as_deref()))
    }

    /// All args passed to the predictor (model args followed by container args)
    pub fn predictor_args(&self) -> impl Iterator<Item = &str> {
        let predictor = &self.spec.predictor;
        predictor
            .model
            .iter()
            .flat_map(|m| m.args.iter())
            .chain(predictor.containers.iter().flat_map(|c| c.args.iter()))
            .map(String::as_str)
    }

    /// All env vars set on the predictor
    pub fn predictor_env(&self) -> impl Iterator<Item = &EnvVar> {
        let predictor = &self.spec.predictor;
        predictor
            .model
            .iter()
            .flat_map(|m| m.env.iter())
            .chain(predictor.containers.iter().flat_map(|c| c.env.iter()))
    }

    /// Model storage URI
    pub fn storage_uri(&self) -> Option<&str> {
        self.spec.predictor.model.as_ref()?.storage_uri.as_deref()
    }

    /// Model format name (sklearn, huggingface, ...)
    pub fn model_format(&self) -> Option<&str> {
        self.spec
            .predictor
            .model
            .as_ref()?
            .model_format
            .as_ref()
            .map(|f| f.name.as_str())
    }
}

/// InferenceService spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct InferenceServiceSpec {
    /// Predictor component
    #[serde(default)]
    pub predictor: PredictorSpec,
}

/// Predictor component
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PredictorSpec {
    /// Model-format based predictor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<PredictorModel>,
    /// Custom containers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<Container>,
}

/// Model-format based predictor
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictorModel {
    /// Model format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_format: Option<ModelFormat>,
    /// Serving runtime name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    /// Where model artifacts are stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_uri: Option<String>,
    /// Runtime image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Runtime args
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Runtime env
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

/// Model format
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ModelFormat {
    /// Format name
    pub name: String,
}

/// Container in a custom predictor
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Container {
    /// Container name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Container image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Container args
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Container env
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

/// Environment variable
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Literal value (valueFrom is not consulted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// InferenceService status
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct InferenceServiceStatus {
    /// Routed URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Cluster-local address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Addressable>,
    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Cluster-local address
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Addressable {
    /// Address URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Kubernetes-style status condition
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    /// Condition type (Ready, PredictorReady, ...)
    #[serde(rename = "type")]
    pub type_: String,
    /// "True", "False" or "Unknown"
    pub status: String,
    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    /// Whether the condition status is "True" (case-insensitive)
    pub fn is_true(&self) -> bool {
        self.status.eq_ignore_ascii_case("true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> InferenceService {
        serde_json::from_value(value).expect("inference service parses")
    }

    #[test]
    fn parses_minimal_object() {
        let isvc = parse(json!({"metadata": {"name": "iris", "namespace": "a"}}));
        assert!(isvc.status.is_none());
        assert!(isvc.ready_condition().is_none());
        assert!(isvc.serving_url().is_none());
        assert_eq!(isvc.kind, "InferenceService");
    }

    #[test]
    fn prefers_routed_url_over_address() {
        let isvc = parse(json!({
            "metadata": {"name": "iris", "namespace": "a"},
            "status": {
                "url": "http://iris.a.example.com",
                "address": {"url": "http://iris-predictor.a.svc.cluster.local"}
            }
        }));
        assert_eq!(isvc.serving_url(), Some("http://iris.a.example.com"));
        assert_eq!(isvc.serving_hostname().as_deref(), Some("iris.a.example.com"));
    }

    #[test]
    fn falls_back_to_address_url() {
        let isvc = parse(json!({
            "metadata": {"name": "iris", "namespace": "a"},
            "status": {
                "url": "",
                "address": {"url": "http://iris-predictor.a.svc.cluster.local:8080/v1"}
            }
        }));
        assert_eq!(
            isvc.serving_hostname().as_deref(),
            Some("iris-predictor.a.svc.cluster.local")
        );
    }

    #[test]
    fn collects_predictor_args_and_env() {
        let isvc = parse(json!({
            "metadata": {"name": "llama", "namespace": "a"},
            "spec": {"predictor": {
                "model": {
                    "modelFormat": {"name": "huggingface"},
                    "storageUri": "hf://meta-llama/Llama-3-8B",
                    "args": ["--task=text_generation"],
                    "env": [{"name": "HF_TASK", "value": "text-generation"}]
                },
                "containers": [{"name": "c", "image": "vllm/vllm-openai:latest", "args": ["--port", "8080"]}]
            }}
        }));
        let args: Vec<_> = isvc.predictor_args().collect();
        assert_eq!(args, vec!["--task=text_generation", "--port", "8080"]);
        assert_eq!(isvc.predictor_env().count(), 1);
        assert_eq!(isvc.predictor_image(), Some("vllm/vllm-openai:latest"));
        assert_eq!(isvc.model_format(), Some("huggingface"));
        assert_eq!(isvc.storage_uri(), Some("hf://meta-llama/Llama-3-8B"));
    }

    #[test]
    fn ready_condition_is_case_insensitive() {
        let isvc = parse(json!({
            "metadata": {"name": "iris", "namespace": "a"},
            "status": {"conditions": [{"type": "Ready", "status": "true"}]}
        }));
        assert!(isvc.ready_condition().is_some_and(Condition::is_true));
    }
}
