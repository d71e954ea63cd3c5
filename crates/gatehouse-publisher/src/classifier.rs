//! Model type classification
//!
//! Decides whether a model is exposed through the predict-style route or the
//! OpenAI-compatible AI gateway. Checks run in order and the first match wins:
//!
//! 1. explicit `gatehouse.io/model-type` annotation
//! 2. serving image against known LLM server images
//! 3. declared task (`--task` arg or `TASK`/`HF_TASK` env) against generative tasks
//! 4. storage URI against known LLM family names
//!
//! Image and URI markers match whole name segments (split on `/`, `:`,
//! `-`, `.` and friends), never raw substrings, so `stgi-tools` is not TGI.
//!
//! Anything else is traditional. The heuristics can miss; an explicit
//! `modelType` on the publish request always overrides classification.

use gatehouse_common::crd::InferenceService;
use tracing::{debug, warn};

use crate::types::ModelType;

/// Annotation that pins a model's type
pub const MODEL_TYPE_ANNOTATION: &str = "gatehouse.io/model-type";

/// Segment runs of images that serve OpenAI-compatible APIs
const LLM_IMAGE_MARKERS: &[&[&str]] = &[
    &["vllm"],
    &["text", "generation", "inference"],
    &["tgi"],
    &["llama", "cpp"],
    &["ollama"],
    &["sglang"],
    &["tensorrt", "llm"],
    &["lmdeploy"],
    &["localai"],
];

/// Tasks served through chat/completions/embeddings (normalized to snake_case)
const GENERATIVE_TASKS: &[&str] = &[
    "text_generation",
    "text2text_generation",
    "chat",
    "completion",
    "completions",
    "embedding",
    "embeddings",
    "feature_extraction",
];

/// Segment runs of model URIs naming LLM families; the last segment may
/// carry a version number (`llama3`, `qwen2`)
const LLM_URI_MARKERS: &[&[&str]] = &[
    &["llama"],
    &["mistral"],
    &["mixtral"],
    &["gpt"],
    &["falcon"],
    &["qwen"],
    &["gemma"],
    &["phi"],
    &["bloom"],
    &["bloomz"],
    &["deepseek"],
    &["flan", "t5"],
    &["starcoder"],
];

/// Which check decided the type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassificationSource {
    /// Explicit annotation
    Annotation,
    /// Serving image
    Image,
    /// Declared task
    Task,
    /// Storage URI
    StorageUri,
    /// Nothing matched
    Default,
}

/// Classification result
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
    /// Decided type
    pub model_type: ModelType,
    /// Which check decided it
    pub source: ClassificationSource,
}

impl Classification {
    fn new(model_type: ModelType, source: ClassificationSource) -> Self {
        Self { model_type, source }
    }
}

/// Classify a model
pub fn classify(service: &InferenceService) -> Classification {
    let result = classify_inner(service);
    debug!(
        model = %service.metadata.name,
        model_type = %result.model_type,
        source = ?result.source,
        "classified model"
    );
    result
}

fn classify_inner(service: &InferenceService) -> Classification {
    if let Some(value) = service.metadata.annotations.get(MODEL_TYPE_ANNOTATION) {
        match ModelType::parse(value) {
            Some(model_type) => {
                return Classification::new(model_type, ClassificationSource::Annotation)
            }
            None => warn!(
                model = %service.metadata.name,
                value = %value,
                "ignoring unrecognized model type annotation"
            ),
        }
    }

    if let Some(image) = service.predictor_image() {
        let segments = segments(image);
        if LLM_IMAGE_MARKERS
            .iter()
            .any(|m| contains_run(&segments, m, false))
        {
            return Classification::new(ModelType::OpenAi, ClassificationSource::Image);
        }
    }

    if let Some(task) = declared_task(service) {
        if GENERATIVE_TASKS.contains(&task.as_str()) {
            return Classification::new(ModelType::OpenAi, ClassificationSource::Task);
        }
    }

    if let Some(uri) = service.storage_uri() {
        let segments = segments(uri);
        if LLM_URI_MARKERS
            .iter()
            .any(|m| contains_run(&segments, m, true))
        {
            return Classification::new(ModelType::OpenAi, ClassificationSource::StorageUri);
        }
    }

    Classification::new(ModelType::Traditional, ClassificationSource::Default)
}

/// Lowercased alphanumeric segments of an image reference or URI
fn segments(value: &str) -> Vec<String> {
    value
        .to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether `marker` appears as consecutive segments. With `versioned`, the
/// final segment may be followed by digits.
fn contains_run(segments: &[String], marker: &[&str], versioned: bool) -> bool {
    let Some((last, head)) = marker.split_last() else {
        return false;
    };
    segments.windows(marker.len()).any(|window| {
        let (tail, prefix) = match window.split_last() {
            Some(split) => split,
            None => return false,
        };
        let tail_matches = match tail.strip_prefix(*last) {
            Some("") => true,
            Some(rest) => versioned && rest.bytes().all(|b| b.is_ascii_digit()),
            None => false,
        };
        tail_matches && prefix.iter().zip(head).all(|(s, m)| s.as_str() == *m)
    })
}

/// Task named by `--task=x` / `--task x` args or `TASK`/`HF_TASK` env,
/// lowercased with `-` normalized to `_`
fn declared_task(service: &InferenceService) -> Option<String> {
    let mut args = service.predictor_args();
    let from_args = loop {
        let Some(arg) = args.next() else { break None };
        if let Some(value) = arg.strip_prefix("--task=") {
            break Some(value.to_string());
        }
        if arg == "--task" {
            break args.next().map(str::to_string);
        }
    };

    from_args
        .or_else(|| {
            service
                .predictor_env()
                .find(|e| e.name == "TASK" || e.name == "HF_TASK")
                .and_then(|e| e.value.clone())
        })
        .map(|t| t.trim().to_ascii_lowercase().replace('-', "_"))
}
