//! Views of externally owned custom resources
//!
//! gatehouse never creates these; it reads them to decide readiness,
//! classification, and the internal hostname to route to.

mod inference_service;

pub use inference_service::{
    Addressable, Condition, Container, EnvVar, InferenceService, InferenceServiceSpec,
    InferenceServiceStatus, ModelFormat, PredictorModel, PredictorSpec,
};
