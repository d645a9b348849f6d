//! Vehicle damage analysis core.
//!
//! A single photograph goes through [`AnalysisPipeline`]:
//!
//! 1. [`ImagePreprocessor`] decodes, resizes and normalizes the image into
//!    the tensor the classifier declares via [`DamageClassifier::input_spec`].
//! 2. A [`DamageClassifier`] turns the tensor into a confidence in `[0, 1]`.
//! 3. [`SeverityRule`] maps the confidence to a severity tier.
//! 4. [`CostEstimator`] looks the tier up in a [`CostTable`].
//! 5. A [`FindingSynthesizer`] attaches localized findings when damage was
//!    detected.
//!
//! The resulting [`AnalysisResult`] serializes to the stable wire contract
//! (`damage_detected`, `confidence`, `severity`, `damage_types`,
//! `cost_estimation`).

pub mod classifier;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod preprocess;
pub mod telemetry;

pub use classifier::{
    load_classifier, DamageClassifier, FixedClassifier, InferenceBackend, LinearProbeClassifier,
    ProbeWeights, SerializedClassifier, UnavailableClassifier, PROBE_FORMAT,
};
pub use config::{AnalyzerConfig, InputConfig, ModelConfig, StorageConfig};
pub use domain::{
    AnalysisError, AnalysisErrorKind, AnalysisResult, BoundingBox, ConfigError, CostBand,
    CostEstimate, CostEstimator, CostLine, CostTable, DamageFinding, DamageKind,
    FindingSynthesizer, InvariantViolation, PlaceholderFindings, Result, Severity,
    SeverityAssessment, SeverityRule,
};
pub use metrics::METRICS;
pub use obs::{
    emit_analysis_completed, emit_analysis_failed, emit_analysis_started, emit_model_loaded,
    emit_model_unavailable, emit_persist_error, AnalysisSpan,
};
pub use pipeline::{AnalysisPipeline, AnalysisPipelineBuilder};
pub use preprocess::{ImagePreprocessor, ImageTensor, InputSpec, Normalization};
pub use telemetry::init_tracing;
