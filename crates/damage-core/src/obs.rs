//! Structured observability hooks for the analysis lifecycle.
//!
//! Events are emitted at `info!` (failures at `warn!`) with an `event` field
//! naming the lifecycle step, so they can be filtered in JSON log pipelines.

use std::path::Path;

use tracing::{info, warn};

use crate::domain::{AnalysisErrorKind, Severity};
use crate::preprocess::InputSpec;

/// RAII guard that enters a span scoping one analysis.
///
/// ```ignore
/// let _span = AnalysisSpan::enter("user-42", "front.jpg");
/// // events emitted here carry user_id and image
/// ```
pub struct AnalysisSpan {
    _span: tracing::span::EnteredSpan,
}

impl AnalysisSpan {
    pub fn enter(user_id: &str, image: &str) -> Self {
        let span = tracing::info_span!("damage.analysis", user_id = %user_id, image = %image);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_analysis_started(input_bytes: usize, classifier: &str) {
    info!(
        event = "analysis.started",
        input_bytes = input_bytes,
        classifier = %classifier,
    );
}

pub fn emit_analysis_completed(
    confidence: f64,
    severity: Severity,
    damage_detected: bool,
    total_cost: f64,
    duration_ms: u64,
) {
    info!(
        event = "analysis.completed",
        confidence = confidence,
        severity = %severity,
        damage_detected = damage_detected,
        total_cost = total_cost,
        duration_ms = duration_ms,
    );
}

pub fn emit_analysis_failed(kind: AnalysisErrorKind, error: &dyn std::fmt::Display, duration_ms: u64) {
    warn!(
        event = "analysis.failed",
        kind = %kind,
        error = %error,
        duration_ms = duration_ms,
    );
}

pub fn emit_model_loaded(name: &str, path: &Path, spec: &InputSpec) {
    info!(
        event = "model.loaded",
        model = %name,
        path = %path.display(),
        width = spec.width,
        height = spec.height,
        normalization = ?spec.normalization,
    );
}

/// The model could not be loaded; every analysis will fail until restart.
pub fn emit_model_unavailable(path: &Path, error: &dyn std::fmt::Display) {
    warn!(event = "model.unavailable", path = %path.display(), error = %error);
}

/// A record (or its blob) could not be persisted after the pipeline ran.
pub fn emit_persist_error(user_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "analysis.persist_error", user_id = %user_id, error = %error);
}
