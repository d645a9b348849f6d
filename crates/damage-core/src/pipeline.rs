//! End-to-end analysis: bytes → tensor → confidence → result.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use image::ImageFormat;

use crate::classifier::DamageClassifier;
use crate::config::AnalyzerConfig;
use crate::domain::{
    AnalysisError, AnalysisResult, ConfigError, CostEstimator, CostTable, FindingSynthesizer,
    PlaceholderFindings, Result, SeverityRule,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::preprocess::ImagePreprocessor;

/// Synchronous damage analysis pipeline.
///
/// Holds no per-call state: one instance can serve concurrent callers as
/// long as its classifier can.
pub struct AnalysisPipeline {
    preprocessor: ImagePreprocessor,
    classifier: Arc<dyn DamageClassifier>,
    severity: SeverityRule,
    costs: CostEstimator,
    findings: Arc<dyn FindingSynthesizer>,
}

impl std::fmt::Debug for AnalysisPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisPipeline")
            .field("classifier", &self.classifier.name())
            .field("input", self.preprocessor.spec())
            .field("severity", &self.severity)
            .field("findings", &self.findings.name())
            .finish()
    }
}

pub struct AnalysisPipelineBuilder {
    classifier: Arc<dyn DamageClassifier>,
    severity: SeverityRule,
    cost_table: CostTable,
    findings: Arc<dyn FindingSynthesizer>,
    accepted_formats: Option<Vec<ImageFormat>>,
    max_input_bytes: Option<usize>,
}

impl AnalysisPipelineBuilder {
    pub fn severity_rule(mut self, rule: SeverityRule) -> Self {
        self.severity = rule;
        self
    }

    pub fn cost_table(mut self, table: CostTable) -> Self {
        self.cost_table = table;
        self
    }

    pub fn findings(mut self, findings: Arc<dyn FindingSynthesizer>) -> Self {
        self.findings = findings;
        self
    }

    pub fn accepted_formats(mut self, formats: Vec<ImageFormat>) -> Self {
        self.accepted_formats = Some(formats);
        self
    }

    pub fn max_input_bytes(mut self, limit: usize) -> Self {
        self.max_input_bytes = Some(limit);
        self
    }

    /// Validate the configuration and build the pipeline.
    ///
    /// The preprocessor is derived from the classifier's declared input spec.
    pub fn build(self) -> std::result::Result<AnalysisPipeline, ConfigError> {
        self.severity.validate()?;
        let costs = CostEstimator::new(self.cost_table)?;

        let mut preprocessor = ImagePreprocessor::new(self.classifier.input_spec())?;
        if let Some(formats) = self.accepted_formats {
            preprocessor = preprocessor.with_accepted_formats(formats);
        }
        if let Some(limit) = self.max_input_bytes {
            preprocessor = preprocessor.with_max_input_bytes(limit);
        }

        Ok(AnalysisPipeline {
            preprocessor,
            classifier: self.classifier,
            severity: self.severity,
            costs,
            findings: self.findings,
        })
    }
}

impl AnalysisPipeline {
    pub fn builder(classifier: Arc<dyn DamageClassifier>) -> AnalysisPipelineBuilder {
        AnalysisPipelineBuilder {
            classifier,
            severity: SeverityRule::default(),
            cost_table: CostTable::default(),
            findings: Arc::new(PlaceholderFindings::default()),
            accepted_formats: None,
            max_input_bytes: None,
        }
    }

    /// Pipeline with the reference thresholds, cost table and findings.
    pub fn new(classifier: Arc<dyn DamageClassifier>) -> std::result::Result<Self, ConfigError> {
        Self::builder(classifier).build()
    }

    pub fn from_config(
        config: &AnalyzerConfig,
        classifier: Arc<dyn DamageClassifier>,
    ) -> std::result::Result<Self, ConfigError> {
        Self::builder(classifier)
            .severity_rule(config.severity)
            .cost_table(config.cost.clone())
            .accepted_formats(config.input.formats()?)
            .max_input_bytes(config.input.max_input_bytes)
            .build()
    }

    pub fn classifier(&self) -> &Arc<dyn DamageClassifier> {
        &self.classifier
    }

    /// Analyze one image. Either a complete result or a typed failure.
    pub fn analyze(&self, image_bytes: &[u8]) -> Result<AnalysisResult> {
        let start = Instant::now();
        obs::emit_analysis_started(image_bytes.len(), self.classifier.name());

        let outcome = self
            .preprocessor
            .preprocess(image_bytes)
            .and_then(|tensor| self.classifier.infer(&tensor))
            .and_then(|confidence| self.postprocess(confidence));

        let duration_ms = start.elapsed().as_millis() as u64;
        match &outcome {
            Ok(result) => {
                METRICS.record_completed(result.damage_detected);
                obs::emit_analysis_completed(
                    result.confidence,
                    result.severity,
                    result.damage_detected,
                    result.cost_estimation.total_cost,
                    duration_ms,
                );
            }
            Err(e) => {
                METRICS.record_failed(e.kind());
                obs::emit_analysis_failed(e.kind(), e, duration_ms);
            }
        }
        outcome
    }

    /// Read `path` and analyze its contents.
    pub fn analyze_file(&self, path: &Path) -> Result<AnalysisResult> {
        let bytes = std::fs::read(path).map_err(|source| AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.analyze(&bytes)
    }

    /// Turn a raw classifier score into a result.
    ///
    /// Fails with `Inference` when the score is not a finite value in
    /// `[0, 1]`.
    pub fn postprocess(&self, confidence: f64) -> Result<AnalysisResult> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(AnalysisError::Inference(format!(
                "classifier returned invalid confidence {confidence}"
            )));
        }

        let assessment = self.severity.classify(confidence);
        let severity = assessment.effective_severity();
        let damage_types = if assessment.damage_detected {
            self.findings.synthesize(confidence, severity)
        } else {
            Vec::new()
        };

        Ok(AnalysisResult {
            damage_detected: assessment.damage_detected,
            confidence,
            severity,
            damage_types,
            cost_estimation: self.costs.estimate(severity),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{FixedClassifier, UnavailableClassifier};
    use crate::domain::{DamageKind, Severity};

    fn pipeline(confidence: f64) -> AnalysisPipeline {
        AnalysisPipeline::new(Arc::new(FixedClassifier::new(confidence))).unwrap()
    }

    #[test]
    fn postprocess_high_scenario() {
        let result = pipeline(0.0).postprocess(0.85).unwrap();
        assert!(result.damage_detected);
        assert_eq!(result.severity, Severity::High);
        assert_eq!(result.cost_estimation.total_cost, 1500.0);
        assert_eq!(result.damage_types.len(), 1);
        assert_eq!(result.damage_types[0].kind, DamageKind::Dent);
        result.check_invariants().unwrap();
    }

    #[test]
    fn postprocess_clean_scenario() {
        let result = pipeline(0.0).postprocess(0.3).unwrap();
        assert!(!result.damage_detected);
        assert_eq!(result.severity, Severity::None);
        assert!(result.damage_types.is_empty());
        assert!(result.cost_estimation.is_zero());
        result.check_invariants().unwrap();
    }

    #[test]
    fn postprocess_rejects_invalid_scores() {
        let p = pipeline(0.0);
        for bad in [f64::NAN, f64::INFINITY, -0.01, 1.01] {
            assert!(matches!(p.postprocess(bad), Err(AnalysisError::Inference(_))));
        }
    }

    #[test]
    fn custom_thresholds_flow_through() {
        let p = AnalysisPipeline::builder(Arc::new(FixedClassifier::new(0.0)))
            .severity_rule(SeverityRule::new(0.3, 0.6).unwrap())
            .build()
            .unwrap();
        let result = p.postprocess(0.4).unwrap();
        assert!(result.damage_detected);
        assert_eq!(result.severity, Severity::Medium);
    }

    #[test]
    fn invalid_cost_table_fails_build() {
        let mut table = CostTable::default();
        table.high.paint = f64::NAN;
        let err = AnalysisPipeline::builder(Arc::new(FixedClassifier::new(0.5)))
            .cost_table(table)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("cost.high.paint"));
    }

    #[test]
    fn unavailable_model_short_circuits_after_decode() {
        let p = AnalysisPipeline::new(Arc::new(UnavailableClassifier::new("no weights"))).unwrap();
        let mut png = std::io::Cursor::new(Vec::new());
        image::DynamicImage::new_rgb8(4, 4)
            .write_to(&mut png, ImageFormat::Png)
            .unwrap();
        assert!(matches!(
            p.analyze(png.get_ref()),
            Err(AnalysisError::ModelUnavailable(_))
        ));
    }

    #[test]
    fn analyze_file_surfaces_io_errors() {
        let err = pipeline(0.9)
            .analyze_file(Path::new("/nonexistent/car.jpg"))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Io { .. }));
    }
}
