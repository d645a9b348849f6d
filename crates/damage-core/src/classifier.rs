//! Damage classifiers: tensor in, confidence out.
//!
//! A classifier is a strategy object injected into the pipeline as
//! `Arc<dyn DamageClassifier>`. It is loaded once at startup and only read
//! afterwards, so implementations must be safe to call concurrently. A
//! backend that is not thread-safe implements [`InferenceBackend`] and is
//! wrapped in [`SerializedClassifier`].

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{AnalysisError, Result};
use crate::obs;
use crate::preprocess::{ImageTensor, InputSpec};

/// Binary damage classifier producing a continuous score.
pub trait DamageClassifier: Send + Sync {
    /// Confidence in `[0, 1]` that the pictured vehicle is damaged.
    fn infer(&self, tensor: &ImageTensor) -> Result<f64>;

    /// Tensor geometry and normalization the model was trained with.
    fn input_spec(&self) -> InputSpec;

    fn name(&self) -> &str;
}

impl fmt::Debug for dyn DamageClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DamageClassifier")
            .field("name", &self.name())
            .field("input_spec", &self.input_spec())
            .finish()
    }
}

fn check_shape(spec: &InputSpec, tensor: &ImageTensor) -> Result<()> {
    let expected = spec.tensor_shape();
    let actual = tensor.shape();
    if actual != expected {
        return Err(AnalysisError::Inference(format!(
            "tensor shape {actual:?} does not match model input {expected:?}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Linear probe
// ---------------------------------------------------------------------------

/// Format tag every weights file must carry.
pub const PROBE_FORMAT: &str = "damage-probe/v1";

/// On-disk representation of a [`LinearProbeClassifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeWeights {
    pub format: String,
    #[serde(default)]
    pub name: Option<String>,
    pub input: InputSpec,
    /// Side length of the pooling grid.
    pub grid: usize,
    /// `grid * grid * 3` coefficients, row-major over (cell_y, cell_x, channel).
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl ProbeWeights {
    pub fn feature_len(&self) -> usize {
        self.grid * self.grid * 3
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.format != PROBE_FORMAT {
            return Err(format!(
                "unsupported weights format {:?}, expected {PROBE_FORMAT:?}",
                self.format
            ));
        }
        self.input.validate().map_err(|e| e.to_string())?;
        if self.grid == 0
            || self.grid > self.input.width as usize
            || self.grid > self.input.height as usize
        {
            return Err(format!(
                "grid {} must be within 1..=min(width, height)",
                self.grid
            ));
        }
        if self.weights.len() != self.feature_len() {
            return Err(format!(
                "expected {} weights for a {}x{} grid, found {}",
                self.feature_len(),
                self.grid,
                self.grid,
                self.weights.len()
            ));
        }
        if !self.bias.is_finite() || self.weights.iter().any(|w| !w.is_finite()) {
            return Err("weights and bias must be finite".to_string());
        }
        Ok(())
    }
}

/// Logistic regression over average-pooled RGB cells.
#[derive(Debug, Clone)]
pub struct LinearProbeClassifier {
    name: String,
    weights: ProbeWeights,
}

impl LinearProbeClassifier {
    pub fn from_weights(weights: ProbeWeights) -> Result<Self> {
        weights.validate().map_err(AnalysisError::ModelUnavailable)?;
        let name = weights
            .name
            .clone()
            .unwrap_or_else(|| "linear-probe".to_string());
        Ok(Self { name, weights })
    }

    /// Load from a JSON weights file.
    ///
    /// Every failure (missing file, bad JSON, inconsistent weights) maps to
    /// `ModelUnavailable`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            AnalysisError::ModelUnavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        let weights: ProbeWeights = serde_json::from_slice(&bytes).map_err(|e| {
            AnalysisError::ModelUnavailable(format!("cannot parse {}: {e}", path.display()))
        })?;
        Self::from_weights(weights)
    }

    /// Mean of each channel over each grid cell.
    fn pool(&self, tensor: &ImageTensor) -> Vec<f64> {
        let grid = self.weights.grid;
        let view = tensor.view();
        let (height, width, _) = view.dim();

        let mut sums = vec![0.0f64; grid * grid * 3];
        let mut counts = vec![0u64; grid * grid];
        for ((y, x, c), value) in view.indexed_iter() {
            let cell = (y * grid / height) * grid + (x * grid / width);
            sums[cell * 3 + c] += f64::from(*value);
            if c == 0 {
                counts[cell] += 1;
            }
        }

        for (cell, count) in counts.iter().enumerate() {
            let count = (*count).max(1) as f64;
            for c in 0..3 {
                sums[cell * 3 + c] /= count;
            }
        }
        sums
    }
}

impl DamageClassifier for LinearProbeClassifier {
    fn infer(&self, tensor: &ImageTensor) -> Result<f64> {
        check_shape(&self.weights.input, tensor)?;

        let features = self.pool(tensor);
        let logit = features
            .iter()
            .zip(&self.weights.weights)
            .map(|(f, w)| f * w)
            .sum::<f64>()
            + self.weights.bias;

        if !logit.is_finite() {
            return Err(AnalysisError::Inference(format!(
                "non-finite activation ({logit})"
            )));
        }

        let confidence = 1.0 / (1.0 + (-logit).exp());
        debug!(classifier = %self.name, logit, confidence, "linear probe forward pass");
        Ok(confidence)
    }

    fn input_spec(&self) -> InputSpec {
        self.weights.input
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// Stubs
// ---------------------------------------------------------------------------

/// Returns a configured confidence for every input.
///
/// Used for demo mode and tests. Must be injected explicitly; nothing falls
/// back to it on failure.
#[derive(Debug, Clone)]
pub struct FixedClassifier {
    confidence: f64,
    spec: InputSpec,
}

impl FixedClassifier {
    pub fn new(confidence: f64) -> Self {
        Self {
            confidence,
            spec: InputSpec::default(),
        }
    }

    pub fn with_input_spec(mut self, spec: InputSpec) -> Self {
        self.spec = spec;
        self
    }
}

impl DamageClassifier for FixedClassifier {
    fn infer(&self, tensor: &ImageTensor) -> Result<f64> {
        check_shape(&self.spec, tensor)?;
        Ok(self.confidence)
    }

    fn input_spec(&self) -> InputSpec {
        self.spec
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Stand-in for a model that failed to load. Every call fails.
#[derive(Debug, Clone)]
pub struct UnavailableClassifier {
    reason: String,
}

impl UnavailableClassifier {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl DamageClassifier for UnavailableClassifier {
    fn infer(&self, _tensor: &ImageTensor) -> Result<f64> {
        Err(AnalysisError::ModelUnavailable(self.reason.clone()))
    }

    fn input_spec(&self) -> InputSpec {
        InputSpec::default()
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

/// A forward pass that needs exclusive access.
///
/// Backends holding mutable or thread-bound session state implement this
/// instead of [`DamageClassifier`] and are shared through
/// [`SerializedClassifier`]. Only `Send` is required.
pub trait InferenceBackend: Send {
    fn forward(&mut self, tensor: &ImageTensor) -> Result<f64>;

    fn input_spec(&self) -> InputSpec;

    fn name(&self) -> &str;
}

/// Makes an [`InferenceBackend`] usable as a shared classifier by running
/// one forward pass at a time.
#[derive(Debug)]
pub struct SerializedClassifier<B> {
    inner: Mutex<B>,
    spec: InputSpec,
    name: String,
}

impl<B: InferenceBackend> SerializedClassifier<B> {
    pub fn new(backend: B) -> Self {
        let spec = backend.input_spec();
        let name = format!("serialized({})", backend.name());
        Self {
            inner: Mutex::new(backend),
            spec,
            name,
        }
    }
}

impl<B: InferenceBackend> DamageClassifier for SerializedClassifier<B> {
    fn infer(&self, tensor: &ImageTensor) -> Result<f64> {
        check_shape(&self.spec, tensor)?;
        let mut backend = self
            .inner
            .lock()
            .map_err(|_| AnalysisError::Inference("classifier lock poisoned".to_string()))?;
        backend.forward(tensor)
    }

    fn input_spec(&self) -> InputSpec {
        self.spec
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Load the linear probe at `path`, or an [`UnavailableClassifier`] carrying
/// the reason it could not be loaded.
///
/// There is no reload path: a failed load stays failed for the life of the
/// process.
pub fn load_classifier(path: &Path) -> Arc<dyn DamageClassifier> {
    match LinearProbeClassifier::load(path) {
        Ok(classifier) => {
            obs::emit_model_loaded(classifier.name(), path, &classifier.input_spec());
            Arc::new(classifier)
        }
        Err(e) => {
            obs::emit_model_unavailable(path, &e);
            Arc::new(UnavailableClassifier::new(e.to_string()))
        }
    }
}
