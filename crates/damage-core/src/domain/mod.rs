//! Domain model for damage analysis.
//!
//! - `Severity` / `SeverityRule`: confidence → severity tier
//! - `CostTable` / `CostEstimator`: severity tier → repair cost
//! - `DamageFinding` / `FindingSynthesizer`: localized findings
//! - `AnalysisResult`: the pipeline's output artifact

pub mod cost;
pub mod error;
pub mod finding;
pub mod result;
pub mod severity;

pub use cost::{CostBand, CostEstimate, CostEstimator, CostLine, CostTable};
pub use error::{AnalysisError, AnalysisErrorKind, ConfigError, Result};
pub use finding::{BoundingBox, DamageFinding, DamageKind, FindingSynthesizer, PlaceholderFindings};
pub use result::{AnalysisResult, InvariantViolation};
pub use severity::{Severity, SeverityAssessment, SeverityRule};
