//! The pipeline's output artifact.

use serde::{Deserialize, Serialize};

use super::cost::CostEstimate;
use super::finding::DamageFinding;
use super::severity::Severity;

/// Complete, immutable output of one analysis.
///
/// Field names are part of the external contract; see the crate docs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub damage_detected: bool,
    pub confidence: f64,
    pub severity: Severity,
    pub damage_types: Vec<DamageFinding>,
    pub cost_estimation: CostEstimate,
}

/// A broken [`AnalysisResult`] invariant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("severity {severity} is inconsistent with damage_detected={damage_detected}")]
    SeverityMismatch {
        damage_detected: bool,
        severity: Severity,
    },

    #[error("damage_types must be empty iff no damage was detected")]
    FindingsMismatch,

    #[error("total_cost {total} != labor + parts + paint ({components})")]
    ComponentSum { total: f64, components: f64 },

    #[error("total_cost {total} != breakdown sum {breakdown}")]
    BreakdownSum { total: f64, breakdown: f64 },

    #[error("cost estimate must be all zero when no damage was detected")]
    NonZeroCostWithoutDamage,
}

// Amounts are sums of at most a handful of configured values; anything beyond
// this is a real discrepancy, not rounding.
const COST_EPSILON: f64 = 1e-6;

impl AnalysisResult {
    /// Verify the structural invariants of a result.
    ///
    /// Results built by the pipeline always pass; this exists for adapters
    /// that rehydrate results from storage.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(InvariantViolation::ConfidenceOutOfRange(self.confidence));
        }

        let severity_ok = if self.damage_detected {
            self.severity != Severity::None
        } else {
            self.severity == Severity::None
        };
        if !severity_ok {
            return Err(InvariantViolation::SeverityMismatch {
                damage_detected: self.damage_detected,
                severity: self.severity,
            });
        }

        if self.damage_types.is_empty() == self.damage_detected {
            return Err(InvariantViolation::FindingsMismatch);
        }

        let cost = &self.cost_estimation;
        let components = cost.labor_cost + cost.parts_cost + cost.paint_cost;
        if (cost.total_cost - components).abs() > COST_EPSILON {
            return Err(InvariantViolation::ComponentSum {
                total: cost.total_cost,
                components,
            });
        }
        if !cost.breakdown.is_empty() {
            let breakdown = cost.breakdown_total();
            if (cost.total_cost - breakdown).abs() > COST_EPSILON {
                return Err(InvariantViolation::BreakdownSum {
                    total: cost.total_cost,
                    breakdown,
                });
            }
        }
        if !self.damage_detected && !cost.is_zero() {
            return Err(InvariantViolation::NonZeroCostWithoutDamage);
        }

        Ok(())
    }
}
