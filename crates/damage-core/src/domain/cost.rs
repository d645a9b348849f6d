//! Severity → repair cost lookup.
//!
//! Cost bands are business policy, so they live in a [`CostTable`] that can be
//! loaded from configuration instead of being re-derived per call.

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::severity::Severity;

/// One line of an itemized estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLine {
    pub item: String,
    pub cost: f64,
    pub description: String,
}

/// Structured repair-cost estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub total_cost: f64,
    pub labor_cost: f64,
    pub parts_cost: f64,
    pub paint_cost: f64,
    pub breakdown: Vec<CostLine>,
}

impl CostEstimate {
    /// All-zero estimate with an empty breakdown.
    pub fn zero() -> Self {
        Self {
            total_cost: 0.0,
            labor_cost: 0.0,
            parts_cost: 0.0,
            paint_cost: 0.0,
            breakdown: Vec::new(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.total_cost == 0.0
            && self.labor_cost == 0.0
            && self.parts_cost == 0.0
            && self.paint_cost == 0.0
            && self.breakdown.is_empty()
    }

    /// Sum of the breakdown lines.
    pub fn breakdown_total(&self) -> f64 {
        self.breakdown.iter().map(|line| line.cost).sum()
    }
}

/// Cost amounts for a single severity tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CostBand {
    pub labor: f64,
    pub parts: f64,
    pub paint: f64,
    /// Emit one breakdown line per component.
    #[serde(default)]
    pub itemize: bool,
}

impl CostBand {
    pub const fn new(labor: f64, parts: f64, paint: f64, itemize: bool) -> Self {
        Self {
            labor,
            parts,
            paint,
            itemize,
        }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0, false)
    }

    pub fn total(&self) -> f64 {
        self.labor + self.parts + self.paint
    }
}

/// Lookup table from severity tier to cost band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CostTable {
    pub none: CostBand,
    pub low: CostBand,
    pub medium: CostBand,
    pub high: CostBand,
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            none: CostBand::zero(),
            low: CostBand::new(100.0, 150.0, 50.0, false),
            medium: CostBand::new(300.0, 400.0, 100.0, false),
            high: CostBand::new(500.0, 700.0, 300.0, true),
        }
    }
}

impl CostTable {
    /// The band priced for `severity`.
    pub fn band(&self, severity: Severity) -> &CostBand {
        match severity {
            Severity::None => &self.none,
            Severity::Low => &self.low,
            Severity::Medium => &self.medium,
            Severity::High => &self.high,
        }
    }

    /// Every amount must be finite and non-negative, and the `none` band
    /// must be all zero and not itemized.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for severity in Severity::ALL {
            let band = self.band(severity);
            for (component, amount) in [
                ("labor", band.labor),
                ("parts", band.parts),
                ("paint", band.paint),
            ] {
                if !amount.is_finite() || amount < 0.0 {
                    return Err(ConfigError::invalid(
                        format!("cost.{}.{component}", severity.as_str().to_lowercase()),
                        "must be a finite, non-negative amount",
                    ));
                }
            }
        }
        if self.none != CostBand::zero() {
            return Err(ConfigError::invalid(
                "cost.none",
                "the no-damage band must be all zero and not itemized",
            ));
        }
        Ok(())
    }
}

const LABOR_DESCRIPTION: &str = "Repair work";
const PARTS_DESCRIPTION: &str = "Replacement parts";
const PAINT_DESCRIPTION: &str = "Repainting";

/// Table-driven cost estimator. Pure and total.
#[derive(Debug, Clone, Default)]
pub struct CostEstimator {
    table: CostTable,
}

impl CostEstimator {
    /// Build an estimator over a validated table.
    pub fn new(table: CostTable) -> Result<Self, ConfigError> {
        table.validate()?;
        Ok(Self { table })
    }

    /// The table this estimator prices from.
    pub fn table(&self) -> &CostTable {
        &self.table
    }

    /// Price a severity.
    ///
    /// Itemized bands get a labor, parts and paint breakdown that sums to
    /// the total. Other bands get an empty breakdown.
    pub fn estimate(&self, severity: Severity) -> CostEstimate {
        let band = self.table.band(severity);

        let breakdown = if band.itemize {
            vec![
                CostLine {
                    item: "Labor".to_string(),
                    cost: band.labor,
                    description: LABOR_DESCRIPTION.to_string(),
                },
                CostLine {
                    item: "Parts".to_string(),
                    cost: band.parts,
                    description: PARTS_DESCRIPTION.to_string(),
                },
                CostLine {
                    item: "Paint".to_string(),
                    cost: band.paint,
                    description: PAINT_DESCRIPTION.to_string(),
                },
            ]
        } else {
            Vec::new()
        };

        CostEstimate {
            total_cost: band.total(),
            labor_cost: band.labor,
            parts_cost: band.parts,
            paint_cost: band.paint,
            breakdown,
        }
    }
}
