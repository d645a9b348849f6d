//! Confidence → severity tiering.

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// Ordinal damage severity.
///
/// `None` is reserved for "no damage detected" and is never produced by the
/// band lookup itself; it is applied by [`SeverityAssessment::effective_severity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::None,
        Severity::Low,
        Severity::Medium,
        Severity::High,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::None => "None",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Severity::None),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Output of [`SeverityRule::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityAssessment {
    pub damage_detected: bool,
    /// Band the confidence falls in, computed even when nothing was detected.
    pub band: Severity,
}

impl SeverityAssessment {
    /// Severity to report: the band when damage was detected, `None` otherwise.
    pub fn effective_severity(&self) -> Severity {
        if self.damage_detected {
            self.band
        } else {
            Severity::None
        }
    }
}

/// Strict-threshold severity rule.
///
/// Bands are evaluated in descending order and the first satisfied band wins:
/// `c > high → High`, `c > detection → Medium`, otherwise `Low`. Both
/// comparisons are strict, so a confidence equal to a threshold falls into the
/// lower band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeverityRule {
    pub detection_threshold: f64,
    pub high_threshold: f64,
}

impl Default for SeverityRule {
    fn default() -> Self {
        Self {
            detection_threshold: 0.5,
            high_threshold: 0.8,
        }
    }
}

impl SeverityRule {
    pub fn new(detection_threshold: f64, high_threshold: f64) -> Result<Self, ConfigError> {
        let rule = Self {
            detection_threshold,
            high_threshold,
        };
        rule.validate()?;
        Ok(rule)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("severity.detection_threshold", self.detection_threshold),
            ("severity.high_threshold", self.high_threshold),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(field, "must be within [0, 1]"));
            }
        }
        if self.high_threshold < self.detection_threshold {
            return Err(ConfigError::invalid(
                "severity.high_threshold",
                "must not be below severity.detection_threshold",
            ));
        }
        Ok(())
    }

    pub fn classify(&self, confidence: f64) -> SeverityAssessment {
        let band = if confidence > self.high_threshold {
            Severity::High
        } else if confidence > self.detection_threshold {
            Severity::Medium
        } else {
            Severity::Low
        };

        SeverityAssessment {
            damage_detected: confidence > self.detection_threshold,
            band,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_follow_strict_thresholds() {
        let rule = SeverityRule::default();

        assert_eq!(rule.classify(0.0).band, Severity::Low);
        assert_eq!(rule.classify(0.5).band, Severity::Low);
        assert_eq!(rule.classify(0.5000001).band, Severity::Medium);
        assert_eq!(rule.classify(0.8).band, Severity::Medium);
        assert_eq!(rule.classify(0.8000001).band, Severity::High);
        assert_eq!(rule.classify(1.0).band, Severity::High);
    }

    #[test]
    fn boundary_is_not_detected() {
        let assessment = SeverityRule::default().classify(0.5);
        assert!(!assessment.damage_detected);
        assert_eq!(assessment.effective_severity(), Severity::None);
    }

    #[test]
    fn effective_severity_keeps_band_when_detected() {
        let assessment = SeverityRule::default().classify(0.85);
        assert!(assessment.damage_detected);
        assert_eq!(assessment.effective_severity(), Severity::High);
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let err = SeverityRule::new(0.9, 0.6).unwrap_err();
        assert!(err.to_string().contains("high_threshold"));
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        assert!(SeverityRule::new(-0.1, 0.8).is_err());
        assert!(SeverityRule::new(0.5, f64::NAN).is_err());
        assert!(SeverityRule::new(0.5, 0.5).is_ok());
    }

    #[test]
    fn severity_serializes_as_title_case() {
        assert_eq!(serde_json::to_string(&Severity::None).unwrap(), "\"None\"");
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"High\"");
        assert_eq!("medium".parse::<Severity>().unwrap(), Severity::Medium);
        assert!("severe".parse::<Severity>().is_err());
    }
}
