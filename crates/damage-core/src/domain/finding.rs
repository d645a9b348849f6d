//! Localized damage findings.

use serde::{Deserialize, Serialize};

use super::severity::Severity;

/// Kind of damage a finding describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageKind {
    Scratch,
    Dent,
    Crack,
    Rust,
    #[serde(rename = "Paint Damage")]
    PaintDamage,
    #[serde(rename = "Broken Glass")]
    BrokenGlass,
}

/// Pixel-space rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageFinding {
    #[serde(rename = "type")]
    pub kind: DamageKind,
    pub location: String,
    pub severity: Severity,
    pub bounding_box: BoundingBox,
}

/// Produces the localized findings attached to a detected result.
///
/// Only consulted when damage was detected; implementations never see
/// undetected results.
pub trait FindingSynthesizer: Send + Sync {
    fn synthesize(&self, confidence: f64, severity: Severity) -> Vec<DamageFinding>;

    fn name(&self) -> &'static str;
}

/// Emits exactly one finding at a fixed region.
///
/// This is not a localization model: the box and location never depend on
/// the image. The kind switches from `Scratch` to `Dent` above
/// `dent_threshold`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderFindings {
    pub location: String,
    pub region: BoundingBox,
    pub dent_threshold: f64,
}

impl Default for PlaceholderFindings {
    fn default() -> Self {
        Self {
            location: "Front bumper".to_string(),
            region: BoundingBox::new(100, 150, 50, 30),
            dent_threshold: 0.7,
        }
    }
}

impl FindingSynthesizer for PlaceholderFindings {
    fn synthesize(&self, confidence: f64, severity: Severity) -> Vec<DamageFinding> {
        let kind = if confidence > self.dent_threshold {
            DamageKind::Dent
        } else {
            DamageKind::Scratch
        };

        vec![DamageFinding {
            kind,
            location: self.location.clone(),
            severity,
            bounding_box: self.region,
        }]
    }

    fn name(&self) -> &'static str {
        "placeholder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_emits_single_fixed_finding() {
        let findings = PlaceholderFindings::default().synthesize(0.9, Severity::High);
        assert_eq!(findings.len(), 1);

        let finding = &findings[0];
        assert_eq!(finding.kind, DamageKind::Dent);
        assert_eq!(finding.location, "Front bumper");
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.bounding_box, BoundingBox::new(100, 150, 50, 30));
    }

    #[test]
    fn placeholder_kind_depends_on_confidence() {
        let synth = PlaceholderFindings::default();
        assert_eq!(
            synth.synthesize(0.6, Severity::Medium)[0].kind,
            DamageKind::Scratch
        );
        assert_eq!(
            synth.synthesize(0.7, Severity::Medium)[0].kind,
            DamageKind::Scratch
        );
        assert_eq!(
            synth.synthesize(0.75, Severity::Medium)[0].kind,
            DamageKind::Dent
        );
    }

    #[test]
    fn finding_wire_names() {
        let finding = &PlaceholderFindings::default().synthesize(0.6, Severity::Medium)[0];
        let json = serde_json::to_value(finding).unwrap();
        assert_eq!(json["type"], "Scratch");
        assert_eq!(json["bounding_box"]["width"], 50);

        let kind = serde_json::to_string(&DamageKind::BrokenGlass).unwrap();
        assert_eq!(kind, "\"Broken Glass\"");
    }
}
