//! End-to-end pipeline behaviour over in-memory images.

use std::sync::Arc;

use damage_core::{
    AnalysisError, AnalysisPipeline, DamageKind, FixedClassifier, LinearProbeClassifier,
    Normalization, ProbeWeights, Severity, PROBE_FORMAT,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
    }))
}

fn fixed(confidence: f64) -> AnalysisPipeline {
    AnalysisPipeline::new(Arc::new(FixedClassifier::new(confidence))).unwrap()
}

#[test]
fn undamaged_range_has_no_cost_and_no_findings() {
    let image = encode(gradient(64, 48), ImageFormat::Png);
    for c in [0.0, 0.1, 0.3, 0.49, 0.5] {
        let result = fixed(c).analyze(&image).unwrap();
        assert!(!result.damage_detected, "confidence {c}");
        assert_eq!(result.severity, Severity::None);
        assert!(result.cost_estimation.is_zero());
        assert!(result.damage_types.is_empty());
        result.check_invariants().unwrap();
    }
}

#[test]
fn medium_range_costs_800_without_breakdown() {
    let image = encode(gradient(64, 48), ImageFormat::Png);
    for c in [0.51, 0.6, 0.7, 0.8] {
        let result = fixed(c).analyze(&image).unwrap();
        assert!(result.damage_detected);
        assert_eq!(result.severity, Severity::Medium, "confidence {c}");
        let cost = &result.cost_estimation;
        assert_eq!(
            [cost.total_cost, cost.labor_cost, cost.parts_cost, cost.paint_cost],
            [800.0, 300.0, 400.0, 100.0]
        );
        assert!(cost.breakdown.is_empty());
        result.check_invariants().unwrap();
    }
}

#[test]
fn high_range_costs_1500_with_itemized_breakdown() {
    let image = encode(gradient(64, 48), ImageFormat::Png);
    for c in [0.81, 0.85, 0.99, 1.0] {
        let result = fixed(c).analyze(&image).unwrap();
        assert_eq!(result.severity, Severity::High, "confidence {c}");
        let cost = &result.cost_estimation;
        assert_eq!(cost.total_cost, 1500.0);
        assert_eq!(cost.breakdown.len(), 3);
        assert_eq!(cost.breakdown_total(), 1500.0);
        result.check_invariants().unwrap();
    }
}

#[test]
fn high_scenario_matches_wire_contract() {
    let image = encode(gradient(320, 240), ImageFormat::Jpeg);
    let result = fixed(0.85).analyze(&image).unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["damage_detected"], true);
    assert_eq!(json["severity"], "High");
    assert_eq!(json["cost_estimation"]["total_cost"], 1500.0);

    let lines: Vec<(String, f64)> = json["cost_estimation"]["breakdown"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| {
            (
                l["item"].as_str().unwrap().to_string(),
                l["cost"].as_f64().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        lines,
        vec![
            ("Labor".to_string(), 500.0),
            ("Parts".to_string(), 700.0),
            ("Paint".to_string(), 300.0)
        ]
    );

    assert_eq!(result.damage_types[0].kind, DamageKind::Dent);
    assert_eq!(json["damage_types"][0]["location"], "Front bumper");
}

#[test]
fn clean_scenario_matches_wire_contract() {
    let image = encode(gradient(32, 32), ImageFormat::Bmp);
    let json = serde_json::to_value(fixed(0.3).analyze(&image).unwrap()).unwrap();
    assert_eq!(json["damage_detected"], false);
    assert_eq!(json["severity"], "None");
    assert_eq!(json["cost_estimation"]["total_cost"], 0.0);
    assert_eq!(json["damage_types"], serde_json::json!([]));
}

#[test]
fn linear_probe_is_idempotent_on_identical_bytes() {
    let weights = ProbeWeights {
        format: PROBE_FORMAT.to_string(),
        name: Some("gradient-probe".to_string()),
        input: damage_core::InputSpec {
            width: 64,
            height: 64,
            normalization: Normalization::Signed,
        },
        grid: 4,
        weights: (0..48).map(|i| ((i % 7) as f64 - 3.0) / 4.0).collect(),
        bias: 0.25,
    };
    let classifier = LinearProbeClassifier::from_weights(weights).unwrap();
    let pipeline = AnalysisPipeline::new(Arc::new(classifier)).unwrap();

    let image = encode(gradient(200, 150), ImageFormat::Png);
    let first = pipeline.analyze(&image).unwrap();
    let second = pipeline.analyze(&image).unwrap();

    assert_eq!(first, second);
    assert!((0.0..=1.0).contains(&first.confidence));
    first.check_invariants().unwrap();
}

#[test]
fn malformed_bytes_never_yield_a_result() {
    let pipeline = fixed(0.99);
    let mut truncated = encode(gradient(64, 64), ImageFormat::Png);
    truncated.truncate(truncated.len() / 3);

    for input in [Vec::new(), b"not an image".to_vec(), truncated] {
        match pipeline.analyze(&input) {
            Err(AnalysisError::Decode(_)) => {}
            other => panic!("expected Decode, got {other:?}"),
        }
    }
}

#[test]
fn analyze_file_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("car.png");
    std::fs::write(&path, encode(gradient(40, 30), ImageFormat::Png)).unwrap();

    let result = fixed(0.65).analyze_file(&path).unwrap();
    assert_eq!(result.severity, Severity::Medium);
    assert_eq!(result.damage_types[0].kind, DamageKind::Scratch);
}
