//! Integration tests for clinical configuration and the margin stage.
//!
//! Exercises endoguide-core config loading together with
//! endoguide-analysis margin planning.

use endoguide_analysis::{AnalysisStages, DepthEstimate, MarginCalculator, TumorBoundary};
use endoguide_core::geometry::{convex_hull, polygon_area, polygon_perimeter};
use endoguide_core::{
    EndoGuideError, InvasionLevel, MarginStandards, PipelineConfig, PixelBuffer, Rect,
    SafetyThresholds, Vec2,
};

// ── Helpers ────────────────────────────────────────────────────

fn boundary(rect: Rect) -> TumorBoundary {
    let contour = convex_hull(&[
        rect.min(),
        Vec2::new(rect.max().x, rect.y),
        rect.max(),
        Vec2::new(rect.x, rect.max().y),
    ]);
    TumorBoundary {
        area: polygon_area(&contour),
        perimeter: polygon_perimeter(&contour),
        contour,
        centroid: rect.center(),
        bounding_box: rect,
        confidence: 0.9,
    }
}

fn depth(level: InvasionLevel) -> DepthEstimate {
    DepthEstimate {
        mean_depth_mm: 3.0,
        min_depth_mm: 2.0,
        max_depth_mm: 4.0,
        invasion_level: level,
        confidence: 0.8,
    }
}

// ── Margin standards ───────────────────────────────────────────

#[test]
fn margin_and_resection_grow_with_severity() {
    let calc = MarginCalculator::new(
        MarginStandards::new(1.5, 4.0, 8.0),
        12.0,
        SafetyThresholds::default(),
    );
    let tumor = boundary(Rect::new(500.0, 400.0, 120.0, 90.0));

    let plans: Vec<_> = InvasionLevel::GRADED
        .iter()
        .map(|&level| calc.calculate(&tumor, Some(&depth(level)), 1920, 1080).unwrap())
        .collect();

    for pair in plans.windows(2) {
        assert!(pair[0].margin_distance_mm < pair[1].margin_distance_mm);
        assert!(pair[0].resection_area_mm2 < pair[1].resection_area_mm2);
    }
    let unknown = calc.calculate(&tumor, None, 1920, 1080).unwrap();
    assert_eq!(unknown.margin_distance_mm, plans[2].margin_distance_mm);
}

#[test]
fn non_increasing_standards_rejected_by_config() {
    let json = r#"{ "margin_standards": { "superficial": 5.0, "moderate": 5.0, "deep": 10.0 } }"#;
    let err = PipelineConfig::from_json_str(json).unwrap_err();
    assert!(matches!(err, EndoGuideError::Configuration(_)));
}

#[test]
fn partial_config_file_takes_defaults() {
    let path = std::env::temp_dir().join(format!("endoguide-config-{}.json", std::process::id()));
    std::fs::write(
        &path,
        r#"{ "queue_capacity": 8, "margin_standards": { "superficial": 1.0, "moderate": 3.0, "deep": 6.0 } }"#,
    )
    .unwrap();

    let config = PipelineConfig::from_path(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.queue_capacity, 8);
    assert_eq!(config.worker_count, 1);
    assert_eq!(config.margin_standards.margin_for(InvasionLevel::Unknown), 6.0);

    let round_trip = PipelineConfig::from_json_str(&config.to_json_pretty().unwrap()).unwrap();
    assert_eq!(round_trip, config);
}

// ── Stage chain ────────────────────────────────────────────────

#[test]
fn lesion_near_edge_gets_low_safety_score() {
    let stages = AnalysisStages::from_config(&PipelineConfig::default());
    // Lesion touching the left border of the view
    let buffer = PixelBuffer::lesion_pattern(320, 240, Rect::new(0.0, 80.0, 70.0, 60.0));
    let grid = stages.grid(&buffer).unwrap();
    let seg = stages.segmenter.segment(&grid).unwrap();
    let primary = seg.primary().unwrap();

    let margin = stages.margin.calculate(primary, None, 320, 240).unwrap();
    assert!(margin.safety_score < 0.5);
    assert!(margin.recommendations.iter().any(|r| r.starts_with("Insufficient")));
}
