//! Safe resection margin calculation.

use crate::depth::DepthEstimate;
use crate::segmentation::TumorBoundary;
use endoguide_core::geometry::{clip_to_rect, grow_radially, polygon_area};
use endoguide_core::{
    EndoGuideError, InvasionLevel, MarginStandards, Rect, Result, SafetyThresholds, Vec2,
};
use serde::{Deserialize, Serialize};

/// Recommended resection plan around the primary tumor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafeMargin {
    /// Required margin from the standards table.
    pub margin_distance_mm: f32,
    /// Invasion level the margin was looked up for.
    pub invasion_level: InvasionLevel,
    pub tumor_area_mm2: f32,
    /// Area enclosed by the resection contour (clipped to the frame).
    pub resection_area_mm2: f32,
    /// Tumor contour grown by the margin, in frame pixels.
    pub resection_contour: Vec<Vec2>,
    /// Portion of the required margin that is inside the field of view.
    pub visible_margin_mm: f32,
    /// `visible_margin_mm / margin_distance_mm`, in [0, 1].
    pub safety_score: f32,
    pub recommendations: Vec<String>,
}

/// Margin stage.
#[derive(Debug, Clone)]
pub struct MarginCalculator {
    standards: MarginStandards,
    pixels_per_mm: f32,
    thresholds: SafetyThresholds,
}

impl MarginCalculator {
    pub fn new(standards: MarginStandards, pixels_per_mm: f32, thresholds: SafetyThresholds) -> Self {
        Self {
            standards,
            pixels_per_mm,
            thresholds,
        }
    }

    /// Required margin for a level. `Unknown` gets the deepest standard.
    pub fn required_margin_mm(&self, level: InvasionLevel) -> f32 {
        self.standards.margin_for(level)
    }

    /// Plan the resection around `boundary` in a `frame_width` x
    /// `frame_height` view. A missing depth estimate is treated as
    /// [`InvasionLevel::Unknown`].
    pub fn calculate(
        &self,
        boundary: &TumorBoundary,
        depth: Option<&DepthEstimate>,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<SafeMargin> {
        if boundary.contour.len() < 3 || boundary.area <= 0.0 {
            return Err(EndoGuideError::analysis(
                "margin",
                "tumor boundary is degenerate",
            ));
        }

        let level = depth.map_or(InvasionLevel::Unknown, |d| d.invasion_level);
        let required_mm = self.required_margin_mm(level);
        let ppm = self.pixels_per_mm;
        let (fw, fh) = (frame_width as f32, frame_height as f32);

        let grown = grow_radially(&boundary.contour, boundary.centroid, required_mm * ppm);
        let resection_contour = clip_to_rect(&grown, Rect::new(0.0, 0.0, fw, fh));

        let clearance_mm = boundary.bounding_box.clearance_within(fw, fh) / ppm;
        let visible_margin_mm = clearance_mm.min(required_mm);
        let safety_score = (visible_margin_mm / required_mm).clamp(0.0, 1.0);

        Ok(SafeMargin {
            margin_distance_mm: required_mm,
            invasion_level: level,
            tumor_area_mm2: boundary.area / (ppm * ppm),
            resection_area_mm2: polygon_area(&resection_contour) / (ppm * ppm),
            recommendations: self.recommendations(level, required_mm, visible_margin_mm, safety_score),
            resection_contour,
            visible_margin_mm,
            safety_score,
        })
    }

    fn recommendations(
        &self,
        level: InvasionLevel,
        required_mm: f32,
        visible_mm: f32,
        score: f32,
    ) -> Vec<String> {
        let mut notes = Vec::with_capacity(2);
        notes.push(match level {
            InvasionLevel::Superficial => {
                "Superficial lesion: en bloc endoscopic mucosal resection is feasible".to_string()
            }
            InvasionLevel::Moderate => {
                "Moderate invasion: consider endoscopic submucosal dissection".to_string()
            }
            InvasionLevel::Deep => {
                "Deep invasion suspected: refer for surgical evaluation".to_string()
            }
            InvasionLevel::Unknown => format!(
                "Invasion depth undetermined: conservative {required_mm:.1} mm margin applied"
            ),
        });

        if score < self.thresholds.caution {
            notes.push(format!(
                "Insufficient visible margin ({visible_mm:.1} of {required_mm:.1} mm): reposition the scope to expose the lesion periphery"
            ));
        } else if score < self.thresholds.adequate {
            notes.push(format!(
                "Margin partially visible ({visible_mm:.1} of {required_mm:.1} mm): confirm the lesion periphery before marking"
            ));
        } else {
            notes.push(format!(
                "Planned {required_mm:.1} mm margin is fully visible"
            ));
        }
        notes
    }
}
