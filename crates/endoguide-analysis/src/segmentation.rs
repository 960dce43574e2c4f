//! Tumor boundary segmentation.
//!
//! The imaging mode is detected from channel statistics first, because
//! narrow-band and white-light frames need different lesion scores:
//! - White light: lesions are redder than the surrounding mucosa.
//! - Narrow band: lesions show as dark brown patches against a
//!   green/cyan background.
//!
//! Candidate regions come from thresholding the score map, closing the mask
//! and splitting it into 4-connected components. When candidates overlap
//! above the configured IoU, only the most confident one survives.

use crate::grid::AnalysisGrid;
use crate::mask::{Region, RegionMask};
use endoguide_core::geometry::{convex_hull, polygon_area, polygon_perimeter};
use endoguide_core::{EndoGuideError, Rect, Result, SegmentationConfig, Vec2};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Illumination mode of the endoscope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImagingMode {
    WhiteLight,
    NarrowBand,
}

/// One closed tumor contour in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TumorBoundary {
    /// Convex outline, counter-clockwise, implicitly closed.
    pub contour: Vec<Vec2>,
    /// Enclosed area in px². Always positive.
    pub area: f32,
    /// Outline length in px.
    pub perimeter: f32,
    pub centroid: Vec2,
    pub bounding_box: Rect,
    /// Segmentation certainty in [0, 1]; not a clinical probability.
    pub confidence: f32,
}

/// Output of the segmentation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segmentation {
    pub imaging_mode: ImagingMode,
    /// Sorted by descending confidence.
    pub boundaries: Vec<TumorBoundary>,
}

impl Segmentation {
    /// Most confident boundary, if any lesion was found.
    pub fn primary(&self) -> Option<&TumorBoundary> {
        self.boundaries.first()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }
}

/// Segmentation stage.
#[derive(Debug, Clone)]
pub struct TumorSegmenter {
    config: SegmentationConfig,
}

impl TumorSegmenter {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Classify the imaging mode from channel means.
    pub fn detect_mode(&self, grid: &AnalysisGrid) -> ImagingMode {
        let [r, g, b] = grid.channel_means();
        if r < self.config.nbi_red_ratio * (g + b) * 0.5 {
            ImagingMode::NarrowBand
        } else {
            ImagingMode::WhiteLight
        }
    }

    /// Lesion likelihood of a single cell for the given mode, in [0, 1].
    fn score(mode: ImagingMode, [r, g, b]: [f32; 3]) -> f32 {
        match mode {
            ImagingMode::WhiteLight => (r - (g + b) * 0.5).clamp(0.0, 1.0),
            ImagingMode::NarrowBand => (1.0 - (g + b) * 0.5).clamp(0.0, 1.0),
        }
    }

    fn threshold(&self, mode: ImagingMode) -> f32 {
        match mode {
            ImagingMode::WhiteLight => self.config.white_light_threshold,
            ImagingMode::NarrowBand => self.config.narrow_band_threshold,
        }
    }

    /// Run segmentation on a prepared grid.
    pub fn segment(&self, grid: &AnalysisGrid) -> Result<Segmentation> {
        if grid.width() < 2 || grid.height() < 2 {
            return Err(EndoGuideError::analysis(
                "segmentation",
                format!("grid {}x{} too small", grid.width(), grid.height()),
            ));
        }

        let mode = self.detect_mode(grid);
        let threshold = self.threshold(mode);

        let mut scores = Vec::with_capacity(grid.len());
        let mut mask = RegionMask::new(grid.width(), grid.height());
        for y in 0..grid.height() {
            for x in 0..grid.width() {
                let s = Self::score(mode, grid.rgb(x, y));
                if s > threshold {
                    mask.set(x, y, 255);
                }
                scores.push(s);
            }
        }
        mask.close(1);

        let candidates: Vec<TumorBoundary> = mask
            .regions(self.config.min_region_pixels)
            .iter()
            .filter_map(|region| self.boundary_from_region(grid, region, &scores, threshold))
            .collect();
        let candidate_count = candidates.len();
        let boundaries =
            suppress_overlaps(candidates, self.config.iou_threshold, self.config.max_regions);

        debug!(
            mode = ?mode,
            candidates = candidate_count,
            kept = boundaries.len(),
            "Segmentation complete"
        );

        Ok(Segmentation {
            imaging_mode: mode,
            boundaries,
        })
    }

    fn boundary_from_region(
        &self,
        grid: &AnalysisGrid,
        region: &Region,
        scores: &[f32],
        threshold: f32,
    ) -> Option<TumorBoundary> {
        let mut corners = Vec::with_capacity(region.len() * 4);
        let mut centroid = Vec2::ZERO;
        let mut score_sum = 0.0f32;

        for &(x, y) in region {
            corners.push(grid.cell_origin(x, y));
            corners.push(grid.cell_origin(x + 1, y));
            corners.push(grid.cell_origin(x, y + 1));
            corners.push(grid.cell_origin(x + 1, y + 1));
            centroid += grid.cell_center(x, y);
            score_sum += scores[y * grid.width() + x];
        }

        let n = region.len() as f32;
        let contour = convex_hull(&corners);
        let area = polygon_area(&contour);
        if area <= 0.0 {
            return None;
        }
        let bounding_box = Rect::bounding(&contour)?;

        // Mean score mapped so that the threshold reads 0.5 and a saturated
        // score reads 1.0.
        let mean_score = score_sum / n;
        let headroom = (1.0 - threshold).max(f32::EPSILON);
        let confidence = (0.5 + 0.5 * (mean_score - threshold) / headroom).clamp(0.0, 1.0);

        Some(TumorBoundary {
            perimeter: polygon_perimeter(&contour),
            contour,
            area,
            centroid: centroid / n,
            bounding_box,
            confidence,
        })
    }
}

/// Greedy IoU suppression: most confident first, drop anything overlapping a
/// kept boundary above `iou_threshold`.
pub fn suppress_overlaps(
    mut candidates: Vec<TumorBoundary>,
    iou_threshold: f32,
    max_kept: usize,
) -> Vec<TumorBoundary> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
            .then(b.area.total_cmp(&a.area))
    });

    let mut kept: Vec<TumorBoundary> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_kept {
            break;
        }
        let overlaps = kept
            .iter()
            .any(|k| k.bounding_box.iou(candidate.bounding_box) > iou_threshold);
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use endoguide_core::PixelBuffer;

    fn segmenter() -> TumorSegmenter {
        TumorSegmenter::new(SegmentationConfig::default())
    }

    fn boundary(rect: Rect, confidence: f32) -> TumorBoundary {
        TumorBoundary {
            contour: vec![rect.min(), rect.max()],
            area: rect.area(),
            perimeter: 2.0 * (rect.width + rect.height),
            centroid: rect.center(),
            bounding_box: rect,
            confidence,
        }
    }

    #[test]
    fn test_detects_white_light_lesion() {
        let lesion = Rect::new(40.0, 30.0, 40.0, 30.0);
        let buffer = PixelBuffer::lesion_pattern(128, 96, lesion);
        let grid = AnalysisGrid::from_buffer(&buffer, 160).unwrap();

        let seg = segmenter().segment(&grid).unwrap();
        assert_eq!(seg.imaging_mode, ImagingMode::WhiteLight);
        assert_eq!(seg.boundaries.len(), 1);

        let primary = seg.primary().unwrap();
        assert!(primary.area > 0.0);
        assert!((primary.centroid - lesion.center()).length() < 2.0);
        assert!(primary.bounding_box.iou(lesion) > 0.7);
        assert!((0.5..=1.0).contains(&primary.confidence));
    }

    #[test]
    fn test_plain_mucosa_has_no_boundaries() {
        let buffer = PixelBuffer::solid(64, 48, [200, 150, 140]);
        let grid = AnalysisGrid::from_buffer(&buffer, 160).unwrap();
        let seg = segmenter().segment(&grid).unwrap();
        assert!(seg.is_empty());
        assert!(seg.primary().is_none());
    }

    #[test]
    fn test_narrow_band_mode_detected() {
        // Cyan-green background with a dark brown patch
        let mut buffer = PixelBuffer::solid(64, 64, [90, 140, 150]);
        for y in 20..40 {
            let row = buffer.row_mut(y);
            for x in 20..40usize {
                row[x * 3..x * 3 + 3].copy_from_slice(&[110, 60, 50]);
            }
        }
        let grid = AnalysisGrid::from_buffer(&buffer, 160).unwrap();
        let seg = segmenter().segment(&grid).unwrap();
        assert_eq!(seg.imaging_mode, ImagingMode::NarrowBand);
        assert_eq!(seg.boundaries.len(), 1);
        let bbox = seg.boundaries[0].bounding_box;
        assert_eq!(bbox, Rect::new(20.0, 20.0, 20.0, 20.0));
    }

    #[test]
    fn test_overlap_keeps_higher_confidence() {
        let a = boundary(Rect::new(0.0, 0.0, 10.0, 10.0), 0.6);
        let b = boundary(Rect::new(1.0, 0.0, 10.0, 10.0), 0.9);
        let c = boundary(Rect::new(50.0, 50.0, 10.0, 10.0), 0.7);

        let kept = suppress_overlaps(vec![a, b, c], 0.5, 8);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.7);
    }

    #[test]
    fn test_max_regions_caps_output() {
        let many = (0..5)
            .map(|i| boundary(Rect::new(i as f32 * 20.0, 0.0, 10.0, 10.0), 0.5 + i as f32 * 0.1))
            .collect();
        assert_eq!(suppress_overlaps(many, 0.5, 3).len(), 3);
    }

    #[test]
    fn test_tiny_grid_is_an_error() {
        let buffer = PixelBuffer::solid(1, 1, [0, 0, 0]);
        let grid = AnalysisGrid::from_buffer(&buffer, 160).unwrap();
        assert!(segmenter().segment(&grid).unwrap_err().is_transient());
    }
}
