//! Invasion depth estimation.
//!
//! A per-cell depth map is derived from two cues on the analysis grid:
//! darkness (deeper lesions absorb more light) and local texture, measured
//! as the standard deviation of luminance over a 3x3 neighbourhood. The map
//! is reduced to statistics over the primary tumor region and the mean depth
//! is bucketed into an [`InvasionLevel`] with the configured cut points.

use crate::grid::AnalysisGrid;
use crate::segmentation::TumorBoundary;
use endoguide_core::geometry::polygon_contains;
use endoguide_core::{DepthConfig, EndoGuideError, InvasionLevel, Result};
use serde::{Deserialize, Serialize};

/// Largest possible standard deviation of values in [0, 1].
const MAX_STD: f32 = 0.5;

/// Reduced depth statistics for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthEstimate {
    pub mean_depth_mm: f32,
    pub min_depth_mm: f32,
    pub max_depth_mm: f32,
    pub invasion_level: InvasionLevel,
    /// Agreement of the depth map inside the region, in [0, 1].
    pub confidence: f32,
}

/// Per-cell depth in millimetres, same shape as the analysis grid.
#[derive(Debug, Clone)]
pub struct DepthMap {
    pub width: usize,
    pub height: usize,
    pub depth_mm: Vec<f32>,
}

/// Depth estimation stage.
#[derive(Debug, Clone)]
pub struct DepthEstimator {
    config: DepthConfig,
}

impl DepthEstimator {
    pub fn new(config: DepthConfig) -> Self {
        Self { config }
    }

    /// Build the per-cell depth map.
    pub fn depth_map(&self, grid: &AnalysisGrid) -> Result<DepthMap> {
        let (w, h) = (grid.width(), grid.height());
        if w < 3 || h < 3 {
            return Err(EndoGuideError::analysis(
                "depth",
                format!("grid {w}x{h} too small for texture window"),
            ));
        }

        let luma: Vec<f32> = (0..h)
            .flat_map(|y| (0..w).map(move |x| (x, y)))
            .map(|(x, y)| grid.luminance(x, y))
            .collect();

        let total_weight = self.config.darkness_weight + self.config.texture_weight;
        let mut depth_mm = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                let darkness = 1.0 - luma[y * w + x];
                let texture = (local_std(&luma, w, h, x, y) / MAX_STD).min(1.0);
                let cue = (self.config.darkness_weight * darkness
                    + self.config.texture_weight * texture)
                    / total_weight;
                depth_mm.push(cue.clamp(0.0, 1.0) * self.config.full_scale_mm);
            }
        }

        Ok(DepthMap {
            width: w,
            height: h,
            depth_mm,
        })
    }

    /// Estimate depth over `region`, or over the whole frame when no tumor
    /// was segmented.
    pub fn estimate(
        &self,
        grid: &AnalysisGrid,
        region: Option<&TumorBoundary>,
    ) -> Result<DepthEstimate> {
        let map = self.depth_map(grid)?;

        let samples: Vec<f32> = match region {
            Some(boundary) => (0..map.height)
                .flat_map(|y| (0..map.width).map(move |x| (x, y)))
                .filter(|&(x, y)| polygon_contains(&boundary.contour, grid.cell_center(x, y)))
                .map(|(x, y)| map.depth_mm[y * map.width + x])
                .collect(),
            None => map.depth_mm.clone(),
        };

        if samples.is_empty() {
            return Err(EndoGuideError::analysis(
                "depth",
                "tumor region covers no grid cells",
            ));
        }

        let n = samples.len() as f32;
        let mean = samples.iter().sum::<f32>() / n;
        let min = samples.iter().copied().fold(f32::INFINITY, f32::min);
        let max = samples.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let variance = samples.iter().map(|d| (d - mean).powi(2)).sum::<f32>() / n;
        // Coefficient of variation; a uniform region is fully consistent.
        let spread = if mean > f32::EPSILON {
            variance.sqrt() / mean
        } else {
            0.0
        };

        Ok(DepthEstimate {
            // Guard against float drift so min <= mean <= max holds exactly
            mean_depth_mm: mean.clamp(min, max),
            min_depth_mm: min,
            max_depth_mm: max,
            invasion_level: self.config.level_for(mean),
            confidence: (1.0 - spread).clamp(0.0, 1.0),
        })
    }
}

/// Standard deviation of luminance in the 3x3 window around (x, y), clipped
/// at the grid border.
fn local_std(luma: &[f32], w: usize, h: usize, x: usize, y: usize) -> f32 {
    let (x0, x1) = (x.saturating_sub(1), (x + 2).min(w));
    let (y0, y1) = (y.saturating_sub(1), (y + 2).min(h));
    let window = || (y0..y1).flat_map(move |yi| (x0..x1).map(move |xi| luma[yi * w + xi]));
    let count = ((x1 - x0) * (y1 - y0)) as f32;
    let mean = window().sum::<f32>() / count;
    (window().map(|v| (v - mean).powi(2)).sum::<f32>() / count).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use endoguide_core::{PixelBuffer, Rect, Vec2};

    fn estimate_solid(rgb: [u8; 3]) -> DepthEstimate {
        let buffer = PixelBuffer::solid(32, 32, rgb);
        let grid = AnalysisGrid::from_buffer(&buffer, 160).unwrap();
        DepthEstimator::new(DepthConfig::default())
            .estimate(&grid, None)
            .unwrap()
    }

    #[test]
    fn test_bright_flat_tissue_is_superficial() {
        let est = estimate_solid([255, 255, 255]);
        assert_eq!(est.invasion_level, InvasionLevel::Superficial);
        assert!(est.mean_depth_mm < 0.01);
        assert!(est.confidence > 0.99);
    }

    #[test]
    fn test_dark_tissue_is_deep() {
        let est = estimate_solid([0, 0, 0]);
        assert_eq!(est.invasion_level, InvasionLevel::Deep);
        // Darkness weight 0.7 of a 10 mm full scale
        assert!((est.mean_depth_mm - 7.0).abs() < 1e-3);
    }

    #[test]
    fn test_mid_gray_is_moderate() {
        let est = estimate_solid([128, 128, 128]);
        assert_eq!(est.invasion_level, InvasionLevel::Moderate);
        assert!(est.min_depth_mm <= est.mean_depth_mm);
        assert!(est.mean_depth_mm <= est.max_depth_mm);
    }

    #[test]
    fn test_region_restricts_samples() {
        // Left half black, right half white; region over the white half only
        let mut buffer = PixelBuffer::solid(40, 20, [255, 255, 255]);
        for y in 0..20 {
            buffer.row_mut(y)[..20 * 3].fill(0);
        }
        let grid = AnalysisGrid::from_buffer(&buffer, 160).unwrap();
        let rect = Rect::new(25.0, 2.0, 12.0, 16.0);
        let region = TumorBoundary {
            contour: vec![
                rect.min(),
                Vec2::new(rect.max().x, rect.y),
                rect.max(),
                Vec2::new(rect.x, rect.max().y),
            ],
            area: rect.area(),
            perimeter: 56.0,
            centroid: rect.center(),
            bounding_box: rect,
            confidence: 0.9,
        };

        let estimator = DepthEstimator::new(DepthConfig::default());
        let est = estimator.estimate(&grid, Some(&region)).unwrap();
        assert_eq!(est.invasion_level, InvasionLevel::Superficial);
        let whole = estimator.estimate(&grid, None).unwrap();
        assert!(whole.max_depth_mm > est.max_depth_mm);
    }

    #[test]
    fn test_tiny_grid_fails() {
        let buffer = PixelBuffer::solid(2, 2, [10, 10, 10]);
        let grid = AnalysisGrid::from_buffer(&buffer, 160).unwrap();
        let err = DepthEstimator::new(DepthConfig::default())
            .depth_map(&grid)
            .unwrap_err();
        assert!(err.to_string().contains("depth"));
    }
}
