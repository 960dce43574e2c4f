//! EndoGuide Analysis - Clinical analysis stages
//!
//! Runs on the raw frame after inference:
//! - Tumor segmentation with imaging-mode detection
//! - Invasion depth estimation
//! - Safe resection margin planning

pub mod depth;
pub mod grid;
pub mod margin;
pub mod mask;
pub mod segmentation;

pub use depth::{DepthEstimate, DepthEstimator, DepthMap};
pub use grid::AnalysisGrid;
pub use margin::{MarginCalculator, SafeMargin};
pub use mask::{Region, RegionMask};
pub use segmentation::{suppress_overlaps, ImagingMode, Segmentation, TumorBoundary, TumorSegmenter};

use endoguide_core::{PipelineConfig, PixelBuffer, Result};

/// The three analysis stages configured from one pipeline config.
#[derive(Debug, Clone)]
pub struct AnalysisStages {
    pub segmenter: TumorSegmenter,
    pub depth: DepthEstimator,
    pub margin: MarginCalculator,
}

impl AnalysisStages {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            segmenter: TumorSegmenter::new(config.segmentation.clone()),
            depth: DepthEstimator::new(config.depth.clone()),
            margin: MarginCalculator::new(
                config.margin_standards.clone(),
                config.pixels_per_mm,
                config.safety.clone(),
            ),
        }
    }

    /// Downsample a frame for the stages.
    pub fn grid(&self, buffer: &PixelBuffer) -> Result<AnalysisGrid> {
        AnalysisGrid::from_buffer(buffer, self.segmenter.config().analysis_max_dim)
    }
}
