//! Pipeline configuration.
//!
//! Every field has a default so a JSON file only needs the keys it changes.
//! [`PipelineConfig::validate`] runs before a pipeline is constructed; an
//! invalid configuration never reaches `start()`.

use crate::clinical::{InvasionLevel, MarginStandards};
use crate::error::{EndoGuideError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Top-level configuration recognized by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frames held in the input queue before drop-oldest kicks in.
    pub queue_capacity: usize,
    /// Results held for the consumer before drop-oldest kicks in.
    pub result_capacity: usize,
    /// Number of worker threads.
    pub worker_count: usize,
    /// Latency budget per frame; slower frames count as violations.
    pub max_latency_ms: f64,
    /// Frame rate the source is expected to deliver.
    pub target_fps: u32,
    /// Serialize calls into the inference capability.
    pub serial_inference: bool,
    /// Calibration from millimetres to frame pixels.
    pub pixels_per_mm: f32,
    /// Required resection margin per invasion level.
    pub margin_standards: MarginStandards,
    pub depth: DepthConfig,
    pub segmentation: SegmentationConfig,
    pub safety: SafetyThresholds,
    /// Number of latency samples kept by the performance monitor.
    pub monitor_window: usize,
    /// How long an idle worker waits on the queue before re-checking the stop flag.
    pub poll_interval_ms: u64,
    /// Upper bound on how long `stop()` waits for workers to exit.
    pub shutdown_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 5,
            result_capacity: 64,
            worker_count: 1,
            max_latency_ms: 200.0,
            target_fps: 30,
            serial_inference: false,
            pixels_per_mm: 10.0,
            margin_standards: MarginStandards::default(),
            depth: DepthConfig::default(),
            segmentation: SegmentationConfig::default(),
            safety: SafetyThresholds::default(),
            monitor_window: 300,
            poll_interval_ms: 20,
            shutdown_timeout_ms: 2_000,
        }
    }
}

/// Depth-map model and invasion-level cut points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthConfig {
    /// Mean depths up to this value are superficial.
    pub superficial_max_mm: f32,
    /// Mean depths up to this value (and above `superficial_max_mm`) are moderate.
    pub moderate_max_mm: f32,
    /// Depth assigned to a fully dark, fully textured pixel.
    pub full_scale_mm: f32,
    /// Contribution of darkness to the depth map.
    pub darkness_weight: f32,
    /// Contribution of local texture variance to the depth map.
    pub texture_weight: f32,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            superficial_max_mm: 2.0,
            moderate_max_mm: 5.0,
            full_scale_mm: 10.0,
            darkness_weight: 0.7,
            texture_weight: 0.3,
        }
    }
}

impl DepthConfig {
    /// Bucket a depth in millimetres.
    pub fn level_for(&self, depth_mm: f32) -> InvasionLevel {
        if depth_mm <= self.superficial_max_mm {
            InvasionLevel::Superficial
        } else if depth_mm <= self.moderate_max_mm {
            InvasionLevel::Moderate
        } else {
            InvasionLevel::Deep
        }
    }
}

/// Tumor segmentation tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Longest side of the grid the score map is computed on.
    pub analysis_max_dim: u32,
    /// Frames whose red mean is below this fraction of the green/blue mean are narrow-band.
    pub nbi_red_ratio: f32,
    /// Lesion score cut-off under white light.
    pub white_light_threshold: f32,
    /// Lesion score cut-off under narrow-band imaging.
    pub narrow_band_threshold: f32,
    /// Regions smaller than this (in grid cells) are ignored.
    pub min_region_pixels: usize,
    /// Overlapping candidates above this IoU keep only the most confident one.
    pub iou_threshold: f32,
    /// Maximum number of boundaries reported per frame.
    pub max_regions: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            analysis_max_dim: 160,
            nbi_red_ratio: 0.85,
            white_light_threshold: 0.3,
            narrow_band_threshold: 0.6,
            min_region_pixels: 12,
            iou_threshold: 0.5,
            max_regions: 8,
        }
    }
}

/// Safety-score cut points driving the recommendation templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyThresholds {
    /// Scores below this are flagged as insufficient.
    pub caution: f32,
    /// Scores at or above this are reported as adequate.
    pub adequate: f32,
}

impl Default for SafetyThresholds {
    fn default() -> Self {
        Self {
            caution: 0.5,
            adequate: 0.8,
        }
    }
}

impl PipelineConfig {
    /// Parse a JSON document. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        debug!(path = %path.display(), "Loaded pipeline config");
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Check every invariant the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: f64) -> Result<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(EndoGuideError::config(format!(
                    "{name} must be positive, got {value}"
                )))
            }
        }

        if self.queue_capacity == 0 {
            return Err(EndoGuideError::config("queue_capacity must be at least 1"));
        }
        if self.result_capacity == 0 {
            return Err(EndoGuideError::config("result_capacity must be at least 1"));
        }
        if self.worker_count == 0 {
            return Err(EndoGuideError::config("worker_count must be at least 1"));
        }
        if self.target_fps == 0 {
            return Err(EndoGuideError::config("target_fps must be at least 1"));
        }
        if self.monitor_window == 0 {
            return Err(EndoGuideError::config("monitor_window must be at least 1"));
        }
        if self.poll_interval_ms == 0 {
            return Err(EndoGuideError::config("poll_interval_ms must be at least 1"));
        }
        positive("max_latency_ms", self.max_latency_ms)?;
        positive("pixels_per_mm", self.pixels_per_mm as f64)?;
        self.margin_standards
            .validate()
            .map_err(EndoGuideError::Configuration)?;

        let depth = &self.depth;
        positive("depth.superficial_max_mm", depth.superficial_max_mm as f64)?;
        positive("depth.full_scale_mm", depth.full_scale_mm as f64)?;
        if !depth.moderate_max_mm.is_finite()
            || depth.moderate_max_mm <= depth.superficial_max_mm
        {
            return Err(EndoGuideError::config(
                "depth.moderate_max_mm must exceed depth.superficial_max_mm",
            ));
        }
        if !(depth.darkness_weight.is_finite() && depth.texture_weight.is_finite())
            || depth.darkness_weight < 0.0
            || depth.texture_weight < 0.0
            || depth.darkness_weight + depth.texture_weight <= 0.0
        {
            return Err(EndoGuideError::config(
                "depth weights must be non-negative and not both zero",
            ));
        }

        let seg = &self.segmentation;
        if seg.analysis_max_dim < 8 {
            return Err(EndoGuideError::config(
                "segmentation.analysis_max_dim must be at least 8",
            ));
        }
        if !(seg.iou_threshold > 0.0 && seg.iou_threshold <= 1.0) {
            return Err(EndoGuideError::config(
                "segmentation.iou_threshold must be in (0, 1]",
            ));
        }
        if seg.max_regions == 0 {
            return Err(EndoGuideError::config(
                "segmentation.max_regions must be at least 1",
            ));
        }
        positive("segmentation.nbi_red_ratio", seg.nbi_red_ratio as f64)?;
        for (name, threshold) in [
            ("segmentation.white_light_threshold", seg.white_light_threshold),
            ("segmentation.narrow_band_threshold", seg.narrow_band_threshold),
        ] {
            if !threshold.is_finite() {
                return Err(EndoGuideError::config(format!("{name} must be finite")));
            }
        }

        let safety = &self.safety;
        if !(0.0..=1.0).contains(&safety.caution)
            || !(0.0..=1.0).contains(&safety.adequate)
            || safety.caution >= safety.adequate
        {
            return Err(EndoGuideError::config(
                "safety thresholds must satisfy 0 <= caution < adequate <= 1",
            ));
        }

        Ok(())
    }
}
