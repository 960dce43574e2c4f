//! Single-frame processing: preprocess, infer, analyze, time.
//!
//! [`FrameProcessor::process`] never fails. Whatever goes wrong inside a
//! stage is recorded as a [`FrameFault`] on the result and the remaining
//! stages still run where their inputs allow.

use crate::monitor::PerformanceMonitor;
use crate::preprocess::preprocess;
use endoguide_analysis::{AnalysisStages, DepthEstimate, SafeMargin, Segmentation};
use endoguide_core::{
    EndoGuideError, Frame, FrameId, InferenceCapability, PipelineConfig, Prediction,
    PreprocessedFrame, Result,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::{debug, warn};

/// Step of the per-frame pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Preprocess,
    Inference,
    Segmentation,
    Depth,
    Margin,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Preprocess => "preprocess",
            Self::Inference => "inference",
            Self::Segmentation => "segmentation",
            Self::Depth => "depth",
            Self::Margin => "margin",
        };
        f.write_str(name)
    }
}

/// A stage failure captured on a degraded result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameFault {
    pub stage: PipelineStage,
    pub message: String,
}

/// Output for one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub frame_id: FrameId,
    /// Wall-clock time from dequeue to completion.
    pub processing_time_ms: f64,
    pub prediction: Option<Prediction>,
    pub segmentation: Option<Segmentation>,
    pub depth_estimate: Option<DepthEstimate>,
    pub safe_margin: Option<SafeMargin>,
    pub completed_at: SystemTime,
    /// `processing_time_ms` exceeded the configured budget.
    pub latency_violation: bool,
    pub faults: Vec<FrameFault>,
}

impl ProcessingResult {
    /// True when at least one stage failed.
    pub fn is_degraded(&self) -> bool {
        !self.faults.is_empty()
    }
}

/// Runs one frame through every stage and records its latency.
pub struct FrameProcessor {
    stages: AnalysisStages,
    monitor: Arc<PerformanceMonitor>,
}

impl FrameProcessor {
    pub fn new(config: &PipelineConfig, monitor: Arc<PerformanceMonitor>) -> Self {
        Self {
            stages: AnalysisStages::from_config(config),
            monitor,
        }
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn process(&self, frame: Frame, inference: &dyn InferenceCapability) -> ProcessingResult {
        let started = Instant::now();
        let frame_id = frame.id();
        let mut faults = Vec::new();
        let mut fault = |stage: PipelineStage, err: EndoGuideError| {
            warn!(frame = %frame_id, stage = %stage, error = %err, "Stage failed");
            faults.push(FrameFault {
                stage,
                message: err.to_string(),
            });
        };

        let prediction = match preprocess(&frame, &inference.input_spec()) {
            Ok(input) => match infer_guarded(inference, &input) {
                Ok(prediction) => Some(prediction),
                Err(e) => {
                    fault(PipelineStage::Inference, e);
                    None
                }
            },
            Err(e) => {
                fault(PipelineStage::Preprocess, e);
                None
            }
        };

        let (mut segmentation, mut depth_estimate, mut safe_margin) = (None, None, None);
        match self.stages.grid(frame.buffer()) {
            Ok(grid) => {
                match self.stages.segmenter.segment(&grid) {
                    Ok(seg) => segmentation = Some(seg),
                    Err(e) => fault(PipelineStage::Segmentation, e),
                }
                let primary = segmentation.as_ref().and_then(Segmentation::primary);

                match self.stages.depth.estimate(&grid, primary) {
                    Ok(depth) => depth_estimate = Some(depth),
                    Err(e) => fault(PipelineStage::Depth, e),
                }

                // Without depth the margin falls back to the deepest standard
                if let Some(boundary) = primary {
                    match self.stages.margin.calculate(
                        boundary,
                        depth_estimate.as_ref(),
                        frame.width(),
                        frame.height(),
                    ) {
                        Ok(margin) => safe_margin = Some(margin),
                        Err(e) => fault(PipelineStage::Margin, e),
                    }
                }
            }
            Err(e) => fault(PipelineStage::Segmentation, e),
        }

        let processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        let latency_violation = self.monitor.record(processing_time_ms);
        if latency_violation {
            warn!(
                frame = %frame_id,
                latency_ms = processing_time_ms,
                budget_ms = self.monitor.max_latency_ms(),
                "Latency budget exceeded"
            );
        }
        debug!(
            frame = %frame_id,
            latency_ms = processing_time_ms,
            faults = faults.len(),
            "Frame processed"
        );

        ProcessingResult {
            frame_id,
            processing_time_ms,
            prediction,
            segmentation,
            depth_estimate,
            safe_margin,
            completed_at: SystemTime::now(),
            latency_violation,
            faults,
        }
    }
}

/// Call the model, turning a panic into an inference error.
fn infer_guarded(inference: &dyn InferenceCapability, input: &PreprocessedFrame) -> Result<Prediction> {
    panic::catch_unwind(AssertUnwindSafe(|| inference.infer(input))).unwrap_or_else(|payload| {
        Err(EndoGuideError::Inference(format!(
            "model '{}' panicked: {}",
            inference.name(),
            panic_message(payload.as_ref())
        )))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
