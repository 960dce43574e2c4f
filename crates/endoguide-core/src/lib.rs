//! EndoGuide Core - Foundation types for endoscopic frame analysis
//!
//! This crate provides the fundamental types used throughout EndoGuide:
//! - Frames and pixel buffers
//! - Geometric primitives for contours
//! - Clinical vocabulary (invasion levels, margin standards)
//! - Pipeline configuration and validation
//! - The inference capability contract

pub mod clinical;
pub mod config;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod inference;

pub use clinical::{InvasionLevel, MarginStandards};
pub use config::{DepthConfig, PipelineConfig, SafetyThresholds, SegmentationConfig};
pub use error::{EndoGuideError, ErrorClass, Result};
pub use frame::{Frame, FrameId, FrameIdGenerator, PixelBuffer, PixelFormat};
pub use geometry::{Rect, Vec2};
pub use inference::{
    FnInference, InferenceCapability, InputSpec, Prediction, PreprocessedFrame, SharedInference,
};
