//! Contract for the externally supplied inference capability.
//!
//! The pipeline treats the model as an opaque callable. Implementations must
//! be safe to call concurrently from several worker threads; a model that is
//! not can still be used by enabling `serial_inference`, which makes the
//! dispatcher wrap it in a mutex.

use crate::error::Result;
use crate::frame::FrameId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Class label and confidence returned by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
}

impl Prediction {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Input shape and normalization the model expects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub width: u32,
    pub height: u32,
    /// 1 (luminance) or 3 (RGB).
    pub channels: usize,
    /// Per-channel mean subtracted after scaling to [0, 1].
    pub mean: [f32; 3],
    /// Per-channel standard deviation divided out after mean subtraction.
    pub std: [f32; 3],
}

impl Default for InputSpec {
    /// 224x224 RGB with ImageNet statistics.
    fn default() -> Self {
        Self {
            width: 224,
            height: 224,
            channels: 3,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

/// A frame resized and normalized to a model's [`InputSpec`].
///
/// `data` is interleaved (HWC) `f32`.
#[derive(Debug, Clone)]
pub struct PreprocessedFrame {
    pub frame_id: FrameId,
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub data: Vec<f32>,
}

impl PreprocessedFrame {
    /// Number of scalar elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The one capability this core consumes.
pub trait InferenceCapability: Send + Sync {
    /// Run the model on a preprocessed frame.
    fn infer(&self, input: &PreprocessedFrame) -> Result<Prediction>;

    /// Shape the preprocessing stage must produce.
    fn input_spec(&self) -> InputSpec {
        InputSpec::default()
    }

    /// Name used in logs.
    fn name(&self) -> &str {
        "model"
    }
}

/// Shared handle to an inference capability.
pub type SharedInference = Arc<dyn InferenceCapability>;

/// Adapter turning a closure into an [`InferenceCapability`].
pub struct FnInference<F> {
    name: String,
    spec: InputSpec,
    f: F,
}

impl<F> FnInference<F>
where
    F: Fn(&PreprocessedFrame) -> Result<Prediction> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            name: "closure".to_string(),
            spec: InputSpec::default(),
            f,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_input_spec(mut self, spec: InputSpec) -> Self {
        self.spec = spec;
        self
    }

    /// Box into a shared handle.
    pub fn shared(self) -> SharedInference
    where
        F: 'static,
    {
        Arc::new(self)
    }
}

impl<F> InferenceCapability for FnInference<F>
where
    F: Fn(&PreprocessedFrame) -> Result<Prediction> + Send + Sync,
{
    fn infer(&self, input: &PreprocessedFrame) -> Result<Prediction> {
        (self.f)(input)
    }

    fn input_spec(&self) -> InputSpec {
        self.spec
    }

    fn name(&self) -> &str {
        &self.name
    }
}
