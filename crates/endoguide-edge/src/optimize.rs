//! Per-device optimization strategies.
//!
//! Each device class resolves to one [`OptimizeFn`] at startup; nothing on
//! the per-frame path branches on hardware. Every returned wrapper still
//! implements [`InferenceCapability`], so callers never see the difference.

use crate::device::{DeviceClass, EdgeDeviceProfile, PrecisionMode};
use endoguide_core::{
    EndoGuideError, InferenceCapability, InputSpec, Prediction, PreprocessedFrame, Result,
    SharedInference,
};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use tracing::{debug, info};

/// Optimization routine for one device class.
pub type OptimizeFn = fn(SharedInference, &EdgeDeviceProfile) -> SharedInference;

const STRATEGIES: &[(DeviceClass, OptimizeFn)] = &[
    (DeviceClass::GenericCpu, passthrough),
    (DeviceClass::Gpu, optimize_cuda),
    (DeviceClass::Jetson, optimize_tensorrt),
    (DeviceClass::EdgeTpu, optimize_tflite_delegate),
    (DeviceClass::OpenVino, optimize_openvino),
    (DeviceClass::Npu, optimize_npu_delegate),
];

/// Look up the routine for `class`; anything without an entry gets the
/// generic CPU passthrough.
pub fn strategy_for(class: DeviceClass) -> OptimizeFn {
    STRATEGIES
        .iter()
        .find(|(c, _)| *c == class)
        .map_or(passthrough as OptimizeFn, |(_, f)| *f)
}

/// Adapt `model` to `profile`. With `serial` set, calls into the result are
/// serialized behind a mutex.
pub fn optimize(model: SharedInference, profile: &EdgeDeviceProfile, serial: bool) -> SharedInference {
    let optimized = strategy_for(profile.device_class)(model, profile);
    info!(
        device = %profile.device_class,
        model = optimized.name(),
        max_batch = profile.max_batch,
        serial,
        "Inference optimized"
    );
    if serial {
        Arc::new(SerializedInference::new(optimized))
    } else {
        optimized
    }
}

fn passthrough(model: SharedInference, _profile: &EdgeDeviceProfile) -> SharedInference {
    model
}

fn reduce_precision(model: SharedInference, profile: &EdgeDeviceProfile) -> SharedInference {
    match profile.precision_mode {
        PrecisionMode::Fp32 => model,
        mode => Arc::new(ReducedPrecision::new(model, mode, profile.backend_strategy.name())),
    }
}

fn batch_limited(model: SharedInference, profile: &EdgeDeviceProfile) -> SharedInference {
    Arc::new(BatchLimited::new(model, profile.max_batch))
}

/// Discrete GPU: half precision, up to a full batch in flight.
fn optimize_cuda(model: SharedInference, profile: &EdgeDeviceProfile) -> SharedInference {
    batch_limited(reduce_precision(model, profile), profile)
}

/// TensorRT engines are built for one input shape.
fn optimize_tensorrt(model: SharedInference, profile: &EdgeDeviceProfile) -> SharedInference {
    let engine = Arc::new(StaticShape::new(reduce_precision(model, profile), "tensorrt"));
    batch_limited(engine, profile)
}

/// The Edge TPU compiler fixes tensor shapes and runs one invocation at a
/// time.
fn optimize_tflite_delegate(model: SharedInference, profile: &EdgeDeviceProfile) -> SharedInference {
    let compiled = Arc::new(StaticShape::new(reduce_precision(model, profile), "edgetpu"));
    Arc::new(BatchLimited::new(compiled, 1))
}

/// OpenVINO reshapes on the fly, so only precision and batch apply.
fn optimize_openvino(model: SharedInference, profile: &EdgeDeviceProfile) -> SharedInference {
    batch_limited(reduce_precision(model, profile), profile)
}

fn optimize_npu_delegate(model: SharedInference, profile: &EdgeDeviceProfile) -> SharedInference {
    let quantized = match profile.precision_mode {
        PrecisionMode::Int8 => reduce_precision(model, profile),
        // The delegate only accepts integer tensors
        _ => Arc::new(ReducedPrecision::new(
            model,
            PrecisionMode::Int8,
            profile.backend_strategy.name(),
        )),
    };
    batch_limited(quantized, profile)
}

/// Runs the wrapped model on inputs rounded to a lower precision.
pub struct ReducedPrecision {
    inner: SharedInference,
    mode: PrecisionMode,
    name: String,
}

impl ReducedPrecision {
    pub fn new(inner: SharedInference, mode: PrecisionMode, backend: &str) -> Self {
        let suffix = match mode {
            PrecisionMode::Fp32 => "fp32",
            PrecisionMode::Fp16 => "fp16",
            PrecisionMode::Int8 => "int8",
        };
        let name = format!("{}@{backend}-{suffix}", inner.name());
        Self { inner, mode, name }
    }

    pub fn mode(&self) -> PrecisionMode {
        self.mode
    }

    /// Round `data` in place to the adapter's precision.
    pub fn quantize(&self, data: &mut [f32]) {
        match self.mode {
            PrecisionMode::Fp32 => {}
            PrecisionMode::Fp16 => data.iter_mut().for_each(|v| *v = truncate_to_half(*v)),
            PrecisionMode::Int8 => quantize_int8(data),
        }
    }
}

impl InferenceCapability for ReducedPrecision {
    fn infer(&self, input: &PreprocessedFrame) -> Result<Prediction> {
        let mut reduced = input.clone();
        self.quantize(&mut reduced.data);
        self.inner.infer(&reduced)
    }

    fn input_spec(&self) -> InputSpec {
        self.inner.input_spec()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Keep the 10 mantissa bits of an IEEE half. Exponent range is left alone.
fn truncate_to_half(v: f32) -> f32 {
    f32::from_bits(v.to_bits() & 0xFFFF_E000)
}

/// Symmetric per-tensor int8 quantization.
fn quantize_int8(data: &mut [f32]) {
    let max_abs = data.iter().fold(0.0f32, |m, v| m.max(v.abs()));
    if max_abs <= f32::EPSILON || !max_abs.is_finite() {
        return;
    }
    let scale = max_abs / 127.0;
    for v in data.iter_mut() {
        *v = (*v / scale).round().clamp(-127.0, 127.0) * scale;
    }
}

/// Serializes calls into a model that is not safe to call concurrently.
pub struct SerializedInference {
    inner: SharedInference,
    lock: Mutex<()>,
}

impl SerializedInference {
    pub fn new(inner: SharedInference) -> Self {
        Self {
            inner,
            lock: Mutex::new(()),
        }
    }
}

impl InferenceCapability for SerializedInference {
    fn infer(&self, input: &PreprocessedFrame) -> Result<Prediction> {
        let _guard = self.lock.lock();
        debug!(frame = %input.frame_id, "Serialized inference");
        self.inner.infer(input)
    }

    fn input_spec(&self) -> InputSpec {
        self.inner.input_spec()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// At most `max_batch` inferences in flight on the device at once. Extra
/// callers wait for a free slot.
pub struct BatchLimited {
    inner: SharedInference,
    max_batch: usize,
    in_flight: Mutex<usize>,
    slot_freed: Condvar,
}

impl BatchLimited {
    /// A `max_batch` of zero is treated as one.
    pub fn new(inner: SharedInference, max_batch: usize) -> Self {
        Self {
            inner,
            max_batch: max_batch.max(1),
            in_flight: Mutex::new(0),
            slot_freed: Condvar::new(),
        }
    }

    pub fn max_batch(&self) -> usize {
        self.max_batch
    }

    fn acquire(&self) -> BatchSlot<'_> {
        let mut in_flight = self.in_flight.lock();
        while *in_flight >= self.max_batch {
            self.slot_freed.wait(&mut in_flight);
        }
        *in_flight += 1;
        BatchSlot { owner: self }
    }
}

/// Returns its slot on drop, including when the model panics.
struct BatchSlot<'a> {
    owner: &'a BatchLimited,
}

impl Drop for BatchSlot<'_> {
    fn drop(&mut self) {
        *self.owner.in_flight.lock() -= 1;
        self.owner.slot_freed.notify_one();
    }
}

impl InferenceCapability for BatchLimited {
    fn infer(&self, input: &PreprocessedFrame) -> Result<Prediction> {
        let _slot = self.acquire();
        self.inner.infer(input)
    }

    fn input_spec(&self) -> InputSpec {
        self.inner.input_spec()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Rejects inputs whose shape differs from the model's declared
/// [`InputSpec`], as compiled accelerator graphs do.
pub struct StaticShape {
    inner: SharedInference,
    backend: &'static str,
}

impl StaticShape {
    pub fn new(inner: SharedInference, backend: &'static str) -> Self {
        Self { inner, backend }
    }
}

impl InferenceCapability for StaticShape {
    fn infer(&self, input: &PreprocessedFrame) -> Result<Prediction> {
        let spec = self.inner.input_spec();
        if (input.width, input.height, input.channels) != (spec.width, spec.height, spec.channels) {
            return Err(EndoGuideError::Inference(format!(
                "{} graph expects {}x{}x{}, got {}x{}x{}",
                self.backend,
                spec.width,
                spec.height,
                spec.channels,
                input.width,
                input.height,
                input.channels
            )));
        }
        self.inner.infer(input)
    }

    fn input_spec(&self) -> InputSpec {
        self.inner.input_spec()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
