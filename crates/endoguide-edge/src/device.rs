//! Device classification.

use endoguide_core::{EndoGuideError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Environment variable that pins the device class by name.
pub const DEVICE_OVERRIDE_ENV: &str = "ENDOGUIDE_DEVICE";

/// Category of compute hardware with its own optimization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    GenericCpu,
    Gpu,
    /// NVIDIA Jetson module (accelerator_a).
    Jetson,
    /// Coral Edge TPU (accelerator_b).
    EdgeTpu,
    /// Intel OpenVINO target (accelerator_c).
    OpenVino,
    /// Vendor NPU behind the kernel accel interface (accelerator_d).
    Npu,
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 6] = [
        Self::GenericCpu,
        Self::Gpu,
        Self::Jetson,
        Self::EdgeTpu,
        Self::OpenVino,
        Self::Npu,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::GenericCpu => "generic_cpu",
            Self::Gpu => "gpu",
            Self::Jetson => "jetson",
            Self::EdgeTpu => "edge_tpu",
            Self::OpenVino => "openvino",
            Self::Npu => "npu",
        }
    }

    /// Parse a class name. Accepts the canonical names and the
    /// `accelerator_a` .. `accelerator_d` aliases, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "generic_cpu" | "cpu" => Some(Self::GenericCpu),
            "gpu" | "cuda" => Some(Self::Gpu),
            "jetson" | "accelerator_a" => Some(Self::Jetson),
            "edge_tpu" | "edgetpu" | "accelerator_b" => Some(Self::EdgeTpu),
            "openvino" | "accelerator_c" => Some(Self::OpenVino),
            "npu" | "accelerator_d" => Some(Self::Npu),
            _ => None,
        }
    }

    pub fn precision_mode(self) -> PrecisionMode {
        match self {
            Self::GenericCpu => PrecisionMode::Fp32,
            Self::Gpu | Self::Jetson | Self::OpenVino => PrecisionMode::Fp16,
            Self::EdgeTpu | Self::Npu => PrecisionMode::Int8,
        }
    }

    pub fn backend_strategy(self) -> BackendStrategy {
        match self {
            Self::GenericCpu => BackendStrategy::Passthrough,
            Self::Gpu => BackendStrategy::Cuda,
            Self::Jetson => BackendStrategy::TensorRt,
            Self::EdgeTpu => BackendStrategy::TfLiteDelegate,
            Self::OpenVino => BackendStrategy::OpenVinoRuntime,
            Self::Npu => BackendStrategy::NpuDelegate,
        }
    }

    /// Most frames the backend has in flight at once.
    pub fn max_batch(self) -> usize {
        match self {
            Self::Gpu => 8,
            Self::Jetson | Self::OpenVino => 4,
            Self::GenericCpu | Self::EdgeTpu | Self::Npu => 1,
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric precision the model is run at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecisionMode {
    Fp32,
    Fp16,
    Int8,
}

/// Execution backend the model is handed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStrategy {
    Passthrough,
    Cuda,
    TensorRt,
    TfLiteDelegate,
    OpenVinoRuntime,
    NpuDelegate,
}

impl BackendStrategy {
    pub fn name(self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::Cuda => "cuda",
            Self::TensorRt => "tensorrt",
            Self::TfLiteDelegate => "tflite-delegate",
            Self::OpenVinoRuntime => "openvino",
            Self::NpuDelegate => "npu-delegate",
        }
    }
}

/// How the device class was decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeSource {
    /// Pinned through [`DEVICE_OVERRIDE_ENV`].
    Override,
    DeviceNode(PathBuf),
    VendorTool(String),
    /// Nothing recognized, or the probe failed.
    Fallback,
    /// Supplied by the caller instead of probed.
    Configured,
}

/// Read-only description of the hardware the pipeline runs on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDeviceProfile {
    pub device_class: DeviceClass,
    pub precision_mode: PrecisionMode,
    pub backend_strategy: BackendStrategy,
    pub max_batch: usize,
    pub probe_source: ProbeSource,
}

impl EdgeDeviceProfile {
    /// Profile with the class defaults for precision, backend and batch.
    pub fn for_class(device_class: DeviceClass, probe_source: ProbeSource) -> Self {
        Self {
            device_class,
            precision_mode: device_class.precision_mode(),
            backend_strategy: device_class.backend_strategy(),
            max_batch: device_class.max_batch(),
            probe_source,
        }
    }

    pub fn generic_cpu() -> Self {
        Self::for_class(DeviceClass::GenericCpu, ProbeSource::Fallback)
    }
}

/// The environment facts classification depends on.
pub trait EnvironmentProbe {
    /// Value of the device override, if set.
    fn device_override(&self) -> Result<Option<String>>;

    fn path_exists(&self, path: &Path) -> bool;

    /// Whether an executable is on `PATH`.
    fn has_tool(&self, name: &str) -> bool;
}

/// Probe backed by the real process environment and filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl EnvironmentProbe for SystemProbe {
    fn device_override(&self) -> Result<Option<String>> {
        match std::env::var(DEVICE_OVERRIDE_ENV) {
            Ok(value) if value.trim().is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(EndoGuideError::DeviceProbe(format!(
                "{DEVICE_OVERRIDE_ENV}: {e}"
            ))),
        }
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn has_tool(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }
}

/// One recognizable hardware signature.
enum Signature {
    Node(&'static str),
    Tool(&'static str),
}

/// Checked in order; the most specialized accelerators come first so that a
/// Jetson (which also exposes a GPU) is not classified as a plain GPU.
const SIGNATURES: &[(DeviceClass, Signature)] = &[
    (DeviceClass::Jetson, Signature::Node("/etc/nv_tegra_release")),
    (DeviceClass::Jetson, Signature::Node("/dev/nvhost-ctrl")),
    (DeviceClass::EdgeTpu, Signature::Node("/dev/apex_0")),
    (DeviceClass::EdgeTpu, Signature::Tool("edgetpu_compiler")),
    (DeviceClass::Npu, Signature::Node("/dev/accel/accel0")),
    (DeviceClass::Npu, Signature::Node("/dev/rknpu")),
    (DeviceClass::OpenVino, Signature::Node("/opt/intel/openvino")),
    (DeviceClass::OpenVino, Signature::Tool("benchmark_app")),
    (DeviceClass::Gpu, Signature::Node("/dev/nvidia0")),
    (DeviceClass::Gpu, Signature::Tool("nvidia-smi")),
    (DeviceClass::Gpu, Signature::Tool("rocm-smi")),
];

fn classify(probe: &dyn EnvironmentProbe) -> Result<(DeviceClass, ProbeSource)> {
    if let Some(name) = probe.device_override()? {
        return DeviceClass::from_name(&name)
            .map(|class| (class, ProbeSource::Override))
            .ok_or_else(|| {
                EndoGuideError::DeviceProbe(format!("unrecognized device class '{name}'"))
            });
    }

    for (class, signature) in SIGNATURES {
        let source = match signature {
            Signature::Node(path) => probe
                .path_exists(Path::new(path))
                .then(|| ProbeSource::DeviceNode(PathBuf::from(path))),
            Signature::Tool(tool) => probe
                .has_tool(tool)
                .then(|| ProbeSource::VendorTool(tool.to_string())),
        };
        if let Some(source) = source {
            return Ok((*class, source));
        }
    }

    Ok((DeviceClass::GenericCpu, ProbeSource::Fallback))
}

/// Classify the environment seen through `probe`. Never fails: a probe
/// error or an unrecognized override yields the generic CPU profile.
pub fn detect_device_with(probe: &dyn EnvironmentProbe) -> EdgeDeviceProfile {
    let profile = match classify(probe) {
        Ok((class, source)) => EdgeDeviceProfile::for_class(class, source),
        Err(e) => {
            warn!(error = %e, "Device probe failed, using generic_cpu");
            EdgeDeviceProfile::generic_cpu()
        }
    };
    info!(
        device = %profile.device_class,
        precision = ?profile.precision_mode,
        backend = profile.backend_strategy.name(),
        source = ?profile.probe_source,
        "Edge device profile"
    );
    profile
}

/// Probe the running system. The first call probes; later calls return the
/// same profile.
pub fn detect_device() -> EdgeDeviceProfile {
    static PROFILE: OnceLock<EdgeDeviceProfile> = OnceLock::new();
    PROFILE.get_or_init(|| detect_device_with(&SystemProbe)).clone()
}
