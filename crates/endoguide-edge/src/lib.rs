//! EndoGuide Edge - Hardware-adaptive inference dispatch
//!
//! The runtime is probed once at startup into an [`EdgeDeviceProfile`];
//! [`optimize`] then resolves the profile's device class through a strategy
//! table and wraps the caller's model accordingly. Unrecognized hardware
//! always lands on the generic CPU passthrough.

pub mod device;
pub mod optimize;

pub use device::{
    detect_device, detect_device_with, BackendStrategy, DeviceClass, EdgeDeviceProfile,
    EnvironmentProbe, PrecisionMode, ProbeSource, SystemProbe, DEVICE_OVERRIDE_ENV,
};
pub use optimize::{
    optimize, strategy_for, BatchLimited, OptimizeFn, ReducedPrecision, SerializedInference,
    StaticShape,
};
