//! Integration tests for device probing and dispatch.
//!
//! Exercises endoguide-edge probing with the pipeline built on top of it.

use endoguide_core::{EndoGuideError, FnInference, PipelineConfig, Prediction, PreprocessedFrame, Result};
use endoguide_edge::{
    detect_device_with, optimize, strategy_for, DeviceClass, EnvironmentProbe, ProbeSource,
};
use endoguide_pipeline::StreamProcessor;
use std::path::Path;

// ── Helpers ────────────────────────────────────────────────────

struct OverrideProbe(&'static str);

impl EnvironmentProbe for OverrideProbe {
    fn device_override(&self) -> Result<Option<String>> {
        Ok(Some(self.0.to_string()))
    }

    fn path_exists(&self, _path: &Path) -> bool {
        true
    }

    fn has_tool(&self, _name: &str) -> bool {
        true
    }
}

struct BrokenProbe;

impl EnvironmentProbe for BrokenProbe {
    fn device_override(&self) -> Result<Option<String>> {
        Err(EndoGuideError::DeviceProbe("environment unreadable".into()))
    }

    fn path_exists(&self, _path: &Path) -> bool {
        false
    }

    fn has_tool(&self, _name: &str) -> bool {
        false
    }
}

fn model() -> endoguide_core::SharedInference {
    FnInference::new(|_: &PreprocessedFrame| Ok(Prediction::new("x", 1.0)))
        .with_name("base")
        .shared()
}

// ── Fallback ───────────────────────────────────────────────────

#[test]
fn unknown_device_falls_back_to_generic_cpu_every_time() {
    let probe = OverrideProbe("tpu-v9000");
    let profiles: Vec<_> = (0..3).map(|_| detect_device_with(&probe)).collect();
    assert!(profiles.iter().all(|p| p.device_class == DeviceClass::GenericCpu));
    assert!(profiles.iter().all(|p| p.probe_source == ProbeSource::Fallback));
    assert_eq!(profiles[0], profiles[2]);

    let sp = StreamProcessor::with_profile(PipelineConfig::default(), model(), profiles[0].clone())
        .unwrap();
    assert_eq!(sp.health().model, "base");
}

#[test]
fn broken_probe_is_never_fatal() {
    let profile = detect_device_with(&BrokenProbe);
    assert_eq!(profile.device_class, DeviceClass::GenericCpu);
}

#[test]
fn override_beats_hardware_signatures() {
    // Every node and tool "exists", yet the override decides
    let profile = detect_device_with(&OverrideProbe("accelerator_d"));
    assert_eq!(profile.device_class, DeviceClass::Npu);
    assert_eq!(profile.probe_source, ProbeSource::Override);
}

// ── Dispatch ───────────────────────────────────────────────────

#[test]
fn serial_flag_keeps_calling_convention() {
    let profile = detect_device_with(&OverrideProbe("openvino"));
    let optimized = optimize(model(), &profile, true);
    let input = PreprocessedFrame {
        frame_id: endoguide_core::FrameId(0),
        width: 1,
        height: 1,
        channels: 3,
        data: vec![0.1, 0.2, 0.3],
    };
    assert_eq!(optimized.infer(&input).unwrap().label, "x");
    assert_eq!(optimized.name(), "base@openvino-fp16");
}

#[test]
fn strategy_table_covers_every_class() {
    for class in DeviceClass::ALL {
        let profile = endoguide_edge::EdgeDeviceProfile::for_class(class, ProbeSource::Configured);
        let optimized = strategy_for(class)(model(), &profile);
        assert_eq!(optimized.input_spec(), model().input_spec());
    }
}
