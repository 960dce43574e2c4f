//! Synthetic endoscope source and stand-in model for running without
//! hardware.

use endoguide_core::{
    FnInference, Frame, FrameIdGenerator, PixelBuffer, Prediction, PreprocessedFrame, Rect,
    SharedInference,
};
use std::thread;
use std::time::Duration;

/// Endless stream of frames with a lesion drifting across the view.
pub struct SyntheticSource {
    ids: FrameIdGenerator,
    width: u32,
    height: u32,
    tick: u32,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            ids: FrameIdGenerator::new(),
            width,
            height,
            tick: 0,
        }
    }

    pub fn next_frame(&mut self) -> Frame {
        let (w, h) = (self.width as f32, self.height as f32);
        let phase = (self.tick % 240) as f32 / 240.0 * std::f32::consts::TAU;
        self.tick = self.tick.wrapping_add(1);

        let size = (w * 0.25, h * 0.25);
        let cx = w * 0.5 + phase.cos() * w * 0.3;
        let cy = h * 0.5 + phase.sin() * h * 0.2;
        let lesion = Rect::new(cx - size.0 * 0.5, cy - size.1 * 0.5, size.0, size.1);

        Frame::new(
            self.ids.next_id(),
            PixelBuffer::lesion_pattern(self.width, self.height, lesion),
        )
    }
}

/// Model that sleeps for `latency` and labels the frame by mean intensity.
pub fn simulated_model(latency: Duration) -> SharedInference {
    FnInference::new(move |input: &PreprocessedFrame| {
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        let mean = input.data.iter().sum::<f32>() / input.len().max(1) as f32;
        let label = if mean < 0.0 { "suspicious" } else { "normal" };
        Ok(Prediction::new(label, 0.5 + mean.abs().min(1.0) * 0.5))
    })
    .with_name("simulated")
    .shared()
}
