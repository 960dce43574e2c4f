//! Resize and normalize a frame into model input.

use endoguide_core::{EndoGuideError, Frame, InputSpec, PreprocessedFrame, Result};

/// Bilinear-resize `frame` to `spec` and normalize each channel as
/// `(value / 255 - mean) / std`. Output is interleaved HWC `f32`.
pub fn preprocess(frame: &Frame, spec: &InputSpec) -> Result<PreprocessedFrame> {
    let buffer = frame.buffer();
    if buffer.is_empty() {
        return Err(EndoGuideError::Preprocess(format!(
            "frame {} has no pixels",
            frame.id()
        )));
    }
    if spec.width == 0 || spec.height == 0 {
        return Err(EndoGuideError::Preprocess(format!(
            "model input {}x{} is empty",
            spec.width, spec.height
        )));
    }
    if spec.channels != 1 && spec.channels != 3 {
        return Err(EndoGuideError::Preprocess(format!(
            "unsupported model input channels: {}",
            spec.channels
        )));
    }
    if spec.std[..spec.channels].iter().any(|s| s.abs() <= f32::EPSILON) {
        return Err(EndoGuideError::Preprocess(
            "model input std must be non-zero".to_string(),
        ));
    }

    let (w, h) = (buffer.width(), buffer.height());
    let (out_w, out_h) = (spec.width, spec.height);
    let scale_x = w as f32 / out_w as f32;
    let scale_y = h as f32 / out_h as f32;
    let mut data = Vec::with_capacity(out_w as usize * out_h as usize * spec.channels);

    for oy in 0..out_h {
        // Sample at pixel centers
        let sy = ((oy as f32 + 0.5) * scale_y - 0.5).max(0.0);
        let y0 = (sy.floor() as u32).min(h - 1);
        let y1 = (y0 + 1).min(h - 1);
        let fy = sy - y0 as f32;

        for ox in 0..out_w {
            let sx = ((ox as f32 + 0.5) * scale_x - 0.5).max(0.0);
            let x0 = (sx.floor() as u32).min(w - 1);
            let x1 = (x0 + 1).min(w - 1);
            let fx = sx - x0 as f32;

            let (p00, p10) = (buffer.rgb(x0, y0), buffer.rgb(x1, y0));
            let (p01, p11) = (buffer.rgb(x0, y1), buffer.rgb(x1, y1));
            let mut rgb = [0.0f32; 3];
            for c in 0..3 {
                let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
                let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
                rgb[c] = (top * (1.0 - fy) + bottom * fy) / 255.0;
            }

            if spec.channels == 1 {
                let luma = 0.299 * rgb[0] + 0.587 * rgb[1] + 0.114 * rgb[2];
                data.push((luma - spec.mean[0]) / spec.std[0]);
            } else {
                for c in 0..3 {
                    data.push((rgb[c] - spec.mean[c]) / spec.std[c]);
                }
            }
        }
    }

    Ok(PreprocessedFrame {
        frame_id: frame.id(),
        width: out_w,
        height: out_h,
        channels: spec.channels,
        data,
    })
}
