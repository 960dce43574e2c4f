//! Downsampled color grid the analysis stages work on.
//!
//! Full-resolution endoscope frames are far larger than the stages need, so
//! each frame is box-averaged once into a grid whose longest side is at most
//! `analysis_max_dim` cells. Coordinates produced by the stages are mapped back
//! to frame pixels through [`AnalysisGrid::cell_origin`].

use endoguide_core::{EndoGuideError, PixelBuffer, Result, Vec2};

/// Box-averaged RGB grid with values in [0, 1].
#[derive(Debug, Clone)]
pub struct AnalysisGrid {
    width: usize,
    height: usize,
    /// Frame pixels per grid cell along each axis.
    cell_size: u32,
    frame_width: u32,
    frame_height: u32,
    rgb: Vec<[f32; 3]>,
}

impl AnalysisGrid {
    /// Downsample a frame so its longest side is at most `max_dim` cells.
    pub fn from_buffer(buffer: &PixelBuffer, max_dim: u32) -> Result<Self> {
        if buffer.is_empty() {
            return Err(EndoGuideError::analysis("grid", "frame has no pixels"));
        }
        let max_dim = max_dim.max(1);
        let longest = buffer.width().max(buffer.height());
        let cell_size = longest.div_ceil(max_dim).max(1);
        let width = buffer.width().div_ceil(cell_size) as usize;
        let height = buffer.height().div_ceil(cell_size) as usize;

        let mut sums = vec![[0.0f32; 3]; width * height];
        let mut counts = vec![0u32; width * height];
        for y in 0..buffer.height() {
            let gy = (y / cell_size) as usize;
            for x in 0..buffer.width() {
                let gx = (x / cell_size) as usize;
                let idx = gy * width + gx;
                let [r, g, b] = buffer.rgb(x, y);
                sums[idx][0] += r as f32;
                sums[idx][1] += g as f32;
                sums[idx][2] += b as f32;
                counts[idx] += 1;
            }
        }

        let rgb = sums
            .into_iter()
            .zip(counts)
            .map(|(sum, count)| {
                let n = count.max(1) as f32 * 255.0;
                [sum[0] / n, sum[1] / n, sum[2] / n]
            })
            .collect();

        Ok(Self {
            width,
            height,
            cell_size,
            frame_width: buffer.width(),
            frame_height: buffer.height(),
            rgb,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rgb.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rgb.is_empty()
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.frame_width, self.frame_height)
    }

    /// Averaged RGB of a cell.
    #[inline]
    pub fn rgb(&self, x: usize, y: usize) -> [f32; 3] {
        self.rgb[y * self.width + x]
    }

    /// Rec. 601 luminance of a cell.
    #[inline]
    pub fn luminance(&self, x: usize, y: usize) -> f32 {
        let [r, g, b] = self.rgb(x, y);
        0.299 * r + 0.587 * g + 0.114 * b
    }

    /// Mean of each channel over the whole grid.
    pub fn channel_means(&self) -> [f32; 3] {
        let n = self.rgb.len().max(1) as f32;
        let sum = self.rgb.iter().fold([0.0f32; 3], |acc, c| {
            [acc[0] + c[0], acc[1] + c[1], acc[2] + c[2]]
        });
        [sum[0] / n, sum[1] / n, sum[2] / n]
    }

    /// Top-left corner of a cell in frame pixels, clamped to the frame.
    pub fn cell_origin(&self, x: usize, y: usize) -> Vec2 {
        let px = (x as u32 * self.cell_size).min(self.frame_width);
        let py = (y as u32 * self.cell_size).min(self.frame_height);
        Vec2::new(px as f32, py as f32)
    }

    /// Center of a cell in frame pixels.
    pub fn cell_center(&self, x: usize, y: usize) -> Vec2 {
        let min = self.cell_origin(x, y);
        let max = self.cell_origin(x + 1, y + 1);
        (min + max) * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use endoguide_core::PixelFormat;

    #[test]
    fn test_grid_respects_max_dim() {
        let buffer = PixelBuffer::solid(640, 480, [255, 0, 0]);
        let grid = AnalysisGrid::from_buffer(&buffer, 160).unwrap();
        assert_eq!(grid.width(), 160);
        assert_eq!(grid.height(), 120);
        assert_eq!(grid.rgb(10, 10), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_small_frames_keep_full_resolution() {
        let buffer = PixelBuffer::solid(20, 10, [0, 0, 0]);
        let grid = AnalysisGrid::from_buffer(&buffer, 160).unwrap();
        assert_eq!((grid.width(), grid.height()), (20, 10));
        assert_eq!(grid.cell_center(0, 0), Vec2::new(0.5, 0.5));
    }

    #[test]
    fn test_partial_edge_cells_are_averaged() {
        // 5 pixels wide at cell size 2 leaves a 1-pixel last column
        let data = vec![0, 0, 0, 0, 255];
        let buffer = PixelBuffer::from_raw(5, 1, PixelFormat::Gray8, data).unwrap();
        let grid = AnalysisGrid::from_buffer(&buffer, 3).unwrap();
        assert_eq!(grid.width(), 3);
        assert_eq!(grid.rgb(2, 0), [1.0, 1.0, 1.0]);
        assert_eq!(grid.cell_origin(3, 0).x, 5.0);
    }

    #[test]
    fn test_empty_frame_rejected() {
        let buffer = PixelBuffer::new(0, 0, PixelFormat::Rgb8);
        assert!(AnalysisGrid::from_buffer(&buffer, 64).is_err());
    }
}
