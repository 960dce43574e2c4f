//! Binary lesion mask over the analysis grid.

use std::collections::VecDeque;

/// One byte per grid cell: 0 = background, 255 = lesion.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionMask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

/// Cells belonging to one 4-connected region.
pub type Region = Vec<(usize, usize)>;

impl RegionMask {
    /// Create an empty mask.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width * height],
        }
    }

    /// Get the mask value at (x, y). Returns 0 if out of bounds.
    pub fn get(&self, x: usize, y: usize) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.data[y * self.width + x]
    }

    /// Set the mask value at (x, y).
    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        if x < self.width && y < self.height {
            self.data[y * self.width + x] = value;
        }
    }

    /// Fraction of cells that are foreground.
    pub fn foreground_ratio(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let fg = self.data.iter().filter(|&&v| v > 128).count();
        fg as f32 / self.data.len() as f32
    }

    /// Dilate (positive) or erode (negative) by a square structuring element.
    pub fn expand_contract(&mut self, cells: i32) {
        let radius = cells.unsigned_abs() as usize;
        if radius == 0 {
            return;
        }
        let dilate = cells > 0;
        let (w, h) = (self.width, self.height);
        let mut output = vec![0u8; w * h];

        for y in 0..h {
            let (y0, y1) = (y.saturating_sub(radius), (y + radius + 1).min(h));
            for x in 0..w {
                let (x0, x1) = (x.saturating_sub(radius), (x + radius + 1).min(w));
                let mut window = (y0..y1).flat_map(|yi| (x0..x1).map(move |xi| (xi, yi)));
                let hit = if dilate {
                    window.any(|(xi, yi)| self.data[yi * w + xi] > 128)
                } else {
                    window.all(|(xi, yi)| self.data[yi * w + xi] > 128)
                };
                output[y * w + x] = if hit { 255 } else { 0 };
            }
        }

        self.data = output;
    }

    /// Morphological closing: fills pinholes and one-cell gaps.
    pub fn close(&mut self, cells: i32) {
        self.expand_contract(cells);
        self.expand_contract(-cells);
    }

    /// 4-connected foreground regions with at least `min_cells` cells.
    pub fn regions(&self, min_cells: usize) -> Vec<Region> {
        let (w, h) = (self.width, self.height);
        let mut visited = vec![false; w * h];
        let mut regions = Vec::new();
        let mut queue = VecDeque::new();

        for start in 0..w * h {
            if visited[start] || self.data[start] <= 128 {
                continue;
            }
            visited[start] = true;
            queue.push_back(start);
            let mut region = Vec::new();

            while let Some(idx) = queue.pop_front() {
                let (x, y) = (idx % w, idx / w);
                region.push((x, y));
                let neighbors = [
                    (x > 0).then(|| idx - 1),
                    (x + 1 < w).then(|| idx + 1),
                    (y > 0).then(|| idx - w),
                    (y + 1 < h).then(|| idx + w),
                ];
                for n in neighbors.into_iter().flatten() {
                    if !visited[n] && self.data[n] > 128 {
                        visited[n] = true;
                        queue.push_back(n);
                    }
                }
            }

            if region.len() >= min_cells.max(1) {
                regions.push(region);
            }
        }

        regions
    }
}
