//! Frame types for endoscopic video frames in CPU memory.
//!
//! A [`Frame`] is immutable once created. It is moved into the frame queue on
//! submission and moved out again by the worker that processes it.

use crate::error::{EndoGuideError, Result};
use crate::geometry::Rect;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Monotonically increasing identifier of a frame within one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameId(pub u64);

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out increasing frame ids. Safe to share between producer threads.
#[derive(Debug, Default)]
pub struct FrameIdGenerator {
    next: AtomicU64,
}

impl FrameIdGenerator {
    /// Create a generator whose first id is 0.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create a generator whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> FrameId {
        FrameId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Pixel format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGB (24 bits per pixel)
    #[default]
    Rgb8,
    /// 8-bit RGBA (32 bits per pixel)
    Rgba8,
    /// 8-bit grayscale
    Gray8,
}

impl PixelFormat {
    /// Number of interleaved channels.
    pub fn channels(self) -> usize {
        match self {
            Self::Rgb8 => 3,
            Self::Rgba8 => 4,
            Self::Gray8 => 1,
        }
    }

    /// Calculate total bytes needed for a frame of this format.
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.channels()
    }
}

/// Interleaved 8-bit pixel data, row-major, no row padding.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    format: PixelFormat,
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Create a zero-filled buffer.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            format,
            width,
            height,
            data: vec![0u8; format.frame_size(width, height)],
        }
    }

    /// Wrap existing pixel data. Fails if the length does not match the shape.
    pub fn from_raw(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let expected = format.frame_size(width, height);
        if data.len() != expected {
            return Err(EndoGuideError::Preprocess(format!(
                "pixel data has {} bytes, {}x{} {:?} needs {}",
                data.len(),
                width,
                height,
                format,
                expected
            )));
        }
        Ok(Self {
            format,
            width,
            height,
            data,
        })
    }

    /// Create a buffer filled with a single RGB color.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut buffer = Self::new(width, height, PixelFormat::Rgb8);
        for px in buffer.data.chunks_exact_mut(3) {
            px.copy_from_slice(&rgb);
        }
        buffer
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    /// Raw interleaved bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// True when the buffer holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Total memory usage of the pixel data in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len()
    }

    /// Get a row of pixel data.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * self.channels();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// Get a mutable row of pixel data.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let stride = self.width as usize * self.channels();
        let start = y as usize * stride;
        &mut self.data[start..start + stride]
    }

    /// RGB value at (x, y). Grayscale is replicated, alpha is ignored.
    #[inline]
    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let c = self.channels();
        let i = (y as usize * self.width as usize + x as usize) * c;
        match self.format {
            PixelFormat::Gray8 => [self.data[i]; 3],
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => {
                [self.data[i], self.data[i + 1], self.data[i + 2]]
            }
        }
    }

    /// Synthetic endoscopic view: pink mucosa with a darker, redder lesion
    /// filling the ellipse inscribed in `lesion`.
    pub fn lesion_pattern(width: u32, height: u32, lesion: Rect) -> Self {
        let mut buffer = Self::solid(width, height, [200, 150, 140]);
        let center = lesion.center();
        let rx = (lesion.width * 0.5).max(1.0);
        let ry = (lesion.height * 0.5).max(1.0);

        for y in 0..height {
            let row = buffer.row_mut(y);
            for x in 0..width {
                let dx = (x as f32 + 0.5 - center.x) / rx;
                let dy = (y as f32 + 0.5 - center.y) / ry;
                let d2 = dx * dx + dy * dy;
                if d2 <= 1.0 {
                    // Darker towards the lesion center
                    let shade = (1.0 - d2) * 40.0;
                    let i = x as usize * 3;
                    row[i] = (170.0 - shade) as u8;
                    row[i + 1] = (60.0 - shade * 0.5) as u8;
                    row[i + 2] = (55.0 - shade * 0.5) as u8;
                }
            }
        }

        buffer
    }
}

/// A single image sample taken from the live video source.
#[derive(Debug, Clone)]
pub struct Frame {
    frame_id: FrameId,
    ingestion_timestamp: SystemTime,
    buffer: PixelBuffer,
}

impl Frame {
    /// Create a frame stamped with the current wall-clock time.
    pub fn new(frame_id: FrameId, buffer: PixelBuffer) -> Self {
        Self::with_timestamp(frame_id, buffer, SystemTime::now())
    }

    /// Create a frame with an explicit ingestion timestamp.
    pub fn with_timestamp(frame_id: FrameId, buffer: PixelBuffer, ingested: SystemTime) -> Self {
        Self {
            frame_id,
            ingestion_timestamp: ingested,
            buffer,
        }
    }

    #[inline]
    pub fn id(&self) -> FrameId {
        self.frame_id
    }

    #[inline]
    pub fn ingestion_timestamp(&self) -> SystemTime {
        self.ingestion_timestamp
    }

    #[inline]
    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.buffer.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.buffer.height
    }
}
