//! Video frames and presentation timestamps.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Presentation timestamp in microseconds since the start of the capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const ZERO: Self = Self(0);

    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub fn from_duration(elapsed: Duration) -> Self {
        Self(elapsed.as_micros() as i64)
    }

    pub fn as_micros(&self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

/// Pixel layout of a frame's buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 32-bit BGRA, the camera's native delivery format
    Bgra8,
    /// 32-bit RGBA
    Rgba8,
}

impl Default for PixelFormat {
    fn default() -> Self {
        Self::Bgra8
    }
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        4
    }

    /// Wire tag used by the tracker bridge
    pub fn wire_tag(&self) -> u8 {
        match self {
            PixelFormat::Bgra8 => 0,
            PixelFormat::Rgba8 => 1,
        }
    }

    pub fn from_wire_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(PixelFormat::Bgra8),
            1 => Some(PixelFormat::Rgba8),
            _ => None,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelFormat::Bgra8 => write!(f, "bgra8"),
            PixelFormat::Rgba8 => write!(f, "rgba8"),
        }
    }
}

/// A decoded camera frame.
///
/// The pixel data is reference counted, so cloning a frame to hand it to the
/// tracker and then to the presenter never copies pixels. Rows may be padded:
/// `stride` is the distance in bytes between the starts of consecutive rows.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    data: Arc<[u8]>,
    timestamp: Timestamp,
}

impl VideoFrame {
    /// Wrap an existing buffer. Returns `None` if the buffer is too small for
    /// the given geometry.
    pub fn new(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        data: impl Into<Arc<[u8]>>,
        timestamp: Timestamp,
    ) -> Option<Self> {
        let data = data.into();
        let row_bytes = width as usize * format.bytes_per_pixel();
        if stride < row_bytes {
            return None;
        }
        let needed = match height {
            0 => 0,
            h => stride * (h as usize - 1) + row_bytes,
        };
        if data.len() < needed {
            return None;
        }

        Some(Self {
            width,
            height,
            stride,
            format,
            data,
            timestamp,
        })
    }

    /// Tightly packed frame filled with a single color (given in BGRA order)
    pub fn solid(width: u32, height: u32, bgra: [u8; 4], timestamp: Timestamp) -> Self {
        let data: Vec<u8> = bgra
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            stride: width as usize * 4,
            format: PixelFormat::Bgra8,
            data: data.into(),
            timestamp,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Bytes of row `y` without padding
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * self.format.bytes_per_pixel()]
    }

    /// Pixel at (x, y) in BGRA order regardless of the buffer's format
    pub fn pixel_bgra(&self, x: u32, y: u32) -> [u8; 4] {
        let i = x as usize * 4;
        let p = &self.row(y)[i..i + 4];
        match self.format {
            PixelFormat::Bgra8 => [p[0], p[1], p[2], p[3]],
            PixelFormat::Rgba8 => [p[2], p[1], p[0], p[3]],
        }
    }

    /// Copy the frame flipped around its vertical axis.
    pub fn mirrored(&self) -> Self {
        let bpp = self.format.bytes_per_pixel();
        let row_bytes = self.width as usize * bpp;
        let mut out = Vec::with_capacity(row_bytes * self.height as usize);

        for y in 0..self.height {
            let row = self.row(y);
            for px in row.chunks_exact(bpp).rev() {
                out.extend_from_slice(px);
            }
        }

        Self {
            width: self.width,
            height: self.height,
            stride: row_bytes,
            format: self.format,
            data: out.into(),
            timestamp: self.timestamp,
        }
    }

    /// Write the frame's pixels as tightly packed BGRA into `out`.
    pub fn copy_bgra_into(&self, out: &mut Vec<u8>) {
        out.clear();
        out.reserve(self.width as usize * self.height as usize * 4);
        for y in 0..self.height {
            let row = self.row(y);
            match self.format {
                PixelFormat::Bgra8 => out.extend_from_slice(row),
                PixelFormat::Rgba8 => {
                    for px in row.chunks_exact(4) {
                        out.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
                    }
                }
            }
        }
    }

    /// Tightly packed RGBA copy, as expected by most UI toolkits
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height {
            let row = self.row(y);
            match self.format {
                PixelFormat::Rgba8 => out.extend_from_slice(row),
                PixelFormat::Bgra8 => {
                    for px in row.chunks_exact(4) {
                        out.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
                    }
                }
            }
        }
        out
    }
}
