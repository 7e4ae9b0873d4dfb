//! Frame-to-texture conversion.
//!
//! A [`TextureCache`] turns processed frames into something the presenter can
//! draw. It is owned by the scene owner and only ever touched from its thread.

use std::sync::Arc;

use crate::error::{IrisviewError, RenderError};
use crate::frame::{Timestamp, VideoFrame};

/// Converts frames into presenter textures, reusing memory where it can
pub trait TextureCache {
    /// Texture handle stored in the scene. Valid while the cache is alive.
    type Texture: Clone;

    /// Returns `None` if the frame cannot be converted; the caller keeps
    /// whatever it showed before.
    fn create_texture(&mut self, frame: &VideoFrame) -> Option<Self::Texture>;
}

/// Texture layout produced by the caches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    /// 8-bit BGRA, sRGB encoded
    Bgra8UnormSrgb,
}

/// CPU-side texture: tightly packed BGRA pixels
#[derive(Debug, Clone)]
pub struct CpuTexture {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub timestamp: Timestamp,
    pixels: Arc<Vec<u8>>,
}

impl CpuTexture {
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// Headless texture cache.
///
/// Keeps a small pool of pixel buffers. A buffer is reused once every texture
/// pointing at it has been dropped; otherwise the oldest pooled buffer is
/// replaced.
#[derive(Debug)]
pub struct CpuTextureCache {
    pool: Vec<Arc<Vec<u8>>>,
    capacity: usize,
    allocations: u64,
}

impl CpuTextureCache {
    pub fn new(capacity: usize) -> Result<Self, IrisviewError> {
        if capacity == 0 {
            return Err(RenderError::TextureCache("pool capacity must be at least 1".to_string()).into());
        }
        Ok(Self {
            pool: Vec::with_capacity(capacity),
            capacity,
            allocations: 0,
        })
    }

    /// Number of pixel buffers allocated so far
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Take a buffer nobody else references, allocating if the pool has none
    fn acquire(&mut self) -> Arc<Vec<u8>> {
        if let Some(i) = self.pool.iter().position(|b| Arc::strong_count(b) == 1) {
            return self.pool.remove(i);
        }

        self.allocations += 1;
        if self.pool.len() >= self.capacity {
            self.pool.remove(0);
        }
        Arc::new(Vec::new())
    }
}

impl TextureCache for CpuTextureCache {
    type Texture = CpuTexture;

    fn create_texture(&mut self, frame: &VideoFrame) -> Option<CpuTexture> {
        if frame.is_empty() {
            return None;
        }

        let mut pixels = self.acquire();
        let buf = Arc::get_mut(&mut pixels)?;
        frame.copy_bgra_into(buf);
        self.pool.push(Arc::clone(&pixels));

        Some(CpuTexture {
            width: frame.width(),
            height: frame.height(),
            format: TextureFormat::Bgra8UnormSrgb,
            timestamp: frame.timestamp(),
            pixels,
        })
    }
}
