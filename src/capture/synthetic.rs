//! Synthetic camera backend producing a moving test pattern.
//!
//! Stands in for camera hardware in headless runs and tests. It offers one
//! front-facing and one rear-facing device. Only the rear device supports
//! locked focus.

use std::time::{Duration, Instant};

use crate::error::{CaptureError, IrisviewError};
use crate::frame::{PixelFormat, Timestamp, VideoFrame};

use super::{CameraBackend, CameraDevice, CameraFacing, CaptureSettings, FrameSource, SampleBuffer};

/// Camera backend with synthetic devices
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    facings: Vec<CameraFacing>,
    realtime: bool,
    max_frames: Option<u64>,
    missing_image_every: Option<u64>,
    fail_focus_lock: bool,
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self {
            facings: vec![CameraFacing::Front, CameraFacing::Back],
            realtime: true,
            max_frames: None,
            missing_image_every: None,
            fail_focus_lock: false,
        }
    }

    /// Only expose devices facing these ways
    pub fn with_facings(mut self, facings: &[CameraFacing]) -> Self {
        self.facings = facings.to_vec();
        self
    }

    /// Pace frames at the configured fps (default) or emit them as fast as
    /// they are consumed
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// End the stream after `n` samples
    pub fn max_frames(mut self, n: u64) -> Self {
        self.max_frames = Some(n);
        self
    }

    /// Every `n`th sample carries no image
    pub fn missing_image_every(mut self, n: u64) -> Self {
        self.missing_image_every = Some(n.max(1));
        self
    }

    /// Make focus locking fail on devices that support it
    pub fn with_failing_focus_lock(mut self) -> Self {
        self.fail_focus_lock = true;
        self
    }

    /// The frame a synthetic source emits at `index`, before mirroring: a
    /// vertical bar sweeping across a gradient background.
    pub fn pattern_frame(width: u32, height: u32, format: PixelFormat, index: u64) -> VideoFrame {
        pattern_frame_at(width, height, format, index, Timestamp::ZERO)
    }
}

fn pattern_frame_at(
    width: u32,
    height: u32,
    format: PixelFormat,
    index: u64,
    timestamp: Timestamp,
) -> VideoFrame {
    let bar_x = if width == 0 { 0 } else { (index % width as u64) as u32 };
    let mut data = Vec::with_capacity(width as usize * height as usize * 4);

    for y in 0..height {
        for x in 0..width {
            let (r, g, b) = if x == bar_x {
                (255u8, 255u8, 255u8)
            } else {
                (
                    (x * 255 / width.max(1)) as u8,
                    (y * 255 / height.max(1)) as u8,
                    (index % 256) as u8,
                )
            };
            match format {
                PixelFormat::Bgra8 => data.extend_from_slice(&[b, g, r, 255]),
                PixelFormat::Rgba8 => data.extend_from_slice(&[r, g, b, 255]),
            }
        }
    }

    VideoFrame::new(width, height, width as usize * 4, format, data, timestamp)
        .unwrap_or_else(|| VideoFrame::solid(0, 0, [0; 4], timestamp))
}

fn device_for(facing: CameraFacing) -> CameraDevice {
    match facing {
        CameraFacing::Front => CameraDevice {
            id: "synthetic-front".to_string(),
            name: "Synthetic Front Camera".to_string(),
            facing,
            supports_locked_focus: false,
        },
        CameraFacing::Back => CameraDevice {
            id: "synthetic-back".to_string(),
            name: "Synthetic Back Camera".to_string(),
            facing,
            supports_locked_focus: true,
        },
    }
}

impl CameraBackend for SyntheticCamera {
    fn devices(&self) -> Vec<CameraDevice> {
        self.facings.iter().map(|&f| device_for(f)).collect()
    }

    fn open(
        &mut self,
        device: &CameraDevice,
        settings: &CaptureSettings,
    ) -> Result<Box<dyn FrameSource>, IrisviewError> {
        if !self.devices().contains(device) {
            return Err(CaptureError::Open {
                device: device.name.clone(),
                message: "not a synthetic device".to_string(),
            }
            .into());
        }
        if settings.fps == 0 {
            return Err(CaptureError::UnsupportedFormat("0 fps".to_string()).into());
        }

        Ok(Box::new(SyntheticSource {
            width: settings.width,
            height: settings.height,
            format: settings.pixel_format,
            frame_interval: Duration::from_secs(1) / settings.fps,
            index: 0,
            started: None,
            realtime: self.realtime,
            max_frames: self.max_frames,
            missing_image_every: self.missing_image_every,
            supports_locked_focus: device.supports_locked_focus,
            fail_focus_lock: self.fail_focus_lock,
        }))
    }
}

struct SyntheticSource {
    width: u32,
    height: u32,
    format: PixelFormat,
    frame_interval: Duration,
    index: u64,
    started: Option<Instant>,
    realtime: bool,
    max_frames: Option<u64>,
    missing_image_every: Option<u64>,
    supports_locked_focus: bool,
    fail_focus_lock: bool,
}

impl FrameSource for SyntheticSource {
    fn lock_focus(&mut self) -> Result<(), IrisviewError> {
        if !self.supports_locked_focus || self.fail_focus_lock {
            return Err(CaptureError::ConfigurationLock("synthetic device refused focus lock".to_string()).into());
        }
        tracing::debug!("Synthetic focus locked");
        Ok(())
    }

    fn next_sample(&mut self) -> Option<SampleBuffer> {
        if self.max_frames.is_some_and(|max| self.index >= max) {
            return None;
        }

        let offset = self.frame_interval * self.index as u32;
        if self.realtime {
            let started = *self.started.get_or_insert_with(Instant::now);
            let due = started + offset;
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }

        let index = self.index;
        self.index += 1;
        let presentation_time = Timestamp::from_duration(offset);

        let missing = self
            .missing_image_every
            .is_some_and(|every| index % every == every - 1);
        let image = (!missing).then(|| {
            pattern_frame_at(self.width, self.height, self.format, index, presentation_time)
        });

        Some(SampleBuffer {
            image,
            presentation_time,
        })
    }
}
