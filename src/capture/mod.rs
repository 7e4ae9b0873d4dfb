//! Camera capture
//!
//! Device selection, session configuration and the background frame delivery
//! threads. Camera hardware sits behind [`CameraBackend`]; the built-in
//! [`synthetic::SyntheticCamera`] produces a moving test pattern.

pub mod session;
pub mod synthetic;

use serde::{Deserialize, Serialize};

use crate::config::CaptureConfig;
use crate::error::IrisviewError;
use crate::frame::{PixelFormat, Timestamp, VideoFrame};

pub use session::CaptureSession;
pub use synthetic::SyntheticCamera;

/// Which way a camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    /// User-facing (selfie) camera
    Front,
    /// Rear camera
    Back,
}

impl Default for CameraFacing {
    fn default() -> Self {
        Self::Front
    }
}

impl std::fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraFacing::Front => write!(f, "front"),
            CameraFacing::Back => write!(f, "back"),
        }
    }
}

impl std::str::FromStr for CameraFacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "front" | "user" => Ok(Self::Front),
            "back" | "rear" | "environment" => Ok(Self::Back),
            other => Err(format!("unknown camera facing '{}'", other)),
        }
    }
}

/// A camera a backend can open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    pub id: String,
    pub name: String,
    pub facing: CameraFacing,
    pub supports_locked_focus: bool,
}

/// Output settings negotiated for one capture session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Width of delivered frames
    pub width: u32,
    /// Height of delivered frames
    pub height: u32,
    pub fps: u32,
    pub pixel_format: PixelFormat,
    /// Flip frames horizontally before delivery
    pub mirrored: bool,
    pub discard_late_frames: bool,
}

impl CaptureSettings {
    /// Settings for `device`. Only front-facing cameras are mirrored.
    pub fn for_device(device: &CameraDevice, config: &CaptureConfig) -> Self {
        let output = config.output_resolution();
        Self {
            width: output.width as u32,
            height: output.height as u32,
            fps: config.fps,
            pixel_format: config.pixel_format,
            mirrored: device.facing == CameraFacing::Front,
            discard_late_frames: config.discard_late_frames,
        }
    }
}

/// One captured sample. The image may be missing, in which case the sample
/// is dropped.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub image: Option<VideoFrame>,
    pub presentation_time: Timestamp,
}

/// Enumerates and opens cameras
pub trait CameraBackend: Send {
    /// Available devices
    fn devices(&self) -> Vec<CameraDevice>;

    /// Open `device` with the given output settings
    fn open(
        &mut self,
        device: &CameraDevice,
        settings: &CaptureSettings,
    ) -> Result<Box<dyn FrameSource>, IrisviewError>;

    /// First device facing the requested way
    fn find(&self, facing: CameraFacing) -> Option<CameraDevice> {
        self.devices().into_iter().find(|d| d.facing == facing)
    }
}

/// A running stream of samples from one opened camera
pub trait FrameSource: Send {
    /// Lock focus at its current position
    fn lock_focus(&mut self) -> Result<(), IrisviewError>;

    /// Block until the next sample is available. `None` ends the stream.
    fn next_sample(&mut self) -> Option<SampleBuffer>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(facing: CameraFacing) -> CameraDevice {
        CameraDevice {
            id: "cam".to_string(),
            name: "Test Camera".to_string(),
            facing,
            supports_locked_focus: true,
        }
    }

    #[test]
    fn test_front_camera_is_mirrored() {
        let settings = CaptureSettings::for_device(&device(CameraFacing::Front), &CaptureConfig::default());
        assert!(settings.mirrored);
    }

    #[test]
    fn test_back_camera_is_not_mirrored() {
        let settings = CaptureSettings::for_device(&device(CameraFacing::Back), &CaptureConfig::default());
        assert!(!settings.mirrored);
    }

    #[test]
    fn test_settings_use_portrait_resolution() {
        let settings = CaptureSettings::for_device(&device(CameraFacing::Back), &CaptureConfig::default());
        assert_eq!((settings.width, settings.height), (1080, 1920));
        assert_eq!(settings.pixel_format, PixelFormat::Bgra8);
    }

    #[test]
    fn test_facing_from_str() {
        assert_eq!("rear".parse::<CameraFacing>(), Ok(CameraFacing::Back));
        assert_eq!("Front".parse::<CameraFacing>(), Ok(CameraFacing::Front));
        assert!("side".parse::<CameraFacing>().is_err());
    }
}
