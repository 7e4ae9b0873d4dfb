//! Configuration parsing and management for irisview

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::capture::CameraFacing;
use crate::error::{ConfigError, IrisviewError};
use crate::frame::PixelFormat;
use crate::geometry::Resolution;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub display: DisplayConfig,
    pub tracker: TrackerConfig,
    pub scene: SceneConfig,
    pub http: HttpConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, IrisviewError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, IrisviewError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Load configuration from default paths
    pub fn load() -> Result<Self, IrisviewError> {
        let paths = [
            PathBuf::from("config.toml"),
            PathBuf::from("config/default.toml"),
            dirs_path().join("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), IrisviewError> {
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(invalid("capture.width", "Capture resolution must be non-zero"));
        }

        if self.capture.fps == 0 {
            return Err(invalid("capture.fps", "Frame rate must be greater than 0"));
        }

        if !self.display.resolution().is_valid() {
            return Err(invalid("display", "Display size must be positive"));
        }

        if !(self.scene.node_size > 0.0) {
            return Err(invalid("scene.node_size", "Node size must be greater than 0"));
        }

        if !(self.scene.z_near > 0.0 && self.scene.z_far > self.scene.z_near) {
            return Err(invalid(
                "scene.z_near",
                "Clip planes must satisfy 0 < z_near < z_far",
            ));
        }

        if !(self.scene.y_fov_degrees > 0.0 && self.scene.y_fov_degrees < 180.0) {
            return Err(invalid(
                "scene.y_fov_degrees",
                "Field of view must be between 0 and 180 degrees",
            ));
        }

        if self.tracker.backend == TrackerBackend::MediaPipe {
            let mp = &self.tracker.mediapipe;
            if mp.port == 0 {
                return Err(invalid("tracker.mediapipe.port", "Port must be greater than 0"));
            }
            if mp.auto_launch && !Path::new(&mp.helper_script).exists() {
                tracing::warn!(
                    "MediaPipe auto_launch enabled but helper script not found at: {}",
                    mp.helper_script
                );
            }
        }

        if self.http.enabled && self.http.port == 0 {
            return Err(invalid("http.port", "Port must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> IrisviewError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// Camera capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Which camera to open
    pub facing: CameraFacing,
    /// Sensor buffer width (landscape)
    pub width: u32,
    /// Sensor buffer height (landscape)
    pub height: u32,
    /// Frames per second
    pub fps: u32,
    /// Pixel format delivered to the tracker
    pub pixel_format: PixelFormat,
    /// Deliver frames rotated to portrait
    pub portrait: bool,
    /// Lock focus when the device supports it
    pub lock_focus: bool,
    /// Drop frames that arrive while the previous one is still being delivered
    pub discard_late_frames: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            facing: CameraFacing::Front,
            width: 1920,
            height: 1080,
            fps: 30,
            pixel_format: PixelFormat::Bgra8,
            portrait: true,
            lock_focus: true,
            discard_late_frames: true,
        }
    }
}

impl CaptureConfig {
    /// Resolution of the frames as delivered (after orientation)
    pub fn output_resolution(&self) -> Resolution {
        let sensor = Resolution::new(self.width as f32, self.height as f32);
        if self.portrait {
            sensor.transposed()
        } else {
            sensor
        }
    }
}

/// Display the background is fitted into
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Display width in points
    pub width: f32,
    /// Display height in points
    pub height: f32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 390.0,
            height: 844.0,
        }
    }
}

impl DisplayConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Tracker backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerBackend {
    /// Echo frames back with a fixed pose
    Passthrough,
    /// External MediaPipe iris helper over TCP
    MediaPipe,
}

impl Default for TrackerBackend {
    fn default() -> Self {
        Self::Passthrough
    }
}

impl std::fmt::Display for TrackerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerBackend::Passthrough => write!(f, "passthrough"),
            TrackerBackend::MediaPipe => write!(f, "mediapipe"),
        }
    }
}

impl std::str::FromStr for TrackerBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "passthrough" | "none" => Ok(Self::Passthrough),
            "mediapipe" | "mp" => Ok(Self::MediaPipe),
            other => Err(format!("unknown tracker backend '{}'", other)),
        }
    }
}

/// Tracker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub backend: TrackerBackend,
    pub passthrough: PassthroughConfig,
    pub mediapipe: MediaPipeConfig,
}

/// Fixed pose emitted by the passthrough tracker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PassthroughConfig {
    /// Translation of the emitted pose
    pub translation: [f32; 3],
    /// Rotation of the emitted pose as (pitch, yaw, roll) in degrees
    pub rotation_degrees: [f32; 3],
}

/// MediaPipe iris helper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaPipeConfig {
    /// Helper address
    pub host: String,
    /// Helper TCP port
    pub port: u16,
    /// Launch the helper as a subprocess
    pub auto_launch: bool,
    /// Path to the helper script
    pub helper_script: String,
    /// Connection attempts before giving up at startup
    pub connect_attempts: u32,
    /// Delay between connection attempts (milliseconds)
    pub connect_retry_ms: u64,
    /// Restart the helper if it exits
    pub auto_restart: bool,
    /// Delay before restarting a crashed helper (seconds)
    pub restart_delay_secs: u64,
}

impl Default for MediaPipeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 12350,
            auto_launch: false,
            helper_script: "scripts/iris_helper.py".to_string(),
            connect_attempts: 10,
            connect_retry_ms: 500,
            auto_restart: true,
            restart_delay_secs: 3,
        }
    }
}

/// Scene / presenter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Edge length of the tracked box
    pub node_size: f32,
    /// Near clip plane
    pub z_near: f32,
    /// Far clip plane
    pub z_far: f32,
    /// Vertical field of view in degrees
    pub y_fov_degrees: f32,
    /// Show the statistics panel in the native UI
    pub show_statistics: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            node_size: 15.0,
            z_near: 1.0,
            z_far: 10000.0,
            y_fov_degrees: 63.0,
            show_statistics: true,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Enable HTTP server
    pub enabled: bool,
    /// HTTP server host
    pub host: String,
    /// HTTP server port
    pub port: u16,
    /// Enable CORS
    pub cors_enabled: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8090,
            cors_enabled: true,
        }
    }
}

/// Get the platform-specific configuration directory
fn dirs_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        if let Some(config_dir) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(config_dir).join("irisview");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".config/irisview");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join("Library/Application Support/irisview");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("irisview");
        }
    }

    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.capture.facing, CameraFacing::Front);
        assert_eq!(config.capture.width, 1920);
        assert_eq!(config.capture.height, 1080);
        assert_eq!(config.capture.pixel_format, PixelFormat::Bgra8);
        assert!(config.capture.discard_late_frames);
        assert_eq!(config.scene.node_size, 15.0);
        assert_eq!(config.tracker.backend, TrackerBackend::Passthrough);
        assert!(config.http.enabled);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [capture]
            facing = "back"
            fps = 60

            [tracker]
            backend = "mediapipe"

            [tracker.mediapipe]
            port = 9000

            [scene]
            node_size = 10.0
        "#;

        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.capture.facing, CameraFacing::Back);
        assert_eq!(config.capture.fps, 60);
        assert_eq!(config.capture.width, 1920);
        assert_eq!(config.tracker.backend, TrackerBackend::MediaPipe);
        assert_eq!(config.tracker.mediapipe.port, 9000);
        assert_eq!(config.tracker.mediapipe.host, "127.0.0.1");
        assert_eq!(config.scene.node_size, 10.0);
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::default();
        config.capture.fps = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scene.z_far = 0.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.display.width = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scene.node_size = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_output_resolution_orientation() {
        let mut capture = CaptureConfig::default();
        assert_eq!(capture.output_resolution(), Resolution::new(1080.0, 1920.0));
        capture.portrait = false;
        assert_eq!(capture.output_resolution(), Resolution::new(1920.0, 1080.0));
    }

    #[test]
    fn test_tracker_backend_from_str() {
        assert_eq!("MediaPipe".parse::<TrackerBackend>(), Ok(TrackerBackend::MediaPipe));
        assert_eq!("passthrough".parse::<TrackerBackend>(), Ok(TrackerBackend::Passthrough));
        assert!("opencv".parse::<TrackerBackend>().is_err());
    }

    #[test]
    fn test_sample_config_matches_defaults() {
        let config = Config::from_str(include_str!("../config.example.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.capture.facing, CameraFacing::Front);
        assert_eq!(config.capture.pixel_format, PixelFormat::Bgra8);
        assert_eq!(config.display.width, 390.0);
        assert_eq!(config.tracker.mediapipe.port, 12350);
        assert_eq!(config.scene.z_far, 10000.0);
        assert_eq!(config.http.port, 8090);
    }
}
