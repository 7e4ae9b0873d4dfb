//! Error types for irisview

use thiserror::Error;

/// Main error type for irisview
#[derive(Error, Debug)]
pub enum IrisviewError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Web server error: {0}")]
    Web(#[from] WebError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// Camera capture errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No {0} camera found")]
    NoDeviceFound(String),

    #[error("Failed to open camera '{device}': {message}")]
    Open { device: String, message: String },

    #[error("Failed to lock camera for configuration: {0}")]
    ConfigurationLock(String),

    #[error("Unsupported capture format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to spawn capture thread: {0}")]
    Thread(String),

    #[error("Capture session already running")]
    AlreadyRunning,
}

/// Tracker backend errors
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Failed to connect to tracker at {addr}: {message}")]
    Connect { addr: String, message: String },

    #[error("Tracker subprocess error: {0}")]
    Subprocess(String),

    #[error("Tracker protocol error: {0}")]
    Protocol(String),

    #[error("Tracker requires a tokio runtime: {0}")]
    Runtime(String),
}

/// Presenter / texture errors
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Unable to allocate texture cache: {0}")]
    TextureCache(String),
}

/// Web server errors
#[derive(Error, Debug)]
pub enum WebError {
    #[error("Failed to bind to address: {0}")]
    Bind(String),

    #[error("Server error: {0}")]
    Serve(String),
}

/// Result type alias for irisview operations
pub type Result<T> = std::result::Result<T, IrisviewError>;
