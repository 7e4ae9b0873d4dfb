//! MediaPipe iris helper subprocess
//!
//! Launches the Python helper that hosts the iris tracking graph, with
//! automatic cleanup on drop.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::config::MediaPipeConfig;
use crate::error::{IrisviewError, TrackingError};

/// Manages the helper child process
pub struct HelperProcess {
    child: Option<Child>,
    config: MediaPipeConfig,
}

impl HelperProcess {
    /// Create a new subprocess manager (does not start the process)
    pub fn new(config: &MediaPipeConfig) -> Self {
        Self {
            child: None,
            config: config.clone(),
        }
    }

    /// Launch the helper.
    ///
    /// Runs: `python3 <helper_script> --host <host> --port <port>`
    pub fn start(&mut self) -> Result<(), IrisviewError> {
        if self.is_running() {
            return Ok(());
        }

        let mut child = Command::new("python3")
            .arg(&self.config.helper_script)
            .args(helper_args(&self.config))
            .kill_on_drop(true)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| {
                TrackingError::Subprocess(format!(
                    "Failed to launch iris helper at '{}': {}",
                    self.config.helper_script, e
                ))
            })?;

        // Forward helper stderr to the log
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "iris_helper", "{}", line);
                }
            });
        }

        tracing::info!(
            "Iris helper started (pid: {:?}, port: {})",
            child.id(),
            self.config.port,
        );

        self.child = Some(child);
        Ok(())
    }

    /// Check if the subprocess is still running (non-blocking)
    pub fn is_running(&mut self) -> bool {
        match &mut self.child {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    tracing::warn!("Iris helper exited with: {}", status);
                    self.child = None;
                    false
                }
                Err(e) => {
                    tracing::error!("Failed to check iris helper status: {}", e);
                    false
                }
            },
            None => false,
        }
    }

    /// Stop the subprocess by killing it
    pub async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            tracing::info!("Stopping iris helper (pid: {:?})", child.id());
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
    }
}

fn helper_args(config: &MediaPipeConfig) -> Vec<String> {
    vec![
        "--host".to_string(),
        config.host.clone(),
        "--port".to_string(),
        config.port.to_string(),
    ]
}

/// Check if the `mediapipe` Python package is available.
///
/// Runs `python3 -c "import mediapipe"` and returns true if it succeeds.
pub fn check_mediapipe_available() -> bool {
    match std::process::Command::new("python3")
        .args(["-c", "import mediapipe"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
    {
        Ok(status) => status.success(),
        Err(_) => false,
    }
}
