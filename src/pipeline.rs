//! Capture-to-tracker wiring.
//!
//! Builds the tracker selected in the configuration, opens the camera and
//! starts delivering frames. Tracker events come back on the receiver handed
//! out by [`Pipeline::start`], to be drained by the scene owner.

use std::sync::Arc;

use glam::Mat4;
use tracing::info;

use crate::capture::{CameraBackend, CameraDevice, CaptureSession};
use crate::config::Config;
use crate::error::IrisviewError;
use crate::tracking::{create_tracker, EventReceiver, EventSink, Tracker};
use crate::Stats;

/// A running capture session feeding a started tracker
pub struct Pipeline {
    session: CaptureSession,
    tracker: Arc<dyn Tracker>,
}

impl Pipeline {
    /// Configure the camera, start the tracker and begin capturing.
    ///
    /// The camera is configured first so that a missing device or a refused
    /// focus lock fails before any tracker resources are started. Trackers
    /// with background tasks must be started inside a tokio runtime.
    pub fn start(
        config: &Config,
        backend: &mut dyn CameraBackend,
        stats: Arc<Stats>,
    ) -> Result<(Self, EventReceiver), IrisviewError> {
        let mut session = CaptureSession::configure(backend, &config.capture, &config.display)?;

        let (sink, events) = EventSink::channel();
        let tracker: Arc<dyn Tracker> = Arc::from(create_tracker(&config.tracker, sink));
        tracker.start()?;
        info!("Tracker '{}' started", tracker.name());

        if let Err(e) = session.start(Arc::clone(&tracker), stats) {
            tracker.stop();
            return Err(e);
        }

        Ok((Self { session, tracker }, events))
    }

    pub fn device(&self) -> &CameraDevice {
        self.session.device()
    }

    /// Aspect-fit transform for the scene background
    pub fn background_transform(&self) -> Mat4 {
        self.session.background_transform()
    }

    pub fn tracker_name(&self) -> &'static str {
        self.tracker.name()
    }

    /// Stop capturing, then stop the tracker
    pub fn stop(&mut self) {
        self.session.stop();
        self.tracker.stop();
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
