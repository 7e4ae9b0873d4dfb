//! Capture session: device selection, configuration and frame delivery.
//!
//! Two dedicated threads per running session. `video-capture` pulls samples
//! from the camera and applies the connection settings (mirroring).
//! `video-delivery` forwards each frame to the tracker. With
//! `discard_late_frames` the hand-off between them holds one frame and
//! anything arriving while it is occupied is dropped.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use glam::Mat4;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::config::{CaptureConfig, DisplayConfig};
use crate::error::{CaptureError, IrisviewError};
use crate::geometry::{aspect_fit_transform, Resolution};
use crate::tracking::Tracker;
use crate::Stats;

use super::{CameraBackend, CameraDevice, CaptureSettings, FrameSource, SampleBuffer};

/// Queue depth between capture and delivery when late frames are kept
const KEEP_LATE_FRAMES_DEPTH: usize = 8;

/// A configured camera session
pub struct CaptureSession {
    device: CameraDevice,
    settings: CaptureSettings,
    background_transform: Mat4,
    source: Option<Box<dyn FrameSource>>,
    running: Option<RunningSession>,
}

struct RunningSession {
    stop: Arc<AtomicBool>,
    capture_thread: thread::JoinHandle<()>,
    delivery_thread: thread::JoinHandle<()>,
}

impl CaptureSession {
    /// Select and open the camera described by `config`.
    ///
    /// Fails if no camera faces the requested way, or if focus cannot be
    /// locked on a device that claims to support it.
    pub fn configure(
        backend: &mut dyn CameraBackend,
        config: &CaptureConfig,
        display: &DisplayConfig,
    ) -> Result<Self, IrisviewError> {
        let device = backend
            .find(config.facing)
            .ok_or_else(|| CaptureError::NoDeviceFound(config.facing.to_string()))?;

        let settings = CaptureSettings::for_device(&device, config);
        let mut source = backend.open(&device, &settings)?;

        if config.lock_focus && device.supports_locked_focus {
            source.lock_focus()?;
            tracing::debug!("Focus locked on {}", device.name);
        }

        let video = Resolution::new(settings.width as f32, settings.height as f32);
        let background_transform = aspect_fit_transform(display.resolution(), video);

        tracing::info!(
            "Camera '{}' ({}) configured: {}x{} @ {} fps, {}, mirrored: {}",
            device.name,
            device.facing,
            settings.width,
            settings.height,
            settings.fps,
            settings.pixel_format,
            settings.mirrored
        );

        Ok(Self {
            device,
            settings,
            background_transform,
            source: Some(source),
            running: None,
        })
    }

    pub fn device(&self) -> &CameraDevice {
        &self.device
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Aspect-fit transform for the background contents
    pub fn background_transform(&self) -> Mat4 {
        self.background_transform
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Start delivering frames to `tracker`. A session can only be started once.
    pub fn start(&mut self, tracker: Arc<dyn Tracker>, stats: Arc<Stats>) -> Result<(), IrisviewError> {
        let source = self.source.take().ok_or(CaptureError::AlreadyRunning)?;

        let depth = if self.settings.discard_late_frames {
            1
        } else {
            KEEP_LATE_FRAMES_DEPTH
        };
        let (sample_tx, sample_rx) = bounded::<SampleBuffer>(depth);
        let stop = Arc::new(AtomicBool::new(false));

        let capture_thread = {
            let stop = Arc::clone(&stop);
            let stats = Arc::clone(&stats);
            let settings = self.settings.clone();
            thread::Builder::new()
                .name("video-capture".to_string())
                .spawn(move || run_capture_thread(source, settings, sample_tx, stop, stats))
                .map_err(|e| CaptureError::Thread(e.to_string()))?
        };

        let delivery_thread = thread::Builder::new()
            .name("video-delivery".to_string())
            .spawn(move || run_delivery_thread(sample_rx, tracker, stats))
            .map_err(|e| CaptureError::Thread(e.to_string()))?;

        tracing::info!("Capture session started");
        self.running = Some(RunningSession {
            stop,
            capture_thread,
            delivery_thread,
        });
        Ok(())
    }

    /// Stop the session and wait for both threads to finish
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.stop.store(true, Ordering::SeqCst);
            if running.capture_thread.join().is_err() {
                tracing::error!("Capture thread panicked");
            }
            if running.delivery_thread.join().is_err() {
                tracing::error!("Delivery thread panicked");
            }
            tracing::info!("Capture session stopped");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_capture_thread(
    mut source: Box<dyn FrameSource>,
    settings: CaptureSettings,
    sample_tx: Sender<SampleBuffer>,
    stop: Arc<AtomicBool>,
    stats: Arc<Stats>,
) {
    tracing::debug!("Capture thread started");

    while !stop.load(Ordering::Relaxed) {
        let Some(mut sample) = source.next_sample() else {
            tracing::info!("Camera stream ended");
            break;
        };
        stats.frames_captured.fetch_add(1, Ordering::Relaxed);

        if settings.mirrored {
            sample.image = sample.image.map(|frame| frame.mirrored());
        }

        if settings.discard_late_frames {
            match sample_tx.try_send(sample) {
                Ok(()) => {}
                Err(TrySendError::Full(late)) => {
                    stats.frames_discarded_late.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!("Discarding late frame at {}", late.presentation_time);
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        } else if sample_tx.send(sample).is_err() {
            break;
        }
    }

    tracing::debug!("Capture thread stopping");
}

fn run_delivery_thread(sample_rx: Receiver<SampleBuffer>, tracker: Arc<dyn Tracker>, stats: Arc<Stats>) {
    for sample in sample_rx.iter() {
        deliver_sample(sample, tracker.as_ref(), &stats);
    }
    tracing::debug!("Delivery thread stopping");
}

/// Forward one sample to the tracker. Samples without an image are dropped.
pub fn deliver_sample(sample: SampleBuffer, tracker: &dyn Tracker, stats: &Stats) {
    let Some(frame) = sample.image else {
        stats.frames_missing_image.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("Sample at {} has no image buffer", sample.presentation_time);
        return;
    };

    tracker.process(frame, sample.presentation_time);
    stats.frames_delivered.fetch_add(1, Ordering::Relaxed);
}
