//! Tracking module
//!
//! A tracker consumes camera frames and, on its own schedule, emits pose
//! transforms and processed frames. Backends:
//! - Passthrough (echoes frames with a fixed pose)
//! - MediaPipe iris helper (binary frames out, JSON poses back over TCP)

pub mod mediapipe;
pub mod passthrough;
pub mod subprocess;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::config::{TrackerBackend, TrackerConfig};
use crate::error::IrisviewError;
use crate::frame::{Timestamp, VideoFrame};
use crate::geometry::PoseTransform;

pub use mediapipe::MediaPipeTracker;
pub use passthrough::PassthroughTracker;

/// Output of a tracker
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    /// Pose of the tracked face in camera space
    Transform(PoseTransform),
    /// Frame produced by the tracker's graph, to be shown as the background
    PixelBuffer(VideoFrame),
}

/// Where trackers deliver their events. Cheap to clone; every clone feeds the
/// same scene owner.
///
/// Poses are queued in order. Frames go through a latest-only slot: a frame
/// the scene owner has not picked up yet is replaced by the next one.
#[derive(Debug, Clone)]
pub struct EventSink {
    poses: mpsc::UnboundedSender<PoseTransform>,
    frames: Arc<watch::Sender<Option<VideoFrame>>>,
}

impl EventSink {
    /// Create a sink and the receiver the scene owner drains
    pub fn channel() -> (Self, EventReceiver) {
        let (pose_tx, pose_rx) = mpsc::unbounded_channel();
        let (frame_tx, frame_rx) = watch::channel(None);
        (
            Self {
                poses: pose_tx,
                frames: Arc::new(frame_tx),
            },
            EventReceiver {
                poses: pose_rx,
                frames: frame_rx,
            },
        )
    }

    /// Returns false once the scene owner is gone
    pub fn transform(&self, pose: PoseTransform) -> bool {
        self.poses.send(pose).is_ok()
    }

    /// Returns false once the scene owner is gone
    pub fn pixel_buffer(&self, frame: VideoFrame) -> bool {
        self.frames.send(Some(frame)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.poses.is_closed()
    }
}

/// Receiving end of a tracker's events
#[derive(Debug)]
pub struct EventReceiver {
    poses: mpsc::UnboundedReceiver<PoseTransform>,
    frames: watch::Receiver<Option<VideoFrame>>,
}

impl EventReceiver {
    /// Next event without waiting. Queued poses come first, then the newest
    /// frame not yet seen.
    pub fn try_recv(&mut self) -> Option<TrackerEvent> {
        if let Ok(pose) = self.poses.try_recv() {
            return Some(TrackerEvent::Transform(pose));
        }
        self.take_frame().map(TrackerEvent::PixelBuffer)
    }

    /// Wait for the next event. Returns `None` once every sink is dropped and
    /// nothing is left to read.
    pub async fn recv(&mut self) -> Option<TrackerEvent> {
        let mut frames_open = true;
        loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }

            tokio::select! {
                pose = self.poses.recv() => {
                    return match pose {
                        Some(pose) => Some(TrackerEvent::Transform(pose)),
                        None => self.take_frame().map(TrackerEvent::PixelBuffer),
                    };
                }
                changed = self.frames.changed(), if frames_open => {
                    frames_open = changed.is_ok();
                }
            }
        }
    }

    fn take_frame(&mut self) -> Option<VideoFrame> {
        let frame = self.frames.borrow_and_update();
        if frame.has_changed() {
            (*frame).clone()
        } else {
            None
        }
    }
}

/// A face/iris tracking backend.
///
/// `process` is called from the capture delivery thread for every frame and
/// must not block; backends that cannot keep up drop frames.
pub trait Tracker: Send + Sync {
    /// Short backend name for logs and status
    fn name(&self) -> &'static str;

    /// Start the backend's graph. Calling it twice is a no-op.
    fn start(&self) -> Result<(), IrisviewError>;

    /// Hand one frame to the tracker
    fn process(&self, frame: VideoFrame, timestamp: Timestamp);

    /// Stop the backend. Frames passed to `process` afterwards are ignored.
    fn stop(&self);
}

/// Build the backend selected in the configuration
pub fn create_tracker(config: &TrackerConfig, sink: EventSink) -> Box<dyn Tracker> {
    match config.backend {
        TrackerBackend::Passthrough => Box::new(PassthroughTracker::new(&config.passthrough, sink)),
        TrackerBackend::MediaPipe => Box::new(MediaPipeTracker::new(&config.mediapipe, sink)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_delivers_in_order() {
        let (sink, mut rx) = EventSink::channel();
        assert!(sink.transform(PoseTransform::IDENTITY));
        assert!(sink.pixel_buffer(VideoFrame::solid(2, 2, [0, 0, 0, 255], Timestamp::ZERO)));

        assert!(matches!(rx.try_recv(), Some(TrackerEvent::Transform(_))));
        assert!(matches!(rx.try_recv(), Some(TrackerEvent::PixelBuffer(_))));
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_pending_frames_coalesce_to_newest() {
        let (sink, mut rx) = EventSink::channel();
        for i in 0..100 {
            assert!(sink.pixel_buffer(VideoFrame::solid(
                4,
                4,
                [0, 0, 0, 255],
                Timestamp::from_micros(i)
            )));
        }
        sink.transform(PoseTransform::IDENTITY);
        sink.transform(PoseTransform::IDENTITY);

        assert!(matches!(rx.try_recv(), Some(TrackerEvent::Transform(_))));
        assert!(matches!(rx.try_recv(), Some(TrackerEvent::Transform(_))));
        match rx.try_recv() {
            Some(TrackerEvent::PixelBuffer(frame)) => {
                assert_eq!(frame.timestamp(), Timestamp::from_micros(99))
            }
            other => panic!("expected pixel buffer, got {:?}", other),
        }
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_recv_wakes_on_frame_and_ends_when_closed() {
        let (sink, mut rx) = EventSink::channel();
        let sender = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            sink.pixel_buffer(VideoFrame::solid(1, 1, [0; 4], Timestamp::from_micros(7)));
        });

        match rx.recv().await {
            Some(TrackerEvent::PixelBuffer(frame)) => {
                assert_eq!(frame.timestamp(), Timestamp::from_micros(7))
            }
            other => panic!("expected pixel buffer, got {:?}", other),
        }
        sender.await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_sink_reports_closed_receiver() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.transform(PoseTransform::IDENTITY));
    }

    #[test]
    fn test_create_tracker_by_backend() {
        let (sink, _rx) = EventSink::channel();
        let mut config = TrackerConfig::default();
        assert_eq!(create_tracker(&config, sink.clone()).name(), "passthrough");

        config.backend = TrackerBackend::MediaPipe;
        assert_eq!(create_tracker(&config, sink).name(), "mediapipe");
    }
}
