//! Passthrough tracker: every frame comes back as the processed frame,
//! together with a fixed pose.

use glam::{EulerRot, Mat4, Quat, Vec3};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::PassthroughConfig;
use crate::error::IrisviewError;
use crate::frame::{Timestamp, VideoFrame};
use crate::geometry::PoseTransform;

use super::{EventSink, Tracker};

pub struct PassthroughTracker {
    sink: EventSink,
    pose: PoseTransform,
    running: AtomicBool,
}

impl PassthroughTracker {
    pub fn new(config: &PassthroughConfig, sink: EventSink) -> Self {
        Self {
            sink,
            pose: pose_from_config(config),
            running: AtomicBool::new(false),
        }
    }

    pub fn pose(&self) -> PoseTransform {
        self.pose
    }
}

fn pose_from_config(config: &PassthroughConfig) -> PoseTransform {
    let [pitch, yaw, roll] = config.rotation_degrees.map(f32::to_radians);
    let rotation = Quat::from_euler(EulerRot::YXZ, yaw, pitch, roll);
    PoseTransform::new(Mat4::from_rotation_translation(
        rotation,
        Vec3::from_array(config.translation),
    ))
}

impl Tracker for PassthroughTracker {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn start(&self) -> Result<(), IrisviewError> {
        if !self.running.swap(true, Ordering::SeqCst) {
            tracing::info!("Passthrough tracker started");
        }
        Ok(())
    }

    fn process(&self, frame: VideoFrame, timestamp: Timestamp) {
        if !self.running.load(Ordering::Relaxed) {
            return;
        }
        tracing::trace!("Passthrough frame at {}", timestamp);
        self.sink.transform(self.pose);
        self.sink.pixel_buffer(frame);
    }

    fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Passthrough tracker stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::TrackerEvent;

    #[test]
    fn test_default_pose_is_identity() {
        let (sink, _rx) = EventSink::channel();
        let tracker = PassthroughTracker::new(&PassthroughConfig::default(), sink);
        assert_eq!(tracker.pose(), PoseTransform::IDENTITY);
    }

    #[test]
    fn test_configured_pose() {
        let config = PassthroughConfig {
            translation: [0.0, 0.0, -60.0],
            rotation_degrees: [0.0, 30.0, 0.0],
        };
        let (sink, _rx) = EventSink::channel();
        let pose = PassthroughTracker::new(&config, sink).pose();

        assert!(pose.position().abs_diff_eq(Vec3::new(0.0, 0.0, -60.0), 1e-5));
        assert!((pose.euler_angles().y - 30f32.to_radians()).abs() < 1e-4);
    }

    #[test]
    fn test_ignores_frames_until_started() {
        let (sink, mut rx) = EventSink::channel();
        let tracker = PassthroughTracker::new(&PassthroughConfig::default(), sink);
        let frame = VideoFrame::solid(2, 2, [1, 2, 3, 255], Timestamp::ZERO);

        tracker.process(frame.clone(), Timestamp::ZERO);
        assert!(rx.try_recv().is_none());

        tracker.start().unwrap();
        tracker.process(frame, Timestamp::from_micros(33_333));
        assert!(matches!(rx.try_recv(), Some(TrackerEvent::Transform(p)) if p == PoseTransform::IDENTITY));
        match rx.try_recv() {
            Some(TrackerEvent::PixelBuffer(f)) => assert_eq!(f.pixel_bgra(1, 1), [1, 2, 3, 255]),
            other => panic!("expected pixel buffer, got {:?}", other),
        }

        tracker.stop();
        tracker.process(VideoFrame::solid(1, 1, [0; 4], Timestamp::ZERO), Timestamp::ZERO);
        assert!(rx.try_recv().is_none());
    }
}
