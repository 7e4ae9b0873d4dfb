//! Irisview - Camera Iris Tracking Overlay
//!
//! Streams camera frames through an iris tracker and keeps a 3D scene in sync
//! with what it reports:
//! - Captures from a front- or rear-facing camera, mirrored for selfie use
//! - Hands every frame to a pluggable tracker (passthrough or MediaPipe bridge)
//! - Poses drive a tracked box, processed frames become the video background
//! - Optional native window and an HTTP/SSE surface for pose consumers

pub mod capture;
pub mod config;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod pipeline;
pub mod scene;
pub mod tracking;
pub mod web;

#[cfg(feature = "native-ui")]
pub mod ui;

pub use config::Config;
pub use error::{IrisviewError, Result};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{broadcast, watch, RwLock};

use geometry::PoseTransform;

/// Pipeline counters, updated lock-free from every thread
#[derive(Debug, Default)]
pub struct Stats {
    pub frames_captured: AtomicU64,
    pub frames_discarded_late: AtomicU64,
    pub frames_missing_image: AtomicU64,
    pub frames_delivered: AtomicU64,
    pub poses_applied: AtomicU64,
    pub textures_applied: AtomicU64,
    pub textures_failed: AtomicU64,
}

/// Point-in-time copy of [`Stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_captured: u64,
    pub frames_discarded_late: u64,
    pub frames_missing_image: u64,
    pub frames_delivered: u64,
    pub poses_applied: u64,
    pub textures_applied: u64,
    pub textures_failed: u64,
}

impl Stats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_discarded_late: self.frames_discarded_late.load(Ordering::Relaxed),
            frames_missing_image: self.frames_missing_image.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            poses_applied: self.poses_applied.load(Ordering::Relaxed),
            textures_applied: self.textures_applied.load(Ordering::Relaxed),
            textures_failed: self.textures_failed.load(Ordering::Relaxed),
        }
    }
}

/// A pose as applied to the scene, in the form published to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoseUpdate {
    /// Number of poses applied so far, including this one
    pub sequence: u64,
    pub position: [f32; 3],
    /// (pitch, yaw, roll) in degrees
    pub rotation: [f32; 3],
    /// Column-major 4x4 matrix
    pub transform: [f32; 16],
}

impl PoseUpdate {
    pub fn from_pose(sequence: u64, pose: &PoseTransform) -> Self {
        let euler = pose.euler_angles();
        Self {
            sequence,
            position: pose.position().to_array(),
            rotation: [
                euler.x.to_degrees(),
                euler.y.to_degrees(),
                euler.z.to_degrees(),
            ],
            transform: pose.to_cols_array(),
        }
    }
}

/// Application state shared across all components
#[derive(Debug)]
pub struct AppState {
    /// Current configuration
    pub config: RwLock<Config>,
    /// Pipeline counters
    pub stats: Arc<Stats>,
    /// Channel for applied poses
    pub pose_tx: broadcast::Sender<PoseUpdate>,
    /// Latest applied pose
    latest_pose: watch::Sender<Option<PoseUpdate>>,
    /// Shutdown signal
    pub shutdown_tx: broadcast::Sender<()>,
    pub started_at: Instant,
}

impl AppState {
    /// Create a new application state with the given configuration
    pub fn new(config: Config) -> Arc<Self> {
        let (pose_tx, _) = broadcast::channel(64);
        let (shutdown_tx, _) = broadcast::channel(1);
        let (latest_pose, _) = watch::channel(None);

        Arc::new(Self {
            config: RwLock::new(config),
            stats: Arc::new(Stats::default()),
            pose_tx,
            latest_pose,
            shutdown_tx,
            started_at: Instant::now(),
        })
    }

    /// Record a pose and broadcast it
    pub fn publish_pose(&self, update: PoseUpdate) {
        self.latest_pose.send_replace(Some(update.clone()));
        let _ = self.pose_tx.send(update);
    }

    /// Get the latest applied pose
    pub fn latest_pose(&self) -> Option<PoseUpdate> {
        self.latest_pose.borrow().clone()
    }

    /// Subscribe to applied poses
    pub fn subscribe_pose(&self) -> broadcast::Receiver<PoseUpdate> {
        self.pose_tx.subscribe()
    }

    /// Subscribe to shutdown signal
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    #[test]
    fn test_pose_update_from_identity() {
        let update = PoseUpdate::from_pose(1, &PoseTransform::IDENTITY);
        assert_eq!(update.position, [0.0; 3]);
        assert_eq!(update.rotation, [0.0; 3]);
        assert_eq!(update.transform, glam::Mat4::IDENTITY.to_cols_array());
    }

    #[test]
    fn test_pose_update_degrees() {
        let pose = PoseTransform::new(glam::Mat4::from_rotation_translation(
            Quat::from_rotation_y(90f32.to_radians()),
            Vec3::new(1.0, 2.0, -3.0),
        ));
        let update = PoseUpdate::from_pose(4, &pose);
        assert_eq!(update.sequence, 4);
        assert_eq!(update.position, [1.0, 2.0, -3.0]);
        assert!((update.rotation[1] - 90.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_publish_pose() {
        let state = AppState::new(Config::default());
        let mut rx = state.subscribe_pose();
        assert!(state.latest_pose().is_none());

        let update = PoseUpdate::from_pose(1, &PoseTransform::IDENTITY);
        state.publish_pose(update.clone());

        assert_eq!(rx.recv().await.unwrap(), update);
        assert_eq!(state.latest_pose(), Some(update));
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = Stats::default();
        stats.frames_captured.fetch_add(3, Ordering::Relaxed);
        stats.textures_failed.fetch_add(1, Ordering::Relaxed);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_captured, 3);
        assert_eq!(snapshot.textures_failed, 1);
        assert_eq!(snapshot.poses_applied, 0);
    }
}
