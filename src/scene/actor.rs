//! Scene owner.
//!
//! Tracker events can originate on any thread. They are queued on the event
//! sink and applied here, so the scene and its texture cache only ever
//! see a single mutator.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use glam::Mat4;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::config::SceneConfig;
use crate::frame::VideoFrame;
use crate::geometry::PoseTransform;
use crate::tracking::{EventReceiver, TrackerEvent};
use crate::{AppState, PoseUpdate};

use super::{Scene, TextureCache};

/// Applies tracker events to the scene it owns
pub struct SceneActor<C: TextureCache> {
    scene: Scene<C::Texture>,
    cache: C,
    events: EventReceiver,
    state: Arc<AppState>,
}

impl<C: TextureCache> SceneActor<C> {
    pub fn new(
        config: &SceneConfig,
        background_transform: Mat4,
        cache: C,
        events: EventReceiver,
        state: Arc<AppState>,
    ) -> Self {
        Self {
            scene: Scene::new(config, background_transform),
            cache,
            events,
            state,
        }
    }

    pub fn scene(&self) -> &Scene<C::Texture> {
        &self.scene
    }

    pub fn handle(&mut self, event: TrackerEvent) {
        match event {
            TrackerEvent::Transform(pose) => self.apply_pose(pose),
            TrackerEvent::PixelBuffer(frame) => self.apply_frame(&frame),
        }
    }

    fn apply_pose(&mut self, pose: PoseTransform) {
        self.scene.target.transform = pose.matrix();

        let sequence = self.state.stats.poses_applied.fetch_add(1, Ordering::Relaxed) + 1;
        let update = PoseUpdate::from_pose(sequence, &pose);
        debug!("pos {:?} rot {:?}", update.position, update.rotation);
        self.state.publish_pose(update);
    }

    fn apply_frame(&mut self, frame: &VideoFrame) {
        let Some(texture) = self.cache.create_texture(frame) else {
            // Nothing is shown for this frame
            self.scene.background.contents = None;
            self.scene.target.surface = None;
            self.state.stats.textures_failed.fetch_add(1, Ordering::Relaxed);
            debug!("Texture creation failed for frame at {}", frame.timestamp());
            return;
        };

        self.scene.background.contents = Some(texture.clone());
        self.scene.target.surface = Some(texture);
        self.state.stats.textures_applied.fetch_add(1, Ordering::Relaxed);
        trace!("Applied frame at {}", frame.timestamp());
    }

    /// Apply every queued event without waiting. Returns how many were applied.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Some(event) = self.events.try_recv() {
            self.handle(event);
            applied += 1;
        }
        applied
    }

    /// Apply events until shutdown or until every sender is gone
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Scene owner started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Scene owner shutting down");
                    break;
                }
                event = self.events.recv() => {
                    match event {
                        Some(event) => self.handle(event),
                        None => {
                            info!("All tracker event senders closed");
                            break;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Timestamp;
    use crate::scene::CpuTextureCache;
    use crate::tracking::EventSink;
    use crate::Config;
    use glam::Vec3;

    fn actor() -> (SceneActor<CpuTextureCache>, EventSink, Arc<AppState>) {
        let (sink, rx) = EventSink::channel();
        let state = AppState::new(Config::default());
        let actor = SceneActor::new(
            &SceneConfig::default(),
            Mat4::IDENTITY,
            CpuTextureCache::new(2).unwrap(),
            rx,
            state.clone(),
        );
        (actor, sink, state)
    }

    #[test]
    fn test_identity_pose_keeps_default_placement() {
        let (mut actor, sink, state) = actor();
        sink.transform(PoseTransform::IDENTITY);
        assert_eq!(actor.drain(), 1);

        let node = &actor.scene().target;
        assert_eq!(node.position(), Vec3::ZERO);
        assert_eq!(node.euler_angles(), Vec3::ZERO);
        assert_eq!(state.latest_pose().unwrap().sequence, 1);
    }

    #[test]
    fn test_last_pose_wins() {
        let (mut actor, sink, state) = actor();
        sink.transform(PoseTransform::from_translation(Vec3::new(1.0, 0.0, -20.0)));
        sink.transform(PoseTransform::from_translation(Vec3::new(-2.0, 3.0, -40.0)));
        actor.drain();

        assert_eq!(actor.scene().target.position(), Vec3::new(-2.0, 3.0, -40.0));
        assert_eq!(state.stats.poses_applied.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_frame_sets_background_and_surface() {
        let (mut actor, sink, state) = actor();
        sink.pixel_buffer(VideoFrame::solid(2, 2, [9, 8, 7, 255], Timestamp::from_micros(5)));
        actor.drain();

        let scene = actor.scene();
        let background = scene.background.contents.as_ref().unwrap();
        let surface = scene.target.surface.as_ref().unwrap();
        assert_eq!(background.timestamp, Timestamp::from_micros(5));
        assert_eq!(surface.pixels(), background.pixels());
        assert_eq!(state.stats.textures_applied.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_texture_failure_clears_background_and_surface() {
        let (mut actor, sink, state) = actor();
        sink.pixel_buffer(VideoFrame::solid(2, 2, [1, 2, 3, 255], Timestamp::from_micros(1)));
        assert_eq!(actor.drain(), 1);
        assert!(actor.scene().background.contents.is_some());

        sink.pixel_buffer(VideoFrame::solid(0, 0, [0; 4], Timestamp::from_micros(2)));
        assert_eq!(actor.drain(), 1);

        let scene = actor.scene();
        assert!(scene.background.contents.is_none());
        assert!(scene.target.surface.is_none());
        assert_eq!(state.stats.textures_failed.load(Ordering::Relaxed), 1);
        assert_eq!(state.stats.textures_applied.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_undrained_frames_apply_only_the_newest() {
        let (mut actor, sink, state) = actor();
        for i in 0..50 {
            sink.pixel_buffer(VideoFrame::solid(2, 2, [0, 0, 0, 255], Timestamp::from_micros(i)));
        }
        assert_eq!(actor.drain(), 1);

        let background = actor.scene().background.contents.as_ref().unwrap();
        assert_eq!(background.timestamp, Timestamp::from_micros(49));
        assert_eq!(state.stats.textures_applied.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_events_from_other_threads() {
        let (mut actor, sink, _state) = actor();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    sink.transform(PoseTransform::from_translation(Vec3::new(i as f32, 0.0, -10.0)));
                    sink.pixel_buffer(VideoFrame::solid(1, 1, [0, 0, 0, 255], Timestamp::ZERO));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Four queued poses plus the newest frame
        assert_eq!(actor.drain(), 5);
        assert!(actor.scene().target.surface.is_some());
    }

    #[tokio::test]
    async fn test_run_stops_when_senders_close() {
        let (mut actor, sink, state) = actor();
        sink.transform(PoseTransform::IDENTITY);
        drop(sink);

        actor.run(state.subscribe_shutdown()).await;
        assert_eq!(state.stats.poses_applied.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (mut actor, _sink, state) = actor();
        let shutdown = state.subscribe_shutdown();
        state.shutdown();
        actor.run(shutdown).await;
    }
}
