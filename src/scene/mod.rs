//! Presenter scene: a camera at the origin, one tracked box and a video
//! background.
//!
//! The scene is owned by a single [`actor::SceneActor`]; everything else talks
//! to it through tracker events.

pub mod actor;
pub mod cube;
pub mod texture;

use glam::{Mat4, Vec2, Vec3};

use crate::config::SceneConfig;
use crate::geometry::{PoseTransform, Resolution};

pub use actor::SceneActor;
pub use texture::{CpuTexture, CpuTextureCache, TextureCache};

/// Perspective camera looking down -Z from the origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneCamera {
    pub z_near: f32,
    pub z_far: f32,
    /// Vertical field of view in radians
    pub y_fov: f32,
}

impl SceneCamera {
    pub fn from_config(config: &SceneConfig) -> Self {
        Self {
            z_near: config.z_near,
            z_far: config.z_far,
            y_fov: config.y_fov_degrees.to_radians(),
        }
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.y_fov, aspect, self.z_near, self.z_far)
    }
}

/// How texture coordinates outside [0, 1] are sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    Repeat,
    ClampToEdge,
    /// Outside the image is transparent black
    ClampToBorder,
}

/// The video background
#[derive(Debug, Clone)]
pub struct Background<T> {
    pub contents: Option<T>,
    /// Scale applied to the contents' texture coordinates
    pub contents_transform: Mat4,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
}

impl<T> Background<T> {
    pub fn new(contents_transform: Mat4) -> Self {
        Self {
            contents: None,
            contents_transform,
            wrap_s: WrapMode::ClampToBorder,
            wrap_t: WrapMode::ClampToBorder,
        }
    }

    /// Where the contents land on a screen of the given size, as
    /// (top-left, size). Scaling texture coordinates up by `s` shrinks the
    /// image by `1/s` on that axis; the result is centered.
    pub fn display_rect(&self, screen: Resolution) -> (Vec2, Vec2) {
        let scale = Vec2::new(
            self.contents_transform.x_axis.x,
            self.contents_transform.y_axis.y,
        );
        let screen = Vec2::new(screen.width, screen.height);
        let size = screen / scale;
        ((screen - size) * 0.5, size)
    }
}

/// The tracked node: a box whose transform and surface follow the tracker
#[derive(Debug, Clone)]
pub struct SceneNode<T> {
    pub transform: Mat4,
    pub size: f32,
    pub surface: Option<T>,
}

impl<T> SceneNode<T> {
    pub fn new(size: f32) -> Self {
        Self {
            transform: Mat4::IDENTITY,
            size,
            surface: None,
        }
    }

    pub fn position(&self) -> Vec3 {
        PoseTransform::new(self.transform).position()
    }

    /// (pitch, yaw, roll) in radians
    pub fn euler_angles(&self) -> Vec3 {
        PoseTransform::new(self.transform).euler_angles()
    }
}

/// Everything the presenter draws
#[derive(Debug, Clone)]
pub struct Scene<T> {
    pub camera: SceneCamera,
    pub target: SceneNode<T>,
    pub background: Background<T>,
}

impl<T> Scene<T> {
    pub fn new(config: &SceneConfig, background_transform: Mat4) -> Self {
        Self {
            camera: SceneCamera::from_config(config),
            target: SceneNode::new(config.node_size),
            background: Background::new(background_transform),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_scene_defaults() {
        let scene: Scene<()> = Scene::new(&SceneConfig::default(), Mat4::IDENTITY);
        assert_eq!(scene.target.transform, Mat4::IDENTITY);
        assert_eq!(scene.target.size, 15.0);
        assert!(scene.target.surface.is_none());
        assert!(scene.background.contents.is_none());
        assert_eq!(scene.background.wrap_s, WrapMode::ClampToBorder);
        assert_eq!(scene.camera.z_near, 1.0);
        assert_eq!(scene.camera.z_far, 10000.0);
    }

    #[test]
    fn test_display_rect_letterboxes() {
        let background: Background<()> =
            Background::new(Mat4::from_scale(Vec3::new(1.0, 2.0, 1.0)));
        let (origin, size) = background.display_rect(Resolution::new(100.0, 400.0));
        assert_eq!(size, Vec2::new(100.0, 200.0));
        assert_eq!(origin, Vec2::new(0.0, 100.0));
    }

    #[test]
    fn test_display_rect_identity_fills_screen() {
        let background: Background<()> = Background::new(Mat4::IDENTITY);
        let (origin, size) = background.display_rect(Resolution::new(640.0, 480.0));
        assert_eq!(origin, Vec2::ZERO);
        assert_eq!(size, Vec2::new(640.0, 480.0));
    }
}
