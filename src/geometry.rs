//! Geometry shared by capture and presentation: resolutions, the aspect-fit
//! background transform, and tracked pose transforms.

use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Width/height pair in pixels (or points, for displays)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: f32,
    pub height: f32,
}

impl Resolution {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Same resolution rotated by 90 degrees
    pub fn transposed(&self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.width.is_finite() && self.height.is_finite()
    }
}

/// Ratio between the screen's and the video's aspect:
/// `(screen_h * video_w) / (screen_w * video_h)`.
pub fn aspect_ratio(screen: Resolution, video: Resolution) -> f32 {
    (screen.height * video.width) / (screen.width * video.height)
}

/// Per-axis scale that fits the background video inside the screen.
///
/// Exactly one axis is scaled: Y by the ratio when it is at least 1, otherwise
/// X by its reciprocal.
pub fn aspect_fit_scale(screen: Resolution, video: Resolution) -> Vec3 {
    let ratio = aspect_ratio(screen, video);
    if ratio >= 1.0 {
        Vec3::new(1.0, ratio, 1.0)
    } else {
        Vec3::new(1.0 / ratio, 1.0, 1.0)
    }
}

/// Contents transform applied to the background's texture coordinates
pub fn aspect_fit_transform(screen: Resolution, video: Resolution) -> Mat4 {
    Mat4::from_scale(aspect_fit_scale(screen, video))
}

/// A tracked 4x4 homogeneous transform (rotation + translation), column-major.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseTransform(Mat4);

impl Default for PoseTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl PoseTransform {
    pub const IDENTITY: Self = Self(Mat4::IDENTITY);

    pub fn new(matrix: Mat4) -> Self {
        Self(matrix)
    }

    /// Build from 16 floats laid out column by column.
    pub fn from_cols_array(cols: &[f32; 16]) -> Self {
        Self(Mat4::from_cols_array(cols))
    }

    /// Build from a slice, rejecting anything that is not 16 finite values
    pub fn from_cols_slice(cols: &[f32]) -> Option<Self> {
        let cols: &[f32; 16] = cols.try_into().ok()?;
        if cols.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Self::from_cols_array(cols))
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self(Mat4::from_translation(translation))
    }

    pub fn matrix(&self) -> Mat4 {
        self.0
    }

    pub fn to_cols_array(&self) -> [f32; 16] {
        self.0.to_cols_array()
    }

    pub fn position(&self) -> Vec3 {
        self.0.w_axis.truncate()
    }

    pub fn rotation(&self) -> Quat {
        let (_, rotation, _) = self.0.to_scale_rotation_translation();
        rotation
    }

    /// Rotation as (pitch, yaw, roll) in radians, applied roll first, then
    /// pitch, then yaw.
    pub fn euler_angles(&self) -> Vec3 {
        let (yaw, pitch, roll) = self.rotation().to_euler(EulerRot::YXZ);
        Vec3::new(pitch, yaw, roll)
    }
}

impl From<Mat4> for PoseTransform {
    fn from(matrix: Mat4) -> Self {
        Self(matrix)
    }
}
