//! Box geometry and screen projection.
//!
//! The presenter draws the tracked node as a textured box. Faces are projected
//! on the CPU and handed to the painter as quads, back-to-front.

use glam::{Mat4, Vec2, Vec3};

/// One face of the box: outward normal, then the face's right and up axes
/// as seen from outside
const FACES: [(Vec3, Vec3, Vec3); 6] = [
    (Vec3::Z, Vec3::X, Vec3::Y),
    (Vec3::X, Vec3::NEG_Z, Vec3::Y),
    (Vec3::NEG_X, Vec3::Z, Vec3::Y),
    (Vec3::Y, Vec3::X, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
];

/// Texture coordinates of each face corner, matching [`face_corners`]
pub const FACE_UVS: [Vec2; 4] = [
    Vec2::new(0.0, 1.0),
    Vec2::new(1.0, 1.0),
    Vec2::new(1.0, 0.0),
    Vec2::new(0.0, 0.0),
];

/// A face after projection
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedFace {
    /// Corners in pixels, y down, counter-clockwise on screen
    pub corners: [Vec2; 4],
    pub uvs: [Vec2; 4],
    /// Mean clip-space w, i.e. distance along the view axis
    pub depth: f32,
}

/// Corners of a face in model space: bottom-left, bottom-right, top-right,
/// top-left
fn face_corners(normal: Vec3, right: Vec3, up: Vec3, half: f32) -> [Vec3; 4] {
    let center = normal * half;
    [
        center + (-right - up) * half,
        center + (right - up) * half,
        center + (right + up) * half,
        center + (-right + up) * half,
    ]
}

fn signed_area(points: &[Vec2; 4]) -> f32 {
    let mut sum = 0.0;
    for i in 0..4 {
        let a = points[i];
        let b = points[(i + 1) % 4];
        sum += a.x * b.y - b.x * a.y;
    }
    sum * 0.5
}

/// Project a box of edge `size` placed by `model` into a viewport of
/// `viewport` pixels.
///
/// Faces crossing the near or far plane are dropped whole, as are faces
/// pointing away from the camera. The rest come back sorted far to near.
pub fn project_box(model: Mat4, size: f32, view_proj: Mat4, viewport: Vec2) -> Vec<ProjectedFace> {
    let mvp = view_proj * model;
    let half = size * 0.5;
    let mut faces = Vec::with_capacity(3);

    'faces: for &(normal, right, up) in &FACES {
        let mut ndc = [Vec2::ZERO; 4];
        let mut depth = 0.0;

        for (i, corner) in face_corners(normal, right, up, half).iter().enumerate() {
            let clip = mvp * corner.extend(1.0);
            if clip.w <= 0.0 {
                continue 'faces;
            }
            let z = clip.z / clip.w;
            if !(0.0..=1.0).contains(&z) {
                continue 'faces;
            }
            ndc[i] = Vec2::new(clip.x, clip.y) / clip.w;
            depth += clip.w;
        }

        if signed_area(&ndc) <= 0.0 {
            continue;
        }

        let corners = ndc.map(|p| Vec2::new((p.x + 1.0) * 0.5 * viewport.x, (1.0 - p.y) * 0.5 * viewport.y));
        faces.push(ProjectedFace {
            corners,
            uvs: FACE_UVS,
            depth: depth / 4.0,
        });
    }

    faces.sort_by(|a, b| b.depth.total_cmp(&a.depth));
    faces
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;
    use std::f32::consts::FRAC_PI_4;

    const VIEWPORT: Vec2 = Vec2::new(400.0, 800.0);

    fn projection() -> Mat4 {
        Mat4::perspective_rh(63f32.to_radians(), VIEWPORT.x / VIEWPORT.y, 1.0, 10000.0)
    }

    #[test]
    fn test_box_in_front_shows_front_face() {
        let model = Mat4::from_translation(Vec3::new(0.0, 0.0, -50.0));
        let faces = project_box(model, 15.0, projection(), VIEWPORT);
        assert_eq!(faces.len(), 1);

        let center = faces[0].corners.iter().copied().sum::<Vec2>() / 4.0;
        assert!((center - VIEWPORT / 2.0).length() < 1e-3);
        // bottom-left corner sits below and left of center
        assert!(faces[0].corners[0].x < center.x);
        assert!(faces[0].corners[0].y > center.y);
        assert_eq!(faces[0].uvs, FACE_UVS);
    }

    #[test]
    fn test_box_around_camera_is_hidden() {
        let faces = project_box(Mat4::IDENTITY, 15.0, projection(), VIEWPORT);
        assert!(faces.is_empty());
    }

    #[test]
    fn test_rotated_box_shows_two_faces() {
        let model = Mat4::from_rotation_translation(
            Quat::from_rotation_y(FRAC_PI_4),
            Vec3::new(0.0, 0.0, -50.0),
        );
        let faces = project_box(model, 15.0, projection(), VIEWPORT);
        assert_eq!(faces.len(), 2);
        for face in &faces {
            assert!(face.depth > 0.0);
        }
    }

    #[test]
    fn test_faces_sorted_far_to_near() {
        let model = Mat4::from_rotation_translation(
            Quat::from_rotation_y(0.3) * Quat::from_rotation_x(0.4),
            Vec3::new(5.0, 0.0, -40.0),
        );
        let faces = project_box(model, 15.0, projection(), VIEWPORT);
        assert!(faces.len() >= 2);
        for pair in faces.windows(2) {
            assert!(pair[0].depth >= pair[1].depth);
        }
    }
}
