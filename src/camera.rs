//! Camera projection contract and a simple orbit camera.

use glam::{Quat, Vec3};

/// A point after perspective projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projected {
    /// Perspective-scaled horizontal offset from the view centre.
    pub x: f32,
    /// Perspective-scaled vertical offset from the view centre.
    pub y: f32,
    /// Perspective factor. Non-positive means the point is behind the eye.
    pub scale: f32,
    /// View-space depth, positive away from the viewer.
    pub z: f32,
}

/// Anything that can project display-space points for the [`Projector`](crate::Projector).
pub trait Projection {
    fn project(&self, point: Vec3) -> Projected;

    /// Eye distance used to normalise depth.
    fn perspective(&self) -> f32;
}

/// Orbit camera for viewing attractors.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    /// Horizontal rotation angle in radians.
    pub yaw: f32,
    /// Vertical rotation angle in radians.
    pub pitch: f32,
    /// Distance from the eye to the orbit target.
    pub perspective: f32,
    /// Point the camera orbits around.
    pub target: Vec3,
}

impl OrbitCamera {
    /// Create a new camera with default positioning.
    pub fn new() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.3,
            perspective: 600.0,
            target: Vec3::ZERO,
        }
    }

    /// Rotation from display space into view space.
    pub fn rotation(&self) -> Quat {
        Quat::from_rotation_x(self.pitch) * Quat::from_rotation_y(self.yaw)
    }
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl Projection for OrbitCamera {
    fn project(&self, point: Vec3) -> Projected {
        let view = self.rotation() * (point - self.target);
        let denom = self.perspective + view.z;
        let scale = if denom > 0.0 { self.perspective / denom } else { 0.0 };
        Projected {
            x: view.x * scale,
            y: view.y * scale,
            scale,
            z: view.z,
        }
    }

    fn perspective(&self) -> f32 {
        self.perspective
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat() -> OrbitCamera {
        OrbitCamera {
            yaw: 0.0,
            pitch: 0.0,
            perspective: 100.0,
            target: Vec3::ZERO,
        }
    }

    #[test]
    fn test_origin_projects_to_centre_with_unit_scale() {
        let p = flat().project(Vec3::ZERO);
        assert_eq!(p.x, 0.0);
        assert_eq!(p.y, 0.0);
        assert!((p.scale - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_farther_points_shrink() {
        let cam = flat();
        let near = cam.project(Vec3::new(10.0, 0.0, 0.0));
        let far = cam.project(Vec3::new(10.0, 0.0, 100.0));
        assert!(far.scale < near.scale);
        assert!(far.x.abs() < near.x.abs());
    }

    #[test]
    fn test_behind_eye_has_non_positive_scale() {
        let p = flat().project(Vec3::new(0.0, 0.0, -150.0));
        assert!(p.scale <= 0.0);
    }

    #[test]
    fn test_yaw_rotates_around_vertical_axis() {
        let cam = OrbitCamera {
            yaw: std::f32::consts::FRAC_PI_2,
            ..flat()
        };
        let p = cam.project(Vec3::new(0.0, 5.0, 0.0));
        assert!(p.x.abs() < 1e-4);
        assert!((p.y - 5.0).abs() < 1e-4);
    }
}
