//! Turns 3D trails into screen-space line segments.

use glam::Vec2;

use crate::camera::Projection;
use crate::trajectory::Trajectory;

/// One screen-space line between adjacent trail points.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Segment {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Speed of the newer endpoint divided by `max_speed`, capped at 1.
    pub speed_norm: f32,
    /// 0 for the newest segment of a trail, approaching 1 for the oldest.
    pub age: f32,
    /// Blink intensity of the owning particle.
    pub blink: f32,
    /// Position along the trail in `[0, 1)`, 0 at the head.
    pub seg_idx: f32,
    /// Normalised depth of the first endpoint.
    pub depth1: f32,
    /// Normalised depth of the second endpoint.
    pub depth2: f32,
}

/// Fixed-capacity segment builder.
///
/// The buffer is allocated once and refilled every frame. Segments beyond
/// `max_segments` are dropped and counted in [`dropped`](Self::dropped).
#[derive(Debug)]
pub struct Projector {
    segments: Vec<Segment>,
    max_segments: usize,
    max_speed: f32,
    dropped: usize,
}

impl Projector {
    /// `max_speed` is the speed mapped to the top of the hue range.
    pub fn new(max_segments: usize, max_speed: f32) -> Self {
        Self {
            segments: Vec::with_capacity(max_segments),
            max_segments,
            max_speed,
            dropped: 0,
        }
    }

    pub fn max_segments(&self) -> usize {
        self.max_segments
    }

    pub fn max_speed(&self) -> f32 {
        self.max_speed
    }

    pub fn set_max_speed(&mut self, max_speed: f32) {
        self.max_speed = max_speed;
    }

    /// Segments produced by the last [`collect_segments`](Self::collect_segments).
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Segments that did not fit during the last collection.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Project every trail into the segment buffer.
    ///
    /// Screen position is `screen_center + projected * zoom`. A segment with an
    /// endpoint behind the camera is skipped and does not count as dropped.
    pub fn collect_segments<'a, P, I>(
        &mut self,
        trajectories: I,
        camera: &P,
        zoom: f32,
        screen_center: Vec2,
    ) -> &[Segment]
    where
        P: Projection + ?Sized,
        I: IntoIterator<Item = &'a Trajectory>,
    {
        self.segments.clear();
        self.dropped = 0;
        let perspective = camera.perspective();
        let depth_of = |z: f32| {
            if perspective > 0.0 {
                (z / perspective).clamp(0.0, 1.0)
            } else {
                0.0
            }
        };

        for trajectory in trajectories {
            let trail = trajectory.trail();
            let len = trail.len();
            if len < 2 {
                continue;
            }

            let blink = trajectory.blink().intensity();
            let last = (len - 1) as f32;
            for i in 0..len - 1 {
                let a = trail[i];
                let b = trail[i + 1];
                let pa = camera.project(a.position);
                let pb = camera.project(b.position);
                if pa.scale <= 0.0 || pb.scale <= 0.0 {
                    continue;
                }
                if self.segments.len() >= self.max_segments {
                    self.dropped += 1;
                    continue;
                }

                let speed_norm = if self.max_speed > 0.0 {
                    (a.speed / self.max_speed).min(1.0)
                } else {
                    1.0
                };
                self.segments.push(Segment {
                    x1: screen_center.x + pa.x * zoom,
                    y1: screen_center.y + pa.y * zoom,
                    x2: screen_center.x + pb.x * zoom,
                    y2: screen_center.y + pb.y * zoom,
                    speed_norm,
                    age: i as f32 / len as f32,
                    blink,
                    seg_idx: i as f32 / last,
                    depth1: depth_of(pa.z),
                    depth2: depth_of(pb.z),
                });
            }
        }

        if self.dropped > 0 {
            log::trace!("Segment buffer full, dropped {} segments", self.dropped);
        }
        &self.segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{OrbitCamera, Projected};
    use crate::stepper::{Step, Stepper};
    use crate::trajectory::TrajectoryConfig;
    use glam::Vec3;
    use std::sync::Arc;

    struct Flat;

    impl Projection for Flat {
        fn project(&self, point: Vec3) -> Projected {
            Projected {
                x: point.x,
                y: point.y,
                scale: 1.0,
                z: point.z,
            }
        }

        fn perspective(&self) -> f32 {
            10.0
        }
    }

    fn walker(points: usize, speed: f32) -> Trajectory {
        let stepper: Arc<dyn Stepper> =
            Arc::new(move |p: Vec3, dt: f32| Step::new(p + Vec3::new(1.0, 0.0, 2.0) * dt, speed));
        let config = TrajectoryConfig {
            spawn_range: 0.0,
            trail_length: 64,
            ..Default::default()
        };
        let mut t = Trajectory::new(stepper, config, 0);
        for _ in 0..points {
            t.update(1.0, 1.0);
        }
        t
    }

    #[test]
    fn test_segments_follow_trail_pairs() {
        let t = walker(4, 5.0);
        let mut projector = Projector::new(100, 10.0);
        let segments = projector.collect_segments([&t], &Flat, 2.0, Vec2::new(100.0, 50.0));
        assert_eq!(segments.len(), 3);

        let first = segments[0];
        // newest point x = 4, next x = 3
        assert_eq!(first.x1, 108.0);
        assert_eq!(first.x2, 106.0);
        assert_eq!(first.y1, 50.0);
        assert_eq!(first.age, 0.0);
        assert_eq!(first.seg_idx, 0.0);
        assert_eq!(first.speed_norm, 0.5);
        assert!((segments[2].seg_idx - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(segments[2].age, 0.5);
    }

    #[test]
    fn test_depth_is_clamped() {
        let t = walker(8, 1.0);
        let mut projector = Projector::new(100, 1.0);
        let segments = projector.collect_segments([&t], &Flat, 1.0, Vec2::ZERO);
        // z runs 16, 14, ... against a perspective of 10
        assert_eq!(segments[0].depth1, 1.0);
        assert!(segments.iter().all(|s| (0.0..=1.0).contains(&s.depth2)));
        assert!((segments[6].depth2 - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_speed_norm_caps_at_one() {
        let t = walker(3, 50.0);
        let mut projector = Projector::new(100, 10.0);
        let segments = projector.collect_segments([&t], &Flat, 1.0, Vec2::ZERO);
        assert!(segments.iter().all(|s| s.speed_norm == 1.0));
    }

    #[test]
    fn test_capacity_drops_silently() {
        let trails: Vec<Trajectory> = (0..10).map(|_| walker(6, 1.0)).collect();
        let mut projector = Projector::new(12, 1.0);
        let segments = projector.collect_segments(&trails, &Flat, 1.0, Vec2::ZERO);
        assert_eq!(segments.len(), 12);
        assert_eq!(projector.dropped(), 50 - 12);
    }

    #[test]
    fn test_segments_behind_camera_are_skipped() {
        let camera = OrbitCamera {
            yaw: 0.0,
            pitch: 0.0,
            perspective: 2.5,
            target: Vec3::ZERO,
        };
        let stepper: Arc<dyn Stepper> =
            Arc::new(|p: Vec3, dt: f32| Step::new(p - Vec3::Z * dt, 1.0));
        let config = TrajectoryConfig {
            spawn_range: 0.0,
            trail_length: 10,
            ..Default::default()
        };
        let mut t = Trajectory::new(stepper, config, 0);
        for _ in 0..5 {
            t.update(1.0, 1.0);
        }
        // z = -5 .. -1; only points with z > -2.5 are in front of the eye
        let mut projector = Projector::new(100, 1.0);
        let segments = projector.collect_segments([&t], &camera, 1.0, Vec2::ZERO);
        assert_eq!(segments.len(), 1);
        assert_eq!(projector.dropped(), 0);

        // a full buffer only counts the visible segment of the second copy
        let mut full = Projector::new(1, 1.0);
        let segments = full.collect_segments([&t, &t], &camera, 1.0, Vec2::ZERO);
        assert_eq!(segments.len(), 1);
        assert_eq!(full.dropped(), 1);
    }
}
