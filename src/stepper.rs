//! The vector-field contract consumed by trajectories.
//!
//! A [`Stepper`] advances a position through a continuous dynamical system by
//! one time step. The attractor equations themselves live outside this crate;
//! anything that implements `Stepper` (including a plain closure) can drive a
//! [`TrailSystem`](crate::TrailSystem).
//!
//! ```ignore
//! let field = |p: Vec3, dt: f32| {
//!     let v = Vec3::new(
//!         10.0 * (p.y - p.x),
//!         p.x * (28.0 - p.z) - p.y,
//!         p.x * p.y - 8.0 / 3.0 * p.z,
//!     );
//!     Step::new(p + v * dt, v.length())
//! };
//! ```

use std::sync::Arc;

use glam::Vec3;
use rand::Rng;

/// Result of a single integration step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    /// Position after the step.
    pub position: Vec3,
    /// Instantaneous speed at the new position.
    pub speed: f32,
}

impl Step {
    pub fn new(position: Vec3, speed: f32) -> Self {
        Self { position, speed }
    }
}

/// A pure `(position, dt) -> (position, speed)` map.
///
/// Implementations must not keep mutable state between calls; the same stepper
/// is shared by every trajectory that was not given its own varied copy.
pub trait Stepper: Send + Sync {
    /// Advance `position` by `dt`.
    fn step(&self, position: Vec3, dt: f32) -> Step;

    /// Numeric parameters that per-particle variation may perturb.
    ///
    /// Steppers without tunable parameters return an empty list, which turns
    /// variation into a no-op.
    fn params(&self) -> Vec<f32> {
        Vec::new()
    }

    /// Build a copy of this stepper with different parameters.
    ///
    /// `params` has the same length and order as [`params`](Self::params).
    /// Returns `None` when the stepper cannot be re-parameterised.
    fn with_params(&self, _params: &[f32]) -> Option<Arc<dyn Stepper>> {
        None
    }
}

impl<F> Stepper for F
where
    F: Fn(Vec3, f32) -> Step + Send + Sync,
{
    fn step(&self, position: Vec3, dt: f32) -> Step {
        self(position, dt)
    }
}

/// Per-particle parameter variation.
///
/// Each range is the full width of the perturbation applied to the matching
/// base parameter: a new particle draws `base + uniform(-range/2, range/2)`.
/// Missing ranges leave the parameter untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamVariation {
    pub ranges: Vec<f32>,
}

impl ParamVariation {
    pub fn new(ranges: impl Into<Vec<f32>>) -> Self {
        Self {
            ranges: ranges.into(),
        }
    }

    /// Perturb `base` by the configured ranges.
    pub fn perturb<R: Rng + ?Sized>(&self, base: &[f32], rng: &mut R) -> Vec<f32> {
        base.iter()
            .enumerate()
            .map(|(i, &value)| match self.ranges.get(i) {
                Some(&range) if range != 0.0 => value + (rng.gen::<f32>() - 0.5) * range,
                _ => value,
            })
            .collect()
    }

    /// Build a varied stepper, or share `base` when it has nothing to vary.
    pub fn apply<R: Rng + ?Sized>(&self, base: &Arc<dyn Stepper>, rng: &mut R) -> Arc<dyn Stepper> {
        let params = base.params();
        if params.is_empty() || self.ranges.iter().all(|r| *r == 0.0) {
            return Arc::clone(base);
        }
        let varied = self.perturb(&params, rng);
        base.with_params(&varied).unwrap_or_else(|| Arc::clone(base))
    }
}
