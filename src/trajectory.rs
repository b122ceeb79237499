//! A single simulated particle and its fading trail.
//!
//! A [`Trajectory`] integrates a [`Stepper`], keeps a bounded newest-first
//! history of display-space points and decides when the particle should be
//! thrown back into the spawn volume: when it escapes `max_distance`, or at
//! random with `respawn_chance` so the picture keeps refreshing.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use glam::Vec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::BlinkConfig;
use crate::stepper::Stepper;

/// Blink chances are expressed per tick of this length.
const BLINK_REFERENCE_TICK: f32 = 1.0 / 60.0;

/// A source axis for one component of an [`AxisMapping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Permutation and sign flip applied to simulation coordinates before display.
///
/// Lets one system be shown in a different orientation, e.g. a Lorenz
/// attractor with its z axis pointing up the screen:
///
/// ```ignore
/// let mapping: AxisMapping = "x,-z,y".parse()?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisMapping {
    axes: [Axis; 3],
    signs: [f32; 3],
}

impl AxisMapping {
    pub const IDENTITY: AxisMapping = AxisMapping {
        axes: [Axis::X, Axis::Y, Axis::Z],
        signs: [1.0, 1.0, 1.0],
    };

    /// Output component `i` is `signs[i] * input[axes[i]]`.
    pub fn new(axes: [Axis; 3], signs: [f32; 3]) -> Self {
        Self { axes, signs }
    }

    pub fn apply(&self, v: Vec3) -> Vec3 {
        let src = v.to_array();
        Vec3::new(
            src[self.axes[0].index()] * self.signs[0],
            src[self.axes[1].index()] * self.signs[1],
            src[self.axes[2].index()] * self.signs[2],
        )
    }
}

impl Default for AxisMapping {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Error returned when an axis mapping string is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAxisMappingError(String);

impl fmt::Display for ParseAxisMappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid axis mapping: {}", self.0)
    }
}

impl std::error::Error for ParseAxisMappingError {}

impl FromStr for AxisMapping {
    type Err = ParseAxisMappingError;

    /// Parses three axis letters, each optionally prefixed with `-`.
    /// Commas and whitespace are ignored: `"xzy"`, `"x, -z, y"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut axes = Vec::with_capacity(3);
        let mut signs = Vec::with_capacity(3);
        let mut negate = false;
        for c in s.chars() {
            match c.to_ascii_lowercase() {
                ',' | ' ' | '\t' => {}
                '+' => negate = false,
                '-' => negate = true,
                letter @ ('x' | 'y' | 'z') => {
                    axes.push(match letter {
                        'x' => Axis::X,
                        'y' => Axis::Y,
                        _ => Axis::Z,
                    });
                    signs.push(if negate { -1.0 } else { 1.0 });
                    negate = false;
                }
                other => {
                    return Err(ParseAxisMappingError(format!(
                        "unexpected '{}' in \"{}\"",
                        other, s
                    )))
                }
            }
        }
        if axes.len() != 3 {
            return Err(ParseAxisMappingError(format!("expected 3 axes in \"{}\"", s)));
        }
        for axis in [Axis::X, Axis::Y, Axis::Z] {
            if !axes.contains(&axis) {
                return Err(ParseAxisMappingError(format!("axis {:?} missing in \"{}\"", axis, s)));
            }
        }
        Ok(Self::new([axes[0], axes[1], axes[2]], [signs[0], signs[1], signs[2]]))
    }
}

/// Per-trajectory settings. Shared by every particle of a [`TrailSystem`](crate::TrailSystem).
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryConfig {
    /// Attractor centre in simulation space; subtracted before display.
    pub center_offset: Vec3,
    /// Edge length of the cube particles respawn in.
    pub spawn_range: f32,
    /// Centre of the spawn cube.
    pub spawn_offset: Vec3,
    pub axis_mapping: AxisMapping,
    /// Probability per update of a random respawn (0.0 = never).
    pub respawn_chance: f32,
    /// Upper bound on the random number of settling steps after a respawn.
    pub warmup_steps: u32,
    /// Particles further than this from `center_offset` respawn (0.0 = never).
    pub max_distance: f32,
    /// Time step used for warmup integration.
    pub dt: f32,
    /// Maximum number of trail points kept.
    pub trail_length: usize,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            center_offset: Vec3::ZERO,
            spawn_range: 1.0,
            spawn_offset: Vec3::ZERO,
            axis_mapping: AxisMapping::IDENTITY,
            respawn_chance: 0.0,
            warmup_steps: 0,
            max_distance: 0.0,
            dt: 0.005,
            trail_length: 40,
        }
    }
}

/// One point of a trail, in display space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailPoint {
    pub position: Vec3,
    pub speed: f32,
}

/// Which branch an [`Trajectory::update`] call took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A new trail point was written.
    Advanced,
    /// The particle left `max_distance` and was respawned.
    Culled,
    /// The random turnover fired and the particle was respawned.
    Turnover,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BlinkPhase {
    Steady,
    Blinking { duration: f32, remaining: f32 },
}

/// Flicker state of one particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blink {
    phase: BlinkPhase,
    intensity: f32,
}

impl Blink {
    fn steady() -> Self {
        Self {
            phase: BlinkPhase::Steady,
            intensity: 0.0,
        }
    }

    /// Current intensity in `[0, 1]`.
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn is_blinking(&self) -> bool {
        matches!(self.phase, BlinkPhase::Blinking { .. })
    }

    /// Seconds left in the current blink, zero when steady.
    pub fn remaining(&self) -> f32 {
        match self.phase {
            BlinkPhase::Steady => 0.0,
            BlinkPhase::Blinking { remaining, .. } => remaining,
        }
    }
}

/// One particle following the vector field.
pub struct Trajectory {
    stepper: Arc<dyn Stepper>,
    config: TrajectoryConfig,
    position: Vec3,
    speed: f32,
    trail: VecDeque<TrailPoint>,
    blink: Blink,
    rng: SmallRng,
}

impl Trajectory {
    /// Create a particle and place it in the spawn volume.
    ///
    /// `seed` makes spawn positions, turnover and blinking reproducible.
    pub fn new(stepper: Arc<dyn Stepper>, config: TrajectoryConfig, seed: u64) -> Self {
        let trail = VecDeque::with_capacity(config.trail_length + 1);
        let mut trajectory = Self {
            stepper,
            config,
            position: Vec3::ZERO,
            speed: 0.0,
            trail,
            blink: Blink::steady(),
            rng: SmallRng::seed_from_u64(seed),
        };
        trajectory.respawn();
        trajectory
    }

    /// Current position in simulation space.
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Speed reported by the last step.
    #[inline]
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Trail points, newest first.
    #[inline]
    pub fn trail(&self) -> &VecDeque<TrailPoint> {
        &self.trail
    }

    #[inline]
    pub fn blink(&self) -> &Blink {
        &self.blink
    }

    pub fn config(&self) -> &TrajectoryConfig {
        &self.config
    }

    pub fn stepper(&self) -> &Arc<dyn Stepper> {
        &self.stepper
    }

    /// Replace the settings. The trail is truncated to the new length.
    pub fn set_config(&mut self, config: TrajectoryConfig) {
        self.config = config;
        self.trail.truncate(self.config.trail_length);
    }

    /// Change the trail capacity, dropping the oldest points if needed.
    pub fn set_trail_length(&mut self, length: usize) {
        self.config.trail_length = length;
        self.trail.truncate(length);
    }

    /// Move back into the spawn cube and clear the trail.
    pub fn respawn(&mut self) {
        let range = self.config.spawn_range;
        let jitter = Vec3::new(
            self.rng.gen::<f32>() - 0.5,
            self.rng.gen::<f32>() - 0.5,
            self.rng.gen::<f32>() - 0.5,
        ) * range;
        self.position = self.config.spawn_offset + jitter;
        self.speed = 0.0;
        self.trail.clear();

        if self.config.warmup_steps > 0 {
            let steps = (self.rng.gen::<f32>() * self.config.warmup_steps as f32).floor() as u32;
            for _ in 0..steps {
                let step = self.stepper.step(self.position, self.config.dt);
                self.position = step.position;
                self.speed = step.speed;
            }
        }
    }

    /// Integrate one step and record it in the trail.
    ///
    /// `scale` converts simulation units to display units.
    pub fn update(&mut self, dt: f32, scale: f32) -> UpdateOutcome {
        let step = self.stepper.step(self.position, dt);
        self.position = step.position;
        self.speed = step.speed;

        let max_distance = self.config.max_distance;
        let offset = self.position.distance_squared(self.config.center_offset);
        if max_distance > 0.0 && offset > max_distance * max_distance {
            self.respawn();
            return UpdateOutcome::Culled;
        }

        if self.config.respawn_chance > 0.0 && self.rng.gen::<f32>() < self.config.respawn_chance {
            self.respawn();
            return UpdateOutcome::Turnover;
        }

        let local = self
            .config
            .axis_mapping
            .apply(self.position - self.config.center_offset)
            * scale;
        self.trail.push_front(TrailPoint {
            position: local,
            speed: self.speed,
        });
        while self.trail.len() > self.config.trail_length {
            self.trail.pop_back();
        }
        UpdateOutcome::Advanced
    }

    /// Advance the flicker state machine by `dt` seconds.
    pub fn update_blink(&mut self, dt: f32, config: &BlinkConfig) {
        if !config.enabled {
            self.blink = Blink::steady();
            return;
        }

        match self.blink.phase {
            BlinkPhase::Steady => {
                let chance = config.chance.clamp(0.0, 1.0);
                let probability = 1.0 - (1.0 - chance).powf(dt / BLINK_REFERENCE_TICK);
                if self.rng.gen::<f32>() < probability {
                    let duration = config.min_duration
                        + self.rng.gen::<f32>() * (config.max_duration - config.min_duration);
                    if duration > 0.0 {
                        self.blink.phase = BlinkPhase::Blinking {
                            duration,
                            remaining: duration,
                        };
                    }
                }
                self.blink.intensity = 0.0;
            }
            BlinkPhase::Blinking { duration, remaining } => {
                let remaining = remaining - dt;
                if remaining <= 0.0 {
                    self.blink = Blink::steady();
                } else {
                    self.blink.phase = BlinkPhase::Blinking { duration, remaining };
                    let progress = 1.0 - remaining / duration;
                    self.blink.intensity = (PI * progress).sin().clamp(0.0, 1.0);
                }
            }
        }
    }
}

impl fmt::Debug for Trajectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trajectory")
            .field("position", &self.position)
            .field("speed", &self.speed)
            .field("trail_len", &self.trail.len())
            .field("blink", &self.blink)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stepper::Step;

    fn drift(velocity: Vec3) -> Arc<dyn Stepper> {
        Arc::new(move |p: Vec3, dt: f32| Step::new(p + velocity * dt, velocity.length()))
    }

    fn still() -> Arc<dyn Stepper> {
        Arc::new(|p: Vec3, _dt: f32| Step::new(p, 0.0))
    }

    #[test]
    fn test_respawn_with_zero_range_is_exact() {
        let config = TrajectoryConfig {
            spawn_range: 0.0,
            spawn_offset: Vec3::new(1.0, 2.0, 3.0),
            trail_length: 5,
            ..Default::default()
        };
        let mut t = Trajectory::new(still(), config, 1);
        assert_eq!(t.position(), Vec3::new(1.0, 2.0, 3.0));
        t.update(0.01, 1.0);
        t.respawn();
        assert_eq!(t.position(), Vec3::new(1.0, 2.0, 3.0));
        assert!(t.trail().is_empty());
    }

    #[test]
    fn test_respawn_stays_in_spawn_cube() {
        let config = TrajectoryConfig {
            spawn_range: 2.0,
            spawn_offset: Vec3::new(5.0, 0.0, -5.0),
            ..Default::default()
        };
        let mut t = Trajectory::new(still(), config, 42);
        for _ in 0..500 {
            t.respawn();
            let d = (t.position() - Vec3::new(5.0, 0.0, -5.0)).abs();
            assert!(d.max_element() <= 1.0);
        }
    }

    #[test]
    fn test_trail_is_bounded_and_newest_first() {
        let config = TrajectoryConfig {
            spawn_range: 0.0,
            trail_length: 3,
            ..Default::default()
        };
        let mut t = Trajectory::new(drift(Vec3::X), config, 9);
        for _ in 0..10 {
            assert_eq!(t.update(1.0, 1.0), UpdateOutcome::Advanced);
            assert!(t.trail().len() <= 3);
        }
        let xs: Vec<f32> = t.trail().iter().map(|p| p.position.x).collect();
        assert_eq!(xs, vec![10.0, 9.0, 8.0]);
    }

    #[test]
    fn test_cull_respawns_without_trail_point() {
        let config = TrajectoryConfig {
            spawn_range: 0.0,
            max_distance: 2.5,
            trail_length: 10,
            ..Default::default()
        };
        let mut t = Trajectory::new(drift(Vec3::X), config, 5);
        assert_eq!(t.update(1.0, 1.0), UpdateOutcome::Advanced);
        assert_eq!(t.update(1.0, 1.0), UpdateOutcome::Advanced);
        assert_eq!(t.update(1.0, 1.0), UpdateOutcome::Culled);
        assert!(t.trail().is_empty());
        assert_eq!(t.position(), Vec3::ZERO);
    }

    #[test]
    fn test_certain_turnover_always_respawns() {
        let config = TrajectoryConfig {
            respawn_chance: 1.0,
            ..Default::default()
        };
        let mut t = Trajectory::new(drift(Vec3::Y), config, 5);
        for _ in 0..20 {
            assert_eq!(t.update(0.1, 1.0), UpdateOutcome::Turnover);
            assert!(t.trail().is_empty());
        }
    }

    #[test]
    fn test_center_axis_mapping_and_scale() {
        let config = TrajectoryConfig {
            spawn_range: 0.0,
            spawn_offset: Vec3::new(1.0, 2.0, 3.0),
            center_offset: Vec3::new(1.0, 1.0, 1.0),
            axis_mapping: "x,-z,y".parse().unwrap(),
            ..Default::default()
        };
        let mut t = Trajectory::new(still(), config, 0);
        t.update(0.1, 2.0);
        // local = (0, 1, 2) -> mapped (0, -2, 1) -> scaled
        assert_eq!(t.trail()[0].position, Vec3::new(0.0, -4.0, 2.0));
    }

    #[test]
    fn test_set_trail_length_truncates() {
        let config = TrajectoryConfig {
            trail_length: 8,
            ..Default::default()
        };
        let mut t = Trajectory::new(drift(Vec3::Z), config, 2);
        for _ in 0..8 {
            t.update(0.1, 1.0);
        }
        t.set_trail_length(3);
        assert_eq!(t.trail().len(), 3);
        assert_eq!(t.config().trail_length, 3);
    }

    #[test]
    fn test_warmup_moves_particle_but_leaves_trail_empty() {
        let config = TrajectoryConfig {
            spawn_range: 0.0,
            warmup_steps: 1000,
            dt: 1.0,
            ..Default::default()
        };
        let mut moved = false;
        for seed in 0..8 {
            let t = Trajectory::new(drift(Vec3::X), config.clone(), seed);
            assert!(t.trail().is_empty());
            assert!(t.position().x < 1000.0);
            moved |= t.position().x > 0.0;
        }
        assert!(moved);
    }

    #[test]
    fn test_axis_mapping_rejects_duplicates() {
        assert!("xxy".parse::<AxisMapping>().is_err());
        assert!("xy".parse::<AxisMapping>().is_err());
        assert!("x,y,w".parse::<AxisMapping>().is_err());
        assert_eq!("x y z".parse::<AxisMapping>().unwrap(), AxisMapping::IDENTITY);
    }

    #[test]
    fn test_blink_pulse_returns_to_steady() {
        let blink = BlinkConfig {
            enabled: true,
            chance: 1.0,
            min_duration: 0.5,
            max_duration: 0.5,
            ..Default::default()
        };
        let mut t = Trajectory::new(still(), TrajectoryConfig::default(), 3);
        t.update_blink(1.0 / 60.0, &blink);
        assert!(t.blink().is_blinking());

        let mut peak = 0.0f32;
        for _ in 0..29 {
            t.update_blink(1.0 / 60.0, &blink);
            let i = t.blink().intensity();
            assert!((0.0..=1.0).contains(&i));
            peak = peak.max(i);
        }
        assert!(peak > 0.9);

        let quiet = BlinkConfig {
            chance: 0.0,
            ..blink
        };
        for _ in 0..10 {
            t.update_blink(1.0 / 60.0, &quiet);
        }
        assert!(!t.blink().is_blinking());
        assert_eq!(t.blink().intensity(), 0.0);
    }

    #[test]
    fn test_disabled_blink_stays_steady() {
        let blink = BlinkConfig {
            enabled: false,
            chance: 1.0,
            ..Default::default()
        };
        let mut t = Trajectory::new(still(), TrajectoryConfig::default(), 3);
        for _ in 0..10 {
            t.update_blink(0.1, &blink);
            assert!(!t.blink().is_blinking());
        }
    }
}
