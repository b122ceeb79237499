//! The particle collection behind one attractor view.

use std::fmt;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::camera::OrbitCamera;
use crate::config::BlinkConfig;
use crate::stepper::{ParamVariation, Stepper};
use crate::trajectory::{AxisMapping, Trajectory, TrajectoryConfig, UpdateOutcome};

/// Camera, zoom and clock of the view. Reset whenever the system is rebuilt.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub camera: OrbitCamera,
    /// Screen pixels per projected display unit.
    pub zoom: f32,
    /// Simulation seconds since the last rebuild.
    pub time: f32,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            camera: OrbitCamera::new(),
            zoom: 1.0,
            time: 0.0,
        }
    }
}

/// Everything needed to switch to a different dynamical system.
pub struct SystemSpec {
    pub stepper: Arc<dyn Stepper>,
    pub config: TrajectoryConfig,
    pub particle_count: usize,
    /// Per-particle parameter spread; `None` shares one stepper.
    pub variation: Option<ParamVariation>,
    /// View to start from after the switch.
    pub view: ViewState,
}

impl SystemSpec {
    pub fn new(stepper: Arc<dyn Stepper>, particle_count: usize) -> Self {
        Self {
            stepper,
            config: TrajectoryConfig::default(),
            particle_count,
            variation: None,
            view: ViewState::default(),
        }
    }

    pub fn with_config(mut self, config: TrajectoryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_axis_mapping(mut self, mapping: AxisMapping) -> Self {
        self.config.axis_mapping = mapping;
        self
    }

    pub fn with_variation(mut self, variation: ParamVariation) -> Self {
        self.variation = Some(variation);
        self
    }

    pub fn with_view(mut self, view: ViewState) -> Self {
        self.view = view;
        self
    }
}

/// Counts of what happened during one [`TrailSystem::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub advanced: usize,
    pub culled: usize,
    pub turnover: usize,
}

/// Owns the trajectories of one attractor and keeps them in step.
pub struct TrailSystem {
    stepper: Arc<dyn Stepper>,
    config: TrajectoryConfig,
    variation: Option<ParamVariation>,
    trajectories: Vec<Trajectory>,
    view: ViewState,
    rng: SmallRng,
}

impl TrailSystem {
    /// Build a system from `spec`.
    ///
    /// `seed` drives every random choice below this system, so two systems
    /// built with the same seed and spec evolve identically.
    pub fn new(spec: SystemSpec, seed: u64) -> Self {
        let mut system = Self {
            stepper: Arc::clone(&spec.stepper),
            config: spec.config.clone(),
            variation: None,
            trajectories: Vec::new(),
            view: ViewState::default(),
            rng: SmallRng::seed_from_u64(seed),
        };
        system.rebuild(spec);
        system
    }

    pub fn trajectories(&self) -> &[Trajectory] {
        &self.trajectories
    }

    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    pub fn config(&self) -> &TrajectoryConfig {
        &self.config
    }

    pub fn stepper(&self) -> &Arc<dyn Stepper> {
        &self.stepper
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ViewState {
        &mut self.view
    }

    /// Grow or shrink to `count` particles.
    ///
    /// Existing particles keep their state. New ones get their own stepper
    /// when a variation is configured.
    pub fn set_particle_count(&mut self, count: usize) {
        if count <= self.trajectories.len() {
            self.trajectories.truncate(count);
            return;
        }
        self.trajectories.reserve(count - self.trajectories.len());
        while self.trajectories.len() < count {
            let trajectory = self.spawn();
            self.trajectories.push(trajectory);
        }
    }

    /// Change the trail capacity of every particle in place.
    pub fn set_trail_length(&mut self, length: usize) {
        self.config.trail_length = length;
        for trajectory in &mut self.trajectories {
            trajectory.set_trail_length(length);
        }
    }

    /// Replace the trajectory settings of every particle, keeping positions.
    pub fn set_config(&mut self, config: TrajectoryConfig) {
        for trajectory in &mut self.trajectories {
            trajectory.set_config(config.clone());
        }
        self.config = config;
    }

    /// Switch to a different dynamical system in one step.
    ///
    /// Stepper, settings, variation and particles are all replaced, and the
    /// camera, zoom and clock return to `spec.view`.
    pub fn rebuild(&mut self, spec: SystemSpec) {
        self.stepper = spec.stepper;
        self.config = spec.config;
        self.variation = spec.variation;
        self.view = spec.view;
        self.trajectories = Vec::with_capacity(spec.particle_count);
        self.set_particle_count(spec.particle_count);
        log::debug!(
            "Rebuilt trail system with {} particles (trail length {})",
            self.trajectories.len(),
            self.config.trail_length
        );
    }

    /// Advance every particle and its blink state, and the view clock.
    pub fn update(&mut self, dt: f32, scale: f32, blink: &BlinkConfig) -> TickStats {
        let mut stats = TickStats::default();
        for trajectory in &mut self.trajectories {
            match trajectory.update(dt, scale) {
                UpdateOutcome::Advanced => stats.advanced += 1,
                UpdateOutcome::Culled => stats.culled += 1,
                UpdateOutcome::Turnover => stats.turnover += 1,
            }
            trajectory.update_blink(dt, blink);
        }
        self.view.time += dt;
        stats
    }

    /// Total trail points across all particles.
    pub fn point_count(&self) -> usize {
        self.trajectories.iter().map(|t| t.trail().len()).sum()
    }

    fn spawn(&mut self) -> Trajectory {
        let stepper = match &self.variation {
            Some(variation) => variation.apply(&self.stepper, &mut self.rng),
            None => Arc::clone(&self.stepper),
        };
        let seed = self.rng.gen::<u64>();
        Trajectory::new(stepper, self.config.clone(), seed)
    }
}

impl fmt::Debug for TrailSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrailSystem")
            .field("particles", &self.trajectories.len())
            .field("config", &self.config)
            .field("variation", &self.variation)
            .field("view", &self.view)
            .finish()
    }
}
