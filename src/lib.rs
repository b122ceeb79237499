//! # glowtrail
//!
//! Glowing particle trails over strange attractors, composited on the GPU.
//!
//! The crate has two halves. The simulation half is plain CPU code: a
//! [`TrailSystem`] owns many [`Trajectory`] values, each stepping a point
//! through a user-supplied [`Stepper`] and remembering its recent positions.
//! A [`Projector`] flattens those trails into screen-space [`Segment`]s
//! through any [`Projection`].
//!
//! The rendering half is the [`GpuCompositor`], which draws the segments as
//! additive lines over an animated background, runs bloom and optional
//! post-processing, and presents the result onto an [`image::RgbaImage`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use glowtrail::prelude::*;
//! use std::sync::Arc;
//!
//! let lorenz = Arc::new(|p: Vec3, dt: f32| {
//!     let v = Vec3::new(
//!         10.0 * (p.y - p.x),
//!         p.x * (28.0 - p.z) - p.y,
//!         p.x * p.y - 8.0 / 3.0 * p.z,
//!     );
//!     Step::new(p + v * dt, v.length())
//! });
//! let mut system = TrailSystem::new(SystemSpec::new(lorenz, 500), 7);
//! let mut projector = Projector::new(20_000, 60.0);
//! let mut compositor = GpuCompositor::new(800, 600, 20_000);
//! let mut canvas = RgbaImage::new(800, 600);
//!
//! let blink = compositor.config().blink.clone();
//! system.update(1.0 / 60.0, 1.0, &blink);
//! let view = system.view().clone();
//! let center = Vec2::new(400.0, 300.0);
//! let segments =
//!     projector.collect_segments(system.trajectories(), &view.camera, view.zoom, center);
//!
//! compositor.begin_frame(view.time);
//! let n = compositor.update_lines(segments);
//! compositor.render_lines(n, view.time, 0.0);
//! compositor.end_frame();
//! compositor.composite_onto(&mut canvas, 0, 0);
//! ```
//!
//! ## Unavailable GPU
//!
//! Missing adapters and shader failures never panic. The compositor records
//! the [`GpuError`] and reports `is_available() == false`; every frame call
//! turns into a no-op so the caller can draw with a CPU fallback instead.
//!
//! ## Configuration
//!
//! Effects are grouped into plain structs inside [`PipelineConfig`] and are
//! changed through closures:
//!
//! ```ignore
//! compositor
//!     .set_bloom(|b| b.strength = 2.0)
//!     .set_depth_fog(|f| f.enabled = true);
//! ```
//!
//! Changes take effect at the next `begin_frame`.

pub mod camera;
pub mod config;
pub mod error;
pub mod gpu;
pub mod projector;
pub mod stepper;
pub mod trail_system;
pub mod trajectory;

pub use camera::{OrbitCamera, Projected, Projection};
pub use config::{
    BackgroundConfig, BlinkConfig, BloomConfig, ChromaticAberrationConfig, ColorGradingConfig,
    DepthFogConfig, EnergyFlowConfig, GlowConfig, IridescenceConfig, PipelineConfig, VisualConfig,
};
pub use error::GpuError;
pub use glam::{Vec2, Vec3};
pub use gpu::{FramePhase, GpuCompositor, RecordingBackend, RenderBackend, WgpuBackend};
pub use image;
pub use projector::{Projector, Segment};
pub use stepper::{ParamVariation, Step, Stepper};
pub use trail_system::{SystemSpec, TickStats, TrailSystem, ViewState};
pub use trajectory::{
    Axis, AxisMapping, Blink, ParseAxisMappingError, TrailPoint, Trajectory, TrajectoryConfig,
    UpdateOutcome,
};

/// Everything needed for the usual simulate-project-composite loop.
pub mod prelude {
    pub use crate::camera::{OrbitCamera, Projection};
    pub use crate::config::PipelineConfig;
    pub use crate::gpu::GpuCompositor;
    pub use crate::projector::{Projector, Segment};
    pub use crate::stepper::{ParamVariation, Step, Stepper};
    pub use crate::trail_system::{SystemSpec, TrailSystem, ViewState};
    pub use crate::trajectory::{AxisMapping, Trajectory, TrajectoryConfig};
    pub use crate::{Vec2, Vec3};
    pub use image::RgbaImage;
}
