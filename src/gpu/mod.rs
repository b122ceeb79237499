//! GPU compositing of trail segments.
//!
//! [`GpuCompositor`] drives one frame at a time through a fixed protocol:
//!
//! ```text
//! begin_frame -> update_lines -> render_lines -> end_frame -> composite_onto
//! ```
//!
//! The compositor plans the passes of each frame and hands them to a
//! [`RenderBackend`]. [`WgpuBackend`] renders them headlessly with wgpu;
//! [`RecordingBackend`] only records them.

mod fbo;
mod graph;
mod present;
mod recording;
mod shaders;
mod uniforms;
mod wgpu_backend;

use image::RgbaImage;

pub use fbo::{Fbo, TARGET_FORMAT};
pub use graph::{plan_begin_frame, plan_end_frame, BlurDirection, Pass, Target, MAX_BLUR_PASSES};
pub use present::{glow_layer, present, GlowLayer, MAX_GLOW_RADIUS};
pub use recording::RecordingBackend;
pub use shaders::{validate_wgsl, ProgramKind};
pub use uniforms::{FrameUniforms, LineInstance};
pub use wgpu_backend::WgpuBackend;

use crate::config::{
    BackgroundConfig, BlinkConfig, BloomConfig, ChromaticAberrationConfig, ColorGradingConfig,
    DepthFogConfig, EnergyFlowConfig, GlowConfig, IridescenceConfig, PipelineConfig, VisualConfig,
};
use crate::error::GpuError;
use crate::projector::Segment;

/// The operations the compositor needs from a GPU.
pub trait RenderBackend {
    /// Build the program. Any error makes the compositor unavailable.
    fn compile(&mut self, kind: ProgramKind) -> Result<(), GpuError>;

    /// Size the line instance buffer once for `capacity` segments.
    fn allocate_lines(&mut self, capacity: usize);

    /// (Re)create every [`Target`] for a `width` x `height` output.
    fn create_targets(&mut self, width: u32, height: u32);

    fn target_size(&self, target: Target) -> Option<(u32, u32)>;

    /// Write `lines` to the start of the instance buffer.
    fn upload_lines(&mut self, lines: &[LineInstance]);

    /// Record one pass of the current frame.
    fn encode(&mut self, pass: &Pass);

    /// Write the frame uniforms and submit everything recorded since the
    /// last submit.
    fn submit(&mut self, uniforms: &FrameUniforms);

    /// Copy a target back to the CPU.
    fn read_target(&mut self, target: Target) -> Result<RgbaImage, GpuError>;

    /// Free every GPU resource.
    fn release(&mut self);
}

/// Where the compositor is in the per-frame protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    BeginFrame,
    LinesUploaded,
    LinesRendered,
    Composited,
}

fn out_of_order(call: &str, phase: FramePhase) {
    log::warn!("Ignoring {} during {:?}", call, phase);
}

/// Renders projected segments with bloom and post-processing and presents the
/// result onto a CPU image.
///
/// If the GPU context is missing or any program fails to build, the compositor
/// is unavailable for the rest of its life: every frame call becomes a no-op
/// and [`failure`](Self::failure) says why.
pub struct GpuCompositor<B: RenderBackend = WgpuBackend> {
    backend: Option<B>,
    failure: Option<GpuError>,
    config: PipelineConfig,
    /// Snapshot taken at `begin_frame`, used for the rest of the frame.
    frame_config: PipelineConfig,
    uniforms: FrameUniforms,
    phase: FramePhase,
    width: u32,
    height: u32,
    max_segments: usize,
    staged: Vec<LineInstance>,
    uploaded: usize,
    dropped: usize,
}

impl GpuCompositor<WgpuBackend> {
    /// Acquire a headless wgpu context and initialise on it.
    pub fn new(width: u32, height: u32, max_segments: usize) -> Self {
        Self::init(WgpuBackend::acquire(), width, height, max_segments)
    }
}

impl<B: RenderBackend> GpuCompositor<B> {
    /// Initialise on an acquired (or failed) context.
    pub fn init(
        context: Result<B, GpuError>,
        width: u32,
        height: u32,
        max_segments: usize,
    ) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let config = PipelineConfig::default();
        let mut compositor = Self {
            backend: None,
            failure: None,
            uniforms: FrameUniforms::from_config(&config, width, height),
            frame_config: config.clone(),
            config,
            phase: FramePhase::Idle,
            width,
            height,
            max_segments,
            staged: Vec::with_capacity(max_segments),
            uploaded: 0,
            dropped: 0,
        };

        let mut backend = match context {
            Ok(backend) => backend,
            Err(e) => {
                compositor.mark_unavailable(e);
                return compositor;
            }
        };

        for kind in ProgramKind::ALL {
            if let Err(e) = backend.compile(kind) {
                backend.release();
                compositor.mark_unavailable(e);
                return compositor;
            }
        }
        backend.allocate_lines(max_segments);
        backend.create_targets(width, height);
        compositor.backend = Some(backend);

        log::info!(
            "GPU compositor ready: {}x{}, {} segments",
            width,
            height,
            max_segments
        );
        compositor
    }

    fn mark_unavailable(&mut self, error: GpuError) {
        log::warn!("GPU compositor unavailable: {}", error);
        self.failure = Some(error);
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Why the compositor is unavailable.
    pub fn failure(&self) -> Option<&GpuError> {
        self.failure.as_ref()
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Current size of a render target, `None` when unavailable.
    pub fn target_size(&self, target: Target) -> Option<(u32, u32)> {
        self.backend.as_ref()?.target_size(target)
    }

    pub fn max_segments(&self) -> usize {
        self.max_segments
    }

    /// Segments cut off by the last `update_lines`.
    pub fn dropped_segments(&self) -> usize {
        self.dropped
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> Option<&mut B> {
        self.backend.as_mut()
    }

    /// Live configuration; changes apply from the next `begin_frame`.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Configuration of the frame in flight.
    pub fn frame_config(&self) -> &PipelineConfig {
        &self.frame_config
    }

    pub fn set_config(&mut self, config: PipelineConfig) -> &mut Self {
        self.config = config;
        self
    }

    pub fn set_visual<F: FnOnce(&mut VisualConfig)>(&mut self, f: F) -> &mut Self {
        f(&mut self.config.visual);
        self
    }

    pub fn set_bloom<F: FnOnce(&mut BloomConfig)>(&mut self, f: F) -> &mut Self {
        f(&mut self.config.bloom);
        self
    }

    pub fn set_background<F: FnOnce(&mut BackgroundConfig)>(&mut self, f: F) -> &mut Self {
        f(&mut self.config.background);
        self
    }

    pub fn set_blink<F: FnOnce(&mut BlinkConfig)>(&mut self, f: F) -> &mut Self {
        f(&mut self.config.blink);
        self
    }

    pub fn set_energy_flow<F: FnOnce(&mut EnergyFlowConfig)>(&mut self, f: F) -> &mut Self {
        f(&mut self.config.energy_flow);
        self
    }

    pub fn set_depth_fog<F: FnOnce(&mut DepthFogConfig)>(&mut self, f: F) -> &mut Self {
        f(&mut self.config.depth_fog);
        self
    }

    pub fn set_iridescence<F: FnOnce(&mut IridescenceConfig)>(&mut self, f: F) -> &mut Self {
        f(&mut self.config.iridescence);
        self
    }

    pub fn set_chromatic_aberration<F: FnOnce(&mut ChromaticAberrationConfig)>(
        &mut self,
        f: F,
    ) -> &mut Self {
        f(&mut self.config.chromatic_aberration);
        self
    }

    pub fn set_color_grading<F: FnOnce(&mut ColorGradingConfig)>(&mut self, f: F) -> &mut Self {
        f(&mut self.config.color_grading);
        self
    }

    pub fn set_glow<F: FnOnce(&mut GlowConfig)>(&mut self, f: F) -> &mut Self {
        f(&mut self.config.glow);
        self
    }

    /// Start a frame: snapshot the config, clear the scene and draw the
    /// background.
    pub fn begin_frame(&mut self, time: f32) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        if !matches!(self.phase, FramePhase::Idle | FramePhase::Composited) {
            out_of_order("begin_frame", self.phase);
            return;
        }

        self.frame_config = self.config.clone();
        self.uniforms = FrameUniforms::from_config(&self.frame_config, self.width, self.height);
        self.uniforms.set_time(time);
        for pass in plan_begin_frame(&self.frame_config) {
            backend.encode(&pass);
        }
        self.uploaded = 0;
        self.phase = FramePhase::BeginFrame;
    }

    /// Upload this frame's segments and return how many were kept.
    ///
    /// Anything past `max_segments` is cut off and counted in
    /// [`dropped_segments`](Self::dropped_segments).
    pub fn update_lines(&mut self, segments: &[Segment]) -> usize {
        let Some(backend) = self.backend.as_mut() else {
            return 0;
        };
        if self.phase != FramePhase::BeginFrame {
            out_of_order("update_lines", self.phase);
            return 0;
        }

        let used = segments.len().min(self.max_segments);
        self.dropped = segments.len() - used;
        if self.dropped > 0 {
            log::trace!("Line buffer full, dropped {} segments", self.dropped);
        }

        self.staged.clear();
        self.staged
            .extend(segments[..used].iter().map(LineInstance::from));
        backend.upload_lines(&self.staged);
        self.uploaded = used;
        self.phase = FramePhase::LinesUploaded;
        used
    }

    /// Draw the first `count` uploaded segments into the scene.
    pub fn render_lines(&mut self, count: usize, time: f32, hue_offset: f32) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        if self.phase != FramePhase::LinesUploaded {
            out_of_order("render_lines", self.phase);
            return;
        }

        let count = count.min(self.uploaded) as u32;
        self.uniforms.set_time(time);
        self.uniforms.set_hue_offset(hue_offset);
        backend.encode(&Pass::Lines { count });
        self.phase = FramePhase::LinesRendered;
    }

    /// Run bloom and post-processing into the present target and submit.
    pub fn end_frame(&mut self) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        if self.phase != FramePhase::LinesRendered {
            out_of_order("end_frame", self.phase);
            return;
        }

        for pass in plan_end_frame(&self.frame_config) {
            backend.encode(&pass);
        }
        backend.submit(&self.uniforms);
        self.phase = FramePhase::Composited;
    }

    /// Present the finished frame onto `surface` with its top-left corner at
    /// (`x`, `y`).
    pub fn composite_onto(&mut self, surface: &mut RgbaImage, x: i64, y: i64) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        if self.phase != FramePhase::Composited {
            out_of_order("composite_onto", self.phase);
            return;
        }

        match backend.read_target(Target::Present) {
            Ok(frame) => present(surface, &frame, x, y, &self.frame_config.glow),
            Err(e) => log::warn!("Skipping frame: {}", e),
        }
        self.phase = FramePhase::Idle;
    }

    /// Recreate every render target at the new size.
    ///
    /// Refused, returning `false`, while a frame is in flight. Zero
    /// dimensions are clamped to 1.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if !matches!(self.phase, FramePhase::Idle | FramePhase::Composited) {
            out_of_order("resize", self.phase);
            return false;
        }

        let (width, height) = (width.max(1), height.max(1));
        self.width = width;
        self.height = height;
        if let Some(backend) = self.backend.as_mut() {
            backend.create_targets(width, height);
            log::debug!("Resized render targets to {}x{}", width, height);
        }
        self.phase = FramePhase::Idle;
        true
    }

    /// Release every GPU resource. The compositor stays unavailable.
    pub fn destroy(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.release();
            log::debug!("GPU compositor destroyed");
        }
        if self.failure.is_none() {
            self.failure = Some(GpuError::Released);
        }
        self.phase = FramePhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compositor() -> GpuCompositor<RecordingBackend> {
        GpuCompositor::init(Ok(RecordingBackend::new()), 64, 32, 16)
    }

    fn segment() -> Segment {
        Segment {
            x2: 10.0,
            y2: 10.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_init_compiles_every_program() {
        let c = compositor();
        assert!(c.is_available());
        assert_eq!(c.backend().unwrap().compiled, ProgramKind::ALL.to_vec());
        assert_eq!(c.backend().unwrap().line_capacity, 16);
    }

    #[test]
    fn test_missing_context_is_unavailable() {
        let c = GpuCompositor::<RecordingBackend>::init(Err(GpuError::NoAdapter), 64, 32, 16);
        assert!(!c.is_available());
        assert!(matches!(c.failure(), Some(GpuError::NoAdapter)));
    }

    #[test]
    fn test_out_of_order_calls_keep_phase() {
        let mut c = compositor();
        c.render_lines(1, 0.0, 0.0);
        c.end_frame();
        assert_eq!(c.phase(), FramePhase::Idle);

        c.begin_frame(0.0);
        c.begin_frame(0.0);
        assert_eq!(c.phase(), FramePhase::BeginFrame);
        c.end_frame();
        assert_eq!(c.phase(), FramePhase::BeginFrame);
        assert_eq!(c.update_lines(&[segment()]), 1);
        assert_eq!(c.phase(), FramePhase::LinesUploaded);
    }

    #[test]
    fn test_config_snapshot_is_taken_at_begin_frame() {
        let mut c = compositor();
        c.set_bloom(|b| b.enabled = false)
            .set_chromatic_aberration(|a| a.enabled = false)
            .set_color_grading(|g| g.enabled = false);
        c.begin_frame(0.0);
        c.set_bloom(|b| b.enabled = true);
        c.update_lines(&[segment()]);
        c.render_lines(1, 0.0, 0.0);
        c.end_frame();

        assert!(!c.frame_config().bloom.enabled);
        assert!(c.config().bloom.enabled);
        assert_eq!(c.backend().unwrap().blit_count(), 1);
    }

    #[test]
    fn test_render_lines_clamps_to_uploaded() {
        let mut c = compositor();
        c.begin_frame(1.5);
        c.update_lines(&[segment(), segment()]);
        c.render_lines(99, 2.0, 30.0);
        let passes = &c.backend().unwrap().passes;
        assert!(passes.contains(&Pass::Lines { count: 2 }));
        c.end_frame();
        let uniforms = c.backend().unwrap().submits[0];
        assert_eq!(uniforms.clock[0], 2.0);
        assert_eq!(uniforms.clock[1], 30.0);
    }

    #[test]
    fn test_resize_refused_mid_frame() {
        let mut c = compositor();
        c.begin_frame(0.0);
        assert!(!c.resize(10, 10));
        assert_eq!(c.size(), (64, 32));
    }
}
