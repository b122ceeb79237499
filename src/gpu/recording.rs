//! A [`RenderBackend`] that records what it is asked to do.
//!
//! Used to check pass ordering and draw-call counts without a GPU.

use std::collections::HashMap;

use image::{Rgba, RgbaImage};

use super::graph::{Pass, Target};
use super::shaders::ProgramKind;
use super::uniforms::{FrameUniforms, LineInstance};
use super::RenderBackend;
use crate::error::GpuError;

#[derive(Debug, Clone)]
pub struct RecordingBackend {
    /// Programs compiled so far, in order.
    pub compiled: Vec<ProgramKind>,
    /// Every pass handed to `encode`, across all frames.
    pub passes: Vec<Pass>,
    /// Length of each `upload_lines` call.
    pub uploads: Vec<usize>,
    /// Uniforms of each `submit`.
    pub submits: Vec<FrameUniforms>,
    pub line_capacity: usize,
    pub released: bool,
    sizes: HashMap<Target, (u32, u32)>,
    fail_on: Option<ProgramKind>,
    fill: Rgba<u8>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            compiled: Vec::new(),
            passes: Vec::new(),
            uploads: Vec::new(),
            submits: Vec::new(),
            line_capacity: 0,
            released: false,
            sizes: HashMap::new(),
            fail_on: None,
            fill: Rgba([255, 255, 255, 255]),
        }
    }

    /// Make `compile` fail for `kind`.
    pub fn failing_on(kind: ProgramKind) -> Self {
        Self {
            fail_on: Some(kind),
            ..Self::new()
        }
    }

    /// Colour of every pixel returned by `read_target`.
    pub fn with_fill(mut self, fill: Rgba<u8>) -> Self {
        self.fill = fill;
        self
    }

    /// Passes that issue a draw call.
    pub fn draw_calls(&self) -> usize {
        self.passes.iter().filter(|p| p.is_draw()).count()
    }

    pub fn blit_count(&self) -> usize {
        self.passes
            .iter()
            .filter(|p| matches!(p, Pass::Blit { .. }))
            .count()
    }

    pub fn clear_log(&mut self) {
        self.passes.clear();
        self.uploads.clear();
        self.submits.clear();
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for RecordingBackend {
    fn compile(&mut self, kind: ProgramKind) -> Result<(), GpuError> {
        if self.fail_on == Some(kind) {
            return Err(GpuError::ShaderCompile {
                program: kind,
                message: "rejected by test backend".into(),
            });
        }
        self.compiled.push(kind);
        Ok(())
    }

    fn allocate_lines(&mut self, capacity: usize) {
        self.line_capacity = capacity;
    }

    fn create_targets(&mut self, width: u32, height: u32) {
        for target in Target::ALL {
            self.sizes.insert(target, target.size_for(width, height));
        }
    }

    fn target_size(&self, target: Target) -> Option<(u32, u32)> {
        self.sizes.get(&target).copied()
    }

    fn upload_lines(&mut self, lines: &[LineInstance]) {
        self.uploads.push(lines.len());
    }

    fn encode(&mut self, pass: &Pass) {
        self.passes.push(*pass);
    }

    fn submit(&mut self, uniforms: &FrameUniforms) {
        self.submits.push(*uniforms);
    }

    fn read_target(&mut self, target: Target) -> Result<RgbaImage, GpuError> {
        let (width, height) = self
            .target_size(target)
            .ok_or_else(|| GpuError::BufferMapping(format!("{} not allocated", target.label())))?;
        Ok(RgbaImage::from_pixel(width, height, self.fill))
    }

    fn release(&mut self) {
        self.sizes.clear();
        self.line_capacity = 0;
        self.released = true;
    }
}
