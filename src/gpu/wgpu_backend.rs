//! Headless wgpu implementation of [`RenderBackend`].

use std::collections::HashMap;
use std::sync::mpsc;

use image::RgbaImage;

use super::fbo::{self, Fbo, TARGET_FORMAT};
use super::graph::{BlurDirection, Pass, Target};
use super::shaders::ProgramKind;
use super::uniforms::{FrameUniforms, LineInstance};
use super::RenderBackend;
use crate::error::GpuError;

const LINE_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x2,
    1 => Float32x2,
    2 => Float32x4,
    3 => Float32x2,
];

/// Premultiplied colour added onto the destination.
const ADDITIVE_BLENDING: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

struct Program {
    bind_group_layout: wgpu::BindGroupLayout,
    /// One pipeline per fragment entry point, in `fragment_entries` order.
    pipelines: Vec<wgpu::RenderPipeline>,
}

/// Off-screen renderer on its own device and queue.
///
/// Every pass of a frame is recorded into one command encoder that is
/// submitted together with the frame uniforms.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    uniform_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    programs: HashMap<ProgramKind, Program>,
    targets: HashMap<Target, Fbo>,
    line_buffer: Option<wgpu::Buffer>,
    line_capacity: usize,
    encoder: Option<wgpu::CommandEncoder>,
}

impl WgpuBackend {
    /// Request an adapter and device without a surface.
    pub fn acquire() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(GpuError::NoAdapter)?;

        let info = adapter.get_info();
        log::info!("Using adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Glowtrail Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))?;

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniform Buffer"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Target Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            device,
            queue,
            uniform_buffer,
            sampler,
            programs: HashMap::new(),
            targets: HashMap::new(),
            line_buffer: None,
            line_capacity: 0,
            encoder: None,
        })
    }

    fn bind_group_layout(&self, kind: ProgramKind) -> wgpu::BindGroupLayout {
        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        if kind.texture_inputs() > 0 {
            entries.push(texture_entry(1));
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }
        if kind.texture_inputs() > 1 {
            entries.push(texture_entry(3));
        }

        self.device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(kind.label()),
                entries: &entries,
            })
    }

    /// Bind group for `kind` reading from `sources` (bindings 1 and 3).
    fn bind_group(&self, kind: ProgramKind, sources: &[Target]) -> Option<wgpu::BindGroup> {
        let program = self.programs.get(&kind)?;
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: self.uniform_buffer.as_entire_binding(),
        }];
        if let Some(first) = sources.first() {
            entries.push(wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&self.targets.get(first)?.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            });
        }
        if let Some(second) = sources.get(1) {
            entries.push(wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(&self.targets.get(second)?.view),
            });
        }

        Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kind.label()),
            layout: &program.bind_group_layout,
            entries: &entries,
        }))
    }

    /// Record one render pass drawing `vertices` x `instances` into `dest`.
    #[allow(clippy::too_many_arguments)]
    fn draw(
        &mut self,
        kind: ProgramKind,
        entry: usize,
        sources: &[Target],
        dest: Target,
        load: wgpu::LoadOp<wgpu::Color>,
        vertices: u32,
        instances: u32,
    ) {
        let Some(bind_group) = self.bind_group(kind, sources) else {
            log::warn!("Skipping {} pass: program or targets missing", kind.label());
            return;
        };
        let (Some(program), Some(target)) = (self.programs.get(&kind), self.targets.get(&dest))
        else {
            log::warn!("Skipping {} pass: program or targets missing", kind.label());
            return;
        };
        let Some(pipeline) = program.pipelines.get(entry) else {
            return;
        };

        let encoder = frame_encoder(&mut self.encoder, &self.device);
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(kind.label()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        if kind == ProgramKind::Lines {
            if let Some(buffer) = &self.line_buffer {
                render_pass.set_vertex_buffer(0, buffer.slice(..));
            }
        }
        render_pass.draw(0..vertices, 0..instances);
    }
}

/// The frame encoder, created on first use.
fn frame_encoder<'a>(
    slot: &'a mut Option<wgpu::CommandEncoder>,
    device: &wgpu::Device,
) -> &'a mut wgpu::CommandEncoder {
    slot.get_or_insert_with(|| {
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        })
    })
}

impl RenderBackend for WgpuBackend {
    fn compile(&mut self, kind: ProgramKind) -> Result<(), GpuError> {
        // naga reports readable errors; wgpu's scope catches the rest
        kind.validate()?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(kind.label()),
            source: wgpu::ShaderSource::Wgsl(kind.source().into()),
        });
        let bind_group_layout = self.bind_group_layout(kind);
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(kind.label()),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let line_buffers = [wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LineInstance>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &LINE_ATTRIBUTES,
        }];
        let buffers: &[wgpu::VertexBufferLayout] = if kind == ProgramKind::Lines {
            &line_buffers
        } else {
            &[]
        };
        let blend = match kind {
            ProgramKind::Lines => Some(ADDITIVE_BLENDING),
            ProgramKind::Background => Some(wgpu::BlendState::ALPHA_BLENDING),
            _ => None,
        };

        let pipelines = kind
            .fragment_entries()
            .iter()
            .map(|&entry| {
                self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(entry),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &shader,
                        entry_point: Some("vs_main"),
                        buffers,
                        compilation_options: Default::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &shader,
                        entry_point: Some(entry),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: TARGET_FORMAT,
                            blend,
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: Default::default(),
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        ..Default::default()
                    },
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                })
            })
            .collect();

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(GpuError::ShaderCompile {
                program: kind,
                message: error.to_string(),
            });
        }

        self.programs.insert(
            kind,
            Program {
                bind_group_layout,
                pipelines,
            },
        );
        Ok(())
    }

    fn allocate_lines(&mut self, capacity: usize) {
        if let Some(old) = self.line_buffer.take() {
            old.destroy();
        }
        let size = (capacity.max(1) * std::mem::size_of::<LineInstance>()) as u64;
        self.line_buffer = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Line Instance Buffer"),
            size,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.line_capacity = capacity;
    }

    fn create_targets(&mut self, width: u32, height: u32) {
        for target in Target::ALL {
            let (w, h) = target.size_for(width, height);
            let fbo = Fbo::new(&self.device, target.label(), w, h);
            if let Some(old) = self.targets.insert(target, fbo) {
                old.destroy();
            }
        }
    }

    fn target_size(&self, target: Target) -> Option<(u32, u32)> {
        self.targets.get(&target).map(Fbo::size)
    }

    fn upload_lines(&mut self, lines: &[LineInstance]) {
        let lines = &lines[..lines.len().min(self.line_capacity)];
        if lines.is_empty() {
            return;
        }
        if let Some(buffer) = &self.line_buffer {
            self.queue.write_buffer(buffer, 0, bytemuck::cast_slice(lines));
        }
    }

    fn encode(&mut self, pass: &Pass) {
        const REPLACE: wgpu::LoadOp<wgpu::Color> = wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT);
        const FULLSCREEN: u32 = 3;

        match *pass {
            Pass::Clear(target) => {
                let Some(fbo) = self.targets.get(&target) else {
                    return;
                };
                let encoder = frame_encoder(&mut self.encoder, &self.device);
                let _ = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Clear"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &fbo.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: REPLACE,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
            }
            Pass::Background => self.draw(
                ProgramKind::Background,
                0,
                &[],
                Target::Scene,
                wgpu::LoadOp::Load,
                FULLSCREEN,
                1,
            ),
            Pass::Lines { count } => {
                let count = count.min(self.line_capacity as u32);
                if count > 0 {
                    self.draw(
                        ProgramKind::Lines,
                        0,
                        &[],
                        Target::Scene,
                        wgpu::LoadOp::Load,
                        6,
                        count,
                    );
                }
            }
            Pass::BrightExtract => self.draw(
                ProgramKind::BrightExtract,
                0,
                &[Target::Scene],
                Target::BloomA,
                REPLACE,
                FULLSCREEN,
                1,
            ),
            Pass::Blur {
                direction,
                source,
                dest,
            } => {
                let entry = match direction {
                    BlurDirection::Horizontal => 0,
                    BlurDirection::Vertical => 1,
                };
                self.draw(ProgramKind::Blur, entry, &[source], dest, REPLACE, FULLSCREEN, 1);
            }
            Pass::Composite { dest } => self.draw(
                ProgramKind::Composite,
                0,
                &[Target::Scene, Target::BloomA],
                dest,
                REPLACE,
                FULLSCREEN,
                1,
            ),
            Pass::PostProcess { source } => self.draw(
                ProgramKind::PostProcess,
                0,
                &[source],
                Target::Present,
                REPLACE,
                FULLSCREEN,
                1,
            ),
            Pass::Blit { source, dest } => {
                let (Some(src), Some(dst)) = (self.targets.get(&source), self.targets.get(&dest))
                else {
                    return;
                };
                if src.size() != dst.size() {
                    log::warn!("Blit size mismatch: {:?} -> {:?}", source, dest);
                    return;
                }
                frame_encoder(&mut self.encoder, &self.device).copy_texture_to_texture(
                    src.texture.as_image_copy(),
                    dst.texture.as_image_copy(),
                    src.extent(),
                );
            }
        }
    }

    fn submit(&mut self, uniforms: &FrameUniforms) {
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(Some(encoder.finish()));
        }
    }

    fn read_target(&mut self, target: Target) -> Result<RgbaImage, GpuError> {
        let fbo = self
            .targets
            .get(&target)
            .ok_or_else(|| GpuError::BufferMapping(format!("{} not allocated", target.label())))?;
        let (width, height) = fbo.size();
        let padded = fbo::padded_bytes_per_row(width);

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            fbo.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            fbo.extent(),
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| GpuError::BufferMapping("map callback dropped".into()))??;

        let pixels = {
            let data = slice.get_mapped_range();
            fbo::unpad_rows(&data, width, height)
        };
        staging.unmap();
        staging.destroy();

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| GpuError::BufferMapping("readback size mismatch".into()))
    }

    fn release(&mut self) {
        self.encoder = None;
        for (_, fbo) in self.targets.drain() {
            fbo.destroy();
        }
        if let Some(buffer) = self.line_buffer.take() {
            buffer.destroy();
        }
        self.line_capacity = 0;
        self.programs.clear();
        self.uniform_buffer.destroy();
        log::debug!("Released GPU resources");
    }
}
