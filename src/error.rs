//! Error types for glowtrail.
//!
//! None of these are returned from per-frame calls. They are recorded when the
//! compositor is initialised and surfaced through
//! [`GpuCompositor::failure`](crate::GpuCompositor::failure), so the caller can
//! switch to a CPU renderer.

use std::fmt;

use crate::gpu::ProgramKind;

/// Errors that make the GPU compositor unavailable.
#[derive(Debug)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// A shader program failed to parse, validate or build its pipeline.
    ShaderCompile {
        /// Which program failed.
        program: ProgramKind,
        /// Compiler output.
        message: String,
    },
    /// Failed to map a buffer for reading the finished frame back.
    BufferMapping(String),
    /// The compositor was destroyed.
    Released,
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoAdapter => write!(
                f,
                "No compatible GPU adapter found. \
                 Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support."
            ),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::ShaderCompile { program, message } => {
                write!(f, "Failed to compile {} program: {}", program.label(), message)
            }
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
            GpuError::Released => write!(f, "GPU compositor has been destroyed"),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

impl From<wgpu::BufferAsyncError> for GpuError {
    fn from(e: wgpu::BufferAsyncError) -> Self {
        GpuError::BufferMapping(e.to_string())
    }
}
