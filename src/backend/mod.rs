//! Backends for the [`RenderDevice`](crate::device::RenderDevice) and
//! [`ShadingProgram`](crate::program::ShadingProgram) seams.
//!
//! - [`cpu`]: software images and a reference implementation of the passes.
//! - [`gpu`]: wgpu textures and WGSL fullscreen passes.

pub mod cpu;
pub mod gpu;

pub use cpu::{CpuDevice, CpuImage, CpuProgram};
pub use gpu::{WgpuDevice, WgpuProgram};
