//! wgpu backend: device wrapper, WGSL templates and the fullscreen-pass
//! shading program.

pub mod device;
pub mod program;
pub mod shaders;
pub mod uniforms;

pub use device::{GpuTexture, WgpuDevice};
pub use program::WgpuProgram;
pub use shaders::{DepthInput, ShaderLibrary, ShaderVariant};
pub use uniforms::{AccumulateUniforms, BlurUniforms, CompositeUniforms, RaytraceUniforms};
