//! Uniform blocks of the WGSL passes.
//!
//! Every struct is `#[repr(C)]`, `Pod`, and a multiple of 16 bytes so it can
//! be copied into a uniform slot with `bytemuck::bytes_of`. Field order
//! matches the WGSL declarations in `shaders/`.

use bytemuck::{Pod, Zeroable};

use crate::program::{AccumulateParams, BlurParams, CompositeParams, RaytraceParams};

/// Pass 0 uniforms.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct RaytraceUniforms {
    pub view_projection: [[f32; 4]; 4],
    pub inverse_view_projection: [[f32; 4]; 4],
    /// x: max length, y: max thickness, zw: unused
    pub ray: [f32; 4],
}

impl RaytraceUniforms {
    #[must_use]
    pub fn new(params: &RaytraceParams) -> Self {
        Self {
            view_projection: params.view_projection.to_cols_array_2d(),
            inverse_view_projection: params.inverse_view_projection.to_cols_array_2d(),
            ray: [params.ray_max_length, params.ray_max_thickness, 0.0, 0.0],
        }
    }
}

/// Pass 1 uniforms.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct BlurUniforms {
    /// `(x, 0, radius, 0)` for the horizontal sub-pass, `(0, y, radius, 0)`
    /// for the vertical one.
    pub params: [f32; 4],
}

impl BlurUniforms {
    #[must_use]
    pub fn new(params: &BlurParams) -> Self {
        Self {
            params: [params.offset.x, params.offset.y, params.radius as f32, 0.0],
        }
    }
}

/// Pass 2 uniforms.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct AccumulateUniforms {
    pub previous_view_projection: [[f32; 4]; 4],
    pub inverse_view_projection: [[f32; 4]; 4],
    /// x: blend ratio, y: 1.0 when the camera has not moved, zw: unused
    pub params: [f32; 4],
}

impl AccumulateUniforms {
    #[must_use]
    pub fn new(params: &AccumulateParams) -> Self {
        let static_camera = params.previous_view_projection == params.view_projection;
        Self {
            previous_view_projection: params.previous_view_projection.to_cols_array_2d(),
            inverse_view_projection: params.inverse_view_projection.to_cols_array_2d(),
            params: [
                params.blend_ratio,
                if static_camera { 1.0 } else { 0.0 },
                0.0,
                0.0,
            ],
        }
    }
}

/// Pass 3 uniforms.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct CompositeUniforms {
    /// x: reflection enhancer, yzw: unused
    pub params: [f32; 4],
}

impl CompositeUniforms {
    #[must_use]
    pub fn new(params: &CompositeParams) -> Self {
        Self {
            params: [params.reflection_enhancer, 0.0, 0.0, 0.0],
        }
    }
}

/// Largest uniform block; every ring slot must hold it.
pub(crate) const MAX_UNIFORM_SIZE: u64 = std::mem::size_of::<RaytraceUniforms>() as u64;
