//! Per-frame camera input and the derived working resolution.

use glam::{Mat4, Vec4};

/// Converts an OpenGL-convention clip space (depth in `[-1, 1]`) to the
/// `[0, 1]` depth range used by wgpu / D3D / Metal.
const GL_TO_ZERO_ONE_DEPTH: Mat4 = Mat4::from_cols(
    Vec4::new(1.0, 0.0, 0.0, 0.0),
    Vec4::new(0.0, 1.0, 0.0, 0.0),
    Vec4::new(0.0, 0.0, 0.5, 0.0),
    Vec4::new(0.0, 0.0, 0.5, 1.0),
);

/// Camera data supplied by the host each frame.
///
/// `projection` is expected in the graphics API's clip-space convention
/// (depth in `[0, 1]`). Use [`CameraState::from_gl_projection`] when the host
/// builds OpenGL-style projections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    /// World → view transform.
    pub view: Mat4,
    /// View → clip transform, API-normalized.
    pub projection: Mat4,
    /// Camera target width in pixels.
    pub pixel_width: u32,
    /// Camera target height in pixels.
    pub pixel_height: u32,
}

impl CameraState {
    #[must_use]
    pub fn new(view: Mat4, projection: Mat4, pixel_width: u32, pixel_height: u32) -> Self {
        Self {
            view,
            projection,
            pixel_width,
            pixel_height,
        }
    }

    /// Builds a camera state from an OpenGL-convention projection matrix,
    /// remapping clip-space depth from `[-1, 1]` to `[0, 1]`.
    #[must_use]
    pub fn from_gl_projection(
        view: Mat4,
        gl_projection: Mat4,
        pixel_width: u32,
        pixel_height: u32,
    ) -> Self {
        Self::new(
            view,
            GL_TO_ZERO_ONE_DEPTH * gl_projection,
            pixel_width,
            pixel_height,
        )
    }

    /// `projection * view`.
    #[inline]
    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    #[inline]
    #[must_use]
    pub fn inverse_view_projection(&self) -> Mat4 {
        self.view_projection().inverse()
    }
}

/// Pixel dimensions at which the reflection pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WorkingResolution {
    pub width: u32,
    pub height: u32,
}

impl WorkingResolution {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `floor(camera_pixels * scale)` in each axis.
    #[must_use]
    pub fn from_camera(camera: &CameraState, scale: f32) -> Self {
        Self {
            width: scale_dimension(camera.pixel_width, scale),
            height: scale_dimension(camera.pixel_height, scale),
        }
    }

    /// `true` when either axis is zero; no buffer can be created at this size.
    #[inline]
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    #[must_use]
    pub fn as_tuple(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

fn scale_dimension(pixels: u32, scale: f32) -> u32 {
    let scaled = (f64::from(pixels) * f64::from(scale)).floor();
    if scaled.is_finite() && scaled > 0.0 {
        scaled.min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}
