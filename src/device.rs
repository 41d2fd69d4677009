//! Render Device Abstraction
//!
//! The pipeline never talks to a graphics API directly. Texture creation,
//! destruction and clearing go through the [`RenderDevice`] trait; textures
//! are referred to by [`TextureId`] handles that stay valid until the device
//! destroys them.
//!
//! Two implementations ship with the crate:
//!
//! | Device | Module | Storage |
//! |--------|--------|---------|
//! | [`CpuDevice`](crate::backend::cpu::CpuDevice) | `backend::cpu` | RGBA `f32` images in host memory |
//! | [`WgpuDevice`](crate::backend::gpu::WgpuDevice) | `backend::gpu` | `wgpu::Texture` + default view |

use bitflags::bitflags;

use crate::errors::Result;

slotmap::new_key_type! {
    /// Handle to a texture owned by a [`RenderDevice`].
    pub struct TextureId;
}

/// Pixel formats used by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit normalized RGBA. Used for reflection and accumulation buffers.
    Rgba8Unorm,
    /// 16-bit float RGBA (HDR scene color).
    Rgba16Float,
    /// 32-bit float depth.
    Depth32Float,
}

impl TextureFormat {
    /// Format of every buffer the pipeline allocates itself.
    pub const REFLECTION: Self = Self::Rgba8Unorm;

    #[inline]
    #[must_use]
    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth32Float)
    }

    #[must_use]
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            Self::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            Self::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }

    #[must_use]
    pub fn from_wgpu(format: wgpu::TextureFormat) -> Option<Self> {
        match format {
            wgpu::TextureFormat::Rgba8Unorm => Some(Self::Rgba8Unorm),
            wgpu::TextureFormat::Rgba16Float => Some(Self::Rgba16Float),
            wgpu::TextureFormat::Depth32Float => Some(Self::Depth32Float),
            _ => None,
        }
    }
}

bitflags! {
    /// How a texture may be used by the passes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TargetUsage: u32 {
        /// Sampled as a pass input.
        const SAMPLED       = 1 << 0;
        /// Bound as a pass output.
        const RENDER_TARGET = 1 << 1;
        /// Random-access (storage) writes.
        const STORAGE       = 1 << 2;
        const COPY_SRC      = 1 << 3;
        const COPY_DST      = 1 << 4;
    }
}

impl TargetUsage {
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::TextureUsages {
        let mut usage = wgpu::TextureUsages::empty();
        if self.contains(Self::SAMPLED) {
            usage |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if self.contains(Self::RENDER_TARGET) {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        if self.contains(Self::STORAGE) {
            usage |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        if self.contains(Self::COPY_SRC) {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }
        if self.contains(Self::COPY_DST) {
            usage |= wgpu::TextureUsages::COPY_DST;
        }
        usage
    }
}

/// Sampling filter for a texture when read by a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    Nearest,
    #[default]
    Bilinear,
}

/// Descriptor for creating a texture.
///
/// Textures are always 2D with a single mip level; the pipeline never
/// generates mips.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TargetUsage,
    pub filter: FilterMode,
    pub label: &'static str,
}

impl TextureDesc {
    /// A bilinear-filtered render target, sampled by later passes.
    #[must_use]
    pub fn render_target(label: &'static str, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            usage: TargetUsage::SAMPLED | TargetUsage::RENDER_TARGET,
            filter: FilterMode::Bilinear,
            label,
        }
    }

    /// Adds random-access write support.
    #[must_use]
    pub fn with_storage(mut self) -> Self {
        self.usage |= TargetUsage::STORAGE;
        self
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Graphics-API resource primitives consumed by the pipeline.
///
/// The pipeline decides *when* and *with what parameters* these are called;
/// the device decides how. All calls happen on the host's render thread
/// between [`begin_frame`](Self::begin_frame) and
/// [`end_frame`](Self::end_frame), except for teardown.
pub trait RenderDevice {
    /// Creates a texture matching `desc`. Contents are undefined.
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId>;

    /// Destroys a texture. Unknown ids are ignored.
    fn destroy_texture(&mut self, id: TextureId);

    /// Fills every texel of `id` with `color`.
    fn clear_texture(&mut self, id: TextureId, color: [f32; 4]) -> Result<()>;

    /// Returns the size of a live texture.
    fn texture_size(&self, id: TextureId) -> Option<(u32, u32)>;

    /// Returns `true` if `id` refers to a live texture.
    fn contains(&self, id: TextureId) -> bool {
        self.texture_size(id).is_some()
    }

    /// Called once before any pass of a frame is issued.
    fn begin_frame(&mut self) {}

    /// Called once after the last pass of a frame; submits recorded work.
    fn end_frame(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_round_trip_through_wgpu() {
        for format in [
            TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba16Float,
            TextureFormat::Depth32Float,
        ] {
            assert_eq!(TextureFormat::from_wgpu(format.to_wgpu()), Some(format));
        }
        assert_eq!(TextureFormat::from_wgpu(wgpu::TextureFormat::Bgra8Unorm), None);
        assert!(TextureFormat::Depth32Float.is_depth());
    }

    #[test]
    fn render_target_usage_maps_to_wgpu() {
        let desc = TextureDesc::render_target("rt", 8, 4, TextureFormat::REFLECTION).with_storage();
        let usage = desc.usage.to_wgpu();
        assert!(usage.contains(
            wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::STORAGE_BINDING
        ));
        assert!(!usage.contains(wgpu::TextureUsages::COPY_SRC));
        assert_eq!(desc.size(), (8, 4));
        assert_eq!(desc.filter, FilterMode::Bilinear);
    }
}
