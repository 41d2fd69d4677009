//! wgpu-backed [`RenderDevice`].
//!
//! Textures live in a slotmap next to their default view. Work recorded
//! between [`begin_frame`](RenderDevice::begin_frame) and
//! [`end_frame`](RenderDevice::end_frame) goes into a single command encoder
//! that is submitted once per frame.

use slotmap::SlotMap;

use crate::device::{FilterMode, RenderDevice, TextureDesc, TextureId};
use crate::errors::{Result, SslrError};

/// A texture registered with a [`WgpuDevice`].
pub struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    filter: FilterMode,
    /// Owned by the host; never destroyed by the device.
    imported: bool,
}

impl GpuTexture {
    #[must_use]
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    #[must_use]
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    #[must_use]
    pub fn filter(&self) -> FilterMode {
        self.filter
    }
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    textures: SlotMap<TextureId, GpuTexture>,
    encoder: Option<wgpu::CommandEncoder>,
}

impl WgpuDevice {
    /// Wraps an existing device and queue, typically the host renderer's.
    #[must_use]
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            textures: SlotMap::with_key(),
            encoder: None,
        }
    }

    /// Creates a headless device on the default adapter.
    pub async fn request(power_preference: wgpu::PowerPreference) -> Result<Self> {
        let instance = wgpu::Instance::default();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| SslrError::AdapterRequestFailed(e.to_string()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("SSLR Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        log::info!("WgpuDevice: using adapter {:?}", adapter.get_info().name);
        Ok(Self::new(device, queue))
    }

    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Registers a host-owned texture (source color, source depth or the
    /// destination). The texture needs `TEXTURE_BINDING` to be read by a
    /// pass and `RENDER_ATTACHMENT` to be written. Color reads are bilinear.
    pub fn import_texture(&mut self, texture: wgpu::Texture) -> TextureId {
        self.import_texture_with_filter(texture, FilterMode::Bilinear)
    }

    /// Like [`import_texture`](Self::import_texture), with the filter passes
    /// sample it with. Depth formats are point sampled regardless.
    pub fn import_texture_with_filter(&mut self, texture: wgpu::Texture, filter: FilterMode) -> TextureId {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.textures.insert(GpuTexture {
            texture,
            view,
            filter,
            imported: true,
        })
    }

    /// Unregisters an imported texture and hands it back.
    pub fn release_import(&mut self, id: TextureId) -> Option<wgpu::Texture> {
        if !self.textures.get(id)?.imported {
            return None;
        }
        self.textures.remove(id).map(|t| t.texture)
    }

    #[must_use]
    pub fn get(&self, id: TextureId) -> Option<&GpuTexture> {
        self.textures.get(id)
    }

    #[must_use]
    pub fn view(&self, id: TextureId) -> Option<&wgpu::TextureView> {
        self.textures.get(id).map(GpuTexture::view)
    }

    #[must_use]
    pub fn format(&self, id: TextureId) -> Option<wgpu::TextureFormat> {
        self.textures.get(id).map(|t| t.texture.format())
    }

    /// Uploads tightly packed texel data into mip 0 of `id`.
    pub fn write_texture(&mut self, id: TextureId, data: &[u8]) -> Result<()> {
        let texture = self
            .textures
            .get(id)
            .ok_or_else(|| SslrError::UnknownTexture(format!("{id:?}")))?;
        let format = texture.texture.format();
        let bytes_per_texel = format
            .block_copy_size(None)
            .ok_or(SslrError::UnsupportedFormat(format))?;
        let size = texture.texture.size();

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size.width * bytes_per_texel),
                rows_per_image: Some(size.height),
            },
            size,
        );
        Ok(())
    }

    /// The frame's command encoder, opened on first use.
    pub fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("SSLR Frame Encoder"),
                })
        })
    }

    fn submit(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(Some(encoder.finish()));
        }
    }
}

impl RenderDevice for WgpuDevice {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId> {
        if desc.width == 0 || desc.height == 0 {
            return Err(SslrError::InvalidTextureSize {
                label: desc.label,
                width: desc.width,
                height: desc.height,
            });
        }
        let format = desc.format.to_wgpu();
        let usage = desc.usage.to_wgpu();
        if usage.contains(wgpu::TextureUsages::STORAGE_BINDING) && format.has_depth_aspect() {
            return Err(SslrError::UnsupportedFormat(format));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(self.textures.insert(GpuTexture {
            texture,
            view,
            filter: desc.filter,
            imported: false,
        }))
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if let Some(t) = self.textures.remove(id)
            && !t.imported
        {
            t.texture.destroy();
        }
    }

    fn clear_texture(&mut self, id: TextureId, color: [f32; 4]) -> Result<()> {
        let texture = self
            .textures
            .get(id)
            .ok_or_else(|| SslrError::UnknownTexture(format!("{id:?}")))?;
        let view = texture.view.clone();
        let is_depth = texture.texture.format().has_depth_aspect();

        let encoder = self.encoder();
        if is_depth {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("SSLR Clear Depth"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color[0]),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
        } else {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("SSLR Clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(color[0]),
                            g: f64::from(color[1]),
                            b: f64::from(color[2]),
                            a: f64::from(color[3]),
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                ..Default::default()
            });
        }
        Ok(())
    }

    fn texture_size(&self, id: TextureId) -> Option<(u32, u32)> {
        self.textures.get(id).map(|t| {
            let size = t.texture.size();
            (size.width, size.height)
        })
    }

    fn begin_frame(&mut self) {
        let _ = self.encoder();
    }

    fn end_frame(&mut self) -> Result<()> {
        self.submit();
        Ok(())
    }
}

impl Drop for WgpuDevice {
    fn drop(&mut self) {
        // Flush clears recorded outside a frame (e.g. during teardown).
        self.submit();
    }
}
