//! wgpu Shading Program
//!
//! Implements the four passes as fullscreen-triangle render pipelines.
//!
//! # Resources
//!
//! - **Pipelines**: one per ([`ShaderVariant`], target format), created on
//!   first use and cached.
//! - **Bind group layouts**: one per variant; a single group 0 holding the
//!   pass textures, one sampler per texture and the pass uniforms. Color
//!   textures are sampled with their own [`FilterMode`]; depth is always
//!   point sampled.
//! - **Uniform ring**: one buffer with a slot per invocation. Reset once per
//!   frame in `set_shared_parameters`, so the H and V blur sub-passes never
//!   overwrite each other's parameters before submission.
//! - **Bind groups**: built per invocation; texture bindings change every
//!   pass.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::device::WgpuDevice;
use super::shaders::{DepthInput, ShaderLibrary, ShaderVariant, TextureBinding};
use super::uniforms::{
    AccumulateUniforms, BlurUniforms, CompositeUniforms, MAX_UNIFORM_SIZE, RaytraceUniforms,
};
use crate::device::{FilterMode, TextureId};
use crate::errors::{Result, SslrError};
use crate::program::{PassId, PassInvocation, ShadingProgram, SharedParameters};

/// Invocations per frame the uniform ring can hold. A frame issues at most
/// seven (raytrace, two denoise blurs, accumulate, two smoothness blurs,
/// composite).
const UNIFORM_SLOTS: u64 = 16;

// ─── Uniform ring ─────────────────────────────────────────────────────────────

struct UniformRing {
    buffer: wgpu::Buffer,
    stride: u64,
    cursor: u64,
}

impl UniformRing {
    fn new(device: &wgpu::Device) -> Self {
        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);
        let stride = MAX_UNIFORM_SIZE.div_ceil(alignment) * alignment;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("SSLR Uniform Ring"),
            size: stride * UNIFORM_SLOTS,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            stride,
            cursor: 0,
        }
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Writes `bytes` into the next slot and returns its offset.
    fn push(&mut self, queue: &wgpu::Queue, pass: PassId, bytes: &[u8]) -> Result<u64> {
        if self.cursor >= UNIFORM_SLOTS {
            return Err(SslrError::pass_failed(
                pass,
                format!("uniform ring exhausted ({UNIFORM_SLOTS} slots per frame)"),
            ));
        }
        let offset = self.cursor * self.stride;
        queue.write_buffer(&self.buffer, offset, bytes);
        self.cursor += 1;
        Ok(offset)
    }
}

// ─── Samplers ─────────────────────────────────────────────────────────────────

struct Samplers {
    linear: wgpu::Sampler,
    nearest: wgpu::Sampler,
}

impl Samplers {
    fn new(device: &wgpu::Device) -> Self {
        let create = |label, filter| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                ..Default::default()
            })
        };
        Self {
            linear: create("SSLR Linear Sampler", wgpu::FilterMode::Linear),
            nearest: create("SSLR Nearest Sampler", wgpu::FilterMode::Nearest),
        }
    }

    fn get(&self, filter: FilterMode) -> &wgpu::Sampler {
        match filter {
            FilterMode::Bilinear => &self.linear,
            FilterMode::Nearest => &self.nearest,
        }
    }
}

/// Filter a texture binding is sampled with.
fn sampler_filter(binding: TextureBinding, texture_filter: FilterMode) -> FilterMode {
    match binding {
        TextureBinding::Color => texture_filter,
        TextureBinding::Depth(_) => FilterMode::Nearest,
    }
}

// ─── Program ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    variant: ShaderVariant,
    target: wgpu::TextureFormat,
}

/// GPU implementation of the SSLR passes.
pub struct WgpuProgram {
    shaders: ShaderLibrary,
    layouts: FxHashMap<ShaderVariant, wgpu::BindGroupLayout>,
    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
    samplers: Samplers,
    uniforms: UniformRing,
    shared: Option<SharedParameters>,
}

impl WgpuProgram {
    pub fn new(device: &WgpuDevice) -> Result<Self> {
        let gpu = device.device();
        Ok(Self {
            shaders: ShaderLibrary::new()?,
            layouts: FxHashMap::default(),
            pipelines: FxHashMap::default(),
            samplers: Samplers::new(gpu),
            uniforms: UniformRing::new(gpu),
            shared: None,
        })
    }

    /// Number of pipelines compiled so far.
    #[must_use]
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Shared parameters of the current frame.
    #[must_use]
    pub fn shared_parameters(&self) -> Option<&SharedParameters> {
        self.shared.as_ref()
    }

    // =========================================================================
    // Layouts and pipelines
    // =========================================================================

    fn layout(&mut self, device: &wgpu::Device, variant: ShaderVariant) -> wgpu::BindGroupLayout {
        self.layouts
            .entry(variant)
            .or_insert_with(|| create_layout(device, variant))
            .clone()
    }

    fn pipeline(
        &mut self,
        device: &wgpu::Device,
        variant: ShaderVariant,
        target: wgpu::TextureFormat,
    ) -> Result<wgpu::RenderPipeline> {
        let key = PipelineKey { variant, target };
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline.clone());
        }

        let label = variant.label();
        let source = self.shaders.render(variant)?;
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let layout = self.layout(device, variant);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&label),
            bind_group_layouts: &[Some(&layout)],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        log::debug!("WgpuProgram: compiled pipeline '{label}' for {target:?}");
        self.pipelines.insert(key, pipeline.clone());
        Ok(pipeline)
    }

    // =========================================================================
    // Invocation
    // =========================================================================

    fn variant(device: &WgpuDevice, invocation: &PassInvocation) -> Result<ShaderVariant> {
        let depth_input = |id: TextureId| {
            device
                .format(id)
                .map(DepthInput::from_format)
                .ok_or_else(|| SslrError::UnknownTexture(format!("source depth {id:?}")))
        };
        Ok(match invocation {
            PassInvocation::Raytrace(p) => ShaderVariant::Raytrace {
                quality: p.quality,
                depth: depth_input(p.source_depth)?,
            },
            PassInvocation::Blur(_) => ShaderVariant::Blur,
            PassInvocation::Accumulate(p) => ShaderVariant::Accumulate {
                depth: depth_input(p.source_depth)?,
            },
            PassInvocation::Composite(p) => ShaderVariant::Composite {
                reflection_source: p.reflection_source,
            },
        })
    }

    fn uniform_bytes(invocation: &PassInvocation) -> (Vec<u8>, u64) {
        fn pack<T: bytemuck::Pod>(value: T) -> (Vec<u8>, u64) {
            (
                bytemuck::bytes_of(&value).to_vec(),
                std::mem::size_of::<T>() as u64,
            )
        }
        match invocation {
            PassInvocation::Raytrace(p) => pack(RaytraceUniforms::new(p)),
            PassInvocation::Blur(p) => pack(BlurUniforms::new(p)),
            PassInvocation::Accumulate(p) => pack(AccumulateUniforms::new(p)),
            PassInvocation::Composite(p) => pack(CompositeUniforms::new(p)),
        }
    }

    /// Textures in binding order, matching [`ShaderVariant::texture_bindings`].
    fn texture_ids(invocation: &PassInvocation) -> SmallVec<[TextureId; 3]> {
        match invocation {
            PassInvocation::Raytrace(p) => smallvec::smallvec![p.source_color, p.source_depth],
            PassInvocation::Blur(p) => smallvec::smallvec![p.input],
            PassInvocation::Accumulate(p) => {
                smallvec::smallvec![p.reflection, p.previous_accumulation, p.source_depth]
            }
            PassInvocation::Composite(p) => smallvec::smallvec![p.source_color, p.reflection],
        }
    }
}

impl ShadingProgram<WgpuDevice> for WgpuProgram {
    fn name(&self) -> &str {
        "WgpuProgram"
    }

    fn set_shared_parameters(
        &mut self,
        _device: &mut WgpuDevice,
        params: &SharedParameters,
    ) -> Result<()> {
        self.uniforms.reset();
        self.shared = Some(*params);
        Ok(())
    }

    fn run_pass(&mut self, device: &mut WgpuDevice, invocation: &PassInvocation) -> Result<()> {
        let pass = invocation.pass_id();
        let output = invocation.output();
        let target = device
            .format(output)
            .ok_or_else(|| SslrError::UnknownTexture(format!("{} output {output:?}", pass.name())))?;
        let output_view = device
            .view(output)
            .cloned()
            .ok_or_else(|| SslrError::UnknownTexture(format!("{output:?}")))?;

        let variant = Self::variant(device, invocation)?;
        let pipeline = self.pipeline(device.device(), variant, target)?;
        let layout = self.layout(device.device(), variant);

        let (bytes, uniform_size) = Self::uniform_bytes(invocation);
        let offset = self.uniforms.push(device.queue(), pass, &bytes)?;

        // --- Bind group ---
        let inputs = Self::texture_ids(invocation)
            .into_iter()
            .zip(variant.texture_bindings())
            .map(|(id, binding)| {
                device
                    .get(id)
                    .map(|t| (t.view().clone(), sampler_filter(binding, t.filter())))
                    .ok_or_else(|| SslrError::UnknownTexture(format!("{} input {id:?}", pass.name())))
            })
            .collect::<Result<SmallVec<[(wgpu::TextureView, FilterMode); 3]>>>()?;

        let mut entries: SmallVec<[wgpu::BindGroupEntry<'_>; 7]> = SmallVec::new();
        for (i, (view, filter)) in inputs.iter().enumerate() {
            let i = i as u32;
            entries.push(wgpu::BindGroupEntry {
                binding: i,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: variant.sampler_binding(i),
                resource: wgpu::BindingResource::Sampler(self.samplers.get(*filter)),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: variant.uniform_binding(),
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &self.uniforms.buffer,
                offset,
                size: wgpu::BufferSize::new(uniform_size),
            }),
        });

        let bind_group = device
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(pass.name()),
                layout: &layout,
                entries: &entries,
            });

        // --- Draw ---
        let label = invocation.label();
        let encoder = device.encoder();
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &output_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            ..Default::default()
        });
        render_pass.set_pipeline(&pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.draw(0..3, 0..1); // fullscreen triangle
        Ok(())
    }
}

fn texture_entry(binding: u32, sample_type: wgpu::TextureSampleType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn create_layout(device: &wgpu::Device, variant: ShaderVariant) -> wgpu::BindGroupLayout {
    let mut entries: SmallVec<[wgpu::BindGroupLayoutEntry; 7]> = SmallVec::new();
    for (i, binding) in variant.texture_bindings().into_iter().enumerate() {
        let i = i as u32;
        entries.push(texture_entry(i, binding.sample_type()));
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: variant.sampler_binding(i),
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(binding.sampler_type()),
            count: None,
        });
    }
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: variant.uniform_binding(),
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&variant.label()),
        entries: &entries,
    })
}
