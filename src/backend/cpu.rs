//! CPU Reference Backend
//!
//! A software [`RenderDevice`] and [`ShadingProgram`] that run the whole
//! pipeline in host memory. Used by the test suite and the benchmarks, and as
//! a readable reference for what each pass computes.
//!
//! Textures are stored as RGBA `f32` images regardless of format. `Rgba8Unorm`
//! targets saturate on write to `[0, 1]` but keep full precision, so the
//! temporal blend is not quantized.
//!
//! # Screen conventions
//!
//! Texel `(x, y)` has its center at `uv = ((x + 0.5) / w, (y + 0.5) / h)`,
//! with `v` growing downwards. NDC follows wgpu: `y` up, depth in `[0, 1]`.

use glam::{Mat4, Vec2, Vec3, Vec4};
use slotmap::SlotMap;

use crate::device::{FilterMode, RenderDevice, TargetUsage, TextureDesc, TextureFormat, TextureId};
use crate::errors::{Result, SslrError};
use crate::program::{
    AccumulateParams, BlurParams, CompositeParams, PassId, PassInvocation, RaytraceParams,
    ShadingProgram, SharedParameters,
};

// ─── Images ───────────────────────────────────────────────────────────────────

/// An RGBA `f32` image owned by a [`CpuDevice`].
#[derive(Debug, Clone)]
pub struct CpuImage {
    label: &'static str,
    width: u32,
    height: u32,
    format: TextureFormat,
    usage: TargetUsage,
    filter: FilterMode,
    pixels: Vec<Vec4>,
}

impl CpuImage {
    fn new(desc: &TextureDesc) -> Self {
        Self {
            label: desc.label,
            width: desc.width,
            height: desc.height,
            format: desc.format,
            usage: desc.usage,
            filter: desc.filter,
            pixels: vec![Vec4::ZERO; desc.width as usize * desc.height as usize],
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    #[must_use]
    pub fn usage(&self) -> TargetUsage {
        self.usage
    }

    /// Row-major texels, top row first.
    #[must_use]
    pub fn pixels(&self) -> &[Vec4] {
        &self.pixels
    }

    /// Texel fetch with clamp-to-edge addressing.
    #[inline]
    #[must_use]
    pub fn load(&self, x: i32, y: i32) -> Vec4 {
        let x = x.clamp(0, self.width as i32 - 1) as usize;
        let y = y.clamp(0, self.height as i32 - 1) as usize;
        self.pixels[y * self.width as usize + x]
    }

    #[must_use]
    pub fn sample_nearest(&self, uv: Vec2) -> Vec4 {
        let x = (uv.x * self.width as f32).floor() as i32;
        let y = (uv.y * self.height as f32).floor() as i32;
        self.load(x, y)
    }

    #[must_use]
    pub fn sample_bilinear(&self, uv: Vec2) -> Vec4 {
        let x = uv.x * self.width as f32 - 0.5;
        let y = uv.y * self.height as f32 - 0.5;
        let (x0, y0) = (x.floor(), y.floor());
        let (fx, fy) = (x - x0, y - y0);
        let (x0, y0) = (x0 as i32, y0 as i32);

        let top = self.load(x0, y0).lerp(self.load(x0 + 1, y0), fx);
        let bottom = self.load(x0, y0 + 1).lerp(self.load(x0 + 1, y0 + 1), fx);
        top.lerp(bottom, fy)
    }

    /// Samples with the image's own filter mode.
    #[must_use]
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        match self.filter {
            FilterMode::Nearest => self.sample_nearest(uv),
            FilterMode::Bilinear => self.sample_bilinear(uv),
        }
    }

    fn texel_size(&self) -> Vec2 {
        Vec2::new(1.0 / self.width as f32, 1.0 / self.height as f32)
    }
}

fn saturate(format: TextureFormat, value: Vec4) -> Vec4 {
    match format {
        TextureFormat::Rgba8Unorm => value.clamp(Vec4::ZERO, Vec4::ONE),
        TextureFormat::Rgba16Float | TextureFormat::Depth32Float => value,
    }
}

// ─── Device ───────────────────────────────────────────────────────────────────

/// Host-memory [`RenderDevice`].
#[derive(Debug, Default)]
pub struct CpuDevice {
    textures: SlotMap<TextureId, CpuImage>,
    created_total: u64,
    destroyed_total: u64,
    frames_begun: u64,
    frames_ended: u64,
}

impl CpuDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an image the host can fill and the pipeline can read or write,
    /// e.g. source color, source depth or the destination.
    pub fn create_image(
        &mut self,
        label: &'static str,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<TextureId> {
        let mut desc = TextureDesc::render_target(label, width, height, format);
        desc.usage |= TargetUsage::COPY_SRC | TargetUsage::COPY_DST;
        self.create_texture(&desc)
    }

    /// Writes `f(x, y)` into every texel of `id`.
    pub fn fill(&mut self, id: TextureId, f: impl Fn(u32, u32) -> Vec4) -> Result<()> {
        let image = self
            .textures
            .get_mut(id)
            .ok_or_else(|| SslrError::UnknownTexture(format!("{id:?}")))?;
        let (width, format) = (image.width, image.format);
        for (i, texel) in image.pixels.iter_mut().enumerate() {
            let (x, y) = (i as u32 % width, i as u32 / width);
            *texel = saturate(format, f(x, y));
        }
        Ok(())
    }

    #[must_use]
    pub fn image(&self, id: TextureId) -> Option<&CpuImage> {
        self.textures.get(id)
    }

    #[must_use]
    pub fn pixels(&self, id: TextureId) -> Option<&[Vec4]> {
        self.textures.get(id).map(CpuImage::pixels)
    }

    #[must_use]
    pub fn pixel(&self, id: TextureId, x: u32, y: u32) -> Option<Vec4> {
        let image = self.textures.get(id)?;
        (x < image.width && y < image.height).then(|| image.load(x as i32, y as i32))
    }

    /// Number of textures currently alive.
    #[must_use]
    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn created_total(&self) -> u64 {
        self.created_total
    }

    #[must_use]
    pub fn destroyed_total(&self) -> u64 {
        self.destroyed_total
    }

    /// Number of completed `begin_frame` / `end_frame` brackets.
    #[must_use]
    pub fn frames_submitted(&self) -> u64 {
        self.frames_ended
    }

    fn lookup(&self, id: TextureId) -> Result<&CpuImage> {
        self.textures
            .get(id)
            .ok_or_else(|| SslrError::UnknownTexture(format!("{id:?}")))
    }

    fn write_pixels(&mut self, id: TextureId, pixels: Vec<Vec4>) -> Result<()> {
        let image = self
            .textures
            .get_mut(id)
            .ok_or_else(|| SslrError::UnknownTexture(format!("{id:?}")))?;
        debug_assert_eq!(pixels.len(), image.pixels.len());
        let format = image.format;
        image.pixels = pixels.into_iter().map(|v| saturate(format, v)).collect();
        Ok(())
    }
}

impl RenderDevice for CpuDevice {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId> {
        if desc.width == 0 || desc.height == 0 {
            return Err(SslrError::InvalidTextureSize {
                label: desc.label,
                width: desc.width,
                height: desc.height,
            });
        }
        self.created_total += 1;
        Ok(self.textures.insert(CpuImage::new(desc)))
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if self.textures.remove(id).is_some() {
            self.destroyed_total += 1;
        }
    }

    fn clear_texture(&mut self, id: TextureId, color: [f32; 4]) -> Result<()> {
        let image = self
            .textures
            .get_mut(id)
            .ok_or_else(|| SslrError::UnknownTexture(format!("{id:?}")))?;
        let value = saturate(image.format, Vec4::from_array(color));
        image.pixels.fill(value);
        Ok(())
    }

    fn texture_size(&self, id: TextureId) -> Option<(u32, u32)> {
        self.textures.get(id).map(CpuImage::size)
    }

    fn begin_frame(&mut self) {
        if self.frames_begun != self.frames_ended {
            log::warn!("CpuDevice: begin_frame called twice without end_frame");
        }
        self.frames_begun += 1;
    }

    fn end_frame(&mut self) -> Result<()> {
        self.frames_ended = self.frames_begun;
        Ok(())
    }
}

// ─── Screen-space helpers ─────────────────────────────────────────────────────

#[inline]
fn texel_uv(x: u32, y: u32, width: u32, height: u32) -> Vec2 {
    Vec2::new(
        (x as f32 + 0.5) / width as f32,
        (y as f32 + 0.5) / height as f32,
    )
}

#[inline]
fn uv_to_ndc(uv: Vec2) -> Vec2 {
    Vec2::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0)
}

#[inline]
fn ndc_to_uv(ndc: Vec2) -> Vec2 {
    Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5)
}

fn unproject(inverse_view_projection: Mat4, uv: Vec2, depth: f32) -> Option<Vec3> {
    let ndc = uv_to_ndc(uv);
    let p = inverse_view_projection * Vec4::new(ndc.x, ndc.y, depth, 1.0);
    (p.w.abs() > f32::EPSILON).then(|| p.truncate() / p.w)
}

/// Projects a world position to `(uv, depth)`. `None` behind the camera.
fn project(view_projection: Mat4, position: Vec3) -> Option<(Vec2, f32)> {
    let clip = view_projection * position.extend(1.0);
    if clip.w <= f32::EPSILON {
        return None;
    }
    let ndc = clip.truncate() / clip.w;
    Some((ndc_to_uv(ndc.truncate()), ndc.z))
}

#[inline]
fn in_unit_square(uv: Vec2) -> bool {
    (0.0..=1.0).contains(&uv.x) && (0.0..=1.0).contains(&uv.y)
}

/// 1 in the interior, falling to 0 over the outer tenth of the screen.
fn edge_fade(uv: Vec2) -> f32 {
    let edge = uv.x.min(1.0 - uv.x).min(uv.y).min(1.0 - uv.y);
    (edge * 10.0).clamp(0.0, 1.0)
}

fn for_each_texel(width: u32, height: u32, mut f: impl FnMut(u32, u32, Vec2) -> Vec4) -> Vec<Vec4> {
    let mut out = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        for x in 0..width {
            out.push(f(x, y, texel_uv(x, y, width, height)));
        }
    }
    out
}

// ─── Program ──────────────────────────────────────────────────────────────────

/// Texel being shaded by a raytrace override.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaytraceTexel {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub uv: Vec2,
}

/// Replacement for the software ray march.
pub type RaytraceFn = Box<dyn Fn(&RaytraceTexel) -> Vec4 + Send + Sync>;

/// Software implementation of the four passes.
#[derive(Default)]
pub struct CpuProgram {
    raytrace_override: Option<RaytraceFn>,
    failing_passes: Vec<PassId>,

    invocations: Vec<PassInvocation>,
    shared: Option<SharedParameters>,
    shared_updates: u32,
}

impl CpuProgram {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the ray march with `f`, evaluated once per output texel.
    #[must_use]
    pub fn with_raytrace(mut self, f: impl Fn(&RaytraceTexel) -> Vec4 + Send + Sync + 'static) -> Self {
        self.raytrace_override = Some(Box::new(f));
        self
    }

    /// Makes every invocation of `pass` fail.
    pub fn fail_pass(&mut self, pass: PassId) {
        if !self.failing_passes.contains(&pass) {
            self.failing_passes.push(pass);
        }
    }

    pub fn clear_failures(&mut self) {
        self.failing_passes.clear();
    }

    /// Every invocation received, in order.
    #[must_use]
    pub fn invocations(&self) -> &[PassInvocation] {
        &self.invocations
    }

    pub fn clear_invocations(&mut self) {
        self.invocations.clear();
    }

    /// Parameters from the latest `set_shared_parameters` call.
    #[must_use]
    pub fn shared_parameters(&self) -> Option<&SharedParameters> {
        self.shared.as_ref()
    }

    #[must_use]
    pub fn shared_updates(&self) -> u32 {
        self.shared_updates
    }

    // ── Pass 0 ─────────────────────────────────────────────────────────────

    fn raytrace(&self, device: &CpuDevice, p: &RaytraceParams, size: (u32, u32)) -> Result<Vec<Vec4>> {
        let color = device.lookup(p.source_color)?;
        let depth = device.lookup(p.source_depth)?;
        let (width, height) = size;

        Ok(for_each_texel(width, height, |x, y, uv| match &self.raytrace_override {
            Some(f) => f(&RaytraceTexel {
                x,
                y,
                width,
                height,
                uv,
            }),
            None => march(color, depth, p, uv),
        }))
    }

    // ── Pass 1 ─────────────────────────────────────────────────────────────

    fn blur(device: &CpuDevice, p: &BlurParams, size: (u32, u32)) -> Result<Vec<Vec4>> {
        let input = device.lookup(p.input)?;
        let step = p.offset * input.texel_size();
        let radius = p.radius as i32;
        let weight = 1.0 / (2 * radius + 1) as f32;

        Ok(for_each_texel(size.0, size.1, |_, _, uv| {
            let mut sum = Vec4::ZERO;
            for i in -radius..=radius {
                sum += input.sample(uv + step * i as f32);
            }
            sum * weight
        }))
    }

    // ── Pass 2 ─────────────────────────────────────────────────────────────

    fn accumulate(device: &CpuDevice, p: &AccumulateParams, size: (u32, u32)) -> Result<Vec<Vec4>> {
        let current = device.lookup(p.reflection)?;
        let history = device.lookup(p.previous_accumulation)?;
        let depth = device.lookup(p.source_depth)?;
        let static_camera = p.previous_view_projection == p.view_projection;
        let same_size = history.size() == size;

        Ok(for_each_texel(size.0, size.1, |x, y, uv| {
            let sample = current.sample(uv);

            let previous = if static_camera {
                if same_size {
                    Some(history.load(x as i32, y as i32))
                } else {
                    Some(history.sample(uv))
                }
            } else {
                let d = depth.sample_nearest(uv).x;
                unproject(p.inverse_view_projection, uv, d)
                    .and_then(|world| project(p.previous_view_projection, world))
                    .filter(|(prev_uv, _)| in_unit_square(*prev_uv))
                    .map(|(prev_uv, _)| history.sample(prev_uv))
            };

            // Disoccluded texels take the new sample.
            match previous {
                Some(previous) => previous.lerp(sample, p.blend_ratio),
                None => sample,
            }
        }))
    }

    // ── Pass 3 ─────────────────────────────────────────────────────────────

    fn composite(device: &CpuDevice, p: &CompositeParams, size: (u32, u32)) -> Result<Vec<Vec4>> {
        let source = device.lookup(p.source_color)?;
        let reflection = device.lookup(p.reflection)?;

        Ok(for_each_texel(size.0, size.1, |_, _, uv| {
            let src = source.sample(uv);
            let refl = reflection.sample(uv);
            let rgb = src.truncate() + refl.truncate() * refl.w * p.reflection_enhancer;
            rgb.extend(src.w)
        }))
    }
}

/// Screen-space ray march from the surface under `uv`.
fn march(color: &CpuImage, depth: &CpuImage, p: &RaytraceParams, uv: Vec2) -> Vec4 {
    let inv = p.inverse_view_projection;

    let d = depth.sample_nearest(uv).x;
    if d >= 1.0 {
        return Vec4::ZERO;
    }
    let (Some(origin), Some(near)) = (unproject(inv, uv, d), unproject(inv, uv, 0.0)) else {
        return Vec4::ZERO;
    };
    let view_dir = (origin - near).normalize_or_zero();
    let Some(mut normal) = surface_normal(depth, inv, uv, origin) else {
        return Vec4::ZERO;
    };
    if normal.dot(view_dir) > 0.0 {
        normal = -normal;
    }
    let dir = view_dir - 2.0 * view_dir.dot(normal) * normal;

    let steps = p.quality.march_steps();
    let step_len = p.ray_max_length / steps as f32;

    let probe = |t: f32| -> Probe {
        let q = origin + dir * t;
        let Some((q_uv, q_depth)) = project(p.view_projection, q) else {
            return Probe::Exit;
        };
        if !in_unit_square(q_uv) || !(0.0..=1.0).contains(&q_depth) {
            return Probe::Exit;
        }
        // Interpolated depth is exact across planar surfaces, so a ray never
        // re-hits the texel it started from.
        let scene_depth = depth.sample_bilinear(q_uv).x;
        let (Some(scene), Some(eye)) = (
            unproject(inv, q_uv, scene_depth),
            unproject(inv, q_uv, 0.0),
        ) else {
            return Probe::Exit;
        };
        let behind = (q - eye).length() - (scene - eye).length();
        if behind > 0.0 && behind < p.ray_max_thickness {
            Probe::Hit(q_uv)
        } else if behind >= p.ray_max_thickness {
            Probe::Occluded
        } else {
            Probe::Miss
        }
    };

    let mut t_prev = 0.0;
    for i in 1..=steps {
        let t = step_len * i as f32;
        match probe(t) {
            Probe::Miss | Probe::Occluded => t_prev = t,
            Probe::Exit => break,
            Probe::Hit(mut hit_uv) => {
                // Binary refinement between the last miss and the hit.
                let (mut lo, mut hi) = (t_prev, t);
                for _ in 0..p.quality.refinement_steps() {
                    let mid = 0.5 * (lo + hi);
                    match probe(mid) {
                        Probe::Hit(mid_uv) => {
                            hi = mid;
                            hit_uv = mid_uv;
                        }
                        _ => lo = mid,
                    }
                }
                let fade = (1.0 - i as f32 / steps as f32) * edge_fade(hit_uv);
                return color.sample(hit_uv).truncate().extend(fade);
            }
        }
    }
    Vec4::ZERO
}

enum Probe {
    Miss,
    /// Behind a surface by more than the thickness.
    Occluded,
    Hit(Vec2),
    Exit,
}

/// World-space normal from depth differences with the right and lower
/// neighbors.
fn surface_normal(depth: &CpuImage, inv: Mat4, uv: Vec2, origin: Vec3) -> Option<Vec3> {
    let texel = depth.texel_size();
    let uv_x = uv + Vec2::new(texel.x, 0.0);
    let uv_y = uv + Vec2::new(0.0, texel.y);
    let px = unproject(inv, uv_x, depth.sample_nearest(uv_x).x)?;
    let py = unproject(inv, uv_y, depth.sample_nearest(uv_y).x)?;
    let normal = (px - origin).cross(py - origin).normalize_or_zero();
    (normal != Vec3::ZERO).then_some(normal)
}

impl ShadingProgram<CpuDevice> for CpuProgram {
    fn name(&self) -> &str {
        "CpuProgram"
    }

    fn set_shared_parameters(&mut self, _device: &mut CpuDevice, params: &SharedParameters) -> Result<()> {
        self.shared = Some(*params);
        self.shared_updates += 1;
        Ok(())
    }

    fn run_pass(&mut self, device: &mut CpuDevice, invocation: &PassInvocation) -> Result<()> {
        let pass = invocation.pass_id();
        self.invocations.push(invocation.clone());

        if self.failing_passes.contains(&pass) {
            return Err(SslrError::pass_failed(pass, "injected failure"));
        }

        let output = invocation.output();
        let size = device
            .texture_size(output)
            .ok_or_else(|| SslrError::UnknownTexture(format!("{} output {output:?}", pass.name())))?;

        let pixels = match invocation {
            PassInvocation::Raytrace(p) => self.raytrace(device, p, size)?,
            PassInvocation::Blur(p) => Self::blur(device, p, size)?,
            PassInvocation::Accumulate(p) => Self::accumulate(device, p, size)?,
            PassInvocation::Composite(p) => Self::composite(device, p, size)?,
        };
        device.write_pixels(output, pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilinear_at_texel_center_is_exact() {
        let mut device = CpuDevice::new();
        let id = device
            .create_image("test", 4, 4, TextureFormat::Rgba16Float)
            .unwrap();
        device
            .fill(id, |x, y| Vec4::new(x as f32, y as f32, 0.0, 1.0))
            .unwrap();
        let image = device.image(id).unwrap();
        let v = image.sample_bilinear(texel_uv(2, 1, 4, 4));
        assert!((v - Vec4::new(2.0, 1.0, 0.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn unorm_targets_saturate() {
        let mut device = CpuDevice::new();
        let id = device
            .create_image("test", 2, 2, TextureFormat::Rgba8Unorm)
            .unwrap();
        device.clear_texture(id, [2.0, -1.0, 0.5, 1.0]).unwrap();
        assert_eq!(device.pixel(id, 1, 1), Some(Vec4::new(1.0, 0.0, 0.5, 1.0)));
    }

    #[test]
    fn uv_ndc_round_trip() {
        let uv = Vec2::new(0.25, 0.75);
        assert!((ndc_to_uv(uv_to_ndc(uv)) - uv).length() < 1e-6);
        assert_eq!(uv_to_ndc(Vec2::new(0.5, 0.0)), Vec2::new(0.0, 1.0));
    }

    #[test]
    fn zero_sized_texture_is_rejected() {
        let mut device = CpuDevice::new();
        let result = device.create_image("empty", 0, 4, TextureFormat::Rgba8Unorm);
        assert!(matches!(result, Err(SslrError::InvalidTextureSize { .. })));
        assert_eq!(device.live_texture_count(), 0);
    }
}
