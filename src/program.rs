//! Shading-Program Boundary
//!
//! The per-pixel math of every pass lives in a [`ShadingProgram`]. The
//! pipeline invokes it by [`PassId`] and hands it a freshly built
//! [`PassInvocation`]: a parameter bag holding exactly the textures and
//! values that pass reads, plus the texture it writes. No state is carried
//! from one invocation to the next, so a texture bound for one pass can never
//! leak into the following one.
//!
//! # Passes
//!
//! | Index | Pass | Reads | Writes |
//! |-------|------|-------|--------|
//! | 0 | Raytrace | source color, source depth | reflection |
//! | 1 | Separable blur (one axis per call) | reflection | scratch |
//! | 2 | Temporal accumulate | reflection, previous accumulation, source depth | current accumulation |
//! | 3 | Composite | source color, reflection source | destination |

use glam::{Mat4, Vec2};
use smallvec::SmallVec;

use crate::device::{RenderDevice, TextureId};
use crate::errors::Result;
use crate::settings::QualityTier;

// ─── Pass identity ────────────────────────────────────────────────────────────

/// The four logical passes, by their program index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum PassId {
    Raytrace = 0,
    Blur = 1,
    Accumulate = 2,
    Composite = 3,
}

impl PassId {
    pub const ALL: [PassId; 4] = [Self::Raytrace, Self::Blur, Self::Accumulate, Self::Composite];

    #[inline]
    #[must_use]
    pub fn index(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Raytrace => "Raytrace",
            Self::Blur => "Blur",
            Self::Accumulate => "Accumulate",
            Self::Composite => "Composite",
        }
    }
}

/// Semantic texture slots. A pass reads its inputs by slot and does not know
/// which pass produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    SourceColor,
    SourceDepth,
    /// Reflection color + alpha (raytrace output, or a blur stage of it).
    Reflection,
    PreviousAccumulation,
    /// Reflection source read by the composite pass.
    ReflectionSource,
}

impl TextureSlot {
    /// Binding name used by shader templates.
    #[must_use]
    pub fn binding_name(self) -> &'static str {
        match self {
            Self::SourceColor => "source_color",
            Self::SourceDepth => "source_depth",
            Self::Reflection => "reflection",
            Self::PreviousAccumulation => "previous_accumulation",
            Self::ReflectionSource => "reflection_source",
        }
    }
}

/// Axis of one separable blur sub-pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlurAxis {
    Horizontal,
    Vertical,
}

/// Why the blur pass is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlurPurpose {
    /// Denoise the raw raytrace output (radius = blur sample count).
    Denoise,
    /// Soften the accumulated history (radius = smoothness max radius).
    Smoothness,
}

/// Which reflection texture the composite pass reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReflectionSource {
    /// The temporally accumulated reflection.
    Accumulated,
    /// The accumulated reflection after the smoothness blur.
    Smoothed,
}

impl ReflectionSource {
    #[must_use]
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            Self::Accumulated => None,
            Self::Smoothed => Some("USE_SMOOTHNESS"),
        }
    }
}

// ─── Shared per-frame parameters ──────────────────────────────────────────────

/// Values pushed to the program once per frame, before any pass runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SharedParameters {
    pub view_projection: Mat4,
    pub inverse_view_projection: Mat4,
    pub ray_max_length: f32,
    pub ray_max_thickness: f32,
    pub reflection_enhancer: f32,
    pub accumulation_blend_ratio: f32,
    /// Working resolution of the reflection buffers.
    pub resolution: (u32, u32),
}

// ─── Per-pass parameter bags ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RaytraceParams {
    pub source_color: TextureId,
    pub source_depth: TextureId,
    pub view_projection: Mat4,
    pub inverse_view_projection: Mat4,
    pub ray_max_length: f32,
    pub ray_max_thickness: f32,
    pub quality: QualityTier,
    pub output: TextureId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlurParams {
    pub input: TextureId,
    pub output: TextureId,
    pub axis: BlurAxis,
    /// Axis-aligned texel offset: `(offset.x, 0)` or `(0, offset.y)`.
    pub offset: Vec2,
    /// Sample count / radius. Never zero here; a zero radius skips the pass.
    pub radius: u32,
    pub purpose: BlurPurpose,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccumulateParams {
    pub reflection: TextureId,
    pub previous_accumulation: TextureId,
    /// Depth of the current frame, used to reconstruct positions for
    /// reprojection.
    pub source_depth: TextureId,
    pub previous_view_projection: Mat4,
    pub view_projection: Mat4,
    pub inverse_view_projection: Mat4,
    pub blend_ratio: f32,
    pub output: TextureId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeParams {
    pub source_color: TextureId,
    pub reflection: TextureId,
    pub reflection_source: ReflectionSource,
    pub reflection_enhancer: f32,
    pub output: TextureId,
}

/// One invocation of the shading program.
#[derive(Debug, Clone, PartialEq)]
pub enum PassInvocation {
    Raytrace(RaytraceParams),
    Blur(BlurParams),
    Accumulate(AccumulateParams),
    Composite(CompositeParams),
}

impl PassInvocation {
    #[must_use]
    pub fn pass_id(&self) -> PassId {
        match self {
            Self::Raytrace(_) => PassId::Raytrace,
            Self::Blur(_) => PassId::Blur,
            Self::Accumulate(_) => PassId::Accumulate,
            Self::Composite(_) => PassId::Composite,
        }
    }

    /// Texture written by this invocation.
    #[must_use]
    pub fn output(&self) -> TextureId {
        match self {
            Self::Raytrace(p) => p.output,
            Self::Blur(p) => p.output,
            Self::Accumulate(p) => p.output,
            Self::Composite(p) => p.output,
        }
    }

    /// Textures read by this invocation, by slot.
    #[must_use]
    pub fn inputs(&self) -> SmallVec<[(TextureSlot, TextureId); 3]> {
        let mut inputs = SmallVec::new();
        match self {
            Self::Raytrace(p) => {
                inputs.push((TextureSlot::SourceColor, p.source_color));
                inputs.push((TextureSlot::SourceDepth, p.source_depth));
            }
            Self::Blur(p) => {
                inputs.push((TextureSlot::Reflection, p.input));
            }
            Self::Accumulate(p) => {
                inputs.push((TextureSlot::Reflection, p.reflection));
                inputs.push((TextureSlot::PreviousAccumulation, p.previous_accumulation));
                inputs.push((TextureSlot::SourceDepth, p.source_depth));
            }
            Self::Composite(p) => {
                inputs.push((TextureSlot::SourceColor, p.source_color));
                inputs.push((TextureSlot::ReflectionSource, p.reflection));
            }
        }
        inputs
    }

    /// Returns the texture bound to `slot`, if this invocation reads it.
    #[must_use]
    pub fn input(&self, slot: TextureSlot) -> Option<TextureId> {
        self.inputs()
            .into_iter()
            .find_map(|(s, id)| (s == slot).then_some(id))
    }

    /// Debug label, e.g. `"Blur (Denoise, Horizontal)"`.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Blur(p) => format!("Blur ({:?}, {:?})", p.purpose, p.axis),
            other => other.pass_id().name().to_string(),
        }
    }
}

// ─── Program trait ────────────────────────────────────────────────────────────

/// A shading program exposing the four pass entry points.
///
/// Programs are generic over the device they render with so that GPU
/// programs can record into the device's command stream.
pub trait ShadingProgram<D: RenderDevice + ?Sized> {
    /// Program name, used for logging.
    fn name(&self) -> &str;

    /// Receives the per-frame shared parameters. Called once per frame,
    /// before the first pass.
    fn set_shared_parameters(&mut self, _device: &mut D, _params: &SharedParameters) -> Result<()> {
        Ok(())
    }

    /// Executes one pass invocation.
    fn run_pass(&mut self, device: &mut D, invocation: &PassInvocation) -> Result<()>;
}

impl<D, P> ShadingProgram<D> for Box<P>
where
    D: RenderDevice + ?Sized,
    P: ShadingProgram<D> + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn set_shared_parameters(&mut self, device: &mut D, params: &SharedParameters) -> Result<()> {
        (**self).set_shared_parameters(device, params)
    }

    fn run_pass(&mut self, device: &mut D, invocation: &PassInvocation) -> Result<()> {
        (**self).run_pass(device, invocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn pass_index_round_trips() {
        for pass in PassId::ALL {
            assert_eq!(PassId::from_index(pass.index()), Some(pass));
        }
        assert_eq!(PassId::from_index(4), None);
    }

    #[test]
    fn accumulate_reads_three_slots() {
        let mut ids: SlotMap<TextureId, ()> = SlotMap::with_key();
        let (refl, prev, depth, out) = (ids.insert(()), ids.insert(()), ids.insert(()), ids.insert(()));
        let invocation = PassInvocation::Accumulate(AccumulateParams {
            reflection: refl,
            previous_accumulation: prev,
            source_depth: depth,
            previous_view_projection: Mat4::IDENTITY,
            view_projection: Mat4::IDENTITY,
            inverse_view_projection: Mat4::IDENTITY,
            blend_ratio: 0.1,
            output: out,
        });

        assert_eq!(invocation.inputs().len(), 3);
        assert_eq!(invocation.input(TextureSlot::PreviousAccumulation), Some(prev));
        assert_eq!(invocation.input(TextureSlot::SourceColor), None);
        assert_eq!(invocation.output(), out);
        assert_eq!(invocation.label(), "Accumulate");
    }

    #[test]
    fn slot_binding_names_are_unique() {
        let names = [
            TextureSlot::SourceColor,
            TextureSlot::SourceDepth,
            TextureSlot::Reflection,
            TextureSlot::PreviousAccumulation,
            TextureSlot::ReflectionSource,
        ]
        .map(TextureSlot::binding_name);
        for (i, a) in names.iter().enumerate() {
            assert!(names[i + 1..].iter().all(|b| a != b));
        }
    }
}
