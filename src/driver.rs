//! Pass Driver
//!
//! Runs the fixed pass sequence of one frame and wires textures between
//! passes.
//!
//! # Data Flow
//!
//! ```text
//!  source color ─┬─► [0] Raytrace ──► reflection
//!  source depth ─┤                        │
//!                │          blur count > 0 ▼
//!                │    [1] Blur H ──► blur_x ──► [1] Blur V ──► blur_y
//!                │                                              │
//!                │          (reflection, or blur_y) ◄───────────┘
//!                │                        │
//!                ├──────────────► [2] Accumulate ◄── previous accumulation
//!                │                        │             (prev view-proj)
//!                │                        ▼
//!                │               current accumulation
//!                │                        │
//!                │        smoothness on   ▼
//!                │    [1] Blur H ──► blur_x ──► [1] Blur V ──► blur_y
//!                │                        │
//!                └──────────────► [3] Composite ──► destination
//!                                         │
//!                                   swap(), record view-proj
//! ```
//!
//! The two blur scratch targets are shared by the denoise and smoothness
//! blurs; the denoise result has already been consumed by the accumulation
//! pass when the smoothness blur overwrites it.

use glam::{Mat4, Vec2};
use smallvec::SmallVec;

use crate::accumulation::AccumulationState;
use crate::device::{RenderDevice, TextureId};
use crate::errors::{Result, SslrError};
use crate::program::{
    AccumulateParams, BlurAxis, BlurParams, BlurPurpose, CompositeParams, PassId,
    PassInvocation, RaytraceParams, ReflectionSource, ShadingProgram, TextureSlot,
};
use crate::settings::SslrSettings;

/// Transient targets acquired for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTargets {
    /// Raw raytrace output.
    pub reflection: TextureId,
    /// Horizontal blur output.
    pub blur_x: TextureId,
    /// Vertical blur output.
    pub blur_y: TextureId,
}

/// Per-frame inputs of the driver.
#[derive(Debug, Clone, Copy)]
pub struct FrameInputs<'a> {
    pub source_color: TextureId,
    pub source_depth: TextureId,
    pub destination: TextureId,
    pub view_projection: Mat4,
    pub inverse_view_projection: Mat4,
    pub settings: &'a SslrSettings,
}

/// One issued pass invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PassRecord {
    pub pass: PassId,
    pub label: String,
    pub output: TextureId,
    pub inputs: SmallVec<[(TextureSlot, TextureId); 3]>,
}

/// What the driver did during one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Invocations in issue order.
    pub records: Vec<PassRecord>,
    /// Previous view-projection consumed by the accumulation pass.
    pub previous_view_projection: Mat4,
    /// View-projection of this frame.
    pub view_projection: Mat4,
    /// Accumulation buffer written this frame (the *previous* slot after the
    /// swap).
    pub accumulated: TextureId,
    /// Reflection texture read by the composite pass.
    pub reflection_source: ReflectionSource,
}

impl FrameReport {
    /// Number of invocations of `pass` this frame.
    #[must_use]
    pub fn count(&self, pass: PassId) -> usize {
        self.records.iter().filter(|r| r.pass == pass).count()
    }

    #[must_use]
    pub fn ran(&self, pass: PassId) -> bool {
        self.count(pass) > 0
    }

    /// Invocations of `pass`, in issue order.
    pub fn invocations(&self, pass: PassId) -> impl Iterator<Item = &PassRecord> {
        self.records.iter().filter(move |r| r.pass == pass)
    }
}

/// Issues the passes of a frame in their fixed order.
#[derive(Debug, Default)]
pub struct PassDriver {
    _private: (),
}

impl PassDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs passes 0–3 for one frame.
    ///
    /// On success the accumulation state has been swapped and its previous
    /// view-projection updated. If any pass fails, the error is returned
    /// immediately and the accumulation state is left untouched; passes
    /// already issued stay issued and nothing is retried.
    pub fn run<D, P>(
        &mut self,
        device: &mut D,
        program: &mut P,
        accumulation: &mut AccumulationState,
        targets: &FrameTargets,
        inputs: &FrameInputs<'_>,
    ) -> Result<FrameReport>
    where
        D: RenderDevice + ?Sized,
        P: ShadingProgram<D> + ?Sized,
    {
        let settings = inputs.settings;
        let mut records = Vec::with_capacity(8);

        // ── Pass 0: Raytrace ───────────────────────────────────────────────
        Self::invoke(
            device,
            program,
            &mut records,
            PassInvocation::Raytrace(RaytraceParams {
                source_color: inputs.source_color,
                source_depth: inputs.source_depth,
                view_projection: inputs.view_projection,
                inverse_view_projection: inputs.inverse_view_projection,
                ray_max_length: settings.ray_max_length,
                ray_max_thickness: settings.ray_max_thickness,
                quality: settings.quality,
                output: targets.reflection,
            }),
        )?;

        // ── Pass 1: Denoise blur ───────────────────────────────────────────
        let reflection = Self::separable_blur(
            device,
            program,
            &mut records,
            targets,
            targets.reflection,
            settings.blur_offset,
            settings.blur_sample_count,
            BlurPurpose::Denoise,
        )?;

        // ── Pass 2: Temporal accumulation ──────────────────────────────────
        let (Some(current), Some(previous)) = (accumulation.current(), accumulation.previous())
        else {
            return Err(SslrError::UnknownTexture(
                "accumulation buffers not initialized".to_string(),
            ));
        };
        let previous_view_projection =
            accumulation.resolve_previous_view_projection(inputs.view_projection);

        Self::invoke(
            device,
            program,
            &mut records,
            PassInvocation::Accumulate(AccumulateParams {
                reflection,
                previous_accumulation: previous,
                source_depth: inputs.source_depth,
                previous_view_projection,
                view_projection: inputs.view_projection,
                inverse_view_projection: inputs.inverse_view_projection,
                blend_ratio: settings.accumulation_blend_ratio,
                output: current,
            }),
        )?;

        // ── Pass 1 (again): Smoothness blur over the history ───────────────
        let (composite_input, reflection_source) = if settings.smoothness.enabled {
            let smoothed = Self::separable_blur(
                device,
                program,
                &mut records,
                targets,
                current,
                settings.blur_offset,
                settings.smoothness.max_radius,
                BlurPurpose::Smoothness,
            )?;
            if smoothed == current {
                (current, ReflectionSource::Accumulated)
            } else {
                (smoothed, ReflectionSource::Smoothed)
            }
        } else {
            (current, ReflectionSource::Accumulated)
        };

        // ── Pass 3: Composite ──────────────────────────────────────────────
        Self::invoke(
            device,
            program,
            &mut records,
            PassInvocation::Composite(CompositeParams {
                source_color: inputs.source_color,
                reflection: composite_input,
                reflection_source,
                reflection_enhancer: settings.reflection_enhancer,
                output: inputs.destination,
            }),
        )?;

        // Only a fully composited frame becomes history.
        accumulation.swap();
        accumulation.set_previous_view_projection(inputs.view_projection);

        Ok(FrameReport {
            records,
            previous_view_projection,
            view_projection: inputs.view_projection,
            accumulated: current,
            reflection_source,
        })
    }

    /// Horizontal then vertical blur of `input`. Returns the blurred texture,
    /// or `input` unchanged when `radius` is zero (both sub-passes skipped).
    fn separable_blur<D, P>(
        device: &mut D,
        program: &mut P,
        records: &mut Vec<PassRecord>,
        targets: &FrameTargets,
        input: TextureId,
        offset: Vec2,
        radius: u32,
        purpose: BlurPurpose,
    ) -> Result<TextureId>
    where
        D: RenderDevice + ?Sized,
        P: ShadingProgram<D> + ?Sized,
    {
        if radius == 0 {
            return Ok(input);
        }

        Self::invoke(
            device,
            program,
            records,
            PassInvocation::Blur(BlurParams {
                input,
                output: targets.blur_x,
                axis: BlurAxis::Horizontal,
                offset: Vec2::new(offset.x, 0.0),
                radius,
                purpose,
            }),
        )?;
        Self::invoke(
            device,
            program,
            records,
            PassInvocation::Blur(BlurParams {
                input: targets.blur_x,
                output: targets.blur_y,
                axis: BlurAxis::Vertical,
                offset: Vec2::new(0.0, offset.y),
                radius,
                purpose,
            }),
        )?;
        Ok(targets.blur_y)
    }

    fn invoke<D, P>(
        device: &mut D,
        program: &mut P,
        records: &mut Vec<PassRecord>,
        invocation: PassInvocation,
    ) -> Result<()>
    where
        D: RenderDevice + ?Sized,
        P: ShadingProgram<D> + ?Sized,
    {
        let record = PassRecord {
            pass: invocation.pass_id(),
            label: invocation.label(),
            output: invocation.output(),
            inputs: invocation.inputs(),
        };
        log::trace!("PassDriver: {} -> {:?}", record.label, record.output);
        records.push(record);
        program.run_pass(device, &invocation)
    }
}
