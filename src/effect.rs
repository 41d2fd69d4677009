//! Effect Controller
//!
//! [`ScreenSpaceReflection`] is the per-frame entry point consumed by the
//! host renderer. It owns the render-target pool, the accumulation state and
//! the pass driver, and runs them against whatever [`RenderDevice`] the host
//! passes in.
//!
//! # States
//!
//! ```text
//!            bind_program()
//!   Disabled ──────────────► Active
//!      ▲                        │
//!      └────────────────────────┘
//!        unbind_program() / teardown()
//! ```
//!
//! While **Disabled**, [`process`](ScreenSpaceReflection::process) returns
//! the source color untouched. While **Active**, each frame:
//!
//! 1. resolves the working resolution from the camera and the scale,
//! 2. ensures the accumulation buffers match it,
//! 3. acquires the transient targets,
//! 4. pushes the shared parameters to the program,
//! 5. runs passes 0–3,
//! 6. releases every transient target, whether or not a pass failed.
//!
//! A failure inside steps 2–5 loses the frame's reflection: it is logged,
//! counted in [`FrameStats::pass_failures`], and the frame is presented as
//! pass-through. Nothing is retried.

use smallvec::SmallVec;

use crate::accumulation::AccumulationState;
use crate::camera::{CameraState, WorkingResolution};
use crate::device::{RenderDevice, TextureFormat, TextureId};
use crate::driver::{FrameInputs, FrameReport, FrameTargets, PassDriver};
use crate::errors::{Result, SslrError};
use crate::pool::{RenderTargetPool, TransientBuffer};
use crate::program::{ShadingProgram, SharedParameters};
use crate::settings::SslrSettings;

/// Resolution changes on this many consecutive frames are reported as churn.
const RESIZE_CHURN_THRESHOLD: u32 = 2;

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectState {
    /// No shading program bound; frames pass through.
    Disabled,
    /// A shading program is bound; frames run the pipeline.
    Active,
}

/// Counters describing the controller's history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames that ran the full pipeline.
    pub frames_processed: u64,
    /// Frames returned unmodified (disabled, degenerate or failed).
    pub frames_passed_through: u64,
    /// Number of working-resolution changes after the first frame.
    pub resize_count: u64,
    /// Length of the current run of frames that changed resolution.
    pub consecutive_resize_frames: u32,
    /// Frames lost to a pass or allocation failure.
    pub pass_failures: u64,
    /// Working resolution of the most recent active frame.
    pub last_resolution: Option<WorkingResolution>,
}

/// Screen-space local reflection effect.
pub struct ScreenSpaceReflection<P> {
    settings: SslrSettings,
    program: Option<P>,

    pool: RenderTargetPool,
    accumulation: AccumulationState,
    driver: PassDriver,

    stats: FrameStats,
    last_report: Option<FrameReport>,
}

impl<P> ScreenSpaceReflection<P> {
    /// Creates a disabled effect.
    #[must_use]
    pub fn new(settings: SslrSettings) -> Self {
        Self {
            settings,
            program: None,
            pool: RenderTargetPool::new(),
            accumulation: AccumulationState::init(),
            driver: PassDriver::new(),
            stats: FrameStats::default(),
            last_report: None,
        }
    }

    /// Creates an effect with a program already bound.
    #[must_use]
    pub fn with_program(settings: SslrSettings, program: P) -> Self {
        let mut effect = Self::new(settings);
        effect.program = Some(program);
        effect
    }

    // === State machine ===

    #[must_use]
    pub fn state(&self) -> EffectState {
        if self.program.is_some() {
            EffectState::Active
        } else {
            EffectState::Disabled
        }
    }

    /// Binds a shading program, returning the previously bound one.
    pub fn bind_program(&mut self, program: P) -> Option<P> {
        if self.program.is_none() {
            log::info!("ScreenSpaceReflection: program bound, effect active");
        }
        self.program.replace(program)
    }

    /// Unbinds the program and releases every persistent and pooled
    /// resource. The effect is disabled afterwards.
    pub fn unbind_program<D: RenderDevice + ?Sized>(&mut self, device: &mut D) -> Option<P> {
        self.release_resources(device);
        let program = self.program.take();
        if program.is_some() {
            log::info!("ScreenSpaceReflection: program unbound, effect disabled");
        }
        program
    }

    /// Releases everything the effect owns on `device` and disables it.
    pub fn teardown<D: RenderDevice + ?Sized>(&mut self, device: &mut D) {
        drop(self.unbind_program(device));
    }

    fn release_resources<D: RenderDevice + ?Sized>(&mut self, device: &mut D) {
        self.accumulation.teardown(device);
        self.pool.clear(device);
        self.stats.last_resolution = None;
        self.stats.consecutive_resize_frames = 0;
        self.last_report = None;
    }

    // === Accessors ===

    #[must_use]
    pub fn settings(&self) -> &SslrSettings {
        &self.settings
    }

    /// Mutable access to the settings; changes apply from the next frame.
    pub fn settings_mut(&mut self) -> &mut SslrSettings {
        &mut self.settings
    }

    pub fn set_settings(&mut self, settings: SslrSettings) {
        self.settings = settings;
    }

    #[must_use]
    pub fn program(&self) -> Option<&P> {
        self.program.as_ref()
    }

    pub fn program_mut(&mut self) -> Option<&mut P> {
        self.program.as_mut()
    }

    #[must_use]
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    #[must_use]
    pub fn pool(&self) -> &RenderTargetPool {
        &self.pool
    }

    #[must_use]
    pub fn accumulation(&self) -> &AccumulationState {
        &self.accumulation
    }

    /// Report of the most recent successful frame.
    #[must_use]
    pub fn last_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }

    // === Per-frame entry point ===

    /// Processes one frame.
    ///
    /// Returns the texture the host should present: `destination` when the
    /// reflection was composited, `source_color` when the frame passed
    /// through. Invalid settings and degenerate working resolutions are
    /// returned as errors without touching the device.
    pub fn process<D>(
        &mut self,
        device: &mut D,
        source_color: TextureId,
        source_depth: TextureId,
        camera: &CameraState,
        destination: TextureId,
    ) -> Result<TextureId>
    where
        D: RenderDevice + ?Sized,
        P: ShadingProgram<D>,
    {
        if self.program.is_none() {
            self.stats.frames_passed_through += 1;
            return Ok(source_color);
        }

        self.settings.validate()?;

        // (1) Working resolution
        let resolution = WorkingResolution::from_camera(camera, self.settings.resolution_scale);
        if resolution.is_degenerate() {
            log::warn!(
                "ScreenSpaceReflection: degenerate working resolution {}x{}, skipping frame",
                resolution.width,
                resolution.height
            );
            self.stats.frames_passed_through += 1;
            return Err(SslrError::DegenerateResolution {
                width: resolution.width,
                height: resolution.height,
                camera_width: camera.pixel_width,
                camera_height: camera.pixel_height,
                scale: self.settings.resolution_scale,
            });
        }
        self.track_resolution(device, resolution);

        device.begin_frame();
        self.pool.begin_frame();

        let result = self.run_frame(
            device,
            resolution,
            source_color,
            source_depth,
            camera,
            destination,
        );

        self.pool.end_frame();
        let submitted = device.end_frame();

        match result {
            Ok(report) => {
                submitted?;
                log::trace!(
                    "ScreenSpaceReflection: frame {} issued {} invocation(s)",
                    self.stats.frames_processed,
                    report.records.len()
                );
                self.stats.frames_processed += 1;
                self.last_report = Some(report);
                Ok(destination)
            }
            Err(err) => {
                log::error!("ScreenSpaceReflection: frame lost, passing through: {err}");
                if let Err(submit_err) = submitted {
                    log::error!("ScreenSpaceReflection: submission also failed: {submit_err}");
                }
                self.stats.pass_failures += 1;
                self.stats.frames_passed_through += 1;
                Ok(source_color)
            }
        }
    }

    /// Steps (2)–(6) of a frame. Transient targets are released on every
    /// path out of this function.
    fn run_frame<D>(
        &mut self,
        device: &mut D,
        resolution: WorkingResolution,
        source_color: TextureId,
        source_depth: TextureId,
        camera: &CameraState,
        destination: TextureId,
    ) -> Result<FrameReport>
    where
        D: RenderDevice + ?Sized,
        P: ShadingProgram<D>,
    {
        let Some(program) = self.program.as_mut() else {
            return Err(SslrError::ProgramNotBound);
        };

        // (2) Persistent buffers
        self.accumulation
            .ensure(device, resolution.width, resolution.height)?;

        let view_projection = camera.view_projection();
        let inverse_view_projection = view_projection.inverse();

        // (3) Transient targets
        let mut buffers: SmallVec<[TransientBuffer; 3]> = SmallVec::new();
        let result = acquire_targets(&mut self.pool, device, resolution, &mut buffers)
            .and_then(|targets| {
                // (4) Shared parameters
                program.set_shared_parameters(
                    device,
                    &SharedParameters {
                        view_projection,
                        inverse_view_projection,
                        ray_max_length: self.settings.ray_max_length,
                        ray_max_thickness: self.settings.ray_max_thickness,
                        reflection_enhancer: self.settings.reflection_enhancer,
                        accumulation_blend_ratio: self.settings.accumulation_blend_ratio,
                        resolution: resolution.as_tuple(),
                    },
                )?;

                // (5) Passes
                self.driver.run(
                    device,
                    program,
                    &mut self.accumulation,
                    &targets,
                    &FrameInputs {
                        source_color,
                        source_depth,
                        destination,
                        view_projection,
                        inverse_view_projection,
                        settings: &self.settings,
                    },
                )
            });

        // (6) Release, unconditionally
        for buffer in buffers {
            self.pool.release(buffer);
        }
        result
    }

    fn track_resolution<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        resolution: WorkingResolution,
    ) {
        match self.stats.last_resolution {
            Some(last) if last != resolution => {
                self.stats.resize_count += 1;
                self.stats.consecutive_resize_frames += 1;
                log::debug!(
                    "ScreenSpaceReflection: working resolution {}x{} -> {}x{}",
                    last.width,
                    last.height,
                    resolution.width,
                    resolution.height
                );
                if self.stats.consecutive_resize_frames >= RESIZE_CHURN_THRESHOLD {
                    log::warn!(
                        "ScreenSpaceReflection: working resolution changed on {} consecutive \
                         frames; accumulation buffers are recreated every frame",
                        self.stats.consecutive_resize_frames
                    );
                }
                // Targets at the old size can never be reused.
                self.pool.trim(device, 0);
            }
            Some(_) => self.stats.consecutive_resize_frames = 0,
            None => {}
        }
        self.stats.last_resolution = Some(resolution);
    }
}

fn acquire_targets<D: RenderDevice + ?Sized>(
    pool: &mut RenderTargetPool,
    device: &mut D,
    resolution: WorkingResolution,
    buffers: &mut SmallVec<[TransientBuffer; 3]>,
) -> Result<FrameTargets> {
    let (w, h) = resolution.as_tuple();
    let format = TextureFormat::REFLECTION;

    let reflection = pool.acquire(device, "SSLR Reflection", w, h, format)?;
    let reflection_id = reflection.id();
    buffers.push(reflection);

    let blur_x = pool.acquire(device, "SSLR Blur X", w, h, format)?;
    let blur_x_id = blur_x.id();
    buffers.push(blur_x);

    let blur_y = pool.acquire(device, "SSLR Blur Y", w, h, format)?;
    let blur_y_id = blur_y.id();
    buffers.push(blur_y);

    Ok(FrameTargets {
        reflection: reflection_id,
        blur_x: blur_x_id,
        blur_y: blur_y_id,
    })
}
