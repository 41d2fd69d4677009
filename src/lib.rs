//! Screen-space local reflections (SSLR) as a post-processing stage.
//!
//! Each frame the effect raymarches the scene depth buffer for reflection
//! hits, denoises the result with a separable blur, blends it into a
//! persistent history, optionally softens that history, and composites it
//! over the source color.
//!
//! ```rust,ignore
//! use sslr::backend::{CpuDevice, CpuProgram};
//! use sslr::{CameraState, ScreenSpaceReflection, SslrSettings};
//!
//! let mut device = CpuDevice::new();
//! let mut effect = ScreenSpaceReflection::with_program(SslrSettings::default(), CpuProgram::new());
//! let output = effect.process(&mut device, color, depth, &camera, destination)?;
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod accumulation;
pub mod backend;
pub mod camera;
pub mod device;
pub mod driver;
pub mod effect;
pub mod errors;
pub mod pool;
pub mod program;
pub mod settings;

pub use accumulation::AccumulationState;
pub use camera::{CameraState, WorkingResolution};
pub use device::{FilterMode, RenderDevice, TargetUsage, TextureDesc, TextureFormat, TextureId};
pub use driver::{FrameReport, PassDriver, PassRecord};
pub use effect::{EffectState, FrameStats, ScreenSpaceReflection};
pub use errors::{Result, SslrError};
pub use pool::{RenderTargetPool, TransientBuffer};
pub use program::{PassId, PassInvocation, ReflectionSource, ShadingProgram, SharedParameters};
pub use settings::{QualityTier, SmoothnessSettings, SslrSettings};
