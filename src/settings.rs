//! Effect Configuration
//!
//! [`SslrSettings`] is the configuration surface of the effect. It is plain
//! data: the host (or its tooling) fills it in before the first frame and may
//! change it between frames; the [`ScreenSpaceReflection`] controller reads it
//! once at the start of every frame.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sslr::{QualityTier, SslrSettings};
//!
//! let mut settings = SslrSettings::default();
//! settings.set_quality(QualityTier::High);
//! settings.set_resolution_scale(0.75);
//! settings.set_smoothness_enabled(true);
//! settings.validate()?;
//!
//! // Or load from a JSON document
//! let settings = SslrSettings::from_json_str(r#"{ "quality": "Low", "blur_sample_count": 0 }"#)?;
//! ```
//!
//! # Fields
//!
//! | Field                    | Range      | Default   |
//! |--------------------------|------------|-----------|
//! | `quality`                | tier       | `Middle`  |
//! | `resolution_scale`       | (0, 1]     | `0.5`     |
//! | `ray_max_length`         | > 0        | `2.0`     |
//! | `ray_max_thickness`      | > 0        | `0.2`     |
//! | `blur_offset`            | 2-vector   | `(1, 1)`  |
//! | `blur_sample_count`      | [0, 10]    | `3`       |
//! | `reflection_enhancer`    | [0, 5]     | `1.0`     |
//! | `smoothness.enabled`     | bool       | `false`   |
//! | `smoothness.max_radius`  | [3, 10]    | `5`       |
//! | `accumulation_blend_ratio` | [0, 1]   | `0.1`     |
//!
//! [`ScreenSpaceReflection`]: crate::effect::ScreenSpaceReflection

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SslrError};

/// Upper bound for [`SslrSettings::blur_sample_count`].
pub const MAX_BLUR_SAMPLE_COUNT: u32 = 10;
/// Upper bound for [`SslrSettings::reflection_enhancer`].
pub const MAX_REFLECTION_ENHANCER: f32 = 5.0;
/// Valid range for [`SmoothnessSettings::max_radius`].
pub const SMOOTHNESS_RADIUS_RANGE: (u32, u32) = (3, 10);

// ---------------------------------------------------------------------------
// QualityTier
// ---------------------------------------------------------------------------

/// Raytrace quality tier.
///
/// Exactly one tier is active at any time. The tier selects an algorithmic
/// variant of the raytrace pass (march step count and hit refinement); the
/// numeric behavior of each tier belongs to the shading program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QualityTier {
    High,
    #[default]
    Middle,
    Low,
}

impl QualityTier {
    /// All tiers, highest first.
    pub const ALL: [QualityTier; 3] = [Self::High, Self::Middle, Self::Low];

    /// Shader keyword that enables this tier's variant.
    #[inline]
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::High => "QUALITY_HIGH",
            Self::Middle => "QUALITY_MIDDLE",
            Self::Low => "QUALITY_LOW",
        }
    }

    /// Number of march steps used by the reference raytrace for this tier.
    #[inline]
    #[must_use]
    pub fn march_steps(self) -> u32 {
        match self {
            Self::High => 64,
            Self::Middle => 32,
            Self::Low => 16,
        }
    }

    /// Number of binary-search refinement steps after a coarse hit.
    #[inline]
    #[must_use]
    pub fn refinement_steps(self) -> u32 {
        match self {
            Self::High => 8,
            Self::Middle => 4,
            Self::Low => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// SmoothnessSettings
// ---------------------------------------------------------------------------

/// Optional second blur applied to the accumulated reflection before
/// compositing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothnessSettings {
    /// Whether the smoothness blur runs.
    pub enabled: bool,
    /// Blur radius (sample count) of the smoothness blur, in [3, 10].
    pub max_radius: u32,
}

impl Default for SmoothnessSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_radius: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// SslrSettings
// ---------------------------------------------------------------------------

/// SSLR configuration (pure data).
///
/// Setter methods clamp their input into the documented range. Direct field
/// writes are allowed; [`validate`](Self::validate) reports anything out of
/// range and is called by the controller before each frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SslrSettings {
    /// Raytrace quality tier.
    pub quality: QualityTier,
    /// Working-resolution scale relative to the camera, in (0, 1].
    pub resolution_scale: f32,
    /// Maximum ray length in world units.
    pub ray_max_length: f32,
    /// Depth thickness assumed for every surface hit by a ray.
    pub ray_max_thickness: f32,
    /// Texel offset of the separable blur (x for the horizontal sub-pass,
    /// y for the vertical one).
    pub blur_offset: Vec2,
    /// Sample count of the reflection denoise blur. `0` disables it.
    pub blur_sample_count: u32,
    /// Multiplier applied to the reflection when compositing.
    pub reflection_enhancer: f32,
    /// Smoothness blur over the accumulated history.
    pub smoothness: SmoothnessSettings,
    /// Weight of the new sample when blending with history
    /// (0 = history only, 1 = new sample only).
    pub accumulation_blend_ratio: f32,
}

impl Default for SslrSettings {
    fn default() -> Self {
        Self {
            quality: QualityTier::Middle,
            resolution_scale: 0.5,
            ray_max_length: 2.0,
            ray_max_thickness: 0.2,
            blur_offset: Vec2::ONE,
            blur_sample_count: 3,
            reflection_enhancer: 1.0,
            smoothness: SmoothnessSettings::default(),
            accumulation_blend_ratio: 0.1,
        }
    }
}

impl SslrSettings {
    /// Creates settings with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses settings from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serializes the settings to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    // === Setters ===

    /// Selects the quality tier. The previous tier is deselected.
    pub fn set_quality(&mut self, quality: QualityTier) {
        self.quality = quality;
    }

    /// Sets the resolution scale. Clamped to `[f32::EPSILON, 1.0]`.
    pub fn set_resolution_scale(&mut self, scale: f32) {
        self.resolution_scale = scale.clamp(f32::EPSILON, 1.0);
    }

    /// Sets the maximum ray length. Must stay positive.
    pub fn set_ray_max_length(&mut self, length: f32) {
        self.ray_max_length = length.max(f32::EPSILON);
    }

    /// Sets the ray thickness. Must stay positive.
    pub fn set_ray_max_thickness(&mut self, thickness: f32) {
        self.ray_max_thickness = thickness.max(f32::EPSILON);
    }

    pub fn set_blur_offset(&mut self, offset: Vec2) {
        self.blur_offset = offset;
    }

    /// Sets the denoise blur sample count. Clamped to `[0, 10]`.
    pub fn set_blur_sample_count(&mut self, count: u32) {
        self.blur_sample_count = count.min(MAX_BLUR_SAMPLE_COUNT);
    }

    /// Sets the reflection enhancer. Clamped to `[0, 5]`.
    pub fn set_reflection_enhancer(&mut self, enhancer: f32) {
        self.reflection_enhancer = enhancer.clamp(0.0, MAX_REFLECTION_ENHANCER);
    }

    pub fn set_smoothness_enabled(&mut self, enabled: bool) {
        self.smoothness.enabled = enabled;
    }

    /// Sets the smoothness blur radius. Clamped to `[3, 10]`.
    pub fn set_smoothness_radius(&mut self, radius: u32) {
        let (lo, hi) = SMOOTHNESS_RADIUS_RANGE;
        self.smoothness.max_radius = radius.clamp(lo, hi);
    }

    /// Sets the accumulation blend ratio. Clamped to `[0, 1]`.
    pub fn set_accumulation_blend_ratio(&mut self, ratio: f32) {
        self.accumulation_blend_ratio = ratio.clamp(0.0, 1.0);
    }

    // === Validation ===

    /// Checks every field against its documented range.
    pub fn validate(&self) -> Result<()> {
        fn invalid(field: &'static str, value: impl ToString, reason: &'static str) -> SslrError {
            SslrError::InvalidSettings {
                field,
                value: value.to_string(),
                reason,
            }
        }

        if !(self.resolution_scale > 0.0 && self.resolution_scale <= 1.0) {
            return Err(invalid(
                "resolution_scale",
                self.resolution_scale,
                "must be in (0, 1]",
            ));
        }
        if !(self.ray_max_length > 0.0 && self.ray_max_length.is_finite()) {
            return Err(invalid("ray_max_length", self.ray_max_length, "must be > 0"));
        }
        if !(self.ray_max_thickness > 0.0 && self.ray_max_thickness.is_finite()) {
            return Err(invalid(
                "ray_max_thickness",
                self.ray_max_thickness,
                "must be > 0",
            ));
        }
        if !self.blur_offset.is_finite() {
            return Err(invalid("blur_offset", self.blur_offset, "must be finite"));
        }
        if self.blur_sample_count > MAX_BLUR_SAMPLE_COUNT {
            return Err(invalid(
                "blur_sample_count",
                self.blur_sample_count,
                "must be in [0, 10]",
            ));
        }
        if !(0.0..=MAX_REFLECTION_ENHANCER).contains(&self.reflection_enhancer) {
            return Err(invalid(
                "reflection_enhancer",
                self.reflection_enhancer,
                "must be in [0, 5]",
            ));
        }
        let (lo, hi) = SMOOTHNESS_RADIUS_RANGE;
        if !(lo..=hi).contains(&self.smoothness.max_radius) {
            return Err(invalid(
                "smoothness.max_radius",
                self.smoothness.max_radius,
                "must be in [3, 10]",
            ));
        }
        if !(0.0..=1.0).contains(&self.accumulation_blend_ratio) {
            return Err(invalid(
                "accumulation_blend_ratio",
                self.accumulation_blend_ratio,
                "must be in [0, 1]",
            ));
        }
        Ok(())
    }
}
