//! WGSL Shader Templates
//!
//! Pass shaders are minijinja templates embedded at compile time. A
//! [`ShaderVariant`] names one compiled permutation: the raytrace pass has a
//! variant per quality tier, the composite pass one per reflection source,
//! and the passes that read depth one per depth-binding kind.
//!
//! Template syntax follows the engine convention: `{$ ... $}` blocks,
//! `{{ ... }}` variables and `$$` line statements.

use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, UndefinedBehavior, context};
use smallvec::SmallVec;

use crate::errors::Result;
use crate::program::{PassId, ReflectionSource};
use crate::settings::QualityTier;

const TEMPLATES: [(&str, &str); 6] = [
    ("fullscreen", include_str!("shaders/fullscreen.wgsl")),
    ("screen", include_str!("shaders/screen.wgsl")),
    ("raytrace", include_str!("shaders/raytrace.wgsl")),
    ("blur", include_str!("shaders/blur.wgsl")),
    ("accumulate", include_str!("shaders/accumulate.wgsl")),
    ("composite", include_str!("shaders/composite.wgsl")),
];

/// How a pass binds the source depth texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthInput {
    /// A depth-format texture (`texture_depth_2d`).
    DepthTexture,
    /// A float color texture carrying depth in its red channel.
    ColorTexture,
}

impl DepthInput {
    #[must_use]
    pub fn from_format(format: wgpu::TextureFormat) -> Self {
        if format.has_depth_aspect() {
            Self::DepthTexture
        } else {
            Self::ColorTexture
        }
    }

    #[must_use]
    pub fn sample_type(self) -> wgpu::TextureSampleType {
        match self {
            Self::DepthTexture => wgpu::TextureSampleType::Depth,
            Self::ColorTexture => wgpu::TextureSampleType::Float { filterable: false },
        }
    }
}

/// What a texture binding of a pass holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureBinding {
    /// Filterable color, sampled with the texture's own filter mode.
    Color,
    /// Source depth. Always point sampled.
    Depth(DepthInput),
}

impl TextureBinding {
    #[must_use]
    pub fn sample_type(self) -> wgpu::TextureSampleType {
        match self {
            Self::Color => wgpu::TextureSampleType::Float { filterable: true },
            Self::Depth(depth) => depth.sample_type(),
        }
    }

    #[must_use]
    pub fn sampler_type(self) -> wgpu::SamplerBindingType {
        match self {
            Self::Color => wgpu::SamplerBindingType::Filtering,
            Self::Depth(_) => wgpu::SamplerBindingType::NonFiltering,
        }
    }
}

/// One shader permutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderVariant {
    Raytrace {
        quality: QualityTier,
        depth: DepthInput,
    },
    Blur,
    Accumulate {
        depth: DepthInput,
    },
    Composite {
        reflection_source: ReflectionSource,
    },
}

impl ShaderVariant {
    #[must_use]
    pub fn pass_id(self) -> PassId {
        match self {
            Self::Raytrace { .. } => PassId::Raytrace,
            Self::Blur => PassId::Blur,
            Self::Accumulate { .. } => PassId::Accumulate,
            Self::Composite { .. } => PassId::Composite,
        }
    }

    /// Texture bindings in binding order.
    ///
    /// Group 0 layout for `n` textures: texture `i` at binding `i`, its
    /// sampler at `n + i`, the uniform block at `2n`.
    #[must_use]
    pub fn texture_bindings(self) -> SmallVec<[TextureBinding; 3]> {
        use TextureBinding::{Color, Depth};
        match self {
            Self::Raytrace { depth, .. } => smallvec::smallvec![Color, Depth(depth)],
            Self::Blur => smallvec::smallvec![Color],
            Self::Accumulate { depth } => smallvec::smallvec![Color, Color, Depth(depth)],
            Self::Composite { .. } => smallvec::smallvec![Color, Color],
        }
    }

    #[must_use]
    pub fn sampler_binding(self, texture: u32) -> u32 {
        self.texture_bindings().len() as u32 + texture
    }

    #[must_use]
    pub fn uniform_binding(self) -> u32 {
        2 * self.texture_bindings().len() as u32
    }

    fn template_name(self) -> &'static str {
        match self {
            Self::Raytrace { .. } => "raytrace",
            Self::Blur => "blur",
            Self::Accumulate { .. } => "accumulate",
            Self::Composite { .. } => "composite",
        }
    }

    #[must_use]
    pub fn label(self) -> String {
        match self {
            Self::Raytrace { quality, depth } => format!("SSLR Raytrace ({quality:?}, {depth:?})"),
            Self::Blur => "SSLR Blur".to_string(),
            Self::Accumulate { depth } => format!("SSLR Accumulate ({depth:?})"),
            Self::Composite { reflection_source } => {
                format!("SSLR Composite ({reflection_source:?})")
            }
        }
    }
}

/// Template environment for the pass shaders.
pub struct ShaderLibrary {
    env: Environment<'static>,
}

impl ShaderLibrary {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();

        let syntax = SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build()?;

        env.set_syntax(syntax);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(UndefinedBehavior::SemiStrict);

        for (name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }

    /// Renders the WGSL source of `variant`.
    pub fn render(&self, variant: ShaderVariant) -> Result<String> {
        let template = self.env.get_template(variant.template_name())?;
        let source = match variant {
            ShaderVariant::Raytrace { quality, depth } => template.render(context! {
                quality_keyword => quality.keyword(),
                march_steps => quality.march_steps(),
                refinement_steps => quality.refinement_steps(),
                depth_binding => 1,
                depth_sampler_binding => variant.sampler_binding(1),
                depth_is_depth_format => depth == DepthInput::DepthTexture,
            })?,
            ShaderVariant::Blur => template.render(context! {})?,
            ShaderVariant::Accumulate { depth } => template.render(context! {
                depth_binding => 2,
                depth_sampler_binding => variant.sampler_binding(2),
                depth_is_depth_format => depth == DepthInput::DepthTexture,
            })?,
            ShaderVariant::Composite { reflection_source } => template.render(context! {
                reflection_keyword => reflection_source.keyword(),
            })?,
        };
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_quality_tier_renders_its_own_step_count() {
        let library = ShaderLibrary::new().unwrap();
        for quality in QualityTier::ALL {
            let source = library
                .render(ShaderVariant::Raytrace {
                    quality,
                    depth: DepthInput::DepthTexture,
                })
                .unwrap();
            assert!(source.contains(quality.keyword()));
            assert!(source.contains(&format!("MARCH_STEPS: u32 = {}u", quality.march_steps())));
            for other in QualityTier::ALL.into_iter().filter(|q| *q != quality) {
                assert!(!source.contains(other.keyword()));
            }
        }
    }

    #[test]
    fn depth_input_selects_binding_type() {
        let library = ShaderLibrary::new().unwrap();
        let depth = library
            .render(ShaderVariant::Accumulate {
                depth: DepthInput::DepthTexture,
            })
            .unwrap();
        let color = library
            .render(ShaderVariant::Accumulate {
                depth: DepthInput::ColorTexture,
            })
            .unwrap();
        assert!(depth.contains("@binding(2) var t_depth: texture_depth_2d"));
        assert!(color.contains("@binding(2) var t_depth: texture_2d<f32>"));
    }

    #[test]
    fn depth_textures_are_point_sampled_not_loaded() {
        let library = ShaderLibrary::new().unwrap();
        let variants = [
            ShaderVariant::Raytrace {
                quality: QualityTier::High,
                depth: DepthInput::DepthTexture,
            },
            ShaderVariant::Accumulate {
                depth: DepthInput::DepthTexture,
            },
        ];
        for variant in variants {
            let depth_index = variant.texture_bindings().len() as u32 - 1;
            let source = library.render(variant).unwrap();
            assert!(
                source.contains(&format!(
                    "@binding({}) var s_depth: sampler",
                    variant.sampler_binding(depth_index)
                )),
                "{variant:?}"
            );
            assert!(source.contains("textureSampleLevel(t_depth, s_depth"), "{variant:?}");
            assert!(!source.contains("textureLoad(t_depth"), "{variant:?}");
        }
    }

    #[test]
    fn bindings_match_the_layout() {
        let library = ShaderLibrary::new().unwrap();
        let variants = [
            ShaderVariant::Raytrace {
                quality: QualityTier::Low,
                depth: DepthInput::ColorTexture,
            },
            ShaderVariant::Blur,
            ShaderVariant::Accumulate {
                depth: DepthInput::ColorTexture,
            },
            ShaderVariant::Composite {
                reflection_source: ReflectionSource::Smoothed,
            },
        ];
        for variant in variants {
            let source = library.render(variant).unwrap();
            assert!(
                source.contains(&format!("@binding({}) var<uniform>", variant.uniform_binding())),
                "{variant:?}"
            );
            for (i, binding) in variant.texture_bindings().into_iter().enumerate() {
                let i = i as u32;
                assert!(source.contains(&format!("@binding({i}) var t_")), "{variant:?}");
                if binding == TextureBinding::Color {
                    let sampler = format!("@binding({}) var s_", variant.sampler_binding(i));
                    assert!(source.contains(&sampler), "{variant:?} {sampler}");
                }
            }
        }
    }

    #[test]
    fn smoothed_composite_carries_keyword() {
        let library = ShaderLibrary::new().unwrap();
        let smoothed = library
            .render(ShaderVariant::Composite {
                reflection_source: ReflectionSource::Smoothed,
            })
            .unwrap();
        let accumulated = library
            .render(ShaderVariant::Composite {
                reflection_source: ReflectionSource::Accumulated,
            })
            .unwrap();
        assert!(smoothed.contains("USE_SMOOTHNESS"));
        assert!(!accumulated.contains("USE_SMOOTHNESS"));
    }

    #[test]
    fn every_variant_includes_the_fullscreen_vertex_stage() {
        let library = ShaderLibrary::new().unwrap();
        let variants = [
            ShaderVariant::Raytrace {
                quality: QualityTier::Low,
                depth: DepthInput::ColorTexture,
            },
            ShaderVariant::Blur,
            ShaderVariant::Accumulate {
                depth: DepthInput::DepthTexture,
            },
            ShaderVariant::Composite {
                reflection_source: ReflectionSource::Accumulated,
            },
        ];
        for variant in variants {
            let source = library.render(variant).unwrap();
            assert!(source.contains("fn vs_main"), "{variant:?}");
            assert!(source.contains("fn fs_main"), "{variant:?}");
            assert!(!source.contains("{$"), "{variant:?}");
        }
    }
}
