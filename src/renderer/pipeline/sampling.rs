//! Texture sampling code helpers.

use crate::assets::TextureHandle;
use crate::renderer::core::state::{MipFilter, TextureFilter, WrapMode};
use crate::renderer::pipeline::registers::RegisterHandle;
use crate::renderer::pipeline::shader_object::ShaderObject;
use crate::resources::texture::{SamplerType, Texture, TextureFormat};

/// The properties of a bound texture that change generated code.
///
/// Passes snapshot this when a texture is assigned. A render context
/// re-reads it from the texture before every compile and recompiles when it
/// moved, so the snapshot only serves compiles made without assets at hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSignature {
    pub format: TextureFormat,
    pub has_mipmaps: bool,
    pub sampler_type: SamplerType,
}

impl TextureSignature {
    #[must_use]
    pub fn of(texture: &Texture) -> Self {
        Self {
            format: texture.format(),
            has_mipmaps: texture.has_mipmaps(),
            sampler_type: texture.sampler_type(),
        }
    }

    /// The signature packed into one word, for version stamps.
    #[must_use]
    pub fn bits(&self) -> u64 {
        self.format as u64 | u64::from(self.has_mipmaps) << 8 | (self.sampler_type as u64) << 16
    }
}

/// A texture a compiled program samples, with the signature it was
/// compiled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampledTexture {
    pub slot: u32,
    pub texture: TextureHandle,
    pub signature: TextureSignature,
}

/// Sampler state derived from the material flags recorded on the shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerSettings {
    pub wrap: WrapMode,
    pub filter: TextureFilter,
    pub mip_filter: MipFilter,
}

impl SamplerSettings {
    #[must_use]
    pub fn for_shader(shader: &ShaderObject, texture: &TextureSignature) -> Self {
        let filter = if shader.use_smoothing {
            TextureFilter::Linear
        } else {
            TextureFilter::Nearest
        };
        let mip_filter = match (shader.use_mipmapping && texture.has_mipmaps, filter) {
            (false, _) => MipFilter::None,
            (true, TextureFilter::Linear) => MipFilter::Linear,
            (true, TextureFilter::Nearest) => MipFilter::Nearest,
        };
        Self {
            wrap: if shader.repeat_textures {
                WrapMode::Repeat
            } else {
                WrapMode::Clamp
            },
            filter,
            mip_filter,
        }
    }
}

fn format_flag(format: TextureFormat) -> &'static str {
    match format {
        TextureFormat::Bgra => "",
        TextureFormat::Compressed => "dxt1,",
        TextureFormat::CompressedAlpha => "dxt5,",
    }
}

/// `tex target, uv, fsN <2d,filter,mip,format wrap>` for a 2D texture.
#[must_use]
pub fn tex2d_sample_code(
    target: RegisterHandle,
    shader: &ShaderObject,
    sampler: RegisterHandle,
    texture: &TextureSignature,
    uv: RegisterHandle,
) -> String {
    let settings = SamplerSettings::for_shader(shader, texture);
    let filter = match settings.filter {
        TextureFilter::Linear => "linear",
        TextureFilter::Nearest => "nearest",
    };
    let mip = match settings.mip_filter {
        MipFilter::None => "mipnone",
        MipFilter::Nearest => "mipnearest",
        MipFilter::Linear => "miplinear",
    };
    let wrap = match settings.wrap {
        WrapMode::Repeat => "wrap",
        WrapMode::Clamp => "clamp",
    };
    let kind = match texture.sampler_type {
        SamplerType::Texture2d => "2d",
        SamplerType::Cube => "cube",
    };
    format!(
        "tex {target}, {uv}, {sampler} <{kind},{filter},{mip},{}{wrap}>\n",
        format_flag(texture.format)
    )
}
