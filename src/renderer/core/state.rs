//! Render state enums and their native lookup tables.
//!
//! Each enum indexes a static table of the corresponding `wgpu` value by its
//! discriminant, so conversion is a single array load.

use std::str::FromStr;

use bitflags::bitflags;

use crate::errors::StageError;
use crate::resources::texture::{SamplerType, TextureFormat};
use crate::scene::CoordinateSystem;

/// Number of texture sampler slots a context exposes.
pub const MAX_SAMPLERS: u32 = 8;

// ============================================================================
// Blending
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    One,
    Zero,
    SourceAlpha,
    OneMinusSourceAlpha,
    SourceColor,
    OneMinusSourceColor,
    DestinationAlpha,
    OneMinusDestinationAlpha,
    DestinationColor,
    OneMinusDestinationColor,
}

static BLEND_FACTORS: [wgpu::BlendFactor; 10] = [
    wgpu::BlendFactor::One,
    wgpu::BlendFactor::Zero,
    wgpu::BlendFactor::SrcAlpha,
    wgpu::BlendFactor::OneMinusSrcAlpha,
    wgpu::BlendFactor::Src,
    wgpu::BlendFactor::OneMinusSrc,
    wgpu::BlendFactor::DstAlpha,
    wgpu::BlendFactor::OneMinusDstAlpha,
    wgpu::BlendFactor::Dst,
    wgpu::BlendFactor::OneMinusDst,
];

impl BlendFactor {
    #[inline]
    #[must_use]
    pub fn native(self) -> wgpu::BlendFactor {
        BLEND_FACTORS[self as usize]
    }
}

// ============================================================================
// Depth
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareMode {
    Always,
    Equal,
    Greater,
    GreaterEqual,
    Less,
    #[default]
    LessEqual,
    Never,
    NotEqual,
}

static COMPARE_MODES: [wgpu::CompareFunction; 8] = [
    wgpu::CompareFunction::Always,
    wgpu::CompareFunction::Equal,
    wgpu::CompareFunction::Greater,
    wgpu::CompareFunction::GreaterEqual,
    wgpu::CompareFunction::Less,
    wgpu::CompareFunction::LessEqual,
    wgpu::CompareFunction::Never,
    wgpu::CompareFunction::NotEqual,
];

impl CompareMode {
    #[inline]
    #[must_use]
    pub fn native(self) -> wgpu::CompareFunction {
        COMPARE_MODES[self as usize]
    }
}

// ============================================================================
// Culling
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TriangleFace {
    None,
    Front,
    #[default]
    Back,
    FrontAndBack,
}

impl TriangleFace {
    /// The face to cull once the camera's handedness is taken into account.
    ///
    /// The native winding is right-handed, so a left-handed camera swaps
    /// front and back.
    #[must_use]
    pub fn resolve(self, coordinate_system: CoordinateSystem) -> Self {
        match (self, coordinate_system) {
            (Self::Front, CoordinateSystem::LeftHanded) => Self::Back,
            (Self::Back, CoordinateSystem::LeftHanded) => Self::Front,
            (face, _) => face,
        }
    }

    /// Native cull face; `FrontAndBack` has no single-face equivalent.
    #[must_use]
    pub fn native(self) -> Option<wgpu::Face> {
        match self {
            Self::Front => Some(wgpu::Face::Front),
            Self::Back => Some(wgpu::Face::Back),
            Self::None | Self::FrontAndBack => None,
        }
    }
}

impl FromStr for TriangleFace {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "front" => Ok(Self::Front),
            "back" => Ok(Self::Back),
            "frontandback" | "front_and_back" => Ok(Self::FrontAndBack),
            _ => Err(StageError::UnknownTriangleFace(s.to_owned())),
        }
    }
}

// ============================================================================
// Sampling
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    #[default]
    Clamp,
    Repeat,
}

static WRAP_MODES: [wgpu::AddressMode; 2] =
    [wgpu::AddressMode::ClampToEdge, wgpu::AddressMode::Repeat];

impl WrapMode {
    #[inline]
    #[must_use]
    pub fn native(self) -> wgpu::AddressMode {
        WRAP_MODES[self as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
}

static TEXTURE_FILTERS: [wgpu::FilterMode; 2] = [wgpu::FilterMode::Nearest, wgpu::FilterMode::Linear];

impl TextureFilter {
    #[inline]
    #[must_use]
    pub fn native(self) -> wgpu::FilterMode {
        TEXTURE_FILTERS[self as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MipFilter {
    #[default]
    None,
    Nearest,
    Linear,
}

static MIP_FILTERS: [Option<wgpu::MipmapFilterMode>; 3] = [
    None,
    Some(wgpu::MipmapFilterMode::Nearest),
    Some(wgpu::MipmapFilterMode::Linear),
];

impl MipFilter {
    #[inline]
    #[must_use]
    pub fn native(self) -> Option<wgpu::MipmapFilterMode> {
        MIP_FILTERS[self as usize]
    }
}

static SAMPLER_TYPES: [wgpu::TextureViewDimension; 2] =
    [wgpu::TextureViewDimension::D2, wgpu::TextureViewDimension::Cube];

impl SamplerType {
    #[inline]
    #[must_use]
    pub fn native(self) -> wgpu::TextureViewDimension {
        SAMPLER_TYPES[self as usize]
    }
}

static TEXTURE_FORMATS: [wgpu::TextureFormat; 3] = [
    wgpu::TextureFormat::Bgra8Unorm,
    wgpu::TextureFormat::Bc1RgbaUnorm,
    wgpu::TextureFormat::Bc3RgbaUnorm,
];

impl TextureFormat {
    #[inline]
    #[must_use]
    pub fn native(self) -> wgpu::TextureFormat {
        TEXTURE_FORMATS[self as usize]
    }
}

/// Sampler state in native terms, as handed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeSamplerState {
    pub address_mode: wgpu::AddressMode,
    pub filter: wgpu::FilterMode,
    pub mipmap_filter: Option<wgpu::MipmapFilterMode>,
}

// ============================================================================
// Vertex Streams & Program Stages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexBufferFormat {
    Float1,
    Float2,
    Float3,
    Float4,
    Bytes4,
}

static VERTEX_FORMATS: [wgpu::VertexFormat; 5] = [
    wgpu::VertexFormat::Float32,
    wgpu::VertexFormat::Float32x2,
    wgpu::VertexFormat::Float32x3,
    wgpu::VertexFormat::Float32x4,
    wgpu::VertexFormat::Unorm8x4,
];

impl VertexBufferFormat {
    #[inline]
    #[must_use]
    pub fn native(self) -> wgpu::VertexFormat {
        VERTEX_FORMATS[self as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramType {
    Vertex,
    Fragment,
}

bitflags! {
    /// Buffers touched by a clear.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearMask: u8 {
        const COLOR = 0b001;
        const DEPTH = 0b010;
        const STENCIL = 0b100;
        const ALL = Self::COLOR.bits() | Self::DEPTH.bits() | Self::STENCIL.bits();
    }
}

/// Scissor rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rectangle {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}
