//! Graphics backend abstraction.
//!
//! The rendering context is backend-agnostic: it drives a [`Backend`] with
//! native `wgpu` enum values and opaque GPU object handles. Factory methods
//! default to [`StageError::UnsupportedOperation`], so a backend only
//! implements what its device offers; a missing factory is fatal at the
//! first call that needs it.
//!
//! Tests use [`HeadlessBackend`](super::headless::HeadlessBackend), which
//! records every call.

use crate::errors::{Result, StageError};
use crate::renderer::core::state::{ClearMask, NativeSamplerState, ProgramType, Rectangle, TriangleFace};
use crate::renderer::settings::BackBufferConfig;

/// Creation parameters of a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub dimension: wgpu::TextureViewDimension,
    pub mip_level_count: u32,
    pub render_target: bool,
}

pub trait Backend {
    type Program;
    type Texture;
    type VertexBuffer;
    type IndexBuffer;

    // --- Factories ---

    fn create_program(&mut self) -> Result<Self::Program> {
        Err(StageError::UnsupportedOperation("create_program"))
    }

    fn create_texture(&mut self, _desc: &TextureDescriptor) -> Result<Self::Texture> {
        Err(StageError::UnsupportedOperation("create_texture"))
    }

    fn create_cube_texture(&mut self, _desc: &TextureDescriptor) -> Result<Self::Texture> {
        Err(StageError::UnsupportedOperation("create_cube_texture"))
    }

    fn create_vertex_buffer(&mut self, _num_vertices: u32, _data_per_vertex: u32) -> Result<Self::VertexBuffer> {
        Err(StageError::UnsupportedOperation("create_vertex_buffer"))
    }

    fn create_index_buffer(&mut self, _num_indices: u32) -> Result<Self::IndexBuffer> {
        Err(StageError::UnsupportedOperation("create_index_buffer"))
    }

    // --- Uploads ---

    fn upload_program(&mut self, program: &mut Self::Program, vertex_code: &str, fragment_code: &str) -> Result<()>;

    /// Uploads one mip level; `face` is 0 for 2D textures.
    fn upload_texture(&mut self, texture: &mut Self::Texture, face: u32, level: u32, data: &[u8]) -> Result<()>;

    fn upload_vertex_buffer(&mut self, buffer: &mut Self::VertexBuffer, data: &[f32], num_vertices: u32) -> Result<()>;

    fn upload_index_buffer(&mut self, buffer: &mut Self::IndexBuffer, data: &[u16]) -> Result<()>;

    // --- Disposal ---

    fn dispose_program(&mut self, program: Self::Program);
    fn dispose_texture(&mut self, texture: Self::Texture);
    fn dispose_vertex_buffer(&mut self, buffer: Self::VertexBuffer);
    fn dispose_index_buffer(&mut self, buffer: Self::IndexBuffer);

    // --- Pipeline state ---

    fn set_program(&mut self, program: &Self::Program) -> Result<()>;

    /// Uploads `data` (four floats per register) starting at `first_register`.
    fn set_program_constants(&mut self, program_type: ProgramType, first_register: u32, data: &[f32]) -> Result<()>;

    fn set_texture_at(&mut self, index: u32, texture: Option<&Self::Texture>) -> Result<()>;

    fn set_sampler_state_at(&mut self, index: u32, state: NativeSamplerState) -> Result<()>;

    /// Binds a stream at `index` with the given per-vertex float offset, or
    /// unbinds it.
    fn set_vertex_buffer_at(
        &mut self,
        index: u32,
        buffer: Option<(&Self::VertexBuffer, u32, wgpu::VertexFormat)>,
    ) -> Result<()>;

    fn set_blend_factors(&mut self, source: wgpu::BlendFactor, destination: wgpu::BlendFactor) -> Result<()>;

    fn set_depth_test(&mut self, depth_mask: bool, compare: wgpu::CompareFunction) -> Result<()>;

    /// `face` is already resolved for the camera's handedness.
    fn set_culling(&mut self, face: TriangleFace) -> Result<()>;

    fn set_scissor(&mut self, rectangle: Option<Rectangle>) -> Result<()>;

    // --- Targets & frames ---

    fn set_render_to_texture(
        &mut self,
        target: &Self::Texture,
        enable_depth_and_stencil: bool,
        anti_alias: u32,
        surface_selector: u32,
    ) -> Result<()>;

    fn set_render_to_back_buffer(&mut self) -> Result<()>;

    fn configure_back_buffer(&mut self, config: &BackBufferConfig) -> Result<()>;

    fn clear(&mut self, color: wgpu::Color, depth: f32, stencil: u32, mask: ClearMask) -> Result<()>;

    fn draw_triangles(&mut self, indices: &Self::IndexBuffer, first_index: u32, num_triangles: u32) -> Result<()>;

    fn present(&mut self) -> Result<()>;
}
