//! Headless backend.
//!
//! Records every call as a [`BackendCommand`] instead of talking to a GPU.
//! Handles are plain ids issued from one counter. Used by the test suite and
//! benchmarks, and as a reference for backend implementors.

use crate::errors::{Result, StageError};
use crate::renderer::core::backend::{Backend, TextureDescriptor};
use crate::renderer::core::state::{ClearMask, NativeSamplerState, ProgramType, Rectangle, TriangleFace};
use crate::renderer::settings::BackBufferConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessProgram {
    pub id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessTexture {
    pub id: u32,
    pub desc: TextureDescriptor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessVertexBuffer {
    pub id: u32,
    pub num_vertices: u32,
    pub data_per_vertex: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessIndexBuffer {
    pub id: u32,
    pub num_indices: u32,
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    CreateProgram(u32),
    CreateTexture { texture: u32, desc: TextureDescriptor },
    CreateVertexBuffer { buffer: u32, num_vertices: u32, data_per_vertex: u32 },
    CreateIndexBuffer { buffer: u32, num_indices: u32 },

    UploadProgram { program: u32, vertex_code: String, fragment_code: String },
    UploadTexture { texture: u32, face: u32, level: u32, bytes: usize },
    UploadVertexBuffer { buffer: u32, num_vertices: u32 },
    UploadIndexBuffer { buffer: u32, num_indices: u32 },

    DisposeProgram(u32),
    DisposeTexture(u32),
    DisposeVertexBuffer(u32),
    DisposeIndexBuffer(u32),

    SetProgram(u32),
    SetProgramConstants { program_type: ProgramType, first_register: u32, num_registers: u32 },
    SetTextureAt { index: u32, texture: Option<u32> },
    SetSamplerStateAt { index: u32, state: NativeSamplerState },
    SetVertexBufferAt { index: u32, buffer: Option<(u32, u32, wgpu::VertexFormat)> },
    SetBlendFactors { source: wgpu::BlendFactor, destination: wgpu::BlendFactor },
    SetDepthTest { depth_mask: bool, compare: wgpu::CompareFunction },
    SetCulling(TriangleFace),
    SetScissor(Option<Rectangle>),

    SetRenderToTexture { texture: u32, enable_depth_and_stencil: bool, anti_alias: u32, surface_selector: u32 },
    SetRenderToBackBuffer,
    ConfigureBackBuffer(BackBufferConfig),
    Clear { color: wgpu::Color, mask: ClearMask },
    DrawTriangles { indices: u32, first_index: u32, num_triangles: u32 },
    Present,
}

#[derive(Debug)]
pub struct HeadlessBackend {
    commands: Vec<BackendCommand>,
    next_id: u32,
    cube_textures: bool,
    programs_created: u32,
    programs_disposed: u32,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            next_id: 1,
            cube_textures: true,
            programs_created: 0,
            programs_disposed: 0,
        }
    }

    /// A backend whose device has no cube texture support.
    #[must_use]
    pub fn without_cube_textures() -> Self {
        Self {
            cube_textures: false,
            ..Self::new()
        }
    }

    #[inline]
    #[must_use]
    pub fn commands(&self) -> &[BackendCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<BackendCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Number of recorded commands matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&BackendCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| predicate(c)).count()
    }

    #[inline]
    #[must_use]
    pub fn programs_created(&self) -> u32 {
        self.programs_created
    }

    #[inline]
    #[must_use]
    pub fn programs_disposed(&self) -> u32 {
        self.programs_disposed
    }

    #[inline]
    #[must_use]
    pub fn live_programs(&self) -> u32 {
        self.programs_created - self.programs_disposed
    }

    fn issue_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, command: BackendCommand) -> Result<()> {
        self.commands.push(command);
        Ok(())
    }
}

impl Backend for HeadlessBackend {
    type Program = HeadlessProgram;
    type Texture = HeadlessTexture;
    type VertexBuffer = HeadlessVertexBuffer;
    type IndexBuffer = HeadlessIndexBuffer;

    fn create_program(&mut self) -> Result<Self::Program> {
        let id = self.issue_id();
        self.programs_created += 1;
        self.record(BackendCommand::CreateProgram(id))?;
        Ok(HeadlessProgram { id })
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> Result<Self::Texture> {
        let id = self.issue_id();
        self.record(BackendCommand::CreateTexture { texture: id, desc: *desc })?;
        Ok(HeadlessTexture { id, desc: *desc })
    }

    fn create_cube_texture(&mut self, desc: &TextureDescriptor) -> Result<Self::Texture> {
        if !self.cube_textures {
            return Err(StageError::UnsupportedOperation("create_cube_texture"));
        }
        self.create_texture(desc)
    }

    fn create_vertex_buffer(&mut self, num_vertices: u32, data_per_vertex: u32) -> Result<Self::VertexBuffer> {
        let id = self.issue_id();
        self.record(BackendCommand::CreateVertexBuffer {
            buffer: id,
            num_vertices,
            data_per_vertex,
        })?;
        Ok(HeadlessVertexBuffer {
            id,
            num_vertices,
            data_per_vertex,
        })
    }

    fn create_index_buffer(&mut self, num_indices: u32) -> Result<Self::IndexBuffer> {
        let id = self.issue_id();
        self.record(BackendCommand::CreateIndexBuffer { buffer: id, num_indices })?;
        Ok(HeadlessIndexBuffer { id, num_indices })
    }

    fn upload_program(&mut self, program: &mut Self::Program, vertex_code: &str, fragment_code: &str) -> Result<()> {
        self.record(BackendCommand::UploadProgram {
            program: program.id,
            vertex_code: vertex_code.to_owned(),
            fragment_code: fragment_code.to_owned(),
        })
    }

    fn upload_texture(&mut self, texture: &mut Self::Texture, face: u32, level: u32, data: &[u8]) -> Result<()> {
        if level >= texture.desc.mip_level_count {
            return Err(StageError::Backend(format!(
                "mip level {level} out of range for texture {}",
                texture.id
            )));
        }
        self.record(BackendCommand::UploadTexture {
            texture: texture.id,
            face,
            level,
            bytes: data.len(),
        })
    }

    fn upload_vertex_buffer(&mut self, buffer: &mut Self::VertexBuffer, data: &[f32], num_vertices: u32) -> Result<()> {
        let expected = (buffer.num_vertices * buffer.data_per_vertex) as usize;
        if data.len() < expected || num_vertices > buffer.num_vertices {
            return Err(StageError::Backend(format!(
                "vertex buffer {} expects {expected} floats, got {}",
                buffer.id,
                data.len()
            )));
        }
        self.record(BackendCommand::UploadVertexBuffer {
            buffer: buffer.id,
            num_vertices,
        })
    }

    fn upload_index_buffer(&mut self, buffer: &mut Self::IndexBuffer, data: &[u16]) -> Result<()> {
        self.record(BackendCommand::UploadIndexBuffer {
            buffer: buffer.id,
            num_indices: data.len() as u32,
        })
    }

    fn dispose_program(&mut self, program: Self::Program) {
        self.programs_disposed += 1;
        self.commands.push(BackendCommand::DisposeProgram(program.id));
    }

    fn dispose_texture(&mut self, texture: Self::Texture) {
        self.commands.push(BackendCommand::DisposeTexture(texture.id));
    }

    fn dispose_vertex_buffer(&mut self, buffer: Self::VertexBuffer) {
        self.commands.push(BackendCommand::DisposeVertexBuffer(buffer.id));
    }

    fn dispose_index_buffer(&mut self, buffer: Self::IndexBuffer) {
        self.commands.push(BackendCommand::DisposeIndexBuffer(buffer.id));
    }

    fn set_program(&mut self, program: &Self::Program) -> Result<()> {
        self.record(BackendCommand::SetProgram(program.id))
    }

    fn set_program_constants(&mut self, program_type: ProgramType, first_register: u32, data: &[f32]) -> Result<()> {
        self.record(BackendCommand::SetProgramConstants {
            program_type,
            first_register,
            num_registers: (data.len() / 4) as u32,
        })
    }

    fn set_texture_at(&mut self, index: u32, texture: Option<&Self::Texture>) -> Result<()> {
        self.record(BackendCommand::SetTextureAt {
            index,
            texture: texture.map(|t| t.id),
        })
    }

    fn set_sampler_state_at(&mut self, index: u32, state: NativeSamplerState) -> Result<()> {
        self.record(BackendCommand::SetSamplerStateAt { index, state })
    }

    fn set_vertex_buffer_at(
        &mut self,
        index: u32,
        buffer: Option<(&Self::VertexBuffer, u32, wgpu::VertexFormat)>,
    ) -> Result<()> {
        self.record(BackendCommand::SetVertexBufferAt {
            index,
            buffer: buffer.map(|(b, offset, format)| (b.id, offset, format)),
        })
    }

    fn set_blend_factors(&mut self, source: wgpu::BlendFactor, destination: wgpu::BlendFactor) -> Result<()> {
        self.record(BackendCommand::SetBlendFactors { source, destination })
    }

    fn set_depth_test(&mut self, depth_mask: bool, compare: wgpu::CompareFunction) -> Result<()> {
        self.record(BackendCommand::SetDepthTest { depth_mask, compare })
    }

    fn set_culling(&mut self, face: TriangleFace) -> Result<()> {
        self.record(BackendCommand::SetCulling(face))
    }

    fn set_scissor(&mut self, rectangle: Option<Rectangle>) -> Result<()> {
        self.record(BackendCommand::SetScissor(rectangle))
    }

    fn set_render_to_texture(
        &mut self,
        target: &Self::Texture,
        enable_depth_and_stencil: bool,
        anti_alias: u32,
        surface_selector: u32,
    ) -> Result<()> {
        self.record(BackendCommand::SetRenderToTexture {
            texture: target.id,
            enable_depth_and_stencil,
            anti_alias,
            surface_selector,
        })
    }

    fn set_render_to_back_buffer(&mut self) -> Result<()> {
        self.record(BackendCommand::SetRenderToBackBuffer)
    }

    fn configure_back_buffer(&mut self, config: &BackBufferConfig) -> Result<()> {
        self.record(BackendCommand::ConfigureBackBuffer(*config))
    }

    fn clear(&mut self, color: wgpu::Color, _depth: f32, _stencil: u32, mask: ClearMask) -> Result<()> {
        self.record(BackendCommand::Clear { color, mask })
    }

    fn draw_triangles(&mut self, indices: &Self::IndexBuffer, first_index: u32, num_triangles: u32) -> Result<()> {
        self.record(BackendCommand::DrawTriangles {
            indices: indices.id,
            first_index,
            num_triangles,
        })
    }

    fn present(&mut self) -> Result<()> {
        self.record(BackendCommand::Present)
    }
}
