//! Rendering Context
//!
//! [`RenderContext`] is the façade one render target stack works through. It
//! owns everything that is specific to one GPU context:
//!
//! - the [`Backend`] it drives
//! - compiled shader objects per `(pass owner, profile)`
//! - the [`ProgramCache`] and the render order ids built from it
//! - the texture / vertex / index [`ResourcePools`]
//! - the bound state it must restore or suppress (render target, streams,
//!   textures, scissor)
//!
//! Logical resources come from an [`AssetServer`] passed into each call and
//! are never mutated here.
//!
//! # Staleness
//!
//! Nothing holds pointers back into the context. A shader object remembers
//! the pass, owner and material versions it was compiled from, and the
//! signatures of the textures it samples, and is recompiled on the next
//! access after any of them moved. Its cache key is
//! kept until the object is recompiled or its animation code changes; while
//! the key hash still matches the bound program no cache probe happens.
//!
//! # Frame Protocol
//!
//! ```text
//! clear → (activate → set_render_state* → deactivate)* → present
//! ```

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::assets::{AssetServer, IndexDataHandle, MaterialHandle, TextureHandle, VertexDataHandle};
use crate::errors::{Result, StageError};
use crate::renderer::core::backend::Backend;
use crate::renderer::core::resources::ResourcePools;
use crate::renderer::core::state::{
    BlendFactor, ClearMask, CompareMode, MAX_SAMPLERS, NativeSamplerState, ProgramType, Rectangle, TriangleFace,
    VertexBufferFormat,
};
use crate::renderer::passes::{PassOwner, PassVersion};
use crate::renderer::pipeline::compiler;
use crate::renderer::pipeline::program_cache::ProgramCache;
use crate::renderer::pipeline::program_id::ProgramId;
use crate::renderer::pipeline::registers::Profile;
use crate::renderer::pipeline::render_order::{RenderOrderCache, RenderOrderStamp, combine_ids};
use crate::renderer::pipeline::sampling::{SamplerSettings, TextureSignature};
use crate::renderer::pipeline::shader_object::ShaderObject;
use crate::renderer::settings::{BackBufferConfig, StageSettings};
use crate::resources::material::Material;
use crate::scene::{CoordinateSystem, VertexStream};

/// Versions a shader object was compiled from, plus the signatures of the
/// textures it samples as they were at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ShaderStamp {
    pass: PassVersion,
    owner: u64,
    material: u64,
    textures: SmallVec<[(TextureHandle, TextureSignature); 2]>,
}

#[derive(Debug)]
struct ShaderEntry {
    shader: ShaderObject,
    stamp: ShaderStamp,
    /// Cache key; empty until computed.
    key: String,
    /// Program this entry holds a usage of.
    program: Option<ProgramId>,
}

/// Render target selection; switching to an equal state is suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RenderTargetState {
    target: Option<TextureHandle>,
    enable_depth_and_stencil: bool,
    surface_selector: u32,
}

pub struct RenderContext<B: Backend> {
    backend: B,
    settings: StageSettings,

    shaders: FxHashMap<(PassOwner, Profile), ShaderEntry>,
    programs: ProgramCache<B::Program>,
    render_orders: RenderOrderCache,
    /// Last GPU-compatibility verdict per animated material.
    gpu_animation: FxHashMap<MaterialHandle, bool>,
    pools: ResourcePools<B>,

    // === Bound State ===
    active_shader: Option<PassOwner>,
    /// High-water marks of the previously active shader object.
    num_used_streams: u32,
    num_used_textures: u32,
    drawing: bool,
    render_target: RenderTargetState,
    render_target_stack: Vec<RenderTargetState>,
    scissor: Option<Rectangle>,
}

impl<B: Backend> RenderContext<B> {
    /// Creates a context and configures the back buffer.
    pub fn new(mut backend: B, settings: StageSettings) -> Result<Self> {
        backend.configure_back_buffer(&settings.back_buffer)?;
        log::debug!(
            "Rendering context created ({:?}, {}x{})",
            settings.profile,
            settings.back_buffer.width,
            settings.back_buffer.height
        );

        let render_target = RenderTargetState {
            target: None,
            enable_depth_and_stencil: settings.back_buffer.enable_depth_and_stencil,
            surface_selector: 0,
        };

        Ok(Self {
            backend,
            settings,
            shaders: FxHashMap::default(),
            programs: ProgramCache::new(),
            render_orders: RenderOrderCache::new(),
            gpu_animation: FxHashMap::default(),
            pools: ResourcePools::new(),
            active_shader: None,
            num_used_streams: 0,
            num_used_textures: 0,
            drawing: false,
            render_target,
            render_target_stack: Vec::new(),
            scissor: None,
        })
    }

    #[inline]
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Consumes the context, returning its backend. GPU objects not disposed
    /// before are leaked to the backend.
    #[must_use]
    pub fn into_backend(self) -> B {
        self.backend
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &StageSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn profile(&self) -> Profile {
        self.settings.profile
    }

    #[inline]
    #[must_use]
    pub fn programs(&self) -> &ProgramCache<B::Program> {
        &self.programs
    }

    #[inline]
    #[must_use]
    pub fn pools(&self) -> &ResourcePools<B> {
        &self.pools
    }

    #[inline]
    #[must_use]
    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    #[inline]
    #[must_use]
    pub fn scissor_rectangle(&self) -> Option<Rectangle> {
        self.scissor
    }

    // ========================================================================
    // Shader Objects & Programs
    // ========================================================================

    /// Returns the compiled shader object of `owner`, compiling it first if
    /// it does not exist or any version it was built from moved.
    ///
    /// A failed compile leaves the previous object (if any) untouched.
    pub fn get_shader_object(&mut self, owner: PassOwner, assets: &AssetServer) -> Result<&mut ShaderObject> {
        let pass = assets.pass(owner.pass)?;
        let material = assets.material(owner.material)?;
        let owner_version = pass.state().owner_version(owner.material).ok_or_else(|| {
            StageError::InvalidArgument(format!(
                "pass '{}' is not attached to material '{}'",
                pass.name, material.name
            ))
        })?;
        let textures = pass
            .kind()
            .textures()
            .into_iter()
            .map(|handle| Ok((handle, TextureSignature::of(assets.texture(handle)?))))
            .collect::<Result<SmallVec<_>>>()?;
        let stamp = ShaderStamp {
            pass: pass.version(),
            owner: owner_version,
            material: material.version(),
            textures,
        };

        let profile = self.settings.profile;
        let key = (owner, profile);
        if self.shaders.get(&key).is_none_or(|entry| entry.stamp != stamp) {
            let uses_gpu_animation = self.uses_gpu_animation(owner.material, material);
            let shader =
                compiler::compile_with_textures(pass, material, profile, uses_gpu_animation, &stamp.textures)?;

            match self.shaders.get_mut(&key) {
                Some(entry) => {
                    entry.shader = shader;
                    entry.stamp = stamp;
                    entry.key.clear();
                }
                None => {
                    self.shaders.insert(
                        key,
                        ShaderEntry {
                            shader,
                            stamp,
                            key: String::new(),
                            program: None,
                        },
                    );
                }
            }
        }

        self.shader_object_mut(owner)
    }

    /// The already compiled shader object of `owner`.
    pub fn shader_object_mut(&mut self, owner: PassOwner) -> Result<&mut ShaderObject> {
        self.entry_mut(owner).map(|entry| &mut entry.shader)
    }

    /// Current cache key of `owner`'s shader object; empty until
    /// [`get_program`](Self::get_program) computed it.
    #[must_use]
    pub fn cache_key(&self, owner: PassOwner) -> Option<&str> {
        self.shaders
            .get(&(owner, self.settings.profile))
            .map(|entry| entry.key.as_str())
    }

    /// Resolves the program of `owner`'s shader object.
    ///
    /// The key is computed only when empty. If it still equals the bound
    /// program's key, that program is returned without touching usages.
    /// Otherwise the new program gains a usage and the previous one loses
    /// one, being disposed right away when that was its last.
    pub fn get_program(&mut self, owner: PassOwner) -> Result<ProgramId> {
        let key = (owner, self.settings.profile);
        let entry = self.shaders.get_mut(&key).ok_or(StageError::NoActiveShaderObject)?;

        if entry.key.is_empty() {
            entry.key = entry.shader.cache_key();
        }

        if let Some(id) = entry.program
            && self.programs.get(id).is_some_and(|program| program.key() == entry.key)
        {
            return Ok(id);
        }

        let id = self.programs.acquire(&entry.key);
        if let Some(previous) = entry.program.replace(id) {
            Self::release_program(&mut self.programs, &mut self.backend, previous);
        }
        Ok(id)
    }

    /// Composite id of the programs `material`'s passes compile to.
    ///
    /// Recomputed only when the material, one of its passes or one of the
    /// owner records changed. Recomputing re-derives GPU animation
    /// compatibility and regenerates the animation code of every pass.
    pub fn get_render_order_id(&mut self, handle: MaterialHandle, assets: &AssetServer) -> Result<u64> {
        let material = assets.material(handle)?;
        let profile = self.settings.profile;

        let mut stamp = RenderOrderStamp::new();
        stamp.push(material.version());
        for &pass in material.passes() {
            let pass = assets.pass(pass)?;
            let version = pass.version();
            stamp.push(version.state);
            stamp.push(version.code);
            for texture in pass.kind().textures() {
                stamp.push(TextureSignature::of(assets.texture(texture)?).bits());
            }
            stamp.push(pass.state().owner_version(handle).unwrap_or(0));
        }
        if let Some(id) = self.render_orders.get(handle, profile, &stamp) {
            return Ok(id);
        }

        let owners: SmallVec<[PassOwner; 4]> = material
            .passes()
            .iter()
            .map(|&pass| PassOwner::new(pass, handle))
            .collect();
        for &owner in &owners {
            self.get_shader_object(owner, assets)?;
        }

        let animation_set = material.animation_set().map(|set| &**set);
        if let Some(set) = animation_set {
            set.reset_gpu_compatibility();
            for &owner in &owners {
                let shader = self.shader_object_mut(owner)?;
                for _ in 0..material.animated_owners() {
                    set.test_gpu_compatibility(shader);
                }
            }
            self.gpu_animation.insert(handle, !set.uses_cpu());
        }

        let uses_gpu_animation = self.uses_gpu_animation(handle, material);
        let mut ids: SmallVec<[ProgramId; 4]> = SmallVec::new();
        for &owner in &owners {
            let entry = self.entry_mut(owner)?;
            entry.shader.uses_gpu_animation = uses_gpu_animation;
            if compiler::emit_animation_code(&mut entry.shader, animation_set) {
                entry.key.clear();
            }
            ids.push(self.get_program(owner)?);
        }

        let id = combine_ids(&ids);
        self.render_orders.insert(handle, profile, stamp, id);
        Ok(id)
    }

    /// Binds the program of `owner`, creating and uploading the backend
    /// program on first use, and unbinds streams and textures the previous
    /// shader object used beyond what this one uses.
    pub fn activate_shader_object(&mut self, owner: PassOwner, assets: &AssetServer) -> Result<()> {
        self.get_shader_object(owner, assets)?;
        self.get_program(owner)?;

        let entry = self
            .shaders
            .get(&(owner, self.settings.profile))
            .ok_or(StageError::NoActiveShaderObject)?;
        let shader = &entry.shader;

        for index in shader.num_used_streams..self.num_used_streams {
            self.backend.set_vertex_buffer_at(index, None)?;
        }
        for index in shader.num_used_textures..self.num_used_textures {
            self.backend.set_texture_at(index, None)?;
        }

        let compiled = self
            .programs
            .get_mut(entry.program.ok_or(StageError::NoActiveShaderObject)?)
            .ok_or(StageError::NoActiveShaderObject)?;
        let id = compiled.id();
        let slot = compiled.program_mut();
        if slot.is_none() {
            let mut program = self.backend.create_program()?;
            self.backend
                .upload_program(&mut program, &shader.full_vertex_code(), &shader.full_fragment_code())?;
            log::debug!("Uploaded program {}", id.index());
            *slot = Some(program);
        }
        if let Some(program) = slot.as_ref() {
            self.backend.set_program(program)?;
        }

        self.active_shader = Some(owner);
        Ok(())
    }

    /// Records the stream and texture usage of `owner` as the high-water
    /// marks the next activation clears down from.
    pub fn deactivate_shader_object(&mut self, owner: PassOwner) -> Result<()> {
        let entry = self.entry_mut(owner)?;
        let (streams, textures) = (entry.shader.num_used_streams, entry.shader.num_used_textures);
        self.num_used_streams = streams;
        self.num_used_textures = textures;
        self.active_shader = None;
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn active_shader_object(&self) -> Option<PassOwner> {
        self.active_shader
    }

    /// Uploads both constant arrays of `owner`'s shader object.
    pub fn upload_shader_constants(&mut self, owner: PassOwner) -> Result<()> {
        let entry = self
            .shaders
            .get(&(owner, self.settings.profile))
            .ok_or(StageError::NoActiveShaderObject)?;
        let shader = &entry.shader;
        if !shader.vertex_constant_data.is_empty() {
            self.backend
                .set_program_constants(ProgramType::Vertex, 0, &shader.vertex_constant_data)?;
        }
        if !shader.fragment_constant_data.is_empty() {
            self.backend
                .set_program_constants(ProgramType::Fragment, 0, &shader.fragment_constant_data)?;
        }
        Ok(())
    }

    /// Releases `owner`'s compiled state under every profile.
    pub fn dispose_shader_object(&mut self, owner: PassOwner) {
        let keys: SmallVec<[(PassOwner, Profile); 2]> =
            self.shaders.keys().filter(|(o, _)| *o == owner).copied().collect();
        for key in keys {
            if let Some(entry) = self.shaders.remove(&key)
                && let Some(id) = entry.program
            {
                Self::release_program(&mut self.programs, &mut self.backend, id);
            }
        }
        if self.active_shader == Some(owner) {
            self.active_shader = None;
        }
        self.render_orders.remove_material(owner.material);
    }

    fn entry_mut(&mut self, owner: PassOwner) -> Result<&mut ShaderEntry> {
        self.shaders
            .get_mut(&(owner, self.settings.profile))
            .ok_or(StageError::NoActiveShaderObject)
    }

    fn uses_gpu_animation(&self, handle: MaterialHandle, material: &Material) -> bool {
        material.animation_set().is_some() && self.gpu_animation.get(&handle).copied().unwrap_or(true)
    }

    fn release_program(programs: &mut ProgramCache<B::Program>, backend: &mut B, id: ProgramId) {
        if let Some(disposed) = programs.release(id)
            && let Some(program) = disposed.program
        {
            backend.dispose_program(program);
            log::debug!("Disposed program {}", disposed.id.index());
        }
    }

    // ========================================================================
    // Fixed-Function State
    // ========================================================================

    pub fn set_depth_test(&mut self, depth_mask: bool, compare: CompareMode) -> Result<()> {
        self.backend.set_depth_test(depth_mask, compare.native())
    }

    pub fn set_blend_factors(&mut self, source: BlendFactor, destination: BlendFactor) -> Result<()> {
        self.backend.set_blend_factors(source.native(), destination.native())
    }

    /// Culls `face` as seen by a camera using `coordinate_system`.
    pub fn set_culling(&mut self, face: TriangleFace, coordinate_system: CoordinateSystem) -> Result<()> {
        self.backend.set_culling(face.resolve(coordinate_system))
    }

    pub fn set_scissor_rectangle(&mut self, rectangle: Option<Rectangle>) -> Result<()> {
        self.scissor = rectangle;
        self.backend.set_scissor(rectangle)
    }

    pub fn set_sampler_state_at(&mut self, index: u32, settings: SamplerSettings) -> Result<()> {
        check_sampler_index(index)?;
        self.backend.set_sampler_state_at(
            index,
            NativeSamplerState {
                address_mode: settings.wrap.native(),
                filter: settings.filter.native(),
                mipmap_filter: settings.mip_filter.native(),
            },
        )
    }

    // ========================================================================
    // Resources
    // ========================================================================

    /// Binds `texture` at sampler `index`, uploading it first if needed.
    pub fn activate_texture(&mut self, index: u32, texture: TextureHandle, assets: &AssetServer) -> Result<()> {
        check_sampler_index(index)?;
        let logical = assets.texture(texture)?;
        let gpu = self.pools.prepare_texture(&mut self.backend, texture, logical)?;
        self.backend.set_texture_at(index, Some(gpu))
    }

    /// Binds a vertex stream at attribute `index`, uploading it first if needed.
    pub fn activate_buffer(
        &mut self,
        index: u32,
        stream: VertexStream,
        format: VertexBufferFormat,
        assets: &AssetServer,
    ) -> Result<()> {
        let logical = assets.vertex_data(stream.data)?;
        let gpu = self.pools.prepare_vertex_buffer(&mut self.backend, stream.data, logical)?;
        self.backend
            .set_vertex_buffer_at(index, Some((gpu, stream.offset, format.native())))
    }

    /// Resolves the GPU index buffer of `indices` without drawing.
    pub fn get_index_buffer(&mut self, indices: IndexDataHandle, assets: &AssetServer) -> Result<&B::IndexBuffer> {
        let logical = assets.index_data(indices)?;
        self.pools.prepare_index_buffer(&mut self.backend, indices, logical)
    }

    pub fn invalidate_texture(&mut self, texture: TextureHandle) {
        self.pools.invalidate_texture(texture);
    }

    pub fn invalidate_vertex_data(&mut self, data: VertexDataHandle) {
        self.pools.invalidate_vertex_buffer(data);
    }

    pub fn invalidate_index_data(&mut self, data: IndexDataHandle) {
        self.pools.invalidate_index_buffer(data);
    }

    pub fn dispose_texture(&mut self, texture: TextureHandle) {
        self.pools.dispose_texture(&mut self.backend, texture);
    }

    pub fn dispose_vertex_data(&mut self, data: VertexDataHandle) {
        self.pools.dispose_vertex_buffer(&mut self.backend, data);
    }

    pub fn dispose_index_data(&mut self, data: IndexDataHandle) {
        self.pools.dispose_index_buffer(&mut self.backend, data);
    }

    // ========================================================================
    // Targets & Frames
    // ========================================================================

    /// Renders to `target`, or to the back buffer with `None`.
    ///
    /// Does nothing when target, depth/stencil flag and surface selector all
    /// equal the current selection.
    pub fn set_render_target(
        &mut self,
        target: Option<TextureHandle>,
        enable_depth_and_stencil: bool,
        surface_selector: u32,
        assets: &AssetServer,
    ) -> Result<()> {
        let next = RenderTargetState {
            target,
            enable_depth_and_stencil,
            surface_selector,
        };
        if next == self.render_target {
            return Ok(());
        }

        match target {
            Some(handle) => {
                let logical = assets.texture(handle)?;
                if !logical.is_render_target() {
                    return Err(StageError::InvalidArgument(format!(
                        "texture {handle:?} is not a render target"
                    )));
                }
                let gpu = self.pools.prepare_texture(&mut self.backend, handle, logical)?;
                self.backend.set_render_to_texture(
                    gpu,
                    enable_depth_and_stencil,
                    self.settings.back_buffer.anti_alias,
                    surface_selector,
                )?;
            }
            None => self.backend.set_render_to_back_buffer()?,
        }
        self.render_target = next;
        Ok(())
    }

    /// Switches to `target`, remembering the current selection for
    /// [`pop_render_target`](Self::pop_render_target).
    pub fn push_render_target(&mut self, target: TextureHandle, assets: &AssetServer) -> Result<()> {
        let previous = self.render_target;
        self.set_render_target(Some(target), true, 0, assets)?;
        self.render_target_stack.push(previous);
        Ok(())
    }

    pub fn pop_render_target(&mut self) -> Result<()> {
        let previous = self
            .render_target_stack
            .pop()
            .ok_or_else(|| StageError::InvalidArgument("render target stack is empty".to_owned()))?;
        if previous == self.render_target {
            return Ok(());
        }

        match previous.target {
            Some(handle) => {
                let entry = self
                    .pools
                    .texture_entry(handle)
                    .ok_or_else(|| StageError::AssetNotFound(format!("texture {handle:?}")))?;
                self.backend.set_render_to_texture(
                    &entry.handle,
                    previous.enable_depth_and_stencil,
                    self.settings.back_buffer.anti_alias,
                    previous.surface_selector,
                )?;
            }
            None => self.backend.set_render_to_back_buffer()?,
        }
        self.render_target = previous;
        Ok(())
    }

    pub fn configure_back_buffer(&mut self, config: BackBufferConfig) -> Result<()> {
        self.backend.configure_back_buffer(&config)?;
        self.settings.back_buffer = config;
        Ok(())
    }

    /// Clears the current target with the configured clear colour and starts
    /// a frame.
    pub fn clear(&mut self, mask: ClearMask) -> Result<()> {
        self.clear_to(self.settings.clear_color, 1.0, 0, mask)
    }

    pub fn clear_to(&mut self, color: wgpu::Color, depth: f32, stencil: u32, mask: ClearMask) -> Result<()> {
        self.backend.clear(color, depth, stencil, mask)?;
        self.drawing = true;
        Ok(())
    }

    /// Draws `num_triangles` triangles of `indices`, starting at `first_index`.
    pub fn draw_triangles(
        &mut self,
        indices: IndexDataHandle,
        first_index: u32,
        num_triangles: u32,
        assets: &AssetServer,
    ) -> Result<()> {
        if !self.drawing {
            return Err(StageError::DrawWithoutClear);
        }
        let logical = assets.index_data(indices)?;
        let gpu = self.pools.prepare_index_buffer(&mut self.backend, indices, logical)?;
        self.backend.draw_triangles(gpu, first_index, num_triangles)
    }

    pub fn present(&mut self) -> Result<()> {
        self.drawing = false;
        self.backend.present()
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Disposes every program and pooled GPU object of this context.
    pub fn dispose(&mut self) {
        let shaders = self.shaders.len();
        self.shaders.clear();
        self.render_orders.clear();
        self.gpu_animation.clear();
        for disposed in self.programs.drain() {
            if let Some(program) = disposed.program {
                self.backend.dispose_program(program);
            }
        }
        self.pools.dispose_all(&mut self.backend);
        self.active_shader = None;
        self.render_target_stack.clear();
        log::debug!("Rendering context disposed ({shaders} shader objects)");
    }
}

fn check_sampler_index(index: u32) -> Result<()> {
    if index >= MAX_SAMPLERS {
        return Err(StageError::SamplerIndexOutOfRange {
            index,
            max: MAX_SAMPLERS,
        });
    }
    Ok(())
}
