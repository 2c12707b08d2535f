//! Shader Compiler
//!
//! Turns one material pass, as owned by one material, into a [`ShaderObject`].
//! The stages always run in this order:
//!
//! 1. Flags and dependency counters from the material and the pass
//! 2. Register reservation for every derived value a stage depends on,
//!    including every animation target, which stays live until all vertex
//!    code is emitted
//! 3. Pre-vertex stage: pass pre-vertex code, world position, projection
//! 4. Dependency code (normals, UVs, view direction) and the pass hooks
//! 5. Animation code ([`emit_animation_code`]), prepended to the vertex program
//! 6. Post-animation fragment code and the final `oc` move
//! 7. Constant arrays sized to what was allocated
//!
//! All stages share one [`CompilationContext`]. Any register exhaustion
//! aborts the compile; the caller only installs the returned object on
//! success.

use rustc_hash::FxHashMap;

use crate::animation::AnimationSet;
use crate::assets::TextureHandle;
use crate::errors::Result;
use crate::renderer::passes::MaterialPass;
use crate::renderer::pipeline::registers::{
    ComponentMask, Profile, RegisterAllocator, RegisterClass, RegisterHandle,
};
use crate::renderer::pipeline::sampling::{SampledTexture, TextureSignature, tex2d_sample_code};
use crate::renderer::pipeline::shader_object::{COMMONS_DATA, ShaderObject};
use crate::resources::material::Material;

/// Identity rows of the 2×4 UV transform.
const UV_IDENTITY: [f32; 8] = [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Mutable state threaded through every emission stage of one compile.
#[derive(Debug)]
pub struct CompilationContext {
    pub registers: RegisterAllocator,
    pub shader: ShaderObject,
    /// Current signatures of the textures the pass samples.
    textures: FxHashMap<TextureHandle, TextureSignature>,
}

impl CompilationContext {
    #[must_use]
    pub fn new(profile: Profile) -> Self {
        Self {
            registers: RegisterAllocator::new(profile),
            shader: ShaderObject::new(profile),
            textures: FxHashMap::default(),
        }
    }

    /// Emits a 2D sample of `texture` at `uv` into `target` on a fresh
    /// sampler and records the binding on the shader.
    ///
    /// `snapshot` is the signature the pass recorded on assignment; a
    /// signature resolved for this compile takes precedence.
    pub fn sample_texture(
        &mut self,
        target: RegisterHandle,
        texture: TextureHandle,
        snapshot: &TextureSignature,
        uv: RegisterHandle,
    ) -> Result<String> {
        let signature = self.textures.get(&texture).copied().unwrap_or(*snapshot);
        let sampler = self.registers.allocate(RegisterClass::TextureSampler)?;
        self.shader.sampled_textures.push(SampledTexture {
            slot: sampler.index(),
            texture,
            signature,
        });
        Ok(tex2d_sample_code(target, &self.shader, sampler, &signature, uv))
    }
}

/// Compiles `pass` for `material`.
///
/// `uses_gpu_animation` is the last GPU-compatibility verdict for the
/// material's animation set; it only matters when the material has one.
pub fn compile(
    pass: &MaterialPass,
    material: &Material,
    profile: Profile,
    uses_gpu_animation: bool,
) -> Result<ShaderObject> {
    compile_with_textures(pass, material, profile, uses_gpu_animation, &[])
}

/// [`compile`] with the current signatures of the textures the pass samples,
/// overriding the ones the pass snapshotted.
pub fn compile_with_textures(
    pass: &MaterialPass,
    material: &Material,
    profile: Profile,
    uses_gpu_animation: bool,
    textures: &[(TextureHandle, TextureSignature)],
) -> Result<ShaderObject> {
    let mut cx = CompilationContext::new(profile);
    cx.textures.extend(textures.iter().copied());

    init_flags(&mut cx.shader, pass, material, uses_gpu_animation);
    init_dependencies(&mut cx.shader, pass);

    let mut vertex = String::new();
    let mut fragment = String::new();

    let temps = reserve_shared(&mut cx)?;

    vertex.push_str(&pass.pre_vertex_code(&mut cx)?);
    vertex.push_str(&world_position_code(&mut cx, pass)?);
    vertex.push_str(&projection_code(&mut cx)?);

    normal_code(&mut cx, &mut vertex)?;
    uv_code(&mut cx, &mut vertex)?;
    normal_fragment_code(&mut cx, pass, &mut fragment)?;
    view_dir_code(&mut cx, &mut vertex, &mut fragment)?;

    vertex.push_str(&pass.vertex_code(&mut cx)?);
    let shaded = temps.shaded;
    fragment.push_str(&pass.fragment_code(&mut cx, shaded)?);

    for temp in temps.vertex {
        cx.registers.release(temp);
    }

    cx.shader.vertex_code = vertex;
    cx.shader.fragment_code = fragment;

    emit_animation_code(&mut cx.shader, material.animation_set().map(|set| &**set));

    let post = post_animation_code(&mut cx, pass, shaded)?;
    cx.shader.post_animation_fragment_code = post;
    cx.registers.release(shaded);

    finalize_constants(&mut cx);
    pass.init_constant_data(&mut cx.shader);

    log::debug!(
        "Compiled pass '{}' ({:?}): {} vc, {} fc, {} streams, {} textures",
        pass.name,
        profile,
        cx.shader.num_used_vertex_constants,
        cx.shader.num_used_fragment_constants,
        cx.shader.num_used_streams,
        cx.shader.num_used_textures
    );

    Ok(cx.shader)
}

/// Regenerates the animation code of `shader`.
///
/// GPU animation delegates to the animation set; otherwise every animated
/// attribute is copied to its target unchanged. Returns `true` if the code
/// differs from what the shader held before.
pub fn emit_animation_code(shader: &mut ShaderObject, animation_set: Option<&dyn AnimationSet>) -> bool {
    let (vertex, fragment) = match animation_set {
        Some(set) if shader.uses_gpu_animation => {
            let mut vertex = set.vertex_code(shader);
            if let (Some(source), Some(target)) = (shader.uv_source, shader.uv_target) {
                vertex.push_str(&set.uv_code(shader, source, target));
            }
            let fragment = shader
                .registers
                .shaded_target
                .map(|target| set.fragment_code(shader, target))
                .unwrap_or_default();
            (vertex, fragment)
        }
        _ => {
            let mut vertex = String::new();
            for (attribute, target) in shader
                .animatable_attributes
                .iter()
                .zip(&shader.animation_target_registers)
            {
                vertex.push_str(&format!("mov {target}, {attribute}\n"));
            }
            if let (Some(source), Some(target)) = (shader.uv_source, shader.uv_target) {
                vertex.push_str(&format!("mov {target}, {source}\n"));
            }
            (vertex, String::new())
        }
    };

    let changed = vertex != shader.animation_vertex_code || fragment != shader.animation_fragment_code;
    shader.animation_vertex_code = vertex;
    shader.animation_fragment_code = fragment;

    if let Some(set) = animation_set
        && shader.uses_gpu_animation
    {
        set.code_generated(shader);
    }
    changed
}

// ============================================================================
// Stage 1: flags & dependencies
// ============================================================================

fn init_flags(shader: &mut ShaderObject, pass: &MaterialPass, material: &Material, uses_gpu_animation: bool) {
    shader.alpha_threshold = material.alpha_threshold();
    shader.uses_premultiplied_alpha = material.alpha_premultiplied();
    shader.use_mipmapping = material.mipmap();
    shader.use_smoothing = material.smooth();
    shader.repeat_textures = material.repeat();
    shader.uses_animated_uvs = material.animate_uvs();
    shader.uses_gpu_animation = uses_gpu_animation && material.animation_set().is_some();
    shader.preserve_alpha = pass.state().preserve_alpha();
}

fn init_dependencies(shader: &mut ShaderObject, pass: &MaterialPass) {
    pass.include_dependencies(shader);

    let deps = &mut shader.dependencies;
    if deps.view_dir > 0 {
        deps.global_pos += 1;
    }
    if shader.uses_tangent_space && deps.normal > 0 {
        deps.tangent += 1;
    }
    if shader.uses_global_pos_fragment && deps.global_pos == 0 {
        deps.global_pos = 1;
    }
}

// ============================================================================
// Stage 2: shared registers
// ============================================================================

struct ReservedTemps {
    shaded: RegisterHandle,
    /// Vertex temporaries released once all vertex code is emitted.
    vertex: Vec<RegisterHandle>,
}

/// Allocates one animatable attribute and its retained vertex target.
fn reserve_animatable(
    regs: &mut RegisterAllocator,
    shader: &mut ShaderObject,
    vertex: &mut Vec<RegisterHandle>,
) -> Result<(RegisterHandle, RegisterHandle)> {
    let input = regs.allocate(RegisterClass::VertexAttribute)?;
    let target = regs.allocate(RegisterClass::VertexTemp)?;
    regs.retain(target, 1);
    shader.animatable_attributes.push(input);
    shader.animation_target_registers.push(target);
    vertex.push(target);
    Ok((input, target))
}

/// Reserves the shared registers. Stream order is position, normal,
/// tangent, UV, secondary UV; every animation target is retained here so no
/// later temporary can alias one.
fn reserve_shared(cx: &mut CompilationContext) -> Result<ReservedTemps> {
    let regs = &mut cx.registers;
    let shader = &mut cx.shader;
    let mut vertex = Vec::new();

    let projection = regs.allocate_block(RegisterClass::VertexConstant, 4)?;
    shader.view_matrix_index = projection.constant_offset();

    let (_, local) = reserve_animatable(regs, shader, &mut vertex)?;
    shader.registers.local_position = Some(local);

    if shader.dependencies.normal > 0 {
        let (input, target) = reserve_animatable(regs, shader, &mut vertex)?;
        shader.normal_buffer_index = Some(input.index());
        shader.registers.normal_input = Some(input);
        shader.registers.normal_target = Some(target);
    }
    if shader.dependencies.tangent > 0 {
        let (input, target) = reserve_animatable(regs, shader, &mut vertex)?;
        shader.tangent_buffer_index = Some(input.index());
        shader.registers.tangent_input = Some(input);
        shader.registers.tangent_target = Some(target);
    }
    if shader.dependencies.uv > 0 {
        let input = regs.allocate(RegisterClass::VertexAttribute)?;
        shader.uv_buffer_index = Some(input.index());
        shader.registers.uv_input = Some(input);
        shader.uv_source = Some(input);
        if shader.uses_animated_uvs {
            let temp = regs.allocate(RegisterClass::VertexTemp)?;
            regs.retain(temp, 1);
            shader.uv_target = Some(temp);
            vertex.push(temp);
        }
    }
    if shader.dependencies.secondary_uv > 0 {
        let input = regs.allocate(RegisterClass::VertexAttribute)?;
        shader.secondary_uv_buffer_index = Some(input.index());
        shader.registers.secondary_uv_input = Some(input);
    }

    let commons = regs.allocate(RegisterClass::FragmentConstant)?;
    shader.registers.commons = Some(commons);
    shader.commons_index = Some(commons.constant_offset());

    let shaded = regs.allocate(RegisterClass::FragmentTemp)?;
    regs.retain(shaded, 1);
    shader.registers.shaded_target = Some(shaded);

    Ok(ReservedTemps { shaded, vertex })
}

// ============================================================================
// Stage 3: world position & projection
// ============================================================================

fn world_position_code(cx: &mut CompilationContext, pass: &MaterialPass) -> Result<String> {
    if cx.shader.dependencies.global_pos == 0 && !pass.state().force_separate_mvp() {
        return Ok(String::new());
    }
    let Some(local) = cx.shader.registers.local_position else {
        return Ok(String::new());
    };

    let scene = cx.registers.allocate_block(RegisterClass::VertexConstant, 4)?;
    cx.shader.scene_matrix_index = Some(scene.constant_offset());

    let global = cx.registers.allocate(RegisterClass::VertexTemp)?;
    cx.registers.retain(global, 1);
    cx.shader.registers.global_position_vertex = Some(global);

    let mut code = format!("m44 {global}, {local}, {scene}\n");
    if cx.shader.uses_global_pos_fragment {
        let varying = cx.registers.allocate(RegisterClass::Varying)?;
        cx.shader.registers.global_position_varying = Some(varying);
        code.push_str(&format!("mov {varying}, {global}\n"));
    }
    Ok(code)
}

fn projection_code(cx: &mut CompilationContext) -> Result<String> {
    let registers = &cx.shader.registers;
    let Some(position) = registers.global_position_vertex.or(registers.local_position) else {
        return Ok(String::new());
    };
    let matrix = RegisterHandle::new(RegisterClass::VertexConstant, (cx.shader.view_matrix_index / 4) as u32);

    if cx.shader.dependencies.projection == 0 {
        return Ok(format!("m44 op, {position}, {matrix}\n"));
    }

    let scratch = cx.registers.allocate(RegisterClass::VertexTemp)?;
    cx.registers.retain(scratch, 1);
    let varying = cx.registers.allocate(RegisterClass::Varying)?;
    cx.shader.registers.projection_fragment = Some(varying);
    let code = format!("m44 {scratch}, {position}, {matrix}\nmov op, {scratch}\nmov {varying}, {scratch}\n");
    cx.registers.release(scratch);
    Ok(code)
}

// ============================================================================
// Stage 4: dependency code
// ============================================================================

fn normal_code(cx: &mut CompilationContext, vertex: &mut String) -> Result<()> {
    let Some(target) = cx.shader.registers.normal_target else {
        return Ok(());
    };

    let matrix = cx.registers.allocate_block(RegisterClass::VertexConstant, 3)?;
    cx.shader.scene_normal_matrix_index = Some(matrix.constant_offset());

    match cx.shader.registers.tangent_target {
        Some(tangent) => tangent_space_code(cx, target, tangent, matrix, vertex)?,
        None => {
            let varying = cx.registers.allocate(RegisterClass::Varying)?;
            cx.shader.registers.normal_varying = Some(varying);
            vertex.push_str(&format!(
                "m33 {}, {target}, {matrix}\nmov {}, {}\n",
                varying.xyz(),
                varying.w(),
                target.w()
            ));
        }
    }
    Ok(())
}

/// Emits the world-space tangent frame as three varyings.
fn tangent_space_code(
    cx: &mut CompilationContext,
    normal: RegisterHandle,
    tangent_target: RegisterHandle,
    matrix: RegisterHandle,
    vertex: &mut String,
) -> Result<()> {
    let varyings = cx.registers.allocate_block(RegisterClass::Varying, 3)?;
    let (tangent, bitangent, normal_varying) = (varyings, varyings.offset_by(1), varyings.offset_by(2));
    cx.shader.registers.tangent_varying = Some(tangent);
    cx.shader.registers.bitangent_varying = Some(bitangent);
    cx.shader.registers.normal_varying = Some(normal_varying);

    let n = cx.registers.allocate(RegisterClass::VertexTemp)?;
    cx.registers.retain(n, 1);
    let t = cx.registers.allocate(RegisterClass::VertexTemp)?;
    cx.registers.retain(t, 1);
    let b = cx.registers.allocate(RegisterClass::VertexTemp)?;

    vertex.push_str(&format!(
        "m33 {n3}, {normal}, {matrix}\nnrm {n3}, {n3}\n\
         m33 {t3}, {tangent_target}, {matrix}\nnrm {t3}, {t3}\n\
         crs {b3}, {n3}, {t3}\n\
         mov {tv}, {t3}\nmov {bv}, {b3}\nmov {nv}, {n3}\n",
        n3 = n.xyz(),
        t3 = t.xyz(),
        b3 = b.xyz(),
        tv = tangent.xyz(),
        bv = bitangent.xyz(),
        nv = normal_varying.xyz(),
    ));

    cx.registers.release(t);
    cx.registers.release(n);
    Ok(())
}

/// Fragment normal: the pass's own code, or the renormalised varying.
/// Runs after [`uv_code`] so passes can sample with the UV varying.
fn normal_fragment_code(cx: &mut CompilationContext, pass: &MaterialPass, fragment: &mut String) -> Result<()> {
    if cx.shader.registers.normal_target.is_none() {
        return Ok(());
    }

    let normal = cx.registers.allocate(RegisterClass::FragmentTemp)?;
    cx.registers.retain(normal, 1);
    cx.shader.registers.normal_fragment = Some(normal);

    let custom = pass.normal_fragment_code(cx)?;
    if custom.is_empty() {
        if let Some(varying) = cx.shader.registers.normal_varying {
            fragment.push_str(&format!(
                "nrm {}, {}\nmov {}, {}\n",
                normal.xyz(),
                varying.xyz(),
                normal.w(),
                varying.w()
            ));
        }
    } else {
        fragment.push_str(&custom);
    }
    Ok(())
}

fn uv_code(cx: &mut CompilationContext, vertex: &mut String) -> Result<()> {
    if cx.shader.registers.uv_input.is_some() {
        let varying = cx.registers.allocate(RegisterClass::Varying)?;
        cx.shader.registers.uv_varying = Some(varying);

        match cx.shader.uv_target {
            Some(temp) => {
                let rows = cx.registers.allocate_block(RegisterClass::VertexConstant, 2)?;
                cx.shader.uv_transform_index = Some(rows.constant_offset());
                vertex.push_str(&format!(
                    "dp4 {}, {temp}, {}\ndp4 {}, {temp}, {}\nmov {}, {}\n",
                    varying.x(),
                    rows,
                    varying.y(),
                    rows.offset_by(1),
                    varying.swizzle(ComponentMask::Z | ComponentMask::W),
                    temp.swizzle(ComponentMask::Z | ComponentMask::W),
                ));
            }
            None => cx.shader.uv_target = Some(varying),
        }
    }

    if let Some(input) = cx.shader.registers.secondary_uv_input {
        let varying = cx.registers.allocate(RegisterClass::Varying)?;
        cx.shader.registers.secondary_uv_varying = Some(varying);
        vertex.push_str(&format!("mov {varying}, {input}\n"));
    }
    Ok(())
}

fn view_dir_code(cx: &mut CompilationContext, vertex: &mut String, fragment: &mut String) -> Result<()> {
    if cx.shader.dependencies.view_dir == 0 {
        return Ok(());
    }
    let Some(global) = cx.shader.registers.global_position_vertex else {
        return Ok(());
    };

    let camera = cx.registers.allocate(RegisterClass::VertexConstant)?;
    cx.shader.camera_position_index = Some(camera.constant_offset());
    let varying = cx.registers.allocate(RegisterClass::Varying)?;
    cx.shader.registers.view_dir_varying = Some(varying);
    vertex.push_str(&format!("sub {varying}, {camera}, {global}\n"));

    let view = cx.registers.allocate(RegisterClass::FragmentTemp)?;
    cx.registers.retain(view, 1);
    cx.shader.registers.view_dir_fragment = Some(view);
    fragment.push_str(&format!(
        "nrm {}, {}\nmov {}, {}\n",
        view.xyz(),
        varying.xyz(),
        view.w(),
        varying.w()
    ));
    Ok(())
}

// ============================================================================
// Stages 6-7: output & constants
// ============================================================================

fn post_animation_code(
    cx: &mut CompilationContext,
    pass: &MaterialPass,
    shaded: RegisterHandle,
) -> Result<String> {
    let mut code = String::new();
    let commons = cx.shader.registers.commons;

    if let Some(commons) = commons {
        if cx.shader.uses_premultiplied_alpha && pass.state().blend_mode().enables_blending() {
            let scratch = cx.registers.allocate(RegisterClass::FragmentTemp)?;
            code.push_str(&format!(
                "add {sw}, {w}, {eps}\ndiv {rgb}, {rgb}, {sw}\n",
                sw = scratch.w(),
                w = shaded.w(),
                eps = commons.w(),
                rgb = shaded.xyz(),
            ));
        }
        if !cx.shader.preserve_alpha {
            code.push_str(&format!("mov {}, {}\n", shaded.w(), commons.z()));
        }
    }

    code.push_str(&format!("mov oc, {shaded}\n"));

    for temp in [cx.shader.registers.normal_fragment, cx.shader.registers.view_dir_fragment]
        .into_iter()
        .flatten()
    {
        cx.registers.release(temp);
    }
    if let Some(global) = cx.shader.registers.global_position_vertex {
        cx.registers.release(global);
    }
    Ok(code)
}

fn finalize_constants(cx: &mut CompilationContext) {
    let regs = &cx.registers;
    let shader = &mut cx.shader;

    shader.num_used_vertex_constants = regs.allocated(RegisterClass::VertexConstant);
    shader.num_used_fragment_constants = regs.allocated(RegisterClass::FragmentConstant);
    shader.num_used_streams = regs.allocated(RegisterClass::VertexAttribute);
    shader.num_used_textures = regs.allocated(RegisterClass::TextureSampler);

    shader.vertex_constant_data = vec![0.0; shader.num_used_vertex_constants as usize * 4];
    shader.fragment_constant_data = vec![0.0; shader.num_used_fragment_constants as usize * 4];

    if let Some(index) = shader.commons_index {
        shader.write_fragment_constants(index, &COMMONS_DATA);
    }
    if let Some(index) = shader.uv_transform_index {
        shader.write_vertex_constants(index, &UV_IDENTITY);
    }
}
