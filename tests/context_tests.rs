//! Rendering Context Tests
//!
//! Tests for:
//! - Frame protocol (clear before draw, present ends the frame)
//! - Fixed-function state forwarding and sampler slot validation
//! - Render target selection, suppression and the push / pop stack
//! - Shader object lifecycle errors, including failed recompiles
//! - Context registry creation and teardown

use myth_stage::renderer::core::state::{
    BlendFactor, ClearMask, CompareMode, MAX_SAMPLERS, MipFilter, Rectangle, TextureFilter, TriangleFace, WrapMode,
};
use myth_stage::renderer::core::{BackendCommand, ContextId, ContextRegistry};
use myth_stage::renderer::pipeline::SamplerSettings;
use myth_stage::resources::DirectionalLight;
use myth_stage::{
    AssetServer, BackBufferConfig, CoordinateSystem, HeadlessBackend, IndexData, LightPicker, Material, MaterialPass,
    PassOwner, Profile, RenderContext, StageError, StageSettings, Texture,
};

fn context() -> RenderContext<HeadlessBackend> {
    RenderContext::new(HeadlessBackend::new(), StageSettings::default()).unwrap()
}

fn sampler() -> SamplerSettings {
    SamplerSettings {
        wrap: WrapMode::Clamp,
        filter: TextureFilter::Linear,
        mip_filter: MipFilter::None,
    }
}

// ============================================================================
// Frame Protocol
// ============================================================================

#[test]
fn creation_configures_the_back_buffer() {
    let settings = StageSettings {
        back_buffer: BackBufferConfig {
            width: 320,
            height: 240,
            ..Default::default()
        },
        ..Default::default()
    };
    let ctx = RenderContext::new(HeadlessBackend::new(), settings.clone()).unwrap();
    assert_eq!(
        ctx.backend().commands(),
        &[BackendCommand::ConfigureBackBuffer(settings.back_buffer)]
    );
}

#[test]
fn draw_requires_a_clear() {
    let mut assets = AssetServer::new();
    let indices = assets.add_index_data(IndexData::new(vec![0, 1, 2]));
    let mut ctx = context();

    assert!(matches!(
        ctx.draw_triangles(indices, 0, 1, &assets),
        Err(StageError::DrawWithoutClear)
    ));

    ctx.clear(ClearMask::ALL).unwrap();
    assert!(ctx.is_drawing());
    ctx.draw_triangles(indices, 0, 1, &assets).unwrap();

    ctx.present().unwrap();
    assert!(!ctx.is_drawing());
    assert!(matches!(
        ctx.draw_triangles(indices, 0, 1, &assets),
        Err(StageError::DrawWithoutClear)
    ));
}

#[test]
fn clear_uses_the_configured_colour() {
    let settings = StageSettings {
        clear_color: wgpu::Color::RED,
        ..Default::default()
    };
    let mut ctx = RenderContext::new(HeadlessBackend::new(), settings).unwrap();
    ctx.clear(ClearMask::COLOR | ClearMask::DEPTH).unwrap();

    assert_eq!(
        ctx.backend().commands().last(),
        Some(&BackendCommand::Clear {
            color: wgpu::Color::RED,
            mask: ClearMask::COLOR | ClearMask::DEPTH,
        })
    );
}

// ============================================================================
// Fixed-Function State
// ============================================================================

#[test]
fn sampler_slots_are_bounded() {
    let mut ctx = context();
    ctx.set_sampler_state_at(MAX_SAMPLERS - 1, sampler()).unwrap();

    let err = ctx.set_sampler_state_at(MAX_SAMPLERS, sampler()).unwrap_err();
    assert!(matches!(
        err,
        StageError::SamplerIndexOutOfRange { index, max } if index == MAX_SAMPLERS && max == MAX_SAMPLERS
    ));
}

#[test]
fn texture_slots_are_bounded() {
    let mut assets = AssetServer::new();
    let texture = assets.add_texture(Texture::render_target(4, 4));
    let mut ctx = context();

    assert!(matches!(
        ctx.activate_texture(MAX_SAMPLERS, texture, &assets),
        Err(StageError::SamplerIndexOutOfRange { .. })
    ));
    assert!(ctx.backend().count(|c| matches!(c, BackendCommand::CreateTexture { .. })) == 0);
}

#[test]
fn state_is_forwarded_as_native_values() {
    let mut ctx = context();
    ctx.backend_mut().take_commands();

    ctx.set_depth_test(false, CompareMode::Always).unwrap();
    ctx.set_blend_factors(BlendFactor::SourceAlpha, BlendFactor::OneMinusSourceAlpha)
        .unwrap();
    ctx.set_culling(TriangleFace::Back, CoordinateSystem::LeftHanded).unwrap();

    assert_eq!(
        ctx.backend().commands(),
        &[
            BackendCommand::SetDepthTest {
                depth_mask: false,
                compare: wgpu::CompareFunction::Always,
            },
            BackendCommand::SetBlendFactors {
                source: wgpu::BlendFactor::SrcAlpha,
                destination: wgpu::BlendFactor::OneMinusSrcAlpha,
            },
            BackendCommand::SetCulling(TriangleFace::Front),
        ]
    );
}

#[test]
fn scissor_rectangle_is_remembered() {
    let mut ctx = context();
    let rect = Rectangle {
        x: 1,
        y: 2,
        width: 30,
        height: 40,
    };
    ctx.set_scissor_rectangle(Some(rect)).unwrap();
    assert_eq!(ctx.scissor_rectangle(), Some(rect));
    ctx.set_scissor_rectangle(None).unwrap();
    assert_eq!(ctx.scissor_rectangle(), None);
}

// ============================================================================
// Render Targets
// ============================================================================

#[test]
fn equal_render_target_selection_is_suppressed() {
    let mut assets = AssetServer::new();
    let target = assets.add_texture(Texture::render_target(64, 64));
    let mut ctx = context();
    ctx.backend_mut().take_commands();

    ctx.set_render_target(Some(target), true, 0, &assets).unwrap();
    ctx.set_render_target(Some(target), true, 0, &assets).unwrap();
    assert_eq!(
        ctx.backend()
            .count(|c| matches!(c, BackendCommand::SetRenderToTexture { .. })),
        1
    );

    // Back buffer with depth is the initial selection.
    ctx.set_render_target(None, true, 0, &assets).unwrap();
    ctx.set_render_target(None, true, 0, &assets).unwrap();
    assert_eq!(ctx.backend().count(|c| *c == BackendCommand::SetRenderToBackBuffer), 1);
}

#[test]
fn render_targets_are_never_uploaded() {
    let mut assets = AssetServer::new();
    let target = assets.add_texture(Texture::render_target(64, 64));
    let mut ctx = context();

    ctx.set_render_target(Some(target), true, 0, &assets).unwrap();
    let entry = ctx.pools().texture_entry(target).unwrap();
    assert!(!entry.invalid);
    assert_eq!(entry.upload_count, 0);
    assert_eq!(ctx.backend().count(|c| matches!(c, BackendCommand::UploadTexture { .. })), 0);
}

#[test]
fn plain_textures_cannot_be_render_targets() {
    let mut assets = AssetServer::new();
    let texture = assets.add_texture(Texture::new_2d(2, 2, Default::default(), vec![0; 16]));
    let mut ctx = context();

    assert!(matches!(
        ctx.set_render_target(Some(texture), true, 0, &assets),
        Err(StageError::InvalidArgument(_))
    ));
}

#[test]
fn push_and_pop_restore_the_previous_target() {
    let mut assets = AssetServer::new();
    let first = assets.add_texture(Texture::render_target(32, 32));
    let second = assets.add_texture(Texture::render_target(16, 16));
    let mut ctx = context();

    ctx.push_render_target(first, &assets).unwrap();
    ctx.push_render_target(second, &assets).unwrap();
    ctx.backend_mut().take_commands();

    ctx.pop_render_target().unwrap();
    ctx.pop_render_target().unwrap();

    let first_id = match ctx.backend().commands()[0] {
        BackendCommand::SetRenderToTexture { texture, .. } => texture,
        ref other => panic!("unexpected command {other:?}"),
    };
    assert_eq!(ctx.backend().commands()[1], BackendCommand::SetRenderToBackBuffer);
    assert_eq!(ctx.pools().texture_entry(first).map(|e| e.handle.id), Some(first_id));

    assert!(matches!(ctx.pop_render_target(), Err(StageError::InvalidArgument(_))));
}

// ============================================================================
// Shader Objects
// ============================================================================

#[test]
fn unattached_pass_cannot_compile() {
    let mut assets = AssetServer::new();
    let material = assets.add_material(Material::new("m"));
    let pass = assets.add_pass(MaterialPass::ambient("loose"));
    let mut ctx = context();

    assert!(matches!(
        ctx.get_shader_object(PassOwner::new(pass, material), &assets),
        Err(StageError::InvalidArgument(_))
    ));
}

#[test]
fn program_lookup_needs_a_compiled_object() {
    let mut assets = AssetServer::new();
    let material = assets.add_material(Material::new("m"));
    let pass = assets.add_pass(MaterialPass::ambient("p"));
    assets.attach_pass(material, pass).unwrap();
    let mut ctx = context();

    assert!(matches!(
        ctx.get_program(PassOwner::new(pass, material)),
        Err(StageError::NoActiveShaderObject)
    ));
}

#[test]
fn activation_unbinds_slots_above_the_new_usage() {
    let mut assets = AssetServer::new();
    let material = assets.add_material(Material::new("m"));
    let pass = assets.add_pass(MaterialPass::ambient("p"));
    assets.attach_pass(material, pass).unwrap();
    let owner = PassOwner::new(pass, material);
    let mut ctx = context();

    ctx.activate_shader_object(owner, &assets).unwrap();
    assert_eq!(ctx.active_shader_object(), Some(owner));
    ctx.deactivate_shader_object(owner).unwrap();
    assert_eq!(ctx.active_shader_object(), None);

    // Same usage as before: nothing to unbind.
    ctx.backend_mut().take_commands();
    ctx.activate_shader_object(owner, &assets).unwrap();
    assert_eq!(
        ctx.backend()
            .count(|c| matches!(c, BackendCommand::SetVertexBufferAt { buffer: None, .. })),
        0
    );
    assert!(matches!(ctx.backend().commands().last(), Some(BackendCommand::SetProgram(_))));
}

#[test]
fn failed_recompile_keeps_the_bound_program() {
    let light = DirectionalLight {
        direction: glam::Vec3::NEG_Y,
        color: glam::Vec3::ONE,
        intensity: 1.0,
    };
    let mut assets = AssetServer::new();
    let material = assets.add_material(Material::new("m"));
    let pass = assets.add_pass(MaterialPass::lighting("lit"));
    assets.attach_pass(material, pass).unwrap();
    let mut picker = LightPicker::new();
    picker.directional_lights.push(light);
    let picker = assets.add_light_picker(picker);
    assets.set_pass_light_picker(pass, Some(picker)).unwrap();
    assets.pass_mut(pass).unwrap().state_mut().set_light_budget(8, 4);
    let owner = PassOwner::new(pass, material);

    let settings = StageSettings {
        profile: Profile::Constrained,
        ..Default::default()
    };
    let mut ctx = RenderContext::new(HeadlessBackend::new(), settings).unwrap();
    ctx.get_shader_object(owner, &assets).unwrap();
    let program = ctx.get_program(owner).unwrap();
    let key = ctx.cache_key(owner).unwrap().to_owned();

    // Eight light blocks no longer fit the constrained fragment constants.
    assets
        .update_light_picker(picker, |p| p.directional_lights.extend(std::iter::repeat_n(light, 7)))
        .unwrap();
    assert!(matches!(
        ctx.get_shader_object(owner, &assets),
        Err(StageError::RegisterCapacityExceeded { .. })
    ));

    assert_eq!(ctx.cache_key(owner), Some(key.as_str()));
    assert_eq!(ctx.programs().len(), 1);
    assert_eq!(ctx.programs().usages(&key), 1);
    assert_eq!(ctx.get_program(owner).unwrap(), program);
    assert_eq!(ctx.programs().usages(&key), 1);
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn registry_creates_each_context_once() {
    let mut registry = ContextRegistry::new();
    let settings = StageSettings::default();
    let id = ContextId(7);

    registry.get_or_create(id, &settings, HeadlessBackend::new).unwrap();
    registry
        .get_or_create(id, &settings, || panic!("context already exists"))
        .unwrap();

    assert!(registry.contains(id));
    assert_eq!(registry.len(), 1);
    assert!(matches!(registry.get(ContextId(8)), Err(StageError::ContextNotFound(8))));
}

#[test]
fn destroying_a_context_disposes_its_objects() {
    let mut assets = AssetServer::new();
    let material = assets.add_material(Material::new("m"));
    let pass = assets.add_pass(MaterialPass::ambient("p"));
    assets.attach_pass(material, pass).unwrap();
    let indices = assets.add_index_data(IndexData::new(vec![0, 1, 2]));

    let mut registry = ContextRegistry::new();
    let id = ContextId(1);
    let ctx = registry
        .get_or_create(id, &StageSettings::default(), HeadlessBackend::new)
        .unwrap();
    ctx.activate_shader_object(PassOwner::new(pass, material), &assets).unwrap();
    ctx.get_index_buffer(indices, &assets).unwrap();

    let backend = registry.destroy(id).unwrap();
    assert!(registry.is_empty());
    assert_eq!(backend.live_programs(), 0);
    assert_eq!(backend.count(|c| matches!(c, BackendCommand::DisposeIndexBuffer(_))), 1);
    assert!(matches!(registry.destroy(id), Err(StageError::ContextNotFound(1))));
}
