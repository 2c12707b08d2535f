//! Shader Compiler Tests
//!
//! Tests for:
//! - Register layout of lit passes (normals, view direction, light block)
//! - Animation targets staying distinct from every other vertex temporary
//! - Normal maps, light maps and screen-space texturing
//! - Textured ambient passes and their UV stream
//! - Output stage alpha handling
//! - Register exhaustion under small profiles

use std::collections::HashSet;

use glam::Vec3;

use myth_stage::renderer::passes::{BlendMode, ColorTransform, PassMode};
use myth_stage::renderer::pipeline::shader_object::ShaderObject;
use myth_stage::renderer::pipeline::{RegisterClass, compile};
use myth_stage::resources::texture::TextureFormat;
use myth_stage::resources::{DirectionalLight, PointLight};
use myth_stage::{AssetServer, LightPicker, Material, MaterialHandle, MaterialPass, PassHandle, Profile, StageError, Texture};

fn directional() -> DirectionalLight {
    DirectionalLight {
        direction: Vec3::NEG_Y,
        color: Vec3::ONE,
        intensity: 1.0,
    }
}

fn lit_setup(picker: LightPicker) -> (AssetServer, MaterialHandle, PassHandle) {
    let mut assets = AssetServer::new();
    let material = assets.add_material(Material::new("lit"));
    let pass = assets.add_pass(MaterialPass::lighting("lit"));
    assets.attach_pass(material, pass).unwrap();
    let picker = assets.add_light_picker(picker);
    assets.set_pass_light_picker(pass, Some(picker)).unwrap();
    (assets, material, pass)
}

// ============================================================================
// Lit Passes
// ============================================================================

#[test]
fn specular_lighting_reserves_view_direction() {
    let mut picker = LightPicker::new();
    picker.directional_lights.push(directional());
    let (mut assets, material, pass) = lit_setup(picker);
    assets
        .pass_mut(pass)
        .unwrap()
        .as_lighting_mut()
        .unwrap()
        .set_gloss(Some(50.0));

    let shader = compile(
        assets.pass(pass).unwrap(),
        assets.material(material).unwrap(),
        Profile::Baseline,
        false,
    )
    .unwrap();

    // Projection (4) + scene (4) + normal matrix (3) + camera (1).
    assert_eq!(shader.num_used_vertex_constants, 12);
    assert_eq!(shader.scene_matrix_index, Some(16));
    assert_eq!(shader.scene_normal_matrix_index, Some(32));
    assert_eq!(shader.camera_position_index, Some(44));

    // Commons, diffuse, specular, one direction/colour pair.
    assert_eq!(shader.num_used_fragment_constants, 5);
    assert_eq!(shader.normal_buffer_index, Some(1));
    assert_eq!(shader.num_used_streams, 2);
    assert!(shader.fragment_code.contains("pow"));
    assert_eq!(shader.slots.specular, Some(8));
    assert_eq!(shader.slots.lights, Some(12));
}

#[test]
fn lighting_without_lights_is_a_flat_colour() {
    let (assets, material, pass) = lit_setup(LightPicker::new());

    let shader = compile(
        assets.pass(pass).unwrap(),
        assets.material(material).unwrap(),
        Profile::Baseline,
        false,
    )
    .unwrap();

    assert_eq!(shader.fragment_code, "mov ft0, fc1\n");
    assert_eq!(shader.normal_buffer_index, None);
    assert_eq!(shader.num_used_streams, 1);
}

#[test]
fn point_lights_need_the_fragment_world_position() {
    let mut picker = LightPicker::new();
    picker.point_lights.push(PointLight {
        position: Vec3::new(0.0, 5.0, 0.0),
        color: Vec3::ONE,
        intensity: 2.0,
    });
    let (assets, material, pass) = lit_setup(picker);

    let shader = compile(
        assets.pass(pass).unwrap(),
        assets.material(material).unwrap(),
        Profile::Baseline,
        false,
    )
    .unwrap();

    assert!(shader.uses_global_pos_fragment);
    let varying = shader.registers.global_position_varying.unwrap();
    let global = shader.registers.global_position_vertex.unwrap();
    assert_ne!(Some(global), shader.registers.normal_target);
    assert!(shader.vertex_code.contains(&format!("mov {varying}, {global}\n")));
    assert!(shader.fragment_code.contains(&format!("{}", varying.xyz())));
    assert_eq!(shader.camera_position_index, None);
}

/// Lit pass with one directional light and a normal map.
fn normal_mapped(assets: &mut AssetServer, pass: PassHandle) -> myth_stage::TextureHandle {
    let map = assets.add_texture(Texture::new_2d(2, 2, TextureFormat::Bgra, vec![128; 16]));
    assets.set_normal_map(pass, Some(map)).unwrap();
    map
}

/// Registers written by `code`, without swizzles.
fn written(code: &str) -> HashSet<String> {
    code.lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(|dst| dst.trim_end_matches(',').split('.').next().unwrap_or_default().to_owned())
        .collect()
}

fn animation_targets(shader: &ShaderObject) -> Vec<String> {
    shader
        .animation_target_registers
        .iter()
        .chain(shader.uv_target.as_ref())
        .map(ToString::to_string)
        .collect()
}

#[test]
fn animation_targets_survive_the_whole_vertex_program() {
    let mut picker = LightPicker::new();
    picker.directional_lights.push(directional());
    let (mut assets, material, pass) = lit_setup(picker);
    normal_mapped(&mut assets, pass);
    assets.material_mut(material).unwrap().set_animate_uvs(true);

    let shader = compile(
        assets.pass(pass).unwrap(),
        assets.material(material).unwrap(),
        Profile::Baseline,
        false,
    )
    .unwrap();

    // Position, normal, tangent, then the animated UV temporary.
    assert_eq!(
        shader.animation_vertex_code,
        "mov vt0, va0\nmov vt1, va1\nmov vt2, va2\nmov vt3, va3\n"
    );
    let targets = animation_targets(&shader);
    assert_eq!(targets.iter().collect::<HashSet<_>>().len(), targets.len());

    // Only the animation code may write a target; the rest only reads them.
    let written = written(&shader.vertex_code);
    for target in &targets {
        assert!(!written.contains(target), "{target} overwritten in\n{}", shader.vertex_code);
    }
    assert!(shader.vertex_code.contains("dp4 v3.x, vt3, vc7\n"));
    assert!(shader.vertex_code.contains("m33 vt4.xyz, vt1, vc4\n"));
}

#[test]
fn normal_map_rotates_the_sample_by_the_tangent_frame() {
    let mut picker = LightPicker::new();
    picker.directional_lights.push(directional());
    let (mut assets, material, pass) = lit_setup(picker);
    let map = normal_mapped(&mut assets, pass);

    let shader = compile(
        assets.pass(pass).unwrap(),
        assets.material(material).unwrap(),
        Profile::Baseline,
        false,
    )
    .unwrap();

    assert!(shader.uses_tangent_space);
    assert_eq!(shader.normal_buffer_index, Some(1));
    assert_eq!(shader.tangent_buffer_index, Some(2));
    assert_eq!(shader.uv_buffer_index, Some(3));
    assert_eq!(shader.sampled_textures.len(), 1);
    assert_eq!(shader.sampled_textures[0].texture, map);

    let uv = shader.registers.uv_varying.unwrap();
    let tangent = shader.registers.tangent_varying.unwrap();
    let normal = shader.registers.normal_fragment.unwrap();
    assert!(shader.vertex_code.contains("crs "));
    assert!(shader.fragment_code.contains(&format!(", {uv}, fs0 <2d,linear,mipnone,clamp>\n")));
    assert!(
        shader
            .fragment_code
            .contains(&format!("mul {}, {}, ", normal.xyz(), tangent.xyz()))
    );

    // The normal is ready before the light loop reads it.
    let sampled = shader.fragment_code.find("tex ").unwrap();
    let lit = shader.fragment_code.find("dp3 ").unwrap();
    assert!(sampled < lit);
}

#[test]
fn normal_map_is_ignored_without_lights() {
    let (mut assets, material, pass) = lit_setup(LightPicker::new());
    normal_mapped(&mut assets, pass);

    let shader = compile(
        assets.pass(pass).unwrap(),
        assets.material(material).unwrap(),
        Profile::Baseline,
        false,
    )
    .unwrap();

    assert!(!shader.uses_tangent_space);
    assert!(shader.sampled_textures.is_empty());
    assert_eq!(shader.num_used_streams, 1);
}

// ============================================================================
// Ambient Passes
// ============================================================================

#[test]
fn light_map_modulates_through_the_secondary_uvs() {
    let mut assets = AssetServer::new();
    let light_map = assets.add_texture(Texture::new_2d(2, 2, TextureFormat::Bgra, vec![255; 16]));
    let material = assets.add_material(Material::new("baked"));
    let pass = assets.add_pass(MaterialPass::ambient("baked"));
    assets.attach_pass(material, pass).unwrap();
    assets.set_light_map(pass, Some(light_map)).unwrap();

    let shader = compile(
        assets.pass(pass).unwrap(),
        assets.material(material).unwrap(),
        Profile::Baseline,
        false,
    )
    .unwrap();

    assert_eq!(shader.secondary_uv_buffer_index, Some(1));
    assert_eq!(shader.uv_buffer_index, None);
    assert_eq!(shader.vertex_code, "m44 op, vt0, vc0\nmov v0, va1\n");
    assert_eq!(
        shader.fragment_code,
        "mov ft0, fc1\ntex ft1, v0, fs0 <2d,linear,mipnone,clamp>\nmul ft0.xyz, ft0.xyz, ft1.xyz\n"
    );
}

#[test]
fn screen_space_texture_samples_the_projected_position() {
    let mut assets = AssetServer::new();
    let texture = assets.add_texture(Texture::new_2d(2, 2, TextureFormat::Bgra, vec![0; 16]));
    let material = assets.add_material(Material::new("screen"));
    let pass = assets.add_pass(MaterialPass::ambient("screen"));
    assets.attach_pass(material, pass).unwrap();
    assets.set_ambient_texture(pass, Some(texture)).unwrap();
    assets
        .pass_mut(pass)
        .unwrap()
        .as_ambient_mut()
        .unwrap()
        .set_screen_space(true);

    let shader = compile(
        assets.pass(pass).unwrap(),
        assets.material(material).unwrap(),
        Profile::Baseline,
        false,
    )
    .unwrap();

    assert_eq!(shader.uv_buffer_index, None);
    assert_eq!(shader.num_used_streams, 1);
    assert_eq!(shader.vertex_code, "m44 vt1, vt0, vc0\nmov op, vt1\nmov v0, vt1\n");
    assert_eq!(
        shader.full_fragment_code(),
        "div ft1.xy, v0.xy, v0.w\nmul ft1.xy, ft1.xy, fc0.y\nneg ft1.y, ft1.y\nadd ft1.xy, ft1.xy, fc0.y\n\
         tex ft0, ft1, fs0 <2d,linear,mipnone,clamp>\nmov oc, ft0\n"
    );
}

#[test]
fn textured_ambient_samples_through_the_uv_varying() {
    let mut assets = AssetServer::new();
    let texture = assets.add_texture(Texture::new_2d(2, 2, TextureFormat::Bgra, vec![0; 16]));
    let material = assets.add_material(Material::new("textured"));
    let pass = assets.add_pass(MaterialPass::ambient("textured"));
    assets.attach_pass(material, pass).unwrap();
    assets.set_ambient_texture(pass, Some(texture)).unwrap();

    let shader = compile(
        assets.pass(pass).unwrap(),
        assets.material(material).unwrap(),
        Profile::Baseline,
        false,
    )
    .unwrap();

    assert_eq!(shader.uv_buffer_index, Some(1));
    assert_eq!(shader.num_used_textures, 1);
    assert_eq!(shader.animation_vertex_code, "mov vt0, va0\nmov v0, va1\n");
    assert_eq!(
        shader.full_fragment_code(),
        "tex ft0, v0, fs0 <2d,linear,mipnone,clamp>\nmov oc, ft0\n"
    );
}

#[test]
fn premultiplied_blending_divides_out_alpha() {
    let mut material = Material::new("m");
    material.set_alpha_premultiplied(true);
    let mut pass = MaterialPass::ambient("blended");
    pass.state_mut().set_blend_mode(BlendMode::Alpha);

    let shader = compile(&pass, &material, Profile::Baseline, false).unwrap();

    assert_eq!(
        shader.post_animation_fragment_code,
        "add ft1.w, ft0.w, fc0.w\ndiv ft0.xyz, ft0.xyz, ft1.w\nmov oc, ft0\n"
    );
}

#[test]
fn colour_transform_follows_the_variant_code() {
    let mut pass = MaterialPass::ambient("tinted");
    pass.state_mut().set_color_transform(Some(ColorTransform {
        green_multiplier: 0.0,
        ..Default::default()
    }));
    let material = Material::new("m");

    let shader = compile(&pass, &material, Profile::Baseline, false).unwrap();
    assert_eq!(
        shader.fragment_code,
        "mov ft0, fc1\nmul ft0, ft0, fc2\nadd ft0, ft0, fc3\n"
    );
    assert_eq!(shader.slots.color_transform, Some(8));

    pass.state_mut().set_pass_mode(PassMode::LIGHTING);
    let shader = compile(&pass, &material, Profile::Baseline, false).unwrap();
    assert_eq!(shader.fragment_code, "mov ft0, fc1\n");
}

// ============================================================================
// Profiles
// ============================================================================

#[test]
fn too_many_lights_exhaust_fragment_constants() {
    let mut picker = LightPicker::new();
    picker.directional_lights.extend(std::iter::repeat_n(directional(), 8));
    let (mut assets, material, pass) = lit_setup(picker);
    assets.pass_mut(pass).unwrap().state_mut().set_light_budget(8, 4);

    let err = compile(
        assets.pass(pass).unwrap(),
        assets.material(material).unwrap(),
        Profile::Constrained,
        false,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        StageError::RegisterCapacityExceeded {
            class: RegisterClass::FragmentConstant,
            capacity: 8
        }
    ));

    // The same pass fits the larger tier.
    let shader = compile(
        assets.pass(pass).unwrap(),
        assets.material(material).unwrap(),
        Profile::Extended,
        false,
    )
    .unwrap();
    assert_eq!(shader.num_used_fragment_constants, 18);
}

#[test]
fn light_budget_truncates_the_picker() {
    let mut picker = LightPicker::new();
    picker.directional_lights.extend(std::iter::repeat_n(directional(), 5));
    let (assets, material, pass) = lit_setup(picker);

    assert_eq!(assets.pass(pass).unwrap().state().light_counts().directional, 3);
    let shader = compile(
        assets.pass(pass).unwrap(),
        assets.material(material).unwrap(),
        Profile::Baseline,
        false,
    )
    .unwrap();

    // Commons, diffuse, three direction/colour pairs.
    assert_eq!(shader.num_used_fragment_constants, 8);
}
