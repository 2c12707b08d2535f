//! Ambient (unlit) shading.
//!
//! Writes either a sampled texture or a constant colour into the shaded
//! target. A textured pass with an alpha threshold discards fragments below
//! the cutoff.
//!
//! The texture is addressed by the mesh UVs, or in screen space from the
//! interpolated clip position. A light map, addressed by the secondary UVs,
//! modulates the colour.

use crate::assets::TextureHandle;
use crate::errors::{Result, StageError};
use crate::renderer::passes::{ActivationEnv, PassState, ShadingHooks};
use crate::renderer::pipeline::compiler::CompilationContext;
use crate::renderer::pipeline::registers::{ComponentMask, RegisterClass, RegisterHandle};
use crate::renderer::pipeline::sampling::TextureSignature;
use crate::renderer::pipeline::shader_object::ShaderObject;
use crate::resources::texture::Texture;
use crate::resources::version_tracker::ChangeTracker;

#[derive(Debug, Clone)]
pub struct AmbientShading {
    color: u32,
    alpha: f32,
    ambient: f32,
    texture: Option<(TextureHandle, TextureSignature)>,
    light_map: Option<(TextureHandle, TextureSignature)>,
    screen_space: bool,
    tracker: ChangeTracker,
}

impl Default for AmbientShading {
    fn default() -> Self {
        Self::new()
    }
}

impl AmbientShading {
    #[must_use]
    pub fn new() -> Self {
        Self {
            color: 0xff_ffff,
            alpha: 1.0,
            ambient: 1.0,
            texture: None,
            light_map: None,
            screen_space: false,
            tracker: ChangeTracker::new(),
        }
    }

    /// Colour as `0xRRGGBB`.
    #[inline]
    #[must_use]
    pub fn color(&self) -> u32 {
        self.color
    }

    pub fn set_color(&mut self, color: u32) {
        self.color = color & 0xff_ffff;
    }

    #[inline]
    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha.clamp(0.0, 1.0);
    }

    #[inline]
    #[must_use]
    pub fn ambient(&self) -> f32 {
        self.ambient
    }

    pub fn set_ambient(&mut self, ambient: f32) {
        self.ambient = ambient;
    }

    #[must_use]
    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture.map(|(handle, _)| handle)
    }

    /// Assigns or clears the texture.
    ///
    /// Generated code only changes when texture presence, mipmap presence or
    /// format change; swapping between equivalent textures keeps the
    /// compiled program.
    pub fn set_texture(&mut self, texture: Option<(TextureHandle, &Texture)>) {
        Self::assign(&mut self.texture, texture, &mut self.tracker);
    }

    #[must_use]
    pub fn light_map(&self) -> Option<TextureHandle> {
        self.light_map.map(|(handle, _)| handle)
    }

    /// Assigns or clears the light map, sampled with the secondary UVs.
    pub fn set_light_map(&mut self, texture: Option<(TextureHandle, &Texture)>) {
        Self::assign(&mut self.light_map, texture, &mut self.tracker);
    }

    #[inline]
    #[must_use]
    pub fn screen_space(&self) -> bool {
        self.screen_space
    }

    /// Addresses the texture by screen position instead of mesh UVs.
    pub fn set_screen_space(&mut self, value: bool) {
        if self.screen_space != value {
            self.screen_space = value;
            self.tracker.changed();
        }
    }

    fn assign(
        slot: &mut Option<(TextureHandle, TextureSignature)>,
        texture: Option<(TextureHandle, &Texture)>,
        tracker: &mut ChangeTracker,
    ) {
        let next = texture.map(|(handle, tex)| (handle, TextureSignature::of(tex)));
        if next.map(|(_, sig)| sig) != slot.map(|(_, sig)| sig) {
            tracker.changed();
        }
        *slot = next;
    }

    #[inline]
    #[must_use]
    pub fn code_version(&self) -> u64 {
        self.tracker.version()
    }

    fn color_data(&self) -> [f32; 4] {
        let channel = |shift: u32| f32::from(((self.color >> shift) & 0xff) as u8) / 255.0 * self.ambient;
        [channel(16), channel(8), channel(0), self.alpha]
    }
}

impl ShadingHooks for AmbientShading {
    fn include_dependencies(&self, _state: &PassState, shader: &mut ShaderObject) {
        if self.texture.is_some() {
            if self.screen_space {
                shader.dependencies.projection += 1;
            } else {
                shader.dependencies.uv += 1;
            }
        }
        if self.light_map.is_some() {
            shader.dependencies.secondary_uv += 1;
        }
    }

    fn fragment_code(
        &self,
        _state: &PassState,
        cx: &mut CompilationContext,
        target: RegisterHandle,
    ) -> Result<String> {
        let mut code = String::new();

        match &self.texture {
            Some((texture, signature)) => {
                let uv = if self.screen_space {
                    let (uv, projected) = screen_uv_code(cx)?;
                    code.push_str(&projected);
                    uv
                } else {
                    missing(cx.shader.registers.uv_varying, "uv")?
                };
                code.push_str(&cx.sample_texture(target, *texture, signature, uv)?);
                if self.screen_space {
                    cx.registers.release(uv);
                }

                if cx.shader.alpha_threshold > 0.0 {
                    let cutoff = cx.registers.allocate(RegisterClass::FragmentConstant)?;
                    cx.shader.slots.alpha_cutoff = Some(cutoff.constant_offset());
                    code.push_str(&format!(
                        "sub {tw}, {tw}, {cut}\nkil {tw}\nadd {tw}, {tw}, {cut}\n",
                        tw = target.w(),
                        cut = cutoff.x()
                    ));
                }
            }
            None => {
                let color = cx.registers.allocate(RegisterClass::FragmentConstant)?;
                cx.shader.slots.color = Some(color.constant_offset());
                code.push_str(&format!("mov {target}, {color}\n"));
            }
        }

        if let Some((light_map, signature)) = &self.light_map {
            let uv = missing(cx.shader.registers.secondary_uv_varying, "secondary uv")?;
            let light = cx.registers.allocate(RegisterClass::FragmentTemp)?;
            cx.registers.retain(light, 1);
            code.push_str(&cx.sample_texture(light, *light_map, signature, uv)?);
            code.push_str(&format!("mul {t}, {t}, {l}\n", t = target.xyz(), l = light.xyz()));
            cx.registers.release(light);
        }

        Ok(code)
    }

    fn init_constant_data(&self, _state: &PassState, shader: &mut ShaderObject) {
        if let Some(index) = shader.slots.alpha_cutoff {
            let threshold = shader.alpha_threshold;
            shader.write_fragment_constants(index, &[threshold, 0.0, 0.0, 0.0]);
        }
    }

    fn activate(&self, _state: &PassState, shader: &mut ShaderObject, _env: &ActivationEnv<'_>) {
        if let Some(index) = shader.slots.color {
            shader.write_fragment_constants(index, &self.color_data());
        }
    }
}

fn missing<T>(value: Option<T>, what: &str) -> Result<T> {
    value.ok_or_else(|| StageError::InvalidArgument(format!("ambient shading requires the {what} register")))
}

/// Maps the interpolated clip position to `[0, 1]` texture space, `v`
/// pointing down. Returns a retained fragment temporary holding the UV.
fn screen_uv_code(cx: &mut CompilationContext) -> Result<(RegisterHandle, String)> {
    let projected = missing(cx.shader.registers.projection_fragment, "projection")?;
    let commons = missing(cx.shader.registers.commons, "commons")?;
    let uv = cx.registers.allocate(RegisterClass::FragmentTemp)?;
    cx.registers.retain(uv, 1);

    let xy = ComponentMask::X | ComponentMask::Y;
    let code = format!(
        "div {uv2}, {p2}, {pw}\nmul {uv2}, {uv2}, {half}\nneg {uvy}, {uvy}\nadd {uv2}, {uv2}, {half}\n",
        uv2 = uv.swizzle(xy),
        p2 = projected.swizzle(xy),
        pw = projected.w(),
        half = commons.y(),
        uvy = uv.y(),
    );
    Ok((uv, code))
}
