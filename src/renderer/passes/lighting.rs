//! Lit shading.
//!
//! Lambert diffuse accumulation over the pass's directional and point lights,
//! additive light probes, and optional Blinn-Phong specular for directional
//! lights. Light constants are laid out as one block:
//!
//! - directional: `[direction-to-light, colour]` per light
//! - point: `[position, colour]` per light
//! - probes: `[colour]` per probe
//!
//! A normal map switches the pass to tangent space: the sampled normal is
//! remapped from `[0, 1]` to `[-1, 1]` and rotated by the interpolated
//! tangent frame.

use crate::assets::TextureHandle;
use crate::errors::Result;
use crate::renderer::passes::{ActivationEnv, PassState, ShadingHooks};
use crate::renderer::pipeline::compiler::CompilationContext;
use crate::renderer::pipeline::registers::{RegisterClass, RegisterHandle};
use crate::renderer::pipeline::sampling::TextureSignature;
use crate::renderer::pipeline::shader_object::ShaderObject;
use crate::resources::texture::Texture;
use crate::resources::version_tracker::ChangeTracker;

#[derive(Debug, Clone)]
pub struct LightingShading {
    diffuse_color: u32,
    diffuse_alpha: f32,
    gloss: Option<f32>,
    specular_strength: f32,
    normal_map: Option<(TextureHandle, TextureSignature)>,
    tracker: ChangeTracker,
}

impl Default for LightingShading {
    fn default() -> Self {
        Self::new()
    }
}

impl LightingShading {
    #[must_use]
    pub fn new() -> Self {
        Self {
            diffuse_color: 0xff_ffff,
            diffuse_alpha: 1.0,
            gloss: None,
            specular_strength: 1.0,
            normal_map: None,
            tracker: ChangeTracker::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn diffuse_color(&self) -> u32 {
        self.diffuse_color
    }

    pub fn set_diffuse_color(&mut self, color: u32) {
        self.diffuse_color = color & 0xff_ffff;
    }

    pub fn set_diffuse_alpha(&mut self, alpha: f32) {
        self.diffuse_alpha = alpha.clamp(0.0, 1.0);
    }

    #[inline]
    #[must_use]
    pub fn gloss(&self) -> Option<f32> {
        self.gloss
    }

    /// Enables specular highlights with the given exponent, or disables them.
    pub fn set_gloss(&mut self, gloss: Option<f32>) {
        if self.gloss.is_some() != gloss.is_some() {
            self.tracker.changed();
        }
        self.gloss = gloss;
    }

    pub fn set_specular_strength(&mut self, strength: f32) {
        self.specular_strength = strength;
    }

    #[must_use]
    pub fn normal_map(&self) -> Option<TextureHandle> {
        self.normal_map.map(|(handle, _)| handle)
    }

    /// Assigns or clears the tangent-space normal map.
    pub fn set_normal_map(&mut self, texture: Option<(TextureHandle, &Texture)>) {
        let next = texture.map(|(handle, tex)| (handle, TextureSignature::of(tex)));
        if next.map(|(_, sig)| sig) != self.normal_map.map(|(_, sig)| sig) {
            self.tracker.changed();
        }
        self.normal_map = next;
    }

    #[inline]
    #[must_use]
    pub fn code_version(&self) -> u64 {
        self.tracker.version()
    }

    fn diffuse_data(&self) -> [f32; 4] {
        let channel = |shift: u32| f32::from(((self.diffuse_color >> shift) & 0xff) as u8) / 255.0;
        [channel(16), channel(8), channel(0), self.diffuse_alpha]
    }
}

fn required<T>(value: Option<T>, what: &str) -> Result<T> {
    value.ok_or_else(|| {
        crate::errors::StageError::InvalidArgument(format!("lighting requires the {what} register"))
    })
}

impl ShadingHooks for LightingShading {
    fn include_dependencies(&self, state: &PassState, shader: &mut ShaderObject) {
        let counts = state.light_counts();
        if counts.total() == 0 {
            return;
        }
        shader.dependencies.normal += 1;
        if self.normal_map.is_some() {
            shader.uses_tangent_space = true;
            shader.dependencies.uv += 1;
        }
        if counts.point > 0 {
            shader.dependencies.global_pos += 1;
            shader.uses_global_pos_fragment = true;
        }
        if self.gloss.is_some() && counts.directional > 0 {
            shader.dependencies.view_dir += 1;
        }
    }

    fn normal_fragment_code(&self, _state: &PassState, cx: &mut CompilationContext) -> Result<String> {
        let Some((texture, signature)) = &self.normal_map else {
            return Ok(String::new());
        };
        let registers = cx.shader.registers;
        let normal = required(registers.normal_fragment, "normal")?;
        let commons = required(registers.commons, "commons")?;
        let uv = required(registers.uv_varying, "uv")?;
        let tangent = required(registers.tangent_varying, "tangent")?;
        let bitangent = required(registers.bitangent_varying, "bitangent")?;
        let normal_varying = required(registers.normal_varying, "normal")?;

        let sample = cx.registers.allocate(RegisterClass::FragmentTemp)?;
        cx.registers.retain(sample, 1);
        let t = cx.registers.allocate(RegisterClass::FragmentTemp)?;

        let mut code = cx.sample_texture(sample, *texture, signature, uv)?;
        code.push_str(&format!(
            "add {s3}, {s3}, {s3}\nsub {s3}, {s3}, {one}\n\
             mul {n3}, {tv}, {sx}\nmul {t3}, {bv}, {sy}\nadd {n3}, {n3}, {t3}\n\
             mul {t3}, {nv}, {sz}\nadd {n3}, {n3}, {t3}\nnrm {n3}, {n3}\nmov {nw}, {one}\n",
            s3 = sample.xyz(),
            one = commons.z(),
            n3 = normal.xyz(),
            t3 = t.xyz(),
            tv = tangent.xyz(),
            bv = bitangent.xyz(),
            nv = normal_varying.xyz(),
            sx = sample.x(),
            sy = sample.y(),
            sz = sample.z(),
            nw = normal.w(),
        ));
        cx.registers.release(sample);
        Ok(code)
    }

    fn fragment_code(
        &self,
        state: &PassState,
        cx: &mut CompilationContext,
        target: RegisterHandle,
    ) -> Result<String> {
        let diffuse = cx.registers.allocate(RegisterClass::FragmentConstant)?;
        cx.shader.slots.color = Some(diffuse.constant_offset());

        let counts = state.light_counts();
        if counts.total() == 0 {
            return Ok(format!("mov {target}, {diffuse}\n"));
        }

        let normal = required(cx.shader.registers.normal_fragment, "normal")?;
        let commons = required(cx.shader.registers.commons, "commons")?;
        let specular = match self.gloss {
            Some(_) if counts.directional > 0 => Some((
                cx.registers.allocate(RegisterClass::FragmentConstant)?,
                required(cx.shader.registers.view_dir_fragment, "view direction")?,
            )),
            _ => None,
        };
        if let Some((constant, _)) = specular {
            cx.shader.slots.specular = Some(constant.constant_offset());
        }

        let block_len = 2 * (counts.directional + counts.point) + counts.probes;
        let lights = cx.registers.allocate_block(RegisterClass::FragmentConstant, block_len)?;
        cx.shader.slots.lights = Some(lights.constant_offset());

        let acc = cx.registers.allocate(RegisterClass::FragmentTemp)?;
        cx.registers.retain(acc, 1);
        let spec_acc = match specular {
            Some(_) => {
                let reg = cx.registers.allocate(RegisterClass::FragmentTemp)?;
                cx.registers.retain(reg, 1);
                Some(reg)
            }
            None => None,
        };
        let t = cx.registers.allocate(RegisterClass::FragmentTemp)?;
        cx.registers.retain(t, 1);

        let mut code = format!("mov {acc}, {}\n", commons.x());
        if let Some(s) = spec_acc {
            code.push_str(&format!("mov {s}, {}\n", commons.x()));
        }

        for i in 0..counts.directional {
            let dir = lights.offset_by(2 * i);
            let color = lights.offset_by(2 * i + 1);
            code.push_str(&format!(
                "dp3 {tx}, {n}, {d}\nsat {tx}, {tx}\nmul {t3}, {c}, {tx}\nadd {a}, {a}, {t3}\n",
                tx = t.x(),
                t3 = t.xyz(),
                n = normal.xyz(),
                d = dir.xyz(),
                c = color.xyz(),
                a = acc.xyz(),
            ));
            if let (Some((gloss, view)), Some(s)) = (specular, spec_acc) {
                code.push_str(&format!(
                    "add {t3}, {d}, {v}\nnrm {t3}, {t3}\ndp3 {tw}, {n}, {t3}\nsat {tw}, {tw}\n\
                     pow {tw}, {tw}, {g}\nmul {tw}, {tw}, {strength}\nmul {t3}, {c}, {tw}\nadd {s3}, {s3}, {t3}\n",
                    t3 = t.xyz(),
                    tw = t.w(),
                    d = dir.xyz(),
                    v = view.xyz(),
                    n = normal.xyz(),
                    g = gloss.x(),
                    strength = gloss.y(),
                    c = color.xyz(),
                    s3 = s.xyz(),
                ));
            }
        }

        if counts.point > 0 {
            let position = required(cx.shader.registers.global_position_varying, "global position")?;
            for j in 0..counts.point {
                let base = 2 * (counts.directional + j);
                let pos = lights.offset_by(base);
                let color = lights.offset_by(base + 1);
                code.push_str(&format!(
                    "sub {t3}, {p}, {g}\nnrm {t3}, {t3}\ndp3 {tx}, {n}, {t3}\nsat {tx}, {tx}\n\
                     mul {t3}, {c}, {tx}\nadd {a}, {a}, {t3}\n",
                    t3 = t.xyz(),
                    tx = t.x(),
                    p = pos.xyz(),
                    g = position.xyz(),
                    n = normal.xyz(),
                    c = color.xyz(),
                    a = acc.xyz(),
                ));
            }
        }

        for k in 0..counts.probes {
            let probe = lights.offset_by(2 * (counts.directional + counts.point) + k);
            code.push_str(&format!("add {a}, {a}, {p}\n", a = acc.xyz(), p = probe.xyz()));
        }

        code.push_str(&format!(
            "mul {}, {}, {}\nmov {}, {}\n",
            target.xyz(),
            diffuse.xyz(),
            acc.xyz(),
            target.w(),
            diffuse.w()
        ));
        if let Some(s) = spec_acc {
            code.push_str(&format!("add {t}, {t}, {s}\n", t = target.xyz(), s = s.xyz()));
            cx.registers.release(s);
        }

        cx.registers.release(t);
        cx.registers.release(acc);
        Ok(code)
    }

    fn activate(&self, state: &PassState, shader: &mut ShaderObject, env: &ActivationEnv<'_>) {
        if let Some(index) = shader.slots.color {
            shader.write_fragment_constants(index, &self.diffuse_data());
        }
        if let (Some(index), Some(gloss)) = (shader.slots.specular, self.gloss) {
            shader.write_fragment_constants(index, &[gloss, self.specular_strength, 0.0, 0.0]);
        }

        let (Some(mut offset), Some(picker)) = (shader.slots.lights, env.light_picker) else {
            return;
        };
        let counts = state.light_counts();
        let offsets = state.light_offsets();
        let casters = state.include_casters();

        for light in picker
            .directional(casters)
            .skip(offsets.directional as usize)
            .take(counts.directional as usize)
        {
            let to_light = -light.direction.normalize_or_zero();
            let color = light.color * light.intensity;
            shader.write_fragment_constants(
                offset,
                &[to_light.x, to_light.y, to_light.z, 0.0, color.x, color.y, color.z, 1.0],
            );
            offset += 8;
        }

        for light in picker
            .points(casters)
            .skip(offsets.point as usize)
            .take(counts.point as usize)
        {
            let p = light.position;
            let color = light.color * light.intensity;
            shader.write_fragment_constants(
                offset,
                &[p.x, p.y, p.z, 1.0, color.x, color.y, color.z, 1.0],
            );
            offset += 8;
        }

        for probe in picker
            .light_probes
            .iter()
            .skip(offsets.probes as usize)
            .take(counts.probes as usize)
        {
            shader.write_fragment_constants(offset, &[probe.color.x, probe.color.y, probe.color.z, 0.0]);
            offset += 4;
        }
    }
}
