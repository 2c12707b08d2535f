//! Colour transform effect.
//!
//! `colour = colour * multipliers + offsets / 255`, applied to the shaded
//! target after the pass variant wrote it.

use crate::errors::Result;
use crate::renderer::pipeline::compiler::CompilationContext;
use crate::renderer::pipeline::registers::{RegisterClass, RegisterHandle};
use crate::renderer::pipeline::shader_object::ShaderObject;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorTransform {
    pub red_multiplier: f32,
    pub green_multiplier: f32,
    pub blue_multiplier: f32,
    pub alpha_multiplier: f32,
    /// Offsets in 0..=255 colour units.
    pub red_offset: f32,
    pub green_offset: f32,
    pub blue_offset: f32,
    pub alpha_offset: f32,
}

impl Default for ColorTransform {
    fn default() -> Self {
        Self {
            red_multiplier: 1.0,
            green_multiplier: 1.0,
            blue_multiplier: 1.0,
            alpha_multiplier: 1.0,
            red_offset: 0.0,
            green_offset: 0.0,
            blue_offset: 0.0,
            alpha_offset: 0.0,
        }
    }
}

impl ColorTransform {
    pub(crate) fn fragment_code(
        &self,
        cx: &mut CompilationContext,
        target: RegisterHandle,
    ) -> Result<String> {
        let multipliers = cx.registers.allocate(RegisterClass::FragmentConstant)?;
        let offsets = cx.registers.allocate(RegisterClass::FragmentConstant)?;
        cx.shader.slots.color_transform = Some(multipliers.constant_offset());

        Ok(format!(
            "mul {target}, {target}, {multipliers}\nadd {target}, {target}, {offsets}\n"
        ))
    }

    pub(crate) fn write_constants(&self, shader: &mut ShaderObject) {
        const INV_255: f32 = 1.0 / 255.0;
        let Some(index) = shader.slots.color_transform else {
            return;
        };
        shader.write_fragment_constants(
            index,
            &[
                self.red_multiplier,
                self.green_multiplier,
                self.blue_multiplier,
                self.alpha_multiplier,
                self.red_offset * INV_255,
                self.green_offset * INV_255,
                self.blue_offset * INV_255,
                self.alpha_offset * INV_255,
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::pipeline::registers::Profile;

    #[test]
    fn offsets_are_uploaded_as_unit_colours() {
        let transform = ColorTransform {
            red_multiplier: 0.5,
            blue_offset: 255.0,
            ..Default::default()
        };
        let mut cx = CompilationContext::new(Profile::Baseline);
        let target = RegisterHandle::new(RegisterClass::FragmentTemp, 0);
        let code = transform.fragment_code(&mut cx, target).unwrap();
        assert_eq!(code, "mul ft0, ft0, fc0\nadd ft0, ft0, fc1\n");

        let mut shader = cx.shader;
        shader.fragment_constant_data = vec![0.0; 8];
        transform.write_constants(&mut shader);
        assert_eq!(
            shader.fragment_constant_data,
            vec![0.5, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0]
        );
    }

    #[test]
    fn missing_slot_writes_nothing() {
        let mut shader = ShaderObject::new(Profile::Baseline);
        shader.fragment_constant_data = vec![0.0; 8];
        ColorTransform::default().write_constants(&mut shader);
        assert!(shader.fragment_constant_data.iter().all(|&v| v == 0.0));
    }
}
