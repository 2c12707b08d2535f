//! Shader Object
//!
//! The compiled intent of one material pass for one owning material: which
//! inputs the generated program depends on, where every shared value lives in
//! the register banks, the generated source, and the constant arrays that are
//! uploaded before each draw.
//!
//! A shader object is produced whole by the compiler. The pool entry that
//! holds it is only replaced once compilation succeeded, so a failed compile
//! never leaves a half-built object behind.

use glam::Mat4;
use smallvec::SmallVec;

use crate::renderer::pipeline::registers::{Profile, RegisterHandle};
use crate::renderer::pipeline::sampling::SampledTexture;

/// `[0.0, 0.5, 1.0, epsilon]`, uploaded to the commons fragment constant.
pub const COMMONS_DATA: [f32; 4] = [0.0, 0.5, 1.0, 1.0e-4];

/// Separator between vertex and fragment source inside a cache key.
pub const KEY_SEPARATOR: &str = "---";

/// How many downstream stages consume each derived value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DependencyCounter {
    pub uv: u32,
    pub secondary_uv: u32,
    pub normal: u32,
    pub tangent: u32,
    pub view_dir: u32,
    pub projection: u32,
    pub global_pos: u32,
}

/// Registers shared between the compiler's stages and the pass hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SharedRegisters {
    pub local_position: Option<RegisterHandle>,
    pub global_position_vertex: Option<RegisterHandle>,
    pub global_position_varying: Option<RegisterHandle>,
    pub projection_fragment: Option<RegisterHandle>,
    pub normal_input: Option<RegisterHandle>,
    pub normal_target: Option<RegisterHandle>,
    pub normal_varying: Option<RegisterHandle>,
    pub normal_fragment: Option<RegisterHandle>,
    pub tangent_input: Option<RegisterHandle>,
    pub tangent_target: Option<RegisterHandle>,
    pub tangent_varying: Option<RegisterHandle>,
    pub bitangent_varying: Option<RegisterHandle>,
    pub uv_input: Option<RegisterHandle>,
    pub uv_varying: Option<RegisterHandle>,
    pub secondary_uv_input: Option<RegisterHandle>,
    pub secondary_uv_varying: Option<RegisterHandle>,
    pub view_dir_varying: Option<RegisterHandle>,
    pub view_dir_fragment: Option<RegisterHandle>,
    pub shaded_target: Option<RegisterHandle>,
    pub commons: Option<RegisterHandle>,
}

/// Constant offsets and sampler slots claimed by the pass variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSlots {
    pub color: Option<usize>,
    pub alpha_cutoff: Option<usize>,
    pub color_transform: Option<usize>,
    pub lights: Option<usize>,
    pub specular: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ShaderObject {
    pub profile: Profile,
    pub dependencies: DependencyCounter,
    pub uses_global_pos_fragment: bool,
    pub uses_tangent_space: bool,
    pub uses_gpu_animation: bool,
    pub uses_animated_uvs: bool,
    pub uses_premultiplied_alpha: bool,
    pub preserve_alpha: bool,

    // Material-derived sampling state
    pub alpha_threshold: f32,
    pub use_mipmapping: bool,
    pub use_smoothing: bool,
    pub repeat_textures: bool,

    // Vertex stream slots
    pub uv_buffer_index: Option<u32>,
    pub secondary_uv_buffer_index: Option<u32>,
    pub normal_buffer_index: Option<u32>,
    pub tangent_buffer_index: Option<u32>,

    // Float offsets into the constant arrays
    pub view_matrix_index: usize,
    pub scene_matrix_index: Option<usize>,
    pub scene_normal_matrix_index: Option<usize>,
    pub camera_position_index: Option<usize>,
    pub uv_transform_index: Option<usize>,
    pub commons_index: Option<usize>,

    pub registers: SharedRegisters,
    pub animatable_attributes: SmallVec<[RegisterHandle; 4]>,
    pub animation_target_registers: SmallVec<[RegisterHandle; 4]>,
    pub uv_source: Option<RegisterHandle>,
    pub uv_target: Option<RegisterHandle>,
    pub slots: PassSlots,
    pub sampled_textures: SmallVec<[SampledTexture; 2]>,

    pub vertex_constant_data: Vec<f32>,
    pub fragment_constant_data: Vec<f32>,
    pub num_used_vertex_constants: u32,
    pub num_used_fragment_constants: u32,
    pub num_used_streams: u32,
    pub num_used_textures: u32,

    pub vertex_code: String,
    pub fragment_code: String,
    pub post_animation_fragment_code: String,
    pub animation_vertex_code: String,
    pub animation_fragment_code: String,
}

impl ShaderObject {
    #[must_use]
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            dependencies: DependencyCounter::default(),
            uses_global_pos_fragment: false,
            uses_tangent_space: false,
            uses_gpu_animation: false,
            uses_animated_uvs: false,
            uses_premultiplied_alpha: false,
            preserve_alpha: true,
            alpha_threshold: 0.0,
            use_mipmapping: true,
            use_smoothing: true,
            repeat_textures: false,
            uv_buffer_index: None,
            secondary_uv_buffer_index: None,
            normal_buffer_index: None,
            tangent_buffer_index: None,
            view_matrix_index: 0,
            scene_matrix_index: None,
            scene_normal_matrix_index: None,
            camera_position_index: None,
            uv_transform_index: None,
            commons_index: None,
            registers: SharedRegisters::default(),
            animatable_attributes: SmallVec::new(),
            animation_target_registers: SmallVec::new(),
            uv_source: None,
            uv_target: None,
            slots: PassSlots::default(),
            sampled_textures: SmallVec::new(),
            vertex_constant_data: Vec::new(),
            fragment_constant_data: Vec::new(),
            num_used_vertex_constants: 0,
            num_used_fragment_constants: 0,
            num_used_streams: 0,
            num_used_textures: 0,
            vertex_code: String::new(),
            fragment_code: String::new(),
            post_animation_fragment_code: String::new(),
            animation_vertex_code: String::new(),
            animation_fragment_code: String::new(),
        }
    }

    /// Complete vertex program: animation code first, then the rest.
    #[must_use]
    pub fn full_vertex_code(&self) -> String {
        let mut code = String::with_capacity(self.animation_vertex_code.len() + self.vertex_code.len());
        code.push_str(&self.animation_vertex_code);
        code.push_str(&self.vertex_code);
        code
    }

    /// Complete fragment program.
    #[must_use]
    pub fn full_fragment_code(&self) -> String {
        let mut code = self.fragment_code.clone();
        code.push_str(&self.animation_fragment_code);
        code.push_str(&self.post_animation_fragment_code);
        code
    }

    /// Content key used to deduplicate programs.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let mut key = self.full_vertex_code();
        key.push_str(KEY_SEPARATOR);
        key.push_str(&self.full_fragment_code());
        key
    }

    /// Copies `values` into the vertex constants at float offset `offset`.
    pub fn write_vertex_constants(&mut self, offset: usize, values: &[f32]) {
        write_clamped(&mut self.vertex_constant_data, offset, values);
    }

    /// Copies `values` into the fragment constants at float offset `offset`.
    pub fn write_fragment_constants(&mut self, offset: usize, values: &[f32]) {
        write_clamped(&mut self.fragment_constant_data, offset, values);
    }

    /// Writes `matrix` as four row registers, the layout `m44` consumes.
    pub fn write_vertex_matrix(&mut self, offset: usize, matrix: &Mat4) {
        self.write_vertex_constants(offset, &matrix.transpose().to_cols_array());
    }
}

fn write_clamped(target: &mut [f32], offset: usize, values: &[f32]) {
    if let Some(dst) = target.get_mut(offset..) {
        let n = dst.len().min(values.len());
        dst[..n].copy_from_slice(&values[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn cache_key_orders_sections() {
        let mut shader = ShaderObject::new(Profile::Baseline);
        shader.animation_vertex_code = "A".into();
        shader.vertex_code = "V".into();
        shader.fragment_code = "F".into();
        shader.animation_fragment_code = "B".into();
        shader.post_animation_fragment_code = "P".into();
        assert_eq!(shader.cache_key(), "AV---FBP");
    }

    #[test]
    fn matrices_are_written_as_rows() {
        let mut shader = ShaderObject::new(Profile::Baseline);
        shader.vertex_constant_data = vec![0.0; 16];
        let m = Mat4::from_cols(
            Vec4::new(1.0, 2.0, 3.0, 4.0),
            Vec4::new(5.0, 6.0, 7.0, 8.0),
            Vec4::new(9.0, 10.0, 11.0, 12.0),
            Vec4::new(13.0, 14.0, 15.0, 16.0),
        );
        shader.write_vertex_matrix(0, &m);
        assert_eq!(&shader.vertex_constant_data[0..4], &[1.0, 5.0, 9.0, 13.0]);
    }

    #[test]
    fn constant_writes_never_overflow() {
        let mut shader = ShaderObject::new(Profile::Baseline);
        shader.fragment_constant_data = vec![0.0; 4];
        shader.write_fragment_constants(2, &[1.0, 2.0, 3.0]);
        assert_eq!(shader.fragment_constant_data, vec![0.0, 0.0, 1.0, 2.0]);
        shader.write_fragment_constants(8, &[1.0]);
    }
}
