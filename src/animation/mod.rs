//! Animation Subsystem Contract
//!
//! Animation curves are evaluated elsewhere; the compiler only needs the
//! animation set to emit code that writes animated attribute values into the
//! target temporaries reserved for it.
//!
//! - [`AnimationSet::vertex_code`] moves `animatable_attributes[i]` into
//!   `animation_target_registers[i]`, applying the animation on the way
//! - [`AnimationSet::fragment_code`] blends per fragment (morphing etc.)
//! - [`AnimationSet::uv_code`] animates texture coordinates
//!
//! Code generation is a pure function of the shader object; only the GPU
//! compatibility probe keeps state, which is why it takes `&self`.

use std::fmt;

use crate::renderer::pipeline::registers::RegisterHandle;
use crate::renderer::pipeline::shader_object::ShaderObject;

pub trait AnimationSet: Send + Sync + fmt::Debug {
    /// Vertex code that writes every animatable attribute into its target.
    fn vertex_code(&self, shader: &ShaderObject) -> String;

    /// Fragment code applied to the shaded colour after the pass code.
    fn fragment_code(&self, _shader: &ShaderObject, _shaded_target: RegisterHandle) -> String {
        String::new()
    }

    /// Vertex code producing the UV varying from its attribute.
    fn uv_code(&self, _shader: &ShaderObject, source: RegisterHandle, target: RegisterHandle) -> String {
        format!("mov {target}, {source}\n")
    }

    /// Called once the full program for `shader` has been generated.
    fn code_generated(&self, _shader: &ShaderObject) {}

    /// Forgets the result of every previous [`test_gpu_compatibility`](Self::test_gpu_compatibility).
    fn reset_gpu_compatibility(&self);

    /// Checks whether the animation can run on the GPU for `shader`.
    fn test_gpu_compatibility(&self, shader: &ShaderObject);

    /// `true` when some tested shader object forced a CPU fallback.
    fn uses_cpu(&self) -> bool;
}
