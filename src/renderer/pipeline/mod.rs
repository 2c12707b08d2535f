//! Shader pipeline module
//!
//! Turns a material's pass list into linked programs:
//! - registers: per-class register allocation with usage counting
//! - shader_object: the compiled code and register layout of one pass
//! - compiler: the fixed compilation sequence for a pass
//! - sampling: texture sampling code and sampler state selection
//! - program_cache: cache-key based program sharing
//! - render_order: material sort ids combined from program ids

pub mod compiler;
pub mod program_cache;
pub mod program_id;
pub mod registers;
pub mod render_order;
pub mod sampling;
pub mod shader_object;

pub use compiler::{CompilationContext, compile, emit_animation_code};
pub use program_cache::{CompiledProgram, ProgramCache, key_hash};
pub use program_id::ProgramId;
pub use registers::{Profile, RegisterAllocator, RegisterClass, RegisterHandle, RegisterLimits};
pub use render_order::{RENDER_ORDER_BASE, RenderOrderCache, combine_ids};
pub use sampling::{SamplerSettings, TextureSignature};
pub use shader_object::ShaderObject;
