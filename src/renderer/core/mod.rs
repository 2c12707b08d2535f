//! Core rendering context
//!
//! Provides:
//! - [`Backend`]: the graphics API seam every GPU call goes through
//! - [`HeadlessBackend`]: a recording backend without a device
//! - [`RenderContext`]: per-context shader objects, programs and pools
//! - [`ContextRegistry`]: context lookup and teardown
//! - fixed-function state enums shared by passes and backends

pub mod backend;
pub mod context;
pub mod headless;
pub mod registry;
pub mod resources;
pub mod state;

pub use backend::{Backend, TextureDescriptor};
pub use context::RenderContext;
pub use headless::{BackendCommand, HeadlessBackend};
pub use registry::{ContextId, ContextRegistry};
pub use resources::{PoolEntry, ResourcePools};
pub use state::{
    BlendFactor, ClearMask, CompareMode, MAX_SAMPLERS, MipFilter, ProgramType, Rectangle, TextureFilter,
    TriangleFace, VertexBufferFormat, WrapMode,
};
