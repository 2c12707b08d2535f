//! Rendering module
//!
//! - settings: context-wide configuration
//! - pipeline: shader compilation and program caching
//! - passes: material passes and their shading hooks
//! - core: rendering context, backends and resource pools

pub mod core;
pub mod passes;
pub mod pipeline;
pub mod settings;

pub use self::core::{Backend, ContextId, ContextRegistry, HeadlessBackend, RenderContext};
pub use passes::{BlendMode, MaterialPass, PassKind, PassOwner};
pub use settings::{BackBufferConfig, StageSettings};
