//! Error Types
//!
//! This module defines the error type used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`StageError`] covers every failure mode:
//! - Register exhaustion during shader compilation
//! - Backend factory operations that the active backend does not provide
//! - Invalid arguments (sampler slots, blend mode names)
//! - State-ordering violations (drawing before the target was cleared)
//!
//! None of these are retried. Each one is either a contract violation or a
//! hard capacity limit and is propagated to the caller as-is.
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for `std::result::Result<T, StageError>`.
//!
//! ```rust,ignore
//! use myth_stage::errors::{StageError, Result};
//!
//! fn compile_material() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::renderer::pipeline::registers::RegisterClass;

/// The main error type for shader compilation and resource management.
#[derive(Error, Debug)]
pub enum StageError {
    // ========================================================================
    // Compilation Errors
    // ========================================================================
    /// A register class ran out of slots while compiling a material pass.
    #[error("Register class '{class}' exhausted (capacity: {capacity})")]
    RegisterCapacityExceeded {
        /// The exhausted class
        class: RegisterClass,
        /// Capacity of the class under the active profile
        capacity: u32,
    },

    // ========================================================================
    // Backend Errors
    // ========================================================================
    /// A backend factory operation was invoked without an implementation.
    #[error("Unsupported backend operation: {0}")]
    UnsupportedOperation(&'static str),

    /// The concrete backend reported a failure.
    #[error("Backend error: {0}")]
    Backend(String),

    // ========================================================================
    // Invalid Arguments
    // ========================================================================
    /// Sampler slot outside of `0..max`.
    #[error("Sampler index {index} out of range (max: {max})")]
    SamplerIndexOutOfRange {
        /// The rejected slot
        index: u32,
        /// Number of available sampler slots
        max: u32,
    },

    /// Blend mode name that does not match any known mode.
    #[error("Unknown blend mode: {0}")]
    UnknownBlendMode(String),

    /// Triangle face name that does not match any known face.
    #[error("Unknown triangle face: {0}")]
    UnknownTriangleFace(String),

    /// Generic invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ========================================================================
    // State Ordering Errors
    // ========================================================================
    /// A draw call was issued before the render target was cleared.
    #[error("Draw call issued without clearing the render target since the last present")]
    DrawWithoutClear,

    /// A per-draw operation was issued while no shader object was active.
    #[error("No shader object is active")]
    NoActiveShaderObject,

    // ========================================================================
    // Lookup Errors
    // ========================================================================
    /// The requested asset handle does not resolve.
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// No rendering context is registered under the given id.
    #[error("Rendering context {0} is not registered")]
    ContextNotFound(u32),
}

/// Alias for `Result<T, StageError>`.
pub type Result<T> = std::result::Result<T, StageError>;
