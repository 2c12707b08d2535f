//! Asset storage.
//!
//! Logical resources live in typed slotmap stores and are addressed by
//! `Copy` handles. Rendering contexts key their GPU-side records by the same
//! handles.

pub mod server;
pub mod storage;

pub use server::{
    AssetServer, IndexDataHandle, LightPickerHandle, MaterialHandle, PassHandle, TextureHandle,
    VertexDataHandle,
};
pub use storage::AssetStorage;
