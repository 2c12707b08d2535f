//! Per-context GPU resource pools
//!
//! Maps logical resources to the GPU objects one rendering context created
//! for them. The same texture or buffer may have independent entries in
//! several contexts at once; nothing here is shared between contexts.
//!
//! Split by resource kind:
//! - texture.rs: 2D, cube and render-target textures
//! - buffer.rs: vertex and index buffers
//!
//! Every kind follows the same lazy pattern: the first access creates the
//! GPU object sized from the logical data and marks the entry invalid; any
//! access of an invalid entry uploads the whole payload and clears the flag.
//! A logical resource whose version moved since the last access becomes
//! invalid again. Uploads are never partial.

mod buffer;
mod texture;

use slotmap::SecondaryMap;

use crate::assets::{IndexDataHandle, TextureHandle, VertexDataHandle};
use crate::renderer::core::backend::{Backend, TextureDescriptor};

// ============================================================================
// Pool Entry
// ============================================================================

/// GPU-side record of one logical resource in one context.
///
/// `S` is the shape the GPU object was created with: element counts for
/// buffers, the full [`TextureDescriptor`](crate::renderer::core::backend::TextureDescriptor)
/// for textures. A logical resource whose shape no longer matches gets a new
/// GPU object.
#[derive(Debug)]
pub struct PoolEntry<H, S = [u32; 2]> {
    pub handle: H,
    /// Set until the current data has been uploaded.
    pub invalid: bool,
    /// Number of full uploads performed so far.
    pub upload_count: u32,
    pub shape: S,
    last_seen_version: u64,
}

impl<H, S> PoolEntry<H, S> {
    fn new(handle: H, version: u64, shape: S) -> Self {
        Self {
            handle,
            invalid: true,
            upload_count: 0,
            shape,
            last_seen_version: version,
        }
    }

    fn observe(&mut self, version: u64) {
        if version != self.last_seen_version {
            self.last_seen_version = version;
            self.invalid = true;
        }
    }

    fn mark_uploaded(&mut self) {
        self.invalid = false;
        self.upload_count += 1;
    }
}

// ============================================================================
// Pools
// ============================================================================

pub struct ResourcePools<B: Backend> {
    textures: SecondaryMap<TextureHandle, PoolEntry<B::Texture, TextureDescriptor>>,
    vertex_buffers: SecondaryMap<VertexDataHandle, PoolEntry<B::VertexBuffer>>,
    index_buffers: SecondaryMap<IndexDataHandle, PoolEntry<B::IndexBuffer>>,
}

impl<B: Backend> Default for ResourcePools<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> ResourcePools<B> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            textures: SecondaryMap::new(),
            vertex_buffers: SecondaryMap::new(),
            index_buffers: SecondaryMap::new(),
        }
    }

    /// Destroys every GPU object of this context.
    pub fn dispose_all(&mut self, backend: &mut B) {
        let (textures, vertex_buffers, index_buffers) = (
            self.textures.len(),
            self.vertex_buffers.len(),
            self.index_buffers.len(),
        );
        for (_, entry) in self.textures.drain() {
            backend.dispose_texture(entry.handle);
        }
        for (_, entry) in self.vertex_buffers.drain() {
            backend.dispose_vertex_buffer(entry.handle);
        }
        for (_, entry) in self.index_buffers.drain() {
            backend.dispose_index_buffer(entry.handle);
        }
        log::debug!(
            "Disposed pools: {textures} textures, {vertex_buffers} vertex buffers, {index_buffers} index buffers"
        );
    }
}
