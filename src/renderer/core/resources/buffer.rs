//! Vertex and index buffer pool operations

use crate::assets::{IndexDataHandle, VertexDataHandle};
use crate::errors::{Result, StageError};
use crate::renderer::core::backend::Backend;
use crate::resources::buffer::{IndexData, VertexData};

use super::{PoolEntry, ResourcePools};

impl<B: Backend> ResourcePools<B> {
    /// Returns the GPU vertex buffer for `handle`, creating and uploading it
    /// as needed. A change in vertex count or stride recreates the buffer.
    pub fn prepare_vertex_buffer(
        &mut self,
        backend: &mut B,
        handle: VertexDataHandle,
        data: &VertexData,
    ) -> Result<&B::VertexBuffer> {
        let version = data.version();
        let shape = [data.num_vertices(), data.data_per_vertex()];
        if self.vertex_buffers.get(handle).is_some_and(|entry| entry.shape != shape) {
            self.dispose_vertex_buffer(backend, handle);
        }

        if !self.vertex_buffers.contains_key(handle) {
            let gpu = backend.create_vertex_buffer(shape[0], shape[1])?;
            log::debug!("Created vertex buffer {handle:?} ({} x {})", shape[0], shape[1]);
            self.vertex_buffers.insert(handle, PoolEntry::new(gpu, version, shape));
        }

        let entry = self
            .vertex_buffers
            .get_mut(handle)
            .ok_or_else(|| StageError::AssetNotFound(format!("vertex data {handle:?}")))?;
        entry.observe(version);

        if entry.invalid {
            backend.upload_vertex_buffer(&mut entry.handle, data.data(), data.num_vertices())?;
            entry.mark_uploaded();
        }
        Ok(&entry.handle)
    }

    /// Returns the GPU index buffer for `handle`, creating and uploading it
    /// as needed.
    pub fn prepare_index_buffer(
        &mut self,
        backend: &mut B,
        handle: IndexDataHandle,
        data: &IndexData,
    ) -> Result<&B::IndexBuffer> {
        let version = data.version();
        let shape = [data.num_indices(), 0];
        if self.index_buffers.get(handle).is_some_and(|entry| entry.shape != shape) {
            self.dispose_index_buffer(backend, handle);
        }

        if !self.index_buffers.contains_key(handle) {
            let gpu = backend.create_index_buffer(shape[0])?;
            log::debug!("Created index buffer {handle:?} ({} indices)", shape[0]);
            self.index_buffers.insert(handle, PoolEntry::new(gpu, version, shape));
        }

        let entry = self
            .index_buffers
            .get_mut(handle)
            .ok_or_else(|| StageError::AssetNotFound(format!("index data {handle:?}")))?;
        entry.observe(version);

        if entry.invalid {
            backend.upload_index_buffer(&mut entry.handle, data.indices())?;
            entry.mark_uploaded();
        }
        Ok(&entry.handle)
    }

    #[must_use]
    pub fn vertex_buffer_entry(&self, handle: VertexDataHandle) -> Option<&PoolEntry<B::VertexBuffer>> {
        self.vertex_buffers.get(handle)
    }

    #[must_use]
    pub fn index_buffer_entry(&self, handle: IndexDataHandle) -> Option<&PoolEntry<B::IndexBuffer>> {
        self.index_buffers.get(handle)
    }

    pub fn invalidate_vertex_buffer(&mut self, handle: VertexDataHandle) {
        if let Some(entry) = self.vertex_buffers.get_mut(handle) {
            entry.invalid = true;
        }
    }

    pub fn invalidate_index_buffer(&mut self, handle: IndexDataHandle) {
        if let Some(entry) = self.index_buffers.get_mut(handle) {
            entry.invalid = true;
        }
    }

    pub fn dispose_vertex_buffer(&mut self, backend: &mut B, handle: VertexDataHandle) {
        if let Some(entry) = self.vertex_buffers.remove(handle) {
            backend.dispose_vertex_buffer(entry.handle);
            log::debug!("Disposed vertex buffer {handle:?}");
        }
    }

    pub fn dispose_index_buffer(&mut self, backend: &mut B, handle: IndexDataHandle) {
        if let Some(entry) = self.index_buffers.remove(handle) {
            backend.dispose_index_buffer(entry.handle);
            log::debug!("Disposed index buffer {handle:?}");
        }
    }
}
