//! Logical geometry buffers.
//!
//! [`VertexData`] and [`IndexData`] hold CPU-side data only. GPU copies live in
//! the per-context pools, which compare the version below with the version
//! they last uploaded.

use crate::resources::version_tracker::{ChangeTracker, MutGuard};

/// Interleaved or planar vertex stream of `f32` values.
#[derive(Debug, Clone)]
pub struct VertexData {
    data: Vec<f32>,
    data_per_vertex: u32,
    tracker: ChangeTracker,
}

impl VertexData {
    #[must_use]
    pub fn new(data: Vec<f32>, data_per_vertex: u32) -> Self {
        Self {
            data,
            data_per_vertex: data_per_vertex.max(1),
            tracker: ChangeTracker::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    #[must_use]
    pub fn data_per_vertex(&self) -> u32 {
        self.data_per_vertex
    }

    #[inline]
    #[must_use]
    pub fn num_vertices(&self) -> u32 {
        self.data.len() as u32 / self.data_per_vertex
    }

    /// Replaces the whole payload.
    pub fn set_data(&mut self, data: Vec<f32>) {
        self.data = data;
        self.tracker.changed();
    }

    /// Mutable access; every GPU copy is re-uploaded in full afterwards.
    pub fn data_mut(&mut self) -> MutGuard<'_, Vec<f32>> {
        MutGuard::new(&mut self.data, &mut self.tracker)
    }

    /// Forces every GPU copy to re-upload without touching the data.
    pub fn invalidate(&mut self) {
        self.tracker.changed();
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.tracker.version()
    }
}

/// Triangle list indices.
#[derive(Debug, Clone)]
pub struct IndexData {
    indices: Vec<u16>,
    tracker: ChangeTracker,
}

impl IndexData {
    #[must_use]
    pub fn new(indices: Vec<u16>) -> Self {
        Self {
            indices,
            tracker: ChangeTracker::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    #[inline]
    #[must_use]
    pub fn num_indices(&self) -> u32 {
        self.indices.len() as u32
    }

    #[inline]
    #[must_use]
    pub fn num_triangles(&self) -> u32 {
        self.num_indices() / 3
    }

    pub fn set_indices(&mut self, indices: Vec<u16>) {
        self.indices = indices;
        self.tracker.changed();
    }

    pub fn invalidate(&mut self) {
        self.tracker.changed();
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.tracker.version()
    }
}
