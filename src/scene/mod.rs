//! Scene-side inputs
//!
//! The scene graph lives outside this crate. Draw calls only need the camera
//! and, per renderable, its transform and geometry handles; both are consumed
//! as opaque numeric data for constant upload.

use glam::{Affine2, Mat4, Vec3};

use crate::assets::{IndexDataHandle, VertexDataHandle};

/// Handedness of the camera's coordinate system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CoordinateSystem {
    #[default]
    LeftHanded,
    RightHanded,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub scene_position: Vec3,
    pub view_projection: Mat4,
    pub coordinate_system: CoordinateSystem,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            scene_position: Vec3::ZERO,
            view_projection: Mat4::IDENTITY,
            coordinate_system: CoordinateSystem::LeftHanded,
        }
    }
}

/// Vertex stream bound to a renderable, with its float offset per vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexStream {
    pub data: VertexDataHandle,
    pub offset: u32,
}

impl VertexStream {
    #[must_use]
    pub fn new(data: VertexDataHandle) -> Self {
        Self { data, offset: 0 }
    }
}

/// One drawable sub-mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Renderable {
    pub scene_transform: Mat4,
    pub uv_transform: Affine2,
    pub positions: VertexStream,
    pub uvs: Option<VertexStream>,
    pub secondary_uvs: Option<VertexStream>,
    pub normals: Option<VertexStream>,
    pub tangents: Option<VertexStream>,
    pub indices: IndexDataHandle,
    pub num_triangles: u32,
}

impl Renderable {
    #[must_use]
    pub fn new(positions: VertexDataHandle, indices: IndexDataHandle, num_triangles: u32) -> Self {
        Self {
            scene_transform: Mat4::IDENTITY,
            uv_transform: Affine2::IDENTITY,
            positions: VertexStream::new(positions),
            uvs: None,
            secondary_uvs: None,
            normals: None,
            tangents: None,
            indices,
            num_triangles,
        }
    }
}
