//! Resource Pool Tests
//!
//! Tests for:
//! - Lazy creation and single upload per version
//! - Re-upload after data changes and explicit invalidation
//! - GPU object recreation when the data shape changes
//! - Cube textures (all faces) and generated mip chains
//! - Per-context independence and disposal

use myth_stage::renderer::core::BackendCommand;
use myth_stage::renderer::core::state::VertexBufferFormat;
use myth_stage::resources::texture::{TextureFormat, TextureSource};
use myth_stage::{
    AssetServer, HeadlessBackend, RenderContext, StageError, StageSettings, Texture, VertexData, VertexStream,
};

fn context() -> RenderContext<HeadlessBackend> {
    RenderContext::new(HeadlessBackend::new(), StageSettings::default()).unwrap()
}

fn uploads(ctx: &RenderContext<HeadlessBackend>) -> usize {
    ctx.backend().count(|c| {
        matches!(
            c,
            BackendCommand::UploadVertexBuffer { .. }
                | BackendCommand::UploadIndexBuffer { .. }
                | BackendCommand::UploadTexture { .. }
        )
    })
}

fn triangle() -> VertexData {
    VertexData::new(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], 3)
}

// ============================================================================
// Vertex Buffers
// ============================================================================

#[test]
fn vertex_data_uploads_once_per_version() {
    let mut assets = AssetServer::new();
    let data = assets.add_vertex_data(triangle());
    let mut ctx = context();

    for _ in 0..3 {
        ctx.activate_buffer(0, VertexStream::new(data), VertexBufferFormat::Float3, &assets)
            .unwrap();
    }

    assert_eq!(
        ctx.backend()
            .count(|c| matches!(c, BackendCommand::CreateVertexBuffer { .. })),
        1
    );
    assert_eq!(uploads(&ctx), 1);
    assert_eq!(ctx.pools().vertex_buffer_entry(data).unwrap().upload_count, 1);
}

#[test]
fn changed_data_reuploads_into_the_same_buffer() {
    let mut assets = AssetServer::new();
    let data = assets.add_vertex_data(triangle());
    let mut ctx = context();
    let stream = VertexStream::new(data);

    ctx.activate_buffer(0, stream, VertexBufferFormat::Float3, &assets).unwrap();
    assets.vertex_data_mut(data).unwrap().data_mut()[0] = 5.0;
    ctx.activate_buffer(0, stream, VertexBufferFormat::Float3, &assets).unwrap();

    assert_eq!(uploads(&ctx), 2);
    assert_eq!(
        ctx.backend()
            .count(|c| matches!(c, BackendCommand::CreateVertexBuffer { .. })),
        1
    );
}

#[test]
fn explicit_invalidation_forces_a_reupload() {
    let mut assets = AssetServer::new();
    let data = assets.add_vertex_data(triangle());
    let mut ctx = context();
    let stream = VertexStream::new(data);

    ctx.activate_buffer(0, stream, VertexBufferFormat::Float3, &assets).unwrap();
    ctx.invalidate_vertex_data(data);
    assert!(ctx.pools().vertex_buffer_entry(data).unwrap().invalid);

    ctx.activate_buffer(0, stream, VertexBufferFormat::Float3, &assets).unwrap();
    assert_eq!(uploads(&ctx), 2);
    assert!(!ctx.pools().vertex_buffer_entry(data).unwrap().invalid);
}

#[test]
fn resized_data_recreates_the_buffer() {
    let mut assets = AssetServer::new();
    let data = assets.add_vertex_data(triangle());
    let mut ctx = context();
    let stream = VertexStream::new(data);

    ctx.activate_buffer(0, stream, VertexBufferFormat::Float3, &assets).unwrap();
    assets.vertex_data_mut(data).unwrap().set_data(vec![0.0; 12]);
    ctx.activate_buffer(0, stream, VertexBufferFormat::Float3, &assets).unwrap();

    assert_eq!(ctx.backend().count(|c| matches!(c, BackendCommand::DisposeVertexBuffer(_))), 1);
    assert!(ctx.backend().commands().contains(&BackendCommand::CreateVertexBuffer {
        buffer: ctx.pools().vertex_buffer_entry(data).unwrap().handle.id,
        num_vertices: 4,
        data_per_vertex: 3,
    }));
}

#[test]
fn index_data_follows_the_same_lifecycle() {
    let mut assets = AssetServer::new();
    let indices = assets.add_index_data(myth_stage::IndexData::new(vec![0, 1, 2]));
    let mut ctx = context();

    ctx.get_index_buffer(indices, &assets).unwrap();
    ctx.get_index_buffer(indices, &assets).unwrap();
    assert_eq!(uploads(&ctx), 1);

    assets.index_data_mut(indices).unwrap().set_indices(vec![0, 1, 2, 2, 1, 3]);
    let buffer = ctx.get_index_buffer(indices, &assets).unwrap();
    assert_eq!(buffer.num_indices, 6);
    assert_eq!(uploads(&ctx), 2);
}

// ============================================================================
// Textures
// ============================================================================

#[test]
fn cube_textures_upload_every_face() {
    let mut assets = AssetServer::new();
    let faces = std::array::from_fn(|_| vec![0u8; 16]);
    let cube = assets.add_texture(Texture::new_cube(2, TextureFormat::Bgra, faces));
    let mut ctx = context();

    ctx.activate_texture(0, cube, &assets).unwrap();

    let faces_uploaded: Vec<u32> = ctx
        .backend()
        .commands()
        .iter()
        .filter_map(|c| match c {
            BackendCommand::UploadTexture { face, level: 0, .. } => Some(*face),
            _ => None,
        })
        .collect();
    assert_eq!(faces_uploaded, vec![0, 1, 2, 3, 4, 5]);

    let desc = ctx.pools().texture_entry(cube).unwrap().handle.desc;
    assert_eq!(desc.dimension, wgpu::TextureViewDimension::Cube);
}

#[test]
fn missing_cube_support_is_reported() {
    let mut assets = AssetServer::new();
    let faces = std::array::from_fn(|_| vec![0u8; 4]);
    let cube = assets.add_texture(Texture::new_cube(1, TextureFormat::Bgra, faces));
    let mut ctx = RenderContext::new(HeadlessBackend::without_cube_textures(), StageSettings::default()).unwrap();

    assert!(matches!(
        ctx.activate_texture(0, cube, &assets),
        Err(StageError::UnsupportedOperation("create_cube_texture"))
    ));
    assert!(ctx.pools().texture_entry(cube).is_none());
}

#[test]
fn generated_mipmaps_upload_the_whole_chain() {
    let mut assets = AssetServer::new();
    let texture = Texture::new_2d(4, 4, TextureFormat::Bgra, vec![255; 64]).with_generated_mipmaps();
    let texture = assets.add_texture(texture);
    let mut ctx = context();

    ctx.activate_texture(0, texture, &assets).unwrap();

    let levels: Vec<(u32, usize)> = ctx
        .backend()
        .commands()
        .iter()
        .filter_map(|c| match c {
            BackendCommand::UploadTexture { level, bytes, .. } => Some((*level, *bytes)),
            _ => None,
        })
        .collect();
    assert_eq!(levels, vec![(0, 64), (1, 16), (2, 4)]);
    assert_eq!(ctx.pools().texture_entry(texture).unwrap().handle.desc.mip_level_count, 3);
}

#[test]
fn resized_texture_gets_a_new_gpu_object() {
    let mut assets = AssetServer::new();
    let texture = assets.add_texture(Texture::new_2d(1, 1, TextureFormat::Bgra, vec![0; 4]));
    let mut ctx = context();

    ctx.activate_texture(0, texture, &assets).unwrap();
    let first = ctx.pools().texture_entry(texture).unwrap().handle.id;

    assets.texture_mut(texture).unwrap().set_source(TextureSource::Image {
        width: 2,
        height: 2,
        levels: vec![vec![0; 16]],
    });
    ctx.activate_texture(0, texture, &assets).unwrap();

    let second = ctx.pools().texture_entry(texture).unwrap().handle.id;
    assert_ne!(first, second);
    assert!(ctx.backend().commands().contains(&BackendCommand::DisposeTexture(first)));
}

#[test]
fn image_turned_cube_gets_a_cube_object() {
    let mut assets = AssetServer::new();
    let texture = assets.add_texture(Texture::new_2d(4, 4, TextureFormat::Bgra, vec![0; 64]));
    let mut ctx = context();

    ctx.activate_texture(0, texture, &assets).unwrap();
    let first = ctx.pools().texture_entry(texture).unwrap().handle.id;

    // Same size and level count; only the kind differs.
    assets.texture_mut(texture).unwrap().set_source(TextureSource::Cube {
        size: 4,
        faces: std::array::from_fn(|_| vec![vec![0; 64]]),
    });
    ctx.activate_texture(0, texture, &assets).unwrap();

    let entry = ctx.pools().texture_entry(texture).unwrap();
    assert_ne!(entry.handle.id, first);
    assert_eq!(entry.handle.desc.dimension, wgpu::TextureViewDimension::Cube);
    assert_eq!(entry.shape.dimension, wgpu::TextureViewDimension::Cube);
    assert!(ctx.backend().commands().contains(&BackendCommand::DisposeTexture(first)));
    assert_eq!(ctx.backend().count(|c| matches!(c, BackendCommand::CreateTexture { .. })), 2);
}

#[test]
fn format_change_gets_a_new_gpu_object() {
    let mut assets = AssetServer::new();
    let texture = assets.add_texture(Texture::new_2d(4, 4, TextureFormat::Bgra, vec![0; 64]));
    let mut ctx = context();

    ctx.activate_texture(0, texture, &assets).unwrap();
    let first = ctx.pools().texture_entry(texture).unwrap().handle.id;

    assets.texture_mut(texture).unwrap().set_format(TextureFormat::Compressed);
    ctx.activate_texture(0, texture, &assets).unwrap();

    let entry = ctx.pools().texture_entry(texture).unwrap();
    assert_ne!(entry.handle.id, first);
    assert_eq!(entry.handle.desc.format, wgpu::TextureFormat::Bc1RgbaUnorm);
    assert!(ctx.backend().commands().contains(&BackendCommand::DisposeTexture(first)));
}

#[test]
fn level_updates_reupload_in_place() {
    let mut assets = AssetServer::new();
    let texture = assets.add_texture(Texture::new_2d(1, 1, TextureFormat::Bgra, vec![0; 4]));
    let mut ctx = context();

    ctx.activate_texture(0, texture, &assets).unwrap();
    assets.texture_mut(texture).unwrap().set_level(None, 0, vec![9; 4]);
    ctx.activate_texture(0, texture, &assets).unwrap();

    assert_eq!(uploads(&ctx), 2);
    assert_eq!(ctx.backend().count(|c| matches!(c, BackendCommand::CreateTexture { .. })), 1);
    assert_eq!(ctx.pools().texture_entry(texture).unwrap().upload_count, 2);
}

// ============================================================================
// Contexts
// ============================================================================

#[test]
fn contexts_keep_independent_pools() {
    let mut assets = AssetServer::new();
    let data = assets.add_vertex_data(triangle());
    let mut first = context();
    let mut second = context();
    let stream = VertexStream::new(data);

    first.activate_buffer(0, stream, VertexBufferFormat::Float3, &assets).unwrap();
    second.activate_buffer(0, stream, VertexBufferFormat::Float3, &assets).unwrap();
    first.dispose_vertex_data(data);

    assert!(first.pools().vertex_buffer_entry(data).is_none());
    assert!(second.pools().vertex_buffer_entry(data).is_some());
    assert_eq!(uploads(&second), 1);
}

#[test]
fn disposed_resources_are_recreated_on_next_use() {
    let mut assets = AssetServer::new();
    let texture = assets.add_texture(Texture::new_2d(1, 1, TextureFormat::Bgra, vec![0; 4]));
    let mut ctx = context();

    ctx.activate_texture(0, texture, &assets).unwrap();
    ctx.dispose_texture(texture);
    ctx.activate_texture(0, texture, &assets).unwrap();

    assert_eq!(ctx.backend().count(|c| matches!(c, BackendCommand::CreateTexture { .. })), 2);
    assert_eq!(ctx.pools().texture_entry(texture).unwrap().upload_count, 1);
}
