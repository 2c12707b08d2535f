//! Texture pool operations

use crate::assets::TextureHandle;
use crate::errors::{Result, StageError};
use crate::renderer::core::backend::{Backend, TextureDescriptor};
use crate::resources::texture::{CUBE_FACES, SamplerType, Texture};

use super::{PoolEntry, ResourcePools};

fn mip_level_count(texture: &Texture) -> u32 {
    if texture.is_render_target() {
        1
    } else {
        (texture.mip_chain(0).len() as u32).max(1)
    }
}

fn texture_descriptor(texture: &Texture) -> TextureDescriptor {
    let (width, height) = texture.size();
    TextureDescriptor {
        width,
        height,
        format: texture.format().native(),
        dimension: texture.sampler_type().native(),
        mip_level_count: mip_level_count(texture),
        render_target: texture.is_render_target(),
    }
}

impl<B: Backend> ResourcePools<B> {
    /// Returns the GPU texture for `handle`, creating and uploading it as
    /// needed.
    ///
    /// Render targets are created but never uploaded. A texture whose
    /// descriptor changed (size, level count, format, cube or 2D, render
    /// target or not) gets a new GPU object.
    pub fn prepare_texture(&mut self, backend: &mut B, handle: TextureHandle, texture: &Texture) -> Result<&B::Texture> {
        let version = texture.version();
        let desc = texture_descriptor(texture);
        let outdated = self
            .textures
            .get(handle)
            .is_some_and(|entry| entry.last_seen_version != version && entry.shape != desc);
        if outdated {
            log::debug!("Texture {handle:?} changed shape, recreating");
            self.dispose_texture(backend, handle);
        }

        if !self.textures.contains_key(handle) {
            let gpu = match texture.sampler_type() {
                SamplerType::Cube => backend.create_cube_texture(&desc)?,
                SamplerType::Texture2d => backend.create_texture(&desc)?,
            };
            log::debug!(
                "Created texture {handle:?} ({}x{}, {} levels, {:?})",
                desc.width,
                desc.height,
                desc.mip_level_count,
                desc.dimension
            );
            self.textures.insert(handle, PoolEntry::new(gpu, version, desc));
        }

        let entry = self
            .textures
            .get_mut(handle)
            .ok_or_else(|| StageError::AssetNotFound(format!("texture {handle:?}")))?;
        entry.observe(version);

        if entry.invalid {
            if texture.is_render_target() {
                entry.invalid = false;
            } else {
                let faces = match texture.sampler_type() {
                    SamplerType::Cube => CUBE_FACES,
                    SamplerType::Texture2d => 1,
                };
                for face in 0..faces {
                    for (level, data) in texture.mip_chain(face).iter().enumerate() {
                        backend.upload_texture(&mut entry.handle, face as u32, level as u32, data)?;
                    }
                }
                entry.mark_uploaded();
                log::debug!("Uploaded texture {handle:?} (upload #{})", entry.upload_count);
            }
        }

        Ok(&entry.handle)
    }

    #[must_use]
    pub fn texture_entry(&self, handle: TextureHandle) -> Option<&PoolEntry<B::Texture, TextureDescriptor>> {
        self.textures.get(handle)
    }

    /// Forces the next access to re-upload.
    pub fn invalidate_texture(&mut self, handle: TextureHandle) {
        if let Some(entry) = self.textures.get_mut(handle) {
            entry.invalid = true;
        }
    }

    pub fn dispose_texture(&mut self, backend: &mut B, handle: TextureHandle) {
        if let Some(entry) = self.textures.remove(handle) {
            backend.dispose_texture(entry.handle);
            log::debug!("Disposed texture {handle:?}");
        }
    }
}
