use slotmap::new_key_type;

use crate::assets::storage::AssetStorage;
use crate::errors::{Result, StageError};
use crate::renderer::passes::{MaterialPass, PickerCounts};
use crate::resources::buffer::{IndexData, VertexData};
use crate::resources::light_picker::LightPicker;
use crate::resources::material::Material;
use crate::resources::texture::Texture;

// Strongly-typed handles
new_key_type! {
    pub struct MaterialHandle;
    pub struct PassHandle;
    pub struct TextureHandle;
    pub struct VertexDataHandle;
    pub struct IndexDataHandle;
    pub struct LightPickerHandle;
}

/// Owner of every logical resource.
///
/// Logical resources carry no per-context state and are shared read-only by
/// all rendering contexts. Relationships that need bookkeeping on both sides
/// (material ↔ pass ownership, pass → light picker subscription) go through
/// the methods here so both sides stay in sync.
#[derive(Debug)]
pub struct AssetServer {
    pub materials: AssetStorage<MaterialHandle, Material>,
    pub passes: AssetStorage<PassHandle, MaterialPass>,
    pub textures: AssetStorage<TextureHandle, Texture>,
    pub vertex_data: AssetStorage<VertexDataHandle, VertexData>,
    pub index_data: AssetStorage<IndexDataHandle, IndexData>,
    pub light_pickers: AssetStorage<LightPickerHandle, LightPicker>,
}

impl Default for AssetServer {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetServer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            materials: AssetStorage::new("material"),
            passes: AssetStorage::new("pass"),
            textures: AssetStorage::new("texture"),
            vertex_data: AssetStorage::new("vertex data"),
            index_data: AssetStorage::new("index data"),
            light_pickers: AssetStorage::new("light picker"),
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    pub fn add_material(&mut self, material: Material) -> MaterialHandle {
        self.materials.add(material)
    }

    pub fn add_pass(&mut self, pass: MaterialPass) -> PassHandle {
        self.passes.add(pass)
    }

    pub fn add_texture(&mut self, texture: Texture) -> TextureHandle {
        self.textures.add(texture)
    }

    pub fn add_vertex_data(&mut self, data: VertexData) -> VertexDataHandle {
        self.vertex_data.add(data)
    }

    pub fn add_index_data(&mut self, data: IndexData) -> IndexDataHandle {
        self.index_data.add(data)
    }

    pub fn add_light_picker(&mut self, picker: LightPicker) -> LightPickerHandle {
        self.light_pickers.add(picker)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn material(&self, handle: MaterialHandle) -> Result<&Material> {
        self.materials.require(handle)
    }

    pub fn material_mut(&mut self, handle: MaterialHandle) -> Result<&mut Material> {
        self.materials.require_mut(handle)
    }

    pub fn pass(&self, handle: PassHandle) -> Result<&MaterialPass> {
        self.passes.require(handle)
    }

    pub fn pass_mut(&mut self, handle: PassHandle) -> Result<&mut MaterialPass> {
        self.passes.require_mut(handle)
    }

    pub fn texture(&self, handle: TextureHandle) -> Result<&Texture> {
        self.textures.require(handle)
    }

    pub fn texture_mut(&mut self, handle: TextureHandle) -> Result<&mut Texture> {
        self.textures.require_mut(handle)
    }

    pub fn vertex_data(&self, handle: VertexDataHandle) -> Result<&VertexData> {
        self.vertex_data.require(handle)
    }

    pub fn vertex_data_mut(&mut self, handle: VertexDataHandle) -> Result<&mut VertexData> {
        self.vertex_data.require_mut(handle)
    }

    pub fn index_data(&self, handle: IndexDataHandle) -> Result<&IndexData> {
        self.index_data.require(handle)
    }

    pub fn index_data_mut(&mut self, handle: IndexDataHandle) -> Result<&mut IndexData> {
        self.index_data.require_mut(handle)
    }

    pub fn light_picker(&self, handle: LightPickerHandle) -> Result<&LightPicker> {
        self.light_pickers.require(handle)
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Appends `pass` to the pass list of `material`.
    pub fn attach_pass(&mut self, material: MaterialHandle, pass: PassHandle) -> Result<()> {
        let target = self.materials.require_mut(material)?;
        let pass_ref = self.passes.require_mut(pass)?;
        if pass_ref.state().has_owner(material) {
            return Err(StageError::InvalidArgument(format!(
                "pass '{}' is already attached to material '{}'",
                pass_ref.name, target.name
            )));
        }
        pass_ref.state_mut().add_owner(material);
        target.passes.push(pass);
        target.mark_changed();
        Ok(())
    }

    /// Removes `pass` from `material`. Compiled state of the pair is released
    /// by the contexts when they dispose the shader object.
    pub fn detach_pass(&mut self, material: MaterialHandle, pass: PassHandle) -> Result<()> {
        let target = self.materials.require_mut(material)?;
        target.passes.retain(|p| *p != pass);
        target.mark_changed();
        if let Some(pass) = self.passes.get_mut(pass) {
            pass.state_mut().remove_owner(material);
        }
        Ok(())
    }

    /// Subscribes `pass` to `picker`, or unsubscribes it with `None`.
    pub fn set_pass_light_picker(&mut self, pass: PassHandle, picker: Option<LightPickerHandle>) -> Result<()> {
        let subscription = match picker {
            Some(handle) => Some((handle, PickerCounts::of(self.light_pickers.require(handle)?))),
            None => None,
        };
        self.passes.require_mut(pass)?.state_mut().set_light_picker(subscription);
        Ok(())
    }

    /// Mutates a light picker and notifies every subscribed pass.
    pub fn update_light_picker(
        &mut self,
        handle: LightPickerHandle,
        update: impl FnOnce(&mut LightPicker),
    ) -> Result<()> {
        let picker = self.light_pickers.require_mut(handle)?;
        update(picker);
        picker.mark_changed();
        let counts = PickerCounts::of(picker);

        for (_, pass) in self.passes.iter_mut() {
            if pass.state().light_picker() == Some(handle) {
                pass.state_mut().picker_changed(counts);
            }
        }
        Ok(())
    }

    /// Assigns the texture of an ambient pass.
    pub fn set_ambient_texture(&mut self, pass: PassHandle, texture: Option<TextureHandle>) -> Result<()> {
        self.assign_texture(pass, texture, "texture", |pass, texture| {
            pass.as_ambient_mut().map(|ambient| ambient.set_texture(texture))
        })
    }

    /// Assigns the light map of an ambient pass.
    pub fn set_light_map(&mut self, pass: PassHandle, texture: Option<TextureHandle>) -> Result<()> {
        self.assign_texture(pass, texture, "light map", |pass, texture| {
            pass.as_ambient_mut().map(|ambient| ambient.set_light_map(texture))
        })
    }

    /// Assigns the normal map of a lighting pass.
    pub fn set_normal_map(&mut self, pass: PassHandle, texture: Option<TextureHandle>) -> Result<()> {
        self.assign_texture(pass, texture, "normal map", |pass, texture| {
            pass.as_lighting_mut().map(|lighting| lighting.set_normal_map(texture))
        })
    }

    fn assign_texture(
        &mut self,
        pass: PassHandle,
        texture: Option<TextureHandle>,
        slot: &str,
        assign: impl FnOnce(&mut MaterialPass, Option<(TextureHandle, &Texture)>) -> Option<()>,
    ) -> Result<()> {
        let texture = match texture {
            Some(handle) => Some((handle, self.textures.require(handle)?)),
            None => None,
        };
        let pass = self.passes.require_mut(pass)?;
        let name = pass.name.clone();
        assign(pass, texture)
            .ok_or_else(|| StageError::InvalidArgument(format!("pass '{name}' has no {slot} slot")))
    }
}
