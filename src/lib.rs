#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod animation;
pub mod assets;
pub mod errors;
pub mod renderer;
pub mod resources;
pub mod scene;

pub use animation::AnimationSet;
pub use assets::{AssetServer, IndexDataHandle, LightPickerHandle, MaterialHandle, PassHandle, TextureHandle, VertexDataHandle};
pub use errors::{Result, StageError};
pub use renderer::pipeline::Profile;
pub use renderer::{
    Backend, BackBufferConfig, ContextId, ContextRegistry, HeadlessBackend, MaterialPass, PassKind, PassOwner,
    RenderContext, StageSettings,
};
pub use resources::{IndexData, LightPicker, Material, Texture, VertexData};
pub use scene::{Camera, CoordinateSystem, Renderable, VertexStream};
