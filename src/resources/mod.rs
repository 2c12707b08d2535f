//! Logical resources
//!
//! CPU-side descriptions shared read-only by every rendering context:
//! - Material: ordered pass list and code-shaping properties
//! - Texture: 2D, cube and render-target textures
//! - VertexData / IndexData: geometry streams
//! - LightPicker: lights feeding the lit passes
//!
//! None of these hold GPU handles. Each carries a version that the
//! per-context pools compare against to decide when to re-upload.

pub mod buffer;
pub mod light_picker;
pub mod material;
pub mod texture;
pub mod version_tracker;

pub use buffer::{IndexData, VertexData};
pub use light_picker::{DirectionalLight, LightPicker, LightProbe, PointLight};
pub use material::Material;
pub use texture::{SamplerType, Texture, TextureFormat, TextureSource};
pub use version_tracker::{ChangeTracker, MutGuard};
