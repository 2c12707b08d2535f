//! Stage Settings
//!
//! Configuration consumed when a rendering context is created. Everything
//! here is plain data; nothing is re-read after the context exists except
//! the light budgets, which new passes pick up through [`StageSettings::pass_defaults`].
//!
//! ```rust,ignore
//! use myth_stage::{Profile, StageSettings};
//!
//! let settings = StageSettings {
//!     profile: Profile::Extended,
//!     max_lights: 6,
//!     ..Default::default()
//! };
//! ```

use crate::renderer::pipeline::registers::Profile;

/// Back buffer configuration applied on context creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackBufferConfig {
    pub width: u32,
    pub height: u32,
    /// Multisample level; 0 disables anti-aliasing.
    pub anti_alias: u32,
    pub enable_depth_and_stencil: bool,
}

impl Default for BackBufferConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            anti_alias: 0,
            enable_depth_and_stencil: true,
        }
    }
}

/// Global configuration for a rendering context.
///
/// # Fields
///
/// | Field              | Description                                | Default          |
/// |--------------------|--------------------------------------------|------------------|
/// | `profile`          | Register capacity tier programs compile for| `Baseline`       |
/// | `max_lights`       | Light budget shared by directional + point | `3`              |
/// | `max_light_probes` | Light probe budget                         | `4`              |
/// | `back_buffer`      | Back buffer size and depth/stencil         | 800×600, depth   |
/// | `clear_color`      | Default clear colour                       | Black (0,0,0,1)  |
#[derive(Debug, Clone)]
pub struct StageSettings {
    /// Capability tier of the device. Decides every register class capacity.
    pub profile: Profile,

    // === Lighting Budgets ===
    /// Upper bound of directional plus point lights one pass shades with.
    ///
    /// Pickers that report more lights are truncated, never rejected.
    pub max_lights: u32,

    pub max_light_probes: u32,

    // === Back Buffer ===
    pub back_buffer: BackBufferConfig,

    pub clear_color: wgpu::Color,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            profile: Profile::Baseline,
            max_lights: 3,
            max_light_probes: 4,
            back_buffer: BackBufferConfig::default(),
            clear_color: wgpu::Color {
                r: 0.0,
                g: 0.0,
                b: 0.0,
                a: 1.0,
            },
        }
    }
}

impl StageSettings {
    /// `(max_lights, max_light_probes)` for newly created passes.
    #[inline]
    #[must_use]
    pub fn pass_defaults(&self) -> (u32, u32) {
        (self.max_lights, self.max_light_probes)
    }
}
