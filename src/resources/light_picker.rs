//! Light picker
//!
//! Supplies the lights a lit pass shades with. Passes read the counts to size
//! their generated code and the light data to fill constants on activation.

use glam::Vec3;

use crate::resources::version_tracker::ChangeTracker;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels in, world space.
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightProbe {
    pub color: Vec3,
}

#[derive(Debug, Clone, Default)]
pub struct LightPicker {
    pub directional_lights: Vec<DirectionalLight>,
    pub point_lights: Vec<PointLight>,
    pub casting_directional_lights: Vec<DirectionalLight>,
    pub casting_point_lights: Vec<PointLight>,
    pub light_probes: Vec<LightProbe>,
    tracker: ChangeTracker,
}

impl LightPicker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn num_directional_lights(&self) -> u32 {
        self.directional_lights.len() as u32
    }

    #[inline]
    #[must_use]
    pub fn num_point_lights(&self) -> u32 {
        self.point_lights.len() as u32
    }

    #[inline]
    #[must_use]
    pub fn num_casting_directional_lights(&self) -> u32 {
        self.casting_directional_lights.len() as u32
    }

    #[inline]
    #[must_use]
    pub fn num_casting_point_lights(&self) -> u32 {
        self.casting_point_lights.len() as u32
    }

    #[inline]
    #[must_use]
    pub fn num_light_probes(&self) -> u32 {
        self.light_probes.len() as u32
    }

    /// Directional lights in shading order, optionally followed by casters.
    pub fn directional(&self, include_casters: bool) -> impl Iterator<Item = &DirectionalLight> {
        let casters: &[DirectionalLight] = if include_casters {
            &self.casting_directional_lights
        } else {
            &[]
        };
        self.directional_lights.iter().chain(casters)
    }

    /// Point lights in shading order, optionally followed by casters.
    pub fn points(&self, include_casters: bool) -> impl Iterator<Item = &PointLight> {
        let casters: &[PointLight] = if include_casters {
            &self.casting_point_lights
        } else {
            &[]
        };
        self.point_lights.iter().chain(casters)
    }

    pub(crate) fn mark_changed(&mut self) {
        self.tracker.changed();
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.tracker.version()
    }
}
