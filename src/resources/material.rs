//! Material
//!
//! A material is an ordered list of passes plus the properties that shape the
//! code of every pass it owns (alpha threshold, sampling flags, animation).
//! Changing any of them bumps the material version, which stales every
//! compiled shader object and render order derived from it.

use std::sync::Arc;

use crate::animation::AnimationSet;
use crate::assets::PassHandle;
use crate::resources::version_tracker::ChangeTracker;

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    alpha_threshold: f32,
    alpha_premultiplied: bool,
    both_sides: bool,
    mipmap: bool,
    smooth: bool,
    repeat: bool,
    animate_uvs: bool,
    animation_set: Option<Arc<dyn AnimationSet>>,
    animated_owners: u32,
    pub(crate) passes: Vec<PassHandle>,
    tracker: ChangeTracker,
}

impl Default for Material {
    fn default() -> Self {
        Self::new("Material")
    }
}

macro_rules! material_flag {
    ($get:ident, $set:ident, $ty:ty) => {
        #[inline]
        #[must_use]
        pub fn $get(&self) -> $ty {
            self.$get
        }

        pub fn $set(&mut self, value: $ty) {
            if self.$get != value {
                self.$get = value;
                self.tracker.changed();
            }
        }
    };
}

impl Material {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alpha_threshold: 0.0,
            alpha_premultiplied: false,
            both_sides: false,
            mipmap: true,
            smooth: true,
            repeat: false,
            animate_uvs: false,
            animation_set: None,
            animated_owners: 0,
            passes: Vec::new(),
            tracker: ChangeTracker::new(),
        }
    }

    material_flag!(alpha_threshold, set_alpha_threshold, f32);
    material_flag!(alpha_premultiplied, set_alpha_premultiplied, bool);
    material_flag!(both_sides, set_both_sides, bool);
    material_flag!(mipmap, set_mipmap, bool);
    material_flag!(smooth, set_smooth, bool);
    material_flag!(repeat, set_repeat, bool);
    material_flag!(animate_uvs, set_animate_uvs, bool);

    #[must_use]
    pub fn animation_set(&self) -> Option<&Arc<dyn AnimationSet>> {
        self.animation_set.as_ref()
    }

    pub fn set_animation_set(&mut self, set: Option<Arc<dyn AnimationSet>>) {
        self.animation_set = set;
        self.tracker.changed();
    }

    /// Number of renderables using this material that carry an animator.
    #[inline]
    #[must_use]
    pub fn animated_owners(&self) -> u32 {
        self.animated_owners
    }

    pub fn add_animated_owner(&mut self) {
        self.animated_owners += 1;
        self.tracker.changed();
    }

    pub fn remove_animated_owner(&mut self) {
        self.animated_owners = self.animated_owners.saturating_sub(1);
        self.tracker.changed();
    }

    #[inline]
    #[must_use]
    pub fn passes(&self) -> &[PassHandle] {
        &self.passes
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
