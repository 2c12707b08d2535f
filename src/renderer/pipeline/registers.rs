//! Virtual Register Allocation
//!
//! The target instruction set exposes seven independent register banks, each
//! with a profile-dependent capacity:
//!
//! | Class              | Prefix | Allocation                     |
//! |--------------------|--------|--------------------------------|
//! | vertex-attribute   | `va`   | monotonic, never reused        |
//! | vertex-temporary   | `vt`   | usage counted, per component   |
//! | vertex-constant    | `vc`   | monotonic, never reused        |
//! | varying            | `v`    | monotonic, never reused        |
//! | fragment-temporary | `ft`   | usage counted                  |
//! | fragment-constant  | `fc`   | monotonic, never reused        |
//! | texture-sampler    | `fs`   | monotonic, never reused        |
//!
//! A [`RegisterAllocator`] lives for exactly one compilation. Running out of
//! slots in any class is fatal for that compilation; there is no spilling.

use std::fmt;

use bitflags::bitflags;

use crate::errors::{Result, StageError};

// ============================================================================
// Register Classes
// ============================================================================

/// A capacity-bounded bank of virtual GPU registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterClass {
    VertexAttribute,
    VertexTemp,
    VertexConstant,
    Varying,
    FragmentTemp,
    FragmentConstant,
    TextureSampler,
}

impl RegisterClass {
    pub const ALL: [Self; 7] = [
        Self::VertexAttribute,
        Self::VertexTemp,
        Self::VertexConstant,
        Self::Varying,
        Self::FragmentTemp,
        Self::FragmentConstant,
        Self::TextureSampler,
    ];

    /// Assembly prefix used when the register is rendered as source text.
    #[inline]
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::VertexAttribute => "va",
            Self::VertexTemp => "vt",
            Self::VertexConstant => "vc",
            Self::Varying => "v",
            Self::FragmentTemp => "ft",
            Self::FragmentConstant => "fc",
            Self::TextureSampler => "fs",
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_temporary(self) -> bool {
        matches!(self, Self::VertexTemp | Self::FragmentTemp)
    }

    #[inline]
    const fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for RegisterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::VertexAttribute => "vertex-attribute",
            Self::VertexTemp => "vertex-temporary",
            Self::VertexConstant => "vertex-constant",
            Self::Varying => "varying",
            Self::FragmentTemp => "fragment-temporary",
            Self::FragmentConstant => "fragment-constant",
            Self::TextureSampler => "texture-sampler",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Component selection of a four-wide vector register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ComponentMask: u8 {
        const X = 0b0001;
        const Y = 0b0010;
        const Z = 0b0100;
        const W = 0b1000;
        const XYZ = Self::X.bits() | Self::Y.bits() | Self::Z.bits();
        const XYZW = Self::XYZ.bits() | Self::W.bits();
    }
}

impl ComponentMask {
    /// Single-component mask for component `index` (0 = x .. 3 = w).
    #[inline]
    #[must_use]
    pub fn component(index: usize) -> Self {
        Self::from_bits_truncate(1 << (index & 3))
    }

    fn components(self) -> impl Iterator<Item = usize> {
        (0..4).filter(move |i| self.bits() & (1 << i) != 0)
    }
}

// ============================================================================
// Register Handles
// ============================================================================

/// A uniquely-named register issued by a [`RegisterAllocator`].
///
/// Renders as source text, e.g. `vt1`, `fc3.w`, `va0.xyz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterHandle {
    class: RegisterClass,
    index: u32,
    mask: ComponentMask,
}

impl RegisterHandle {
    #[inline]
    #[must_use]
    pub const fn new(class: RegisterClass, index: u32) -> Self {
        Self {
            class,
            index,
            mask: ComponentMask::XYZW,
        }
    }

    #[inline]
    #[must_use]
    pub const fn class(self) -> RegisterClass {
        self.class
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[inline]
    #[must_use]
    pub const fn mask(self) -> ComponentMask {
        self.mask
    }

    /// Same physical register restricted to `mask`.
    #[inline]
    #[must_use]
    pub const fn swizzle(self, mask: ComponentMask) -> Self {
        Self {
            class: self.class,
            index: self.index,
            mask,
        }
    }

    #[inline]
    #[must_use]
    pub const fn x(self) -> Self {
        self.swizzle(ComponentMask::X)
    }

    #[inline]
    #[must_use]
    pub const fn y(self) -> Self {
        self.swizzle(ComponentMask::Y)
    }

    #[inline]
    #[must_use]
    pub const fn z(self) -> Self {
        self.swizzle(ComponentMask::Z)
    }

    #[inline]
    #[must_use]
    pub const fn w(self) -> Self {
        self.swizzle(ComponentMask::W)
    }

    #[inline]
    #[must_use]
    pub const fn xyz(self) -> Self {
        self.swizzle(ComponentMask::XYZ)
    }

    /// The register `n` slots after this one in the same class.
    ///
    /// Used to address the rows of matrices reserved as a block.
    #[inline]
    #[must_use]
    pub const fn offset_by(self, n: u32) -> Self {
        Self {
            class: self.class,
            index: self.index + n,
            mask: self.mask,
        }
    }

    /// Float offset of this register inside a constant data array.
    #[inline]
    #[must_use]
    pub const fn constant_offset(self) -> usize {
        self.index as usize * 4
    }
}

impl fmt::Display for RegisterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.class.prefix(), self.index)?;
        if self.mask != ComponentMask::XYZW {
            f.write_str(".")?;
            for c in self.mask.components() {
                f.write_str(["x", "y", "z", "w"][c])?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Profiles
// ============================================================================

/// Per-class register capacities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterLimits {
    pub vertex_attributes: u32,
    pub vertex_temps: u32,
    pub vertex_constants: u32,
    pub varyings: u32,
    pub fragment_temps: u32,
    pub fragment_constants: u32,
    pub texture_samplers: u32,
}

impl RegisterLimits {
    #[inline]
    #[must_use]
    pub const fn capacity(&self, class: RegisterClass) -> u32 {
        match class {
            RegisterClass::VertexAttribute => self.vertex_attributes,
            RegisterClass::VertexTemp => self.vertex_temps,
            RegisterClass::VertexConstant => self.vertex_constants,
            RegisterClass::Varying => self.varyings,
            RegisterClass::FragmentTemp => self.fragment_temps,
            RegisterClass::FragmentConstant => self.fragment_constants,
            RegisterClass::TextureSampler => self.texture_samplers,
        }
    }
}

/// Capability tier of the target device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Profile {
    /// Minimum tier: eight slots in every class.
    Constrained,
    #[default]
    Baseline,
    Extended,
}

impl Profile {
    #[must_use]
    pub const fn limits(self) -> RegisterLimits {
        match self {
            Self::Constrained => RegisterLimits {
                vertex_attributes: 8,
                vertex_temps: 8,
                vertex_constants: 8,
                varyings: 8,
                fragment_temps: 8,
                fragment_constants: 8,
                texture_samplers: 8,
            },
            Self::Baseline => RegisterLimits {
                vertex_attributes: 8,
                vertex_temps: 8,
                vertex_constants: 128,
                varyings: 8,
                fragment_temps: 8,
                fragment_constants: 28,
                texture_samplers: 8,
            },
            Self::Extended => RegisterLimits {
                vertex_attributes: 8,
                vertex_temps: 26,
                vertex_constants: 250,
                varyings: 10,
                fragment_temps: 26,
                fragment_constants: 64,
                texture_samplers: 16,
            },
        }
    }
}

// ============================================================================
// Allocator
// ============================================================================

type ComponentUsage = [u32; 4];

/// Tracks free and used slots per register class for one compilation.
///
/// Non-temporary classes hand out indices monotonically and never reuse them.
/// Temporaries are usage counted per component: [`allocate`](Self::allocate)
/// returns the lowest register whose components are all unused, but the slot
/// is only reserved once [`retain`](Self::retain) adds usages. An unretained
/// temporary is scratch space that the next allocation may hand out again.
#[derive(Debug, Clone)]
pub struct RegisterAllocator {
    limits: RegisterLimits,
    issued: [u32; 7],
    vertex_temps: Vec<ComponentUsage>,
    fragment_temps: Vec<ComponentUsage>,
}

impl RegisterAllocator {
    #[must_use]
    pub fn new(profile: Profile) -> Self {
        Self::with_limits(profile.limits())
    }

    #[must_use]
    pub fn with_limits(limits: RegisterLimits) -> Self {
        Self {
            limits,
            issued: [0; 7],
            vertex_temps: vec![[0; 4]; limits.vertex_temps as usize],
            fragment_temps: vec![[0; 4]; limits.fragment_temps as usize],
        }
    }

    #[inline]
    #[must_use]
    pub fn limits(&self) -> &RegisterLimits {
        &self.limits
    }

    /// Clears every class back to empty.
    pub fn reset(&mut self) {
        self.issued = [0; 7];
        self.vertex_temps.fill([0; 4]);
        self.fragment_temps.fill([0; 4]);
    }

    /// Issues the next free register of `class`.
    pub fn allocate(&mut self, class: RegisterClass) -> Result<RegisterHandle> {
        if let Some(temps) = self.temps(class) {
            return temps
                .iter()
                .position(|usage| usage.iter().all(|&u| u == 0))
                .map(|i| RegisterHandle::new(class, i as u32))
                .ok_or_else(|| self.exhausted(class));
        }

        let next = self.issued[class.slot()];
        if next >= self.limits.capacity(class) {
            return Err(self.exhausted(class));
        }
        self.issued[class.slot()] = next + 1;
        Ok(RegisterHandle::new(class, next))
    }

    /// Issues `count` consecutive registers of a non-temporary class and
    /// returns the first one.
    pub fn allocate_block(&mut self, class: RegisterClass, count: u32) -> Result<RegisterHandle> {
        if class.is_temporary() {
            return Err(StageError::InvalidArgument(format!(
                "block allocation is not available for {class}"
            )));
        }
        let first = self.issued[class.slot()];
        if first + count > self.limits.capacity(class) {
            return Err(self.exhausted(class));
        }
        self.issued[class.slot()] = first + count;
        Ok(RegisterHandle::new(class, first))
    }

    /// Issues a single free component of a vertex temporary, e.g. `vt2.y`.
    pub fn allocate_component(&mut self, class: RegisterClass) -> Result<RegisterHandle> {
        if class != RegisterClass::VertexTemp {
            return Err(StageError::InvalidArgument(format!(
                "component allocation is not available for {class}"
            )));
        }
        self.vertex_temps
            .iter()
            .enumerate()
            .find_map(|(i, usage)| {
                usage.iter().position(|&u| u == 0).map(|c| {
                    RegisterHandle::new(class, i as u32).swizzle(ComponentMask::component(c))
                })
            })
            .ok_or_else(|| self.exhausted(class))
    }

    /// Adds `count` usages to every component of a temporary.
    ///
    /// Non-temporary registers are permanently reserved on allocation, so
    /// this is a no-op for them.
    pub fn retain(&mut self, handle: RegisterHandle, count: u32) {
        let Some(temps) = self.temps_mut(handle.class()) else {
            return;
        };
        if let Some(usage) = temps.get_mut(handle.index() as usize) {
            for c in handle.mask().components() {
                usage[c] += count;
            }
        }
    }

    /// Drops one usage of a temporary; it becomes reusable at zero.
    pub fn release(&mut self, handle: RegisterHandle) {
        let Some(temps) = self.temps_mut(handle.class()) else {
            return;
        };
        if let Some(usage) = temps.get_mut(handle.index() as usize) {
            for c in handle.mask().components() {
                if usage[c] == 0 {
                    log::warn!("Released {handle} more often than it was retained");
                } else {
                    usage[c] -= 1;
                }
            }
        }
    }

    /// Current usage count of a temporary (maximum over its components).
    #[must_use]
    pub fn usage(&self, handle: RegisterHandle) -> u32 {
        self.temps(handle.class())
            .and_then(|temps| temps.get(handle.index() as usize))
            .map_or(0, |usage| {
                handle.mask().components().map(|c| usage[c]).max().unwrap_or(0)
            })
    }

    /// Number of registers of `class` issued so far (temporaries: currently live).
    #[must_use]
    pub fn allocated(&self, class: RegisterClass) -> u32 {
        match self.temps(class) {
            Some(temps) => temps.iter().filter(|u| u.iter().any(|&c| c > 0)).count() as u32,
            None => self.issued[class.slot()],
        }
    }

    fn exhausted(&self, class: RegisterClass) -> StageError {
        StageError::RegisterCapacityExceeded {
            class,
            capacity: self.limits.capacity(class),
        }
    }

    fn temps(&self, class: RegisterClass) -> Option<&[ComponentUsage]> {
        match class {
            RegisterClass::VertexTemp => Some(&self.vertex_temps),
            RegisterClass::FragmentTemp => Some(&self.fragment_temps),
            _ => None,
        }
    }

    fn temps_mut(&mut self, class: RegisterClass) -> Option<&mut Vec<ComponentUsage>> {
        match class {
            RegisterClass::VertexTemp => Some(&mut self.vertex_temps),
            RegisterClass::FragmentTemp => Some(&mut self.fragment_temps),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_render_as_assembly() {
        let vt = RegisterHandle::new(RegisterClass::VertexTemp, 3);
        assert_eq!(vt.to_string(), "vt3");
        assert_eq!(vt.xyz().to_string(), "vt3.xyz");
        assert_eq!(RegisterHandle::new(RegisterClass::Varying, 1).w().to_string(), "v1.w");
        assert_eq!(
            RegisterHandle::new(RegisterClass::FragmentConstant, 0)
                .swizzle(ComponentMask::X | ComponentMask::W)
                .to_string(),
            "fc0.xw"
        );
    }

    #[test]
    fn constants_are_never_reused() {
        let mut alloc = RegisterAllocator::new(Profile::Baseline);
        let a = alloc.allocate(RegisterClass::VertexConstant).unwrap();
        let b = alloc.allocate(RegisterClass::VertexConstant).unwrap();
        assert_ne!(a.index(), b.index());
        alloc.release(a);
        let c = alloc.allocate(RegisterClass::VertexConstant).unwrap();
        assert_eq!(c.index(), 2);
        assert_eq!(alloc.allocated(RegisterClass::VertexConstant), 3);
    }

    #[test]
    fn capacity_overflow_is_an_error() {
        let mut alloc = RegisterAllocator::new(Profile::Constrained);
        for _ in 0..8 {
            alloc.allocate(RegisterClass::Varying).unwrap();
        }
        let err = alloc.allocate(RegisterClass::Varying).unwrap_err();
        assert!(matches!(
            err,
            StageError::RegisterCapacityExceeded {
                class: RegisterClass::Varying,
                capacity: 8
            }
        ));
    }

    #[test]
    fn temporaries_free_at_zero_usage() {
        let mut alloc = RegisterAllocator::new(Profile::Baseline);
        let t0 = alloc.allocate(RegisterClass::FragmentTemp).unwrap();
        alloc.retain(t0, 2);

        let t1 = alloc.allocate(RegisterClass::FragmentTemp).unwrap();
        assert_ne!(t0.index(), t1.index());

        alloc.release(t0);
        assert_eq!(alloc.allocate(RegisterClass::FragmentTemp).unwrap().index(), 1);
        alloc.release(t0);
        assert_eq!(alloc.usage(t0), 0);
        assert_eq!(alloc.allocate(RegisterClass::FragmentTemp).unwrap().index(), 0);
    }

    #[test]
    fn vertex_temp_components_share_a_register() {
        let mut alloc = RegisterAllocator::new(Profile::Baseline);
        let a = alloc.allocate_component(RegisterClass::VertexTemp).unwrap();
        alloc.retain(a, 1);
        let b = alloc.allocate_component(RegisterClass::VertexTemp).unwrap();
        assert_eq!(a.index(), b.index());
        assert_ne!(a.mask(), b.mask());

        // A whole-vector request must skip the partially used register.
        let v = alloc.allocate(RegisterClass::VertexTemp).unwrap();
        assert_eq!(v.index(), 1);
    }

    #[test]
    fn component_allocation_is_vertex_temp_only() {
        let mut alloc = RegisterAllocator::new(Profile::Baseline);
        assert!(matches!(
            alloc.allocate_component(RegisterClass::FragmentTemp),
            Err(StageError::InvalidArgument(_))
        ));
    }

    #[test]
    fn reset_clears_every_class() {
        let mut alloc = RegisterAllocator::new(Profile::Baseline);
        alloc.allocate_block(RegisterClass::VertexConstant, 4).unwrap();
        let t = alloc.allocate(RegisterClass::VertexTemp).unwrap();
        alloc.retain(t, 1);
        alloc.reset();
        assert_eq!(alloc.allocated(RegisterClass::VertexConstant), 0);
        assert_eq!(alloc.allocated(RegisterClass::VertexTemp), 0);
    }
}
