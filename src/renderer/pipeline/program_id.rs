//! Strongly-typed program handle.
//!
//! A thin `Copy` wrapper around the slot a compiled program occupies in the
//! [`ProgramCache`] id table. Slots are reused after disposal, so an id is
//! only meaningful while the program it was issued for is alive.
//!
//! [`ProgramCache`]: super::program_cache::ProgramCache

/// Small integer identity of a compiled program within one context.
///
/// Render order ids are composed from these, so they stay small: the cache
/// always hands out the lowest free slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub(crate) u32);

impl ProgramId {
    /// Raw slot index.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    #[must_use]
    pub fn value(self) -> u64 {
        u64::from(self.0)
    }
}
