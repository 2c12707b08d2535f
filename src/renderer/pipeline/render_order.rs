//! Render order ids.
//!
//! A material's render order id identifies the combination of programs its
//! passes compile to; sorting draws by it groups identical program sequences.
//! The id is `Σ program_id × 1000^pass_index`.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::assets::MaterialHandle;
use crate::renderer::pipeline::program_id::ProgramId;
use crate::renderer::pipeline::registers::Profile;

/// Base of the positional encoding of per-pass program ids.
pub const RENDER_ORDER_BASE: u64 = 1000;

/// Versions a render order was derived from: the material version followed
/// by each pass's state version, code version, packed texture signatures
/// and owner version.
pub type RenderOrderStamp = SmallVec<[u64; 10]>;

#[must_use]
pub fn combine_ids(ids: &[ProgramId]) -> u64 {
    ids.iter()
        .rev()
        .fold(0u64, |acc, id| acc.wrapping_mul(RENDER_ORDER_BASE).wrapping_add(id.value()))
}

#[derive(Debug, Clone)]
struct RenderOrderEntry {
    stamp: RenderOrderStamp,
    id: u64,
}

/// Cached render order ids per `(material, profile)`.
#[derive(Debug, Default)]
pub struct RenderOrderCache {
    entries: FxHashMap<(MaterialHandle, Profile), RenderOrderEntry>,
}

impl RenderOrderCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached id, if it was derived from exactly `stamp`.
    #[must_use]
    pub fn get(&self, material: MaterialHandle, profile: Profile, stamp: &[u64]) -> Option<u64> {
        self.entries
            .get(&(material, profile))
            .filter(|entry| entry.stamp.as_slice() == stamp)
            .map(|entry| entry.id)
    }

    pub fn insert(&mut self, material: MaterialHandle, profile: Profile, stamp: RenderOrderStamp, id: u64) {
        self.entries.insert((material, profile), RenderOrderEntry { stamp, id });
    }

    pub fn remove_material(&mut self, material: MaterialHandle) {
        self.entries.retain(|(m, _), _| *m != material);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
