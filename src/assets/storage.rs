use slotmap::{Key, SlotMap};

use crate::errors::{Result, StageError};

/// Typed store of one asset kind, addressed by its slotmap handle.
#[derive(Debug)]
pub struct AssetStorage<H: Key, T> {
    map: SlotMap<H, T>,
    kind: &'static str,
}

impl<H: Key, T> AssetStorage<H, T> {
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        Self {
            map: SlotMap::with_key(),
            kind,
        }
    }

    pub fn add(&mut self, asset: impl Into<T>) -> H {
        self.map.insert(asset.into())
    }

    #[inline]
    #[must_use]
    pub fn get(&self, handle: H) -> Option<&T> {
        self.map.get(handle)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        self.map.get_mut(handle)
    }

    /// Like [`get`](Self::get), failing with [`StageError::AssetNotFound`].
    pub fn require(&self, handle: H) -> Result<&T> {
        self.map.get(handle).ok_or_else(|| self.not_found(handle))
    }

    pub fn require_mut(&mut self, handle: H) -> Result<&mut T> {
        let missing = self.not_found(handle);
        self.map.get_mut(handle).ok_or(missing)
    }

    pub fn remove(&mut self, handle: H) -> Option<T> {
        self.map.remove(handle)
    }

    #[must_use]
    pub fn contains(&self, handle: H) -> bool {
        self.map.contains_key(handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> {
        self.map.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (H, &mut T)> {
        self.map.iter_mut()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn not_found(&self, handle: H) -> StageError {
        StageError::AssetNotFound(format!("{} {:?}", self.kind, handle.data()))
    }
}
