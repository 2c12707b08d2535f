//! Program Cache
//!
//! Deduplicates compiled programs by the content of their generated source.
//! Entries are bucketed by the xxh3-128 hash of their cache key and matched
//! on the full key, so colliding keys get separate programs. Identical
//! source from different passes or materials shares one entry, addressed by
//! its [`ProgramId`].
//!
//! # Lifetime
//!
//! Every shader object bound to a program holds one usage. The entry is
//! removed in the same call that drops its last usage and the backend program
//! (if one was ever created) is handed back to the caller for disposal.
//! Nothing is retained idle.
//!
//! Backend programs are created lazily: an entry starts without one and the
//! rendering context creates and uploads it the first time the program is
//! activated.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use xxhash_rust::xxh3::xxh3_128;

use crate::renderer::pipeline::program_id::ProgramId;

/// Hash under which a cache key is stored.
#[inline]
#[must_use]
pub fn key_hash(key: &str) -> u128 {
    xxh3_128(key.as_bytes())
}

#[derive(Debug)]
pub struct CompiledProgram<P> {
    id: ProgramId,
    key: String,
    program: Option<P>,
    usages: u32,
}

impl<P> CompiledProgram<P> {
    #[inline]
    #[must_use]
    pub fn id(&self) -> ProgramId {
        self.id
    }

    /// Full cache key: vertex source, separator, fragment source.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[inline]
    #[must_use]
    pub fn usages(&self) -> u32 {
        self.usages
    }

    /// Backend program, once the entry was activated.
    #[inline]
    #[must_use]
    pub fn program(&self) -> Option<&P> {
        self.program.as_ref()
    }

    pub(crate) fn program_mut(&mut self) -> &mut Option<P> {
        &mut self.program
    }
}

/// An entry removed because its usage count reached zero.
#[derive(Debug)]
pub struct DisposedProgram<P> {
    pub id: ProgramId,
    pub program: Option<P>,
}

#[derive(Debug)]
pub struct ProgramCache<P> {
    /// Entries by key hash. A bucket only holds more than one entry when
    /// distinct keys collide; lookups always compare the full key.
    programs: FxHashMap<u128, SmallVec<[CompiledProgram<P>; 1]>>,
    /// Slot table; `ids[n]` holds the key hash of the program with id `n`.
    ids: Vec<Option<u128>>,
    len: usize,
}

impl<P> Default for ProgramCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> ProgramCache<P> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            programs: FxHashMap::default(),
            ids: Vec::new(),
            len: 0,
        }
    }

    /// Adds one usage to the program compiled from `key`, creating the entry
    /// (without a backend program) when it does not exist yet.
    pub fn acquire(&mut self, key: &str) -> ProgramId {
        let hash = key_hash(key);
        if let Some(entry) = self
            .programs
            .get_mut(&hash)
            .and_then(|bucket| bucket.iter_mut().find(|entry| entry.key == key))
        {
            entry.usages += 1;
            return entry.id;
        }

        let id = self.next_free_id();
        self.ids[id.index()] = Some(hash);
        let bucket = self.programs.entry(hash).or_default();
        if !bucket.is_empty() {
            log::warn!("Program key hash collision on {hash:032x}; keeping both programs");
        }
        bucket.push(CompiledProgram {
            id,
            key: key.to_owned(),
            program: None,
            usages: 1,
        });
        self.len += 1;
        log::debug!("Program {} registered ({} live)", id.0, self.len);
        id
    }

    /// Drops one usage. Returns the removed entry when it was the last one.
    pub fn release(&mut self, id: ProgramId) -> Option<DisposedProgram<P>> {
        let hash = (*self.ids.get(id.index())?)?;
        let bucket = self.programs.get_mut(&hash)?;
        let position = bucket.iter().position(|entry| entry.id == id)?;
        let entry = &mut bucket[position];
        entry.usages = entry.usages.saturating_sub(1);
        if entry.usages > 0 {
            return None;
        }

        let entry = bucket.swap_remove(position);
        if bucket.is_empty() {
            self.programs.remove(&hash);
        }
        self.ids[id.index()] = None;
        self.len -= 1;
        log::debug!("Program {} released ({} live)", entry.id.0, self.len);
        Some(DisposedProgram {
            id: entry.id,
            program: entry.program,
        })
    }

    #[must_use]
    pub fn get(&self, id: ProgramId) -> Option<&CompiledProgram<P>> {
        let hash = (*self.ids.get(id.index())?)?;
        self.programs.get(&hash)?.iter().find(|entry| entry.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: ProgramId) -> Option<&mut CompiledProgram<P>> {
        let hash = (*self.ids.get(id.index())?)?;
        self.programs.get_mut(&hash)?.iter_mut().find(|entry| entry.id == id)
    }

    /// The program compiled from `key`, if any.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<&CompiledProgram<P>> {
        self.programs
            .get(&key_hash(key))?
            .iter()
            .find(|entry| entry.key == key)
    }

    /// Usage count of the program compiled from `key`; 0 when absent.
    #[must_use]
    pub fn usages(&self, key: &str) -> u32 {
        self.find(key).map_or(0, |entry| entry.usages)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Removes every entry regardless of usages.
    pub fn drain(&mut self) -> impl Iterator<Item = DisposedProgram<P>> + '_ {
        self.ids.clear();
        self.len = 0;
        self.programs.drain().flat_map(|(_, bucket)| {
            bucket.into_iter().map(|entry| DisposedProgram {
                id: entry.id,
                program: entry.program,
            })
        })
    }

    /// Registers `key` under an arbitrary hash, bypassing [`key_hash`].
    #[cfg(test)]
    fn acquire_with_hash(&mut self, hash: u128, key: &str) -> ProgramId {
        let id = self.next_free_id();
        self.ids[id.index()] = Some(hash);
        self.programs.entry(hash).or_default().push(CompiledProgram {
            id,
            key: key.to_owned(),
            program: None,
            usages: 1,
        });
        self.len += 1;
        id
    }

    fn next_free_id(&mut self) -> ProgramId {
        let slot = match self.ids.iter().position(Option::is_none) {
            Some(slot) => slot,
            None => {
                self.ids.push(None);
                self.ids.len() - 1
            }
        };
        ProgramId(slot as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_keys_share_one_entry() {
        let mut cache = ProgramCache::<()>::new();
        let first = cache.acquire("a---b");
        let second = cache.acquire("a---b");
        assert_eq!(first, second);
        assert_eq!(cache.usages("a---b"), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn last_release_removes_the_entry() {
        let mut cache = ProgramCache::<u32>::new();
        let id = cache.acquire("k");
        cache.acquire("k");
        *cache.get_mut(id).unwrap().program_mut() = Some(7);

        assert!(cache.release(id).is_none());
        let disposed = cache.release(id).unwrap();
        assert_eq!(disposed.program, Some(7));
        assert!(cache.get(id).is_none());
        assert!(cache.release(id).is_none());
    }

    #[test]
    fn ids_reuse_the_lowest_free_slot() {
        let mut cache = ProgramCache::<()>::new();
        let a = cache.acquire("a");
        assert_eq!(a.index(), 0);
        assert_eq!(cache.acquire("b").index(), 1);
        cache.release(a);
        assert_eq!(cache.acquire("c").index(), 0);
        assert_eq!(cache.acquire("a").index(), 2);
    }

    #[test]
    fn colliding_keys_never_share_a_program() {
        let mut cache = ProgramCache::<()>::new();
        let hash = key_hash("mov oc, fc0");
        // A second key forced into the same bucket.
        let intruder = cache.acquire_with_hash(hash, "mov oc, fc1");
        let real = cache.acquire("mov oc, fc0");

        assert_ne!(real, intruder);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.usages("mov oc, fc0"), 1);
        assert_eq!(cache.get(intruder).unwrap().key(), "mov oc, fc1");

        assert!(cache.release(intruder).is_some());
        assert_eq!(cache.acquire("mov oc, fc0"), real);
        assert_eq!(cache.usages("mov oc, fc0"), 2);
    }
}
