//! Context registry.
//!
//! Process-wide caches are kept per rendering context. The registry maps an
//! opaque [`ContextId`] to its [`RenderContext`], creating it on first use
//! and tearing it down explicitly on [`ContextRegistry::destroy`].

use std::collections::hash_map::Entry;

use rustc_hash::FxHashMap;

use crate::errors::{Result, StageError};
use crate::renderer::core::backend::Backend;
use crate::renderer::core::context::RenderContext;
use crate::renderer::settings::StageSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u32);

pub struct ContextRegistry<B: Backend> {
    contexts: FxHashMap<ContextId, RenderContext<B>>,
}

impl<B: Backend> Default for ContextRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> ContextRegistry<B> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            contexts: FxHashMap::default(),
        }
    }

    /// Returns the context registered under `id`, creating it with the
    /// backend produced by `backend` if there is none.
    pub fn get_or_create(
        &mut self,
        id: ContextId,
        settings: &StageSettings,
        backend: impl FnOnce() -> B,
    ) -> Result<&mut RenderContext<B>> {
        match self.contexts.entry(id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let context = RenderContext::new(backend(), settings.clone())?;
                log::debug!("Registered rendering context {}", id.0);
                Ok(entry.insert(context))
            }
        }
    }

    pub fn get(&self, id: ContextId) -> Result<&RenderContext<B>> {
        self.contexts.get(&id).ok_or(StageError::ContextNotFound(id.0))
    }

    pub fn get_mut(&mut self, id: ContextId) -> Result<&mut RenderContext<B>> {
        self.contexts.get_mut(&id).ok_or(StageError::ContextNotFound(id.0))
    }

    #[must_use]
    pub fn contains(&self, id: ContextId) -> bool {
        self.contexts.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Disposes every GPU object of the context and unregisters it. The
    /// backend is handed back to the caller.
    pub fn destroy(&mut self, id: ContextId) -> Result<B> {
        let mut context = self.contexts.remove(&id).ok_or(StageError::ContextNotFound(id.0))?;
        context.dispose();
        log::debug!("Destroyed rendering context {}", id.0);
        Ok(context.into_backend())
    }

    pub fn destroy_all(&mut self) {
        for (_, mut context) in self.contexts.drain() {
            context.dispose();
        }
    }
}
