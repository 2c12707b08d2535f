/// Monotonic change counter carried by every logical resource.
///
/// Per-context pools remember the version they last consumed; a mismatch
/// marks their entry invalid. Logical resources therefore never need to
/// know which contexts hold GPU copies of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeTracker {
    version: u64,
}

impl ChangeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self { version: 0 }
    }

    /// Marks as modified, increments version by 1
    pub fn changed(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    /// Gets the current version number
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Mutable access to resource data; bumps the owner's version when dropped.
pub struct MutGuard<'a, T: ?Sized> {
    data: &'a mut T,
    tracker: &'a mut ChangeTracker,
}

impl<'a, T: ?Sized> MutGuard<'a, T> {
    pub fn new(data: &'a mut T, tracker: &'a mut ChangeTracker) -> Self {
        Self { data, tracker }
    }
}

impl<T: ?Sized> std::ops::Deref for MutGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl<T: ?Sized> std::ops::DerefMut for MutGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data
    }
}

impl<T: ?Sized> Drop for MutGuard<'_, T> {
    fn drop(&mut self) {
        self.tracker.changed();
    }
}
