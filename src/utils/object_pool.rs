use std::cmp::Reverse;
use std::collections::{BinaryHeap, TryReserveError};

use super::handle::{Handle, HandleIndex};

/// A named object collection addressed by stable, versioned `Handle`s. Every
/// time a handle is freed its version is bumped, so stale handles never alias
/// the object that reuses the slot.
///
/// Freed indices are recycled smallest-first, which keeps the storage compact.
pub struct ObjectPool<T> {
    versions: Vec<HandleIndex>,
    entries: Vec<Option<T>>,
    frees: BinaryHeap<Reverse<HandleIndex>>,
}

impl<T> Default for ObjectPool<T> {
    fn default() -> Self {
        ObjectPool::new()
    }
}

impl<T> ObjectPool<T> {
    /// Constructs a new, empty `ObjectPool`.
    pub fn new() -> Self {
        ObjectPool {
            versions: Vec::new(),
            entries: Vec::new(),
            frees: BinaryHeap::new(),
        }
    }

    /// Reserves storage for at least `additional` more objects without aborting
    /// the process if the allocator gives up.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        let recycled = self.frees.len();
        if recycled >= additional {
            return Ok(());
        }

        self.versions.try_reserve(additional - recycled)?;
        self.entries.try_reserve(additional - recycled)?;
        self.frees.try_reserve(additional)?;
        Ok(())
    }

    /// Creates a `T` and named it with `Handle`.
    pub fn create(&mut self, value: T) -> Handle {
        if let Some(Reverse(index)) = self.frees.pop() {
            let i = index as usize;
            self.versions[i] = self.versions[i].wrapping_add(1);
            self.entries[i] = Some(value);
            Handle::new(index, self.versions[i])
        } else {
            self.versions.push(1);
            self.entries.push(Some(value));
            Handle::new(self.versions.len() as HandleIndex - 1, 1)
        }
    }

    /// Returns true if this `Handle` was created by `ObjectPool`, and has not been
    /// freed yet.
    #[inline]
    pub fn contains(&self, handle: Handle) -> bool {
        let i = handle.index() as usize;
        i < self.versions.len()
            && self.versions[i] == handle.version()
            && self.entries[i].is_some()
    }

    /// Returns immutable reference to internal value with name `Handle`.
    #[inline]
    pub fn get(&self, handle: Handle) -> Option<&T> {
        if self.contains(handle) {
            self.entries[handle.index() as usize].as_ref()
        } else {
            None
        }
    }

    /// Returns mutable reference to internal value with name `Handle`.
    #[inline]
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        if self.contains(handle) {
            self.entries[handle.index() as usize].as_mut()
        } else {
            None
        }
    }

    /// Recycles the value with name `Handle`.
    pub fn free(&mut self, handle: Handle) -> Option<T> {
        if !self.contains(handle) {
            return None;
        }

        let i = handle.index() as usize;
        self.versions[i] = self.versions[i].wrapping_add(1);
        self.frees.push(Reverse(handle.index()));
        self.entries[i].take()
    }

    /// Removes every object, invalidating all handles handed out so far.
    pub fn drain(&mut self) -> Vec<T> {
        let mut drained = Vec::with_capacity(self.len());
        for (i, v) in self.entries.iter_mut().enumerate() {
            if let Some(value) = v.take() {
                self.versions[i] = self.versions[i].wrapping_add(1);
                self.frees.push(Reverse(i as HandleIndex));
                drained.push(value);
            }
        }

        drained
    }

    /// Returns the total number of alive objects in this `ObjectPool`.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len() - self.frees.len()
    }

    /// Checks if the pool is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
