//! # Registry
//!
//! The `Registry` is the table every loaded resource lives in. It maps a stable `Identifier` to
//! a single shared, reference-counted payload, plus the `Destructor` that knows how to release
//! that payload.
//!
//! ## Ownership & Lifetime
//!
//! For the sake of simplicity, the reference-counting technique is used for providing shared
//! ownership of a resource. Every `Resource<T>` handle is one reference. Cloning a handle or
//! `acquire`-ing an identifier increases the count by 1, dropping or `release`-ing a handle
//! decreases it. When the last reference to a given resource is dropped, the destructor is
//! invoked exactly once and the identifier is forgotten by the registry.
//!
//! The table itself only keeps weak references. An `acquire` that races with the destruction
//! of the very same resource fails with `NotFound` instead of resurrecting a dying payload.

use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::sync::{Arc, Mutex, Weak};

use crate::errors::{Error, Result};
use crate::utils::hash::FastHashMap;

use super::identifier::Identifier;

/// Releases the payload of a resource once nobody references it anymore.
pub trait Destructor<T>: Send + Sync {
    fn destroy(&self, identifier: &Identifier, payload: T);
}

impl<T, F> Destructor<T> for F
where
    F: Fn(&Identifier, T) + Send + Sync,
{
    fn destroy(&self, identifier: &Identifier, payload: T) {
        self(identifier, payload)
    }
}

type Table<T> = Mutex<FastHashMap<Identifier, Weak<Record<T>>>>;

struct Record<T: Send + Sync + 'static> {
    identifier: Identifier,
    size: usize,
    payload: ManuallyDrop<T>,
    destructor: Arc<dyn Destructor<T>>,
    table: Weak<Table<T>>,
}

impl<T: Send + Sync + 'static> Drop for Record<T> {
    fn drop(&mut self) {
        // Safety: `payload` is never touched again after this point.
        let payload = unsafe { ManuallyDrop::take(&mut self.payload) };
        self.destructor.destroy(&self.identifier, payload);

        if let Some(table) = self.table.upgrade() {
            let mut table = table.lock().unwrap();

            // The slot might have been taken over by a new resource with the same
            // identifier in the meantime.
            let dead = table
                .get(&self.identifier)
                .map(|v| v.strong_count() == 0)
                .unwrap_or(false);

            if dead {
                table.remove(&self.identifier);
            }
        }
    }
}

/// A shared, read-only reference to a registered resource.
pub struct Resource<T: Send + Sync + 'static> {
    record: Arc<Record<T>>,
}

impl<T: Send + Sync + 'static> Resource<T> {
    /// Gets the identifier this resource is registered under.
    #[inline]
    pub fn identifier(&self) -> &Identifier {
        &self.record.identifier
    }

    /// Gets the byte size recorded at registration.
    #[inline]
    pub fn size(&self) -> usize {
        self.record.size
    }

    /// Gets the number of outstanding references, this one included.
    #[inline]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.record)
    }

    /// Returns true if both handles point at the same payload.
    #[inline]
    pub fn ptr_eq(lhs: &Self, rhs: &Self) -> bool {
        Arc::ptr_eq(&lhs.record, &rhs.record)
    }
}

impl<T: Send + Sync + 'static> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Resource {
            record: self.record.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Deref for Resource<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.record.payload
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Resource")
            .field("identifier", &self.record.identifier)
            .field("size", &self.record.size)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

/// The table of live resources of one payload type.
pub struct Registry<T: Send + Sync + 'static> {
    table: Arc<Table<T>>,
}

impl<T: Send + Sync + 'static> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Registry {
            table: self.table.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Default for Registry<T> {
    fn default() -> Self {
        Registry::new()
    }
}

impl<T: Send + Sync + 'static> Registry<T> {
    /// Creates a new and empty `Registry`.
    pub fn new() -> Self {
        Registry {
            table: Arc::new(Mutex::new(FastHashMap::default())),
        }
    }

    /// Registers `payload` under `identifier`, returning the first reference to it.
    ///
    /// Fails if a live resource is registered under the same identifier already. The payload
    /// is moved in, so on failure it is handed to `destructor` right away.
    pub fn create<I>(
        &self,
        identifier: I,
        payload: T,
        size: usize,
        destructor: Arc<dyn Destructor<T>>,
    ) -> Result<Resource<T>>
    where
        I: Into<Identifier>,
    {
        let identifier = identifier.into();
        let mut table = self.table.lock().unwrap();

        let occupied = table
            .get(&identifier)
            .map(|v| v.strong_count() > 0)
            .unwrap_or(false);

        let rsp = if occupied {
            Err(Error::AlreadyExists(identifier.clone()))
        } else {
            table.try_reserve(1).map_err(Error::from)
        };

        if let Err(err) = rsp {
            drop(table);
            destructor.destroy(&identifier, payload);
            return Err(err);
        }

        let record = Arc::new(Record {
            identifier: identifier.clone(),
            size,
            payload: ManuallyDrop::new(payload),
            destructor,
            table: Arc::downgrade(&self.table),
        });

        table.insert(identifier, Arc::downgrade(&record));
        Ok(Resource { record })
    }

    /// Looks up a live resource and returns a new reference to it. Never creates.
    pub fn acquire<I>(&self, identifier: I) -> Result<Resource<T>>
    where
        I: Into<Identifier>,
    {
        let identifier = identifier.into();
        let record = {
            let table = self.table.lock().unwrap();
            table.get(&identifier).and_then(Weak::upgrade)
        };

        record
            .map(|record| Resource { record })
            .ok_or_else(|| Error::NotFound(identifier))
    }

    /// Gives up a reference. Returns true if it was the last one, in which case the
    /// resource has been destroyed when this returns.
    pub fn release(&self, resource: Resource<T>) -> bool {
        match Arc::into_inner(resource.record) {
            Some(record) => {
                drop(record);
                true
            }
            None => false,
        }
    }

    /// Returns true if a live resource is registered under `identifier`.
    pub fn contains<I: AsRef<str>>(&self, identifier: I) -> bool {
        self.ref_count(identifier).is_some()
    }

    /// Gets the number of outstanding references of a live resource.
    pub fn ref_count<I: AsRef<str>>(&self, identifier: I) -> Option<usize> {
        let table = self.table.lock().unwrap();
        table
            .get(identifier.as_ref())
            .map(Weak::strong_count)
            .filter(|&v| v > 0)
    }

    /// Gets the identifiers of all live resources.
    pub fn identifiers(&self) -> Vec<Identifier> {
        let table = self.table.lock().unwrap();
        table
            .iter()
            .filter(|(_, v)| v.strong_count() > 0)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Gets the number of live resources.
    pub fn len(&self) -> usize {
        let table = self.table.lock().unwrap();
        table.values().filter(|v| v.strong_count() > 0).count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
