//! # ResourcePool
//!
//! The `ResourcePool` is the get-or-load entry point of one asset kind. It composes a bounded
//! `Cache`, the `Registry` and a `StateTracker`, and calls into the `ResourceLoader` of the
//! kind only when no shared copy exists.
//!
//! ## Loading
//!
//! For a given identifier, the first thread which flips its state from `Unknown` to `Loading`
//! becomes the only loader. It decodes the payload, registers it, caches it and finally
//! publishes `Loaded`, in that order, so anyone observing `Loaded` also observes the cached
//! and registered resource. Every other thread either hits the cache, or blocks until the
//! loader publishes its result (bounded by a timeout).
//!
//! Failed loads are not retried automatically. The identifier is marked `Error`, and the next
//! request for it starts over.

use std::borrow::Borrow;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::errors::{Error, Result};
use crate::sched::Scheduler;
use crate::utils::finally::finally;

use super::cache::{Cache, CacheParams, CacheStats};
use super::identifier::Identifier;
use super::registry::{Destructor, Registry, Resource};
use super::state::{ResourceState, StateTracker};

/// The bridge between a `ResourcePool` and the external decoder of an asset kind.
pub trait ResourceLoader: Send + Sync + 'static {
    /// The description a resource is loaded from.
    type Descriptor: ?Sized + Sync;
    /// The loaded, read-only payload.
    type Resource: Send + Sync + 'static;

    /// The asset kind, used for logging.
    const NAME: &'static str;

    /// Derives the stable identifier of `desc`.
    fn identify(&self, desc: &Self::Descriptor) -> Result<Identifier>;

    /// Produces the payload described by `desc`. Called at most once per identifier for
    /// concurrent first requests.
    fn load(
        &self,
        identifier: &Identifier,
        desc: &Self::Descriptor,
    ) -> ::std::result::Result<Self::Resource, failure::Error>;

    /// The byte size of a payload.
    fn size(&self, resource: &Self::Resource) -> usize;

    /// The weight a payload is accounted with in the cache.
    fn weight(&self, _: &Self::Resource) -> usize {
        1
    }

    /// Releases a payload once its last reference is gone.
    fn delete(&self, _: &Identifier, _: Self::Resource) {}
}

struct LoaderDestructor<L: ResourceLoader>(Arc<L>);

impl<L: ResourceLoader> Destructor<L::Resource> for LoaderDestructor<L> {
    fn destroy(&self, identifier: &Identifier, payload: L::Resource) {
        trace!("Destroys {} {}.", L::NAME, identifier);
        self.0.delete(identifier, payload);
    }
}

pub struct ResourcePool<L: ResourceLoader> {
    loader: Arc<L>,
    destructor: Arc<dyn Destructor<L::Resource>>,
    registry: Registry<L::Resource>,
    cache: Arc<Cache<L::Resource>>,
    states: Arc<StateTracker>,
    timeout: Duration,
}

impl<L: ResourceLoader> Clone for ResourcePool<L> {
    fn clone(&self) -> Self {
        ResourcePool {
            loader: self.loader.clone(),
            destructor: self.destructor.clone(),
            registry: self.registry.clone(),
            cache: self.cache.clone(),
            states: self.states.clone(),
            timeout: self.timeout,
        }
    }
}

impl<L: ResourceLoader> ResourcePool<L> {
    /// Creates a new pool whose cache is bounded by `params`, and whose waiters give up after
    /// `timeout`.
    pub fn new(loader: L, params: CacheParams, timeout: Duration) -> Result<Self> {
        let loader = Arc::new(loader);
        let destructor: Arc<dyn Destructor<L::Resource>> =
            Arc::new(LoaderDestructor(loader.clone()));

        Ok(ResourcePool {
            loader,
            destructor,
            registry: Registry::new(),
            cache: Arc::new(Cache::with_params(L::NAME, params)?),
            states: Arc::new(StateTracker::default()),
            timeout,
        })
    }

    /// Gets a shared reference to the resource described by `desc`, loading it if nobody did
    /// so far. Every successful call adds one reference, which should be given back with
    /// `release` (or by dropping the handle).
    pub fn load_with_ref_counting(&self, desc: &L::Descriptor) -> Result<Resource<L::Resource>> {
        let identifier = self.loader.identify(desc)?;
        let current = thread::current().id();

        loop {
            let snapshot = self.states.snapshot(&identifier);

            match snapshot.state {
                ResourceState::Loaded => {
                    if let Some(resource) = self.resolve(&identifier) {
                        return Ok(resource);
                    }

                    // Evicted and released by everybody. Starts over.
                    debug!("{} {} is gone, reloads it.", L::NAME, identifier);
                    self.states.invalidate(&identifier, snapshot.generation);
                }

                ResourceState::Loading => {
                    if snapshot.owner == Some(current) {
                        return Err(Error::AlreadyLoading(identifier));
                    }

                    match self
                        .states
                        .wait_for(&identifier, ResourceState::Loaded, self.timeout)
                    {
                        ResourceState::Loading => {
                            warn!(
                                "Timed out after {:?} waiting for {} {}.",
                                self.timeout,
                                L::NAME,
                                identifier
                            );
                            return Err(Error::Timeout(identifier, self.timeout));
                        }
                        ResourceState::Error => {
                            let err = format_err!("The concurrent load attempt failed.");
                            return Err(Error::DecodeFailure(identifier, err));
                        }
                        _ => {}
                    }
                }

                ResourceState::Unknown | ResourceState::Error => {
                    if self.states.try_acquire_loading(&identifier, current) {
                        return self.load_exclusive(&identifier, desc);
                    }
                }
            }
        }
    }

    /// Runs the same orchestration as `load_with_ref_counting` on `sched`, and hands the
    /// result to `func` once done.
    pub fn load_async<D, F>(&self, sched: &Scheduler, desc: D, func: F)
    where
        D: Borrow<L::Descriptor> + Send + 'static,
        F: FnOnce(Result<Resource<L::Resource>>) + Send + 'static,
    {
        let pool = self.clone();
        sched.spawn(move || {
            let rsp = pool.load_with_ref_counting(desc.borrow());
            func(rsp);
        });
    }

    /// Gives up a reference obtained from this pool. Returns true if it was the last one
    /// and the resource has been destroyed.
    #[inline]
    pub fn release(&self, resource: Resource<L::Resource>) -> bool {
        self.registry.release(resource)
    }

    /// Gets the identifier `desc` resolves to.
    #[inline]
    pub fn identify(&self, desc: &L::Descriptor) -> Result<Identifier> {
        self.loader.identify(desc)
    }

    /// Gets the loading state of `desc`.
    pub fn state(&self, desc: &L::Descriptor) -> Result<ResourceState> {
        Ok(self.states.get(self.loader.identify(desc)?))
    }

    #[inline]
    pub fn loader(&self) -> &L {
        &self.loader
    }

    #[inline]
    pub fn registry(&self) -> &Registry<L::Resource> {
        &self.registry
    }

    #[inline]
    pub fn cache(&self) -> &Cache<L::Resource> {
        &self.cache
    }

    #[inline]
    pub fn states(&self) -> &StateTracker {
        &self.states
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[inline]
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drops every reference held by the cache.
    #[inline]
    pub fn clear(&self) -> usize {
        self.cache.clear()
    }

    /// Drains the cache and forgets all settled loading states. Loads in flight finish
    /// normally, and resources still referenced by callers stay alive in the registry until
    /// they are released.
    pub fn shutdown(&self) -> usize {
        let released = self.cache.shutdown();
        self.states.clear();

        let leaks = self.registry.len();
        if leaks > 0 {
            warn!(
                "{} {} resources are still referenced after shutdown.",
                leaks,
                L::NAME
            );
        }

        released
    }

    fn resolve(&self, identifier: &Identifier) -> Option<Resource<L::Resource>> {
        if let Some(resource) = self.cache.get(identifier) {
            return Some(resource);
        }

        // The state says loaded, but the cache evicted it in the meantime.
        let resource = self.registry.acquire(identifier).ok()?;
        let weight = self.loader.weight(&resource);
        if let Err(err) = self.cache.put(identifier, resource.clone(), weight) {
            warn!("Could not cache {} {}: {}", L::NAME, identifier, err);
        }

        Some(resource)
    }

    fn load_exclusive(
        &self,
        identifier: &Identifier,
        desc: &L::Descriptor,
    ) -> Result<Resource<L::Resource>> {
        let owner = thread::current().id();

        // Unless disarmed, marks the attempt as failed on every early return or unwinding,
        // so waiters are never left behind.
        let guard = finally((), |_| {
            self.states.set(identifier, ResourceState::Error, owner);
        });

        let payload = self.loader.load(identifier, desc).map_err(|err| {
            warn!("Failed to load {} {}: {}", L::NAME, identifier, err);
            Error::DecodeFailure(identifier.clone(), err)
        })?;

        let size = self.loader.size(&payload);
        let weight = self.loader.weight(&payload);

        let resource =
            match self
                .registry
                .create(identifier, payload, size, self.destructor.clone())
            {
                Ok(resource) => resource,
                Err(Error::AlreadyExists(_)) => self.registry.acquire(identifier)?,
                Err(err) => return Err(err),
            };

        if let Err(err) = self.cache.put(identifier, resource.clone(), weight) {
            warn!("Could not cache {} {}: {}", L::NAME, identifier, err);
        }

        guard.forget();
        self.states.set(identifier, ResourceState::Loaded, owner);

        debug!("Loads {} {} ({} bytes).", L::NAME, identifier, size);
        Ok(resource)
    }
}
