//! A bounded index from identifier to a strong, cache-owned `Resource` reference.
//!
//! The same component serves every asset kind, the eviction order is picked by `Policy`:
//!
//! * `Policy::Lru` keeps entries ordered from most- to least-recently used. A hit moves the
//!   entry to the front. Used for textures, bounded by both an entry count and a byte budget.
//! * `Policy::Fifo` keeps entries in insertion order and hits do not reorder them. When the
//!   cache is full the entry inserted first goes away. Used for materials and meshes.
//!
//! Entries live in an `ObjectPool` arena and are chained by handle into a doubly-linked
//! order list; the front is the newest (or most recent), the back is the next victim.
//!
//! Evicting an entry only drops the reference held by the cache. Whether the resource gets
//! destroyed depends on who else still holds it.

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::errors::{Error, Result};
use crate::utils::hash::FastHashMap;
use crate::utils::prelude::{Handle, ObjectPool};

use super::identifier::Identifier;
use super::registry::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    Lru,
    Fifo,
}

/// The bounds and eviction policy of a `Cache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheParams {
    pub policy: Policy,
    /// The maximum number of entries. Must be at least 1.
    pub max_entries: usize,
    /// The maximum sum of entry weights, unbounded if `None`.
    pub max_weight: Option<usize>,
}

impl Default for CacheParams {
    fn default() -> Self {
        CacheParams {
            policy: Policy::Fifo,
            max_entries: 256,
            max_weight: None,
        }
    }
}

impl CacheParams {
    pub fn lru(max_entries: usize, max_weight: usize) -> Self {
        CacheParams {
            policy: Policy::Lru,
            max_entries,
            max_weight: Some(max_weight),
        }
    }

    pub fn fifo(max_entries: usize) -> Self {
        CacheParams {
            policy: Policy::Fifo,
            max_entries,
            max_weight: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(Error::InvalidParams(
                "Cache must be able to hold at least 1 entry.".to_owned(),
            ));
        }

        if self.max_weight == Some(0) {
            return Err(Error::InvalidParams(
                "Cache weight budget must be greater than 0.".to_owned(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub total_weight: usize,
    pub max_weight: Option<usize>,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Node<T: Send + Sync + 'static> {
    key: Identifier,
    resource: Resource<T>,
    weight: usize,
    prev: Option<Handle>,
    next: Option<Handle>,
}

struct CacheState<T: Send + Sync + 'static> {
    params: Option<CacheParams>,
    nodes: ObjectPool<Node<T>>,
    index: FastHashMap<Identifier, Handle>,
    head: Option<Handle>,
    tail: Option<Handle>,
    total_weight: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<T: Send + Sync + 'static> CacheState<T> {
    fn new() -> Self {
        CacheState {
            params: None,
            nodes: ObjectPool::new(),
            index: FastHashMap::default(),
            head: None,
            tail: None,
            total_weight: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    fn unlink(&mut self, handle: Handle) {
        let (prev, next) = match self.nodes.get(handle) {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(p) => self.nodes.get_mut(p).into_iter().for_each(|v| v.next = next),
            None => self.head = next,
        }

        match next {
            Some(n) => self.nodes.get_mut(n).into_iter().for_each(|v| v.prev = prev),
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, handle: Handle) {
        let head = self.head;
        if let Some(node) = self.nodes.get_mut(handle) {
            node.prev = None;
            node.next = head;
        }

        match head {
            Some(h) => self.nodes.get_mut(h).into_iter().for_each(|v| v.prev = Some(handle)),
            None => self.tail = Some(handle),
        }

        self.head = Some(handle);
    }

    fn remove(&mut self, handle: Handle) -> Option<Node<T>> {
        self.unlink(handle);
        let node = self.nodes.free(handle)?;
        self.index.remove(&node.key);
        self.total_weight -= node.weight;
        Some(node)
    }

    fn exceeds(&self, params: &CacheParams, incoming: usize) -> bool {
        if self.nodes.len() >= params.max_entries {
            return true;
        }

        match params.max_weight {
            Some(max) => self.total_weight.saturating_add(incoming) > max,
            None => false,
        }
    }

    fn drain(&mut self) -> Vec<Node<T>> {
        self.index.clear();
        self.head = None;
        self.tail = None;
        self.total_weight = 0;
        self.nodes.drain()
    }
}

/// A bounded, thread-safe cache of `Resource` references.
pub struct Cache<T: Send + Sync + 'static> {
    name: String,
    state: Mutex<CacheState<T>>,
}

impl<T: Send + Sync + 'static> Cache<T> {
    /// Creates a new, uninitialized cache. `name` is only used for logging.
    pub fn new<N: Into<String>>(name: N) -> Self {
        Cache {
            name: name.into(),
            state: Mutex::new(CacheState::new()),
        }
    }

    /// Creates a new cache and initializes it with `params`.
    pub fn with_params<N: Into<String>>(name: N, params: CacheParams) -> Result<Self> {
        let cache = Cache::new(name);
        cache.initialize(params)?;
        Ok(cache)
    }

    #[inline]
    fn lock(&self) -> MutexGuard<CacheState<T>> {
        self.state.lock().unwrap()
    }

    /// Sets up the bounds of this cache. Does nothing and returns false if the cache has
    /// been initialized already.
    pub fn initialize(&self, params: CacheParams) -> Result<bool> {
        params.validate()?;

        let mut state = self.lock();
        if state.params.is_some() {
            return Ok(false);
        }

        info!(
            "Initializes {} cache ({:?}, max {} entries, max weight {:?}).",
            self.name, params.policy, params.max_entries, params.max_weight
        );

        state.params = Some(params);
        Ok(true)
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.lock().params.is_some()
    }

    #[inline]
    pub fn params(&self) -> Option<CacheParams> {
        self.lock().params
    }

    /// Looks up `key`. A hit hands out a new reference to the cached resource, and with the
    /// `Lru` policy marks the entry as the most recently used one.
    pub fn get<I: AsRef<str>>(&self, key: I) -> Option<Resource<T>> {
        let key = key.as_ref();
        let mut state = self.lock();

        let policy = match state.params {
            Some(params) => params.policy,
            None => return None,
        };

        match state.index.get(key).cloned() {
            Some(handle) => {
                state.hits += 1;
                if policy == Policy::Lru {
                    state.unlink(handle);
                    state.push_front(handle);
                }

                trace!("Hits {} in {} cache.", key, self.name);
                state.nodes.get(handle).map(|v| v.resource.clone())
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Inserts `resource` under `key`, evicting entries per policy until the bounds hold
    /// with the new entry in place.
    ///
    /// If `key` is cached already, the existing entry is kept (and touched with the `Lru`
    /// policy). Nothing is evicted if the insertion can not succeed.
    pub fn put<I>(&self, key: I, resource: Resource<T>, weight: usize) -> Result<()>
    where
        I: Into<Identifier>,
    {
        let key = key.into();
        let mut evicted: SmallVec<[Node<T>; 4]> = SmallVec::new();

        {
            let mut state = self.lock();
            let params = state.params.ok_or(Error::NotInitialized)?;

            if let Some(handle) = state.index.get(&key).cloned() {
                if params.policy == Policy::Lru {
                    state.unlink(handle);
                    state.push_front(handle);
                }

                return Ok(());
            }

            if let Some(max) = params.max_weight {
                if weight > max {
                    return Err(Error::OverBudget(key, weight, max));
                }
            }

            state.nodes.try_reserve(1)?;
            state.index.try_reserve(1)?;

            while state.exceeds(&params, weight) {
                let victim = match state.tail {
                    Some(v) => v,
                    None => break,
                };

                if let Some(node) = state.remove(victim) {
                    state.evictions += 1;
                    evicted.push(node);
                }
            }

            let handle = state.nodes.create(Node {
                key: key.clone(),
                resource,
                weight,
                prev: None,
                next: None,
            });

            state.index.insert(key, handle);
            state.push_front(handle);
            state.total_weight += weight;
        }

        for node in evicted {
            debug!(
                "Evicts {} from {} cache ({} references left elsewhere).",
                node.key,
                self.name,
                node.resource.ref_count() - 1
            );
        }

        Ok(())
    }

    /// Removes `key` from this cache, handing the cache's reference over to the caller.
    pub fn remove<I: AsRef<str>>(&self, key: I) -> Option<Resource<T>> {
        let mut state = self.lock();
        let handle = state.index.get(key.as_ref()).cloned()?;
        state.remove(handle).map(|v| v.resource)
    }

    /// Returns true if `key` is cached. Does not count as a hit or miss.
    pub fn contains<I: AsRef<str>>(&self, key: I) -> bool {
        self.lock().index.contains_key(key.as_ref())
    }

    /// Drops every entry. Returns the number of references released.
    pub fn clear(&self) -> usize {
        let nodes = self.lock().drain();
        let len = nodes.len();

        if len > 0 {
            debug!("Clears {} entries from {} cache.", len, self.name);
        }

        len
    }

    /// Drops every entry, resets the statistics and returns the cache to its uninitialized
    /// state. Returns the number of references released.
    pub fn shutdown(&self) -> usize {
        let nodes = {
            let mut state = self.lock();
            if state.params.take().is_none() {
                return 0;
            }

            state.hits = 0;
            state.misses = 0;
            state.evictions = 0;
            state.drain()
        };

        info!(
            "Shutdowns {} cache, releases {} entries.",
            self.name,
            nodes.len()
        );

        nodes.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let params = state.params.unwrap_or_default();

        CacheStats {
            entries: state.nodes.len(),
            max_entries: if state.params.is_some() {
                params.max_entries
            } else {
                0
            },
            total_weight: state.total_weight,
            max_weight: params.max_weight,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::res::registry::{Destructor, Registry};
    use std::sync::Arc;

    fn create(registry: &Registry<u32>, key: &str) -> Resource<u32> {
        let destructor: Arc<dyn Destructor<u32>> = Arc::new(|_: &Identifier, _: u32| {});
        registry.create(key, 0, 4, destructor).unwrap()
    }

    #[test]
    fn fifo_evicts_oldest() {
        let registry = Registry::new();
        let cache = Cache::with_params("test", CacheParams::fifo(2)).unwrap();

        cache.put("a", create(&registry, "a"), 1).unwrap();
        cache.put("b", create(&registry, "b"), 1).unwrap();
        cache.put("c", create(&registry, "c"), 1).unwrap();

        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.len(), 2);

        // The cache held the only reference to "a".
        assert!(!registry.contains("a"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn fifo_ignores_hits() {
        let registry = Registry::new();
        let cache = Cache::with_params("test", CacheParams::fifo(2)).unwrap();

        cache.put("a", create(&registry, "a"), 1).unwrap();
        cache.put("b", create(&registry, "b"), 1).unwrap();
        assert!(cache.get("a").is_some());
        cache.put("c", create(&registry, "c"), 1).unwrap();

        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
    }

    #[test]
    fn lru_evicts_least_recent() {
        let registry = Registry::new();
        let cache = Cache::with_params("test", CacheParams::lru(2, 1024)).unwrap();

        cache.put("a", create(&registry, "a"), 1).unwrap();
        cache.put("b", create(&registry, "b"), 1).unwrap();
        assert!(cache.get("a").is_some());
        cache.put("c", create(&registry, "c"), 1).unwrap();

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn lru_weight_budget() {
        let registry = Registry::new();
        let cache = Cache::with_params("test", CacheParams::lru(16, 10)).unwrap();

        cache.put("a", create(&registry, "a"), 4).unwrap();
        cache.put("b", create(&registry, "b"), 4).unwrap();
        cache.put("c", create(&registry, "c"), 4).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.total_weight, 8);
        assert!(!cache.contains("a"));

        cache.put("d", create(&registry, "d"), 10).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().total_weight, 10);
    }

    #[test]
    fn over_budget_keeps_entries() {
        let registry = Registry::new();
        let cache = Cache::with_params("test", CacheParams::lru(16, 10)).unwrap();

        cache.put("a", create(&registry, "a"), 4).unwrap();
        match cache.put("b", create(&registry, "b"), 11) {
            Err(Error::OverBudget(_, 11, 10)) => {}
            other => panic!("unexpected {:?}", other),
        }

        assert!(cache.contains("a"));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn hits_and_misses() {
        let registry = Registry::new();
        let cache = Cache::with_params("test", CacheParams::fifo(4)).unwrap();

        assert!(cache.get("a").is_none());
        cache.put("a", create(&registry, "a"), 1).unwrap();
        assert!(cache.get("a").is_some());
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn hit_adds_reference() {
        let registry = Registry::new();
        let cache = Cache::with_params("test", CacheParams::fifo(4)).unwrap();

        let r = create(&registry, "a");
        cache.put("a", r.clone(), 1).unwrap();
        assert_eq!(r.ref_count(), 2);

        let hit = cache.get("a").unwrap();
        assert!(Resource::ptr_eq(&r, &hit));
        assert_eq!(r.ref_count(), 3);

        drop(hit);
        assert_eq!(cache.clear(), 1);
        assert_eq!(r.ref_count(), 1);
    }

    #[test]
    fn duplicated_put() {
        let registry = Registry::new();
        let cache = Cache::with_params("test", CacheParams::fifo(4)).unwrap();

        let r = create(&registry, "a");
        cache.put("a", r.clone(), 1).unwrap();
        cache.put("a", r.clone(), 1).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(r.ref_count(), 2);
    }

    #[test]
    fn lifecycle() {
        let registry = Registry::new();
        let cache = Cache::new("test");

        assert!(!cache.is_initialized());
        assert!(cache.get("a").is_none());
        match cache.put("a", create(&registry, "a"), 1) {
            Err(Error::NotInitialized) => {}
            other => panic!("unexpected {:?}", other),
        }

        assert!(cache.initialize(CacheParams::fifo(2)).unwrap());
        assert!(!cache.initialize(CacheParams::fifo(8)).unwrap());
        assert_eq!(cache.stats().max_entries, 2);

        let r = create(&registry, "a");
        cache.put("a", r.clone(), 1).unwrap();
        assert!(cache.get("a").is_some());

        assert_eq!(cache.shutdown(), 1);
        assert_eq!(r.ref_count(), 1);
        assert_eq!(cache.stats(), CacheStats::default());
        assert!(!cache.is_initialized());
    }

    #[test]
    fn invalid_params() {
        assert!(Cache::<u32>::with_params("test", CacheParams::fifo(0)).is_err());
        assert!(Cache::<u32>::with_params("test", CacheParams::lru(1, 0)).is_err());
    }

    #[test]
    fn remove() {
        let registry = Registry::new();
        let cache = Cache::with_params("test", CacheParams::lru(4, 100)).unwrap();

        cache.put("a", create(&registry, "a"), 5).unwrap();
        cache.put("b", create(&registry, "b"), 7).unwrap();

        let a = cache.remove("a").unwrap();
        assert_eq!(a.ref_count(), 1);
        assert_eq!(cache.stats().total_weight, 7);
        assert!(cache.remove("a").is_none());

        cache.put("c", create(&registry, "c"), 1).unwrap();
        cache.put("d", create(&registry, "d"), 1).unwrap();
        cache.put("e", create(&registry, "e"), 1).unwrap();
        assert_eq!(cache.len(), 4);
        cache.put("f", create(&registry, "f"), 1).unwrap();
        assert!(!cache.contains("b"));
    }
}
