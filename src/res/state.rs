//! Per-identifier loading state machine.
//!
//! ```text
//! Unknown --try_acquire_loading--> Loading --set--> Loaded
//!    ^                                |
//!    |                                +----set----> Error
//!    +------ invalidate (Loaded) / retry (Error) -----+
//! ```
//!
//! Records are spread over a fixed number of stripes by the hash of their identifier. Each
//! stripe owns a mutex and a condition variable, so the number of notification primitives
//! stays bounded no matter how many identifiers pass through.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crate::utils::hash::{hash64, FastHashMap};

use super::identifier::Identifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceState {
    Unknown,
    Loading,
    Loaded,
    Error,
}

impl ResourceState {
    /// Returns true if no load attempt is in flight.
    #[inline]
    pub fn is_terminal(self) -> bool {
        match self {
            ResourceState::Loaded | ResourceState::Error => true,
            _ => false,
        }
    }
}

impl Default for ResourceState {
    fn default() -> Self {
        ResourceState::Unknown
    }
}

/// The observed state of an identifier, together with the number of times it has
/// reached `Loaded` so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub state: ResourceState,
    pub generation: u64,
    /// The thread holding `Loading`, if any.
    pub owner: Option<ThreadId>,
}

#[derive(Debug, Default)]
struct StateRecord {
    state: ResourceState,
    owner: Option<ThreadId>,
    generation: u64,
}

#[derive(Default)]
struct Stripe {
    records: Mutex<FastHashMap<Identifier, StateRecord>>,
    cond: Condvar,
}

pub const DEFAULT_STRIPES: usize = 16;

pub struct StateTracker {
    stripes: Box<[Stripe]>,
}

impl Default for StateTracker {
    fn default() -> Self {
        StateTracker::new(DEFAULT_STRIPES)
    }
}

impl StateTracker {
    /// Creates a new tracker with `stripes` lock and notification stripes.
    pub fn new(stripes: usize) -> Self {
        let stripes: Vec<_> = (0..stripes.max(1)).map(|_| Stripe::default()).collect();
        StateTracker {
            stripes: stripes.into_boxed_slice(),
        }
    }

    #[inline]
    fn stripe(&self, identifier: &str) -> &Stripe {
        let index = hash64(identifier) as usize % self.stripes.len();
        &self.stripes[index]
    }

    #[inline]
    fn lock(&self, identifier: &str) -> (&Stripe, MutexGuard<FastHashMap<Identifier, StateRecord>>) {
        let stripe = self.stripe(identifier);
        (stripe, stripe.records.lock().unwrap())
    }

    /// Gets the current state without blocking. `Unknown` if never seen.
    pub fn get<I: AsRef<str>>(&self, identifier: I) -> ResourceState {
        self.snapshot(identifier).state
    }

    /// Gets the current state and generation without blocking.
    pub fn snapshot<I: AsRef<str>>(&self, identifier: I) -> Snapshot {
        let identifier = identifier.as_ref();
        let (_, records) = self.lock(identifier);
        records
            .get(identifier)
            .map(|v| Snapshot {
                state: v.state,
                generation: v.generation,
                owner: v.owner,
            })
            .unwrap_or(Snapshot {
                state: ResourceState::Unknown,
                generation: 0,
                owner: None,
            })
    }

    /// Atomically moves `identifier` into `Loading` on behalf of `owner`. Succeeds only if no
    /// one is loading it and it is not loaded already; a previous `Error` counts as `Unknown`
    /// so failed loads could be retried.
    pub fn try_acquire_loading<I>(&self, identifier: I, owner: ThreadId) -> bool
    where
        I: Into<Identifier>,
    {
        let identifier = identifier.into();
        let (_, mut records) = self.lock(&identifier);
        let record = records.entry(identifier).or_default();

        match record.state {
            ResourceState::Unknown | ResourceState::Error => {
                record.state = ResourceState::Loading;
                record.owner = Some(owner);
                true
            }
            ResourceState::Loading | ResourceState::Loaded => false,
        }
    }

    /// Completes the load attempt held by `owner`, moving `identifier` into a terminal state
    /// and waking up everybody waiting on it.
    ///
    /// Returns false if the identifier is being loaded by another thread.
    pub fn set<I>(&self, identifier: I, state: ResourceState, owner: ThreadId) -> bool
    where
        I: Into<Identifier>,
    {
        let identifier = identifier.into();
        let (stripe, mut records) = self.lock(&identifier);
        let record = records.entry(identifier).or_default();

        if record.state == ResourceState::Loading && record.owner != Some(owner) {
            warn!(
                "{:?} tried to complete a load it does not own ({:?}).",
                owner, record.owner
            );
            return false;
        }

        if state == ResourceState::Loaded {
            record.generation += 1;
        }

        record.state = state;
        record.owner = None;
        stripe.cond.notify_all();
        true
    }

    /// Moves a `Loaded` identifier back to `Unknown`, if it is still at `generation`. Used
    /// once the backing resource is known to be gone, so the next request reloads it.
    pub fn invalidate<I: AsRef<str>>(&self, identifier: I, generation: u64) -> bool {
        let identifier = identifier.as_ref();
        let (_, mut records) = self.lock(identifier);

        match records.get_mut(identifier) {
            Some(record)
                if record.state == ResourceState::Loaded && record.generation == generation =>
            {
                record.state = ResourceState::Unknown;
                true
            }
            _ => false,
        }
    }

    /// Blocks the current thread while `identifier` is being loaded by another thread, until
    /// `target` is reached or `timeout` elapses. Returns the last observed state, which equals
    /// `target` on success. `Loading` is only returned once the deadline has passed, or if the
    /// current thread is the one loading it.
    ///
    /// Nothing is in flight for an `Unknown` identifier, so it is returned right away.
    pub fn wait_for<I>(
        &self,
        identifier: I,
        target: ResourceState,
        timeout: Duration,
    ) -> ResourceState
    where
        I: AsRef<str>,
    {
        let identifier = identifier.as_ref();
        let (stripe, mut records) = self.lock(identifier);
        let deadline = Instant::now() + timeout;
        let current = thread::current().id();

        loop {
            let (state, owner) = records
                .get(identifier)
                .map(|v| (v.state, v.owner))
                .unwrap_or((ResourceState::Unknown, None));

            if state == target || state.is_terminal() {
                return state;
            }

            // Nothing in flight.
            if state == ResourceState::Unknown {
                return state;
            }

            if owner == Some(current) {
                warn!("Waiting on {} which is loaded by the current thread.", identifier);
                return state;
            }

            let now = Instant::now();
            if now >= deadline {
                return state;
            }

            records = stripe.cond.wait_timeout(records, deadline - now).unwrap().0;
        }
    }

    /// Forgets every settled record. Loads in flight keep their `Loading` record, so their
    /// waiters keep waiting and nobody else could start the same load twice.
    pub fn clear(&self) {
        for stripe in self.stripes.iter() {
            stripe
                .records
                .lock()
                .unwrap()
                .retain(|_, v| v.state == ResourceState::Loading);
            stripe.cond.notify_all();
        }
    }

    /// Gets the number of identifiers tracked since the last `clear`.
    pub fn len(&self) -> usize {
        self.stripes
            .iter()
            .map(|v| v.records.lock().unwrap().len())
            .sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn transitions() {
        let states = StateTracker::new(4);
        let me = thread::current().id();

        assert_eq!(states.get("a"), ResourceState::Unknown);
        assert!(states.try_acquire_loading("a", me));
        assert!(!states.try_acquire_loading("a", me));
        assert_eq!(states.get("a"), ResourceState::Loading);
        assert_eq!(states.snapshot("a").owner, Some(me));

        assert!(states.set("a", ResourceState::Loaded, me));
        assert!(!states.try_acquire_loading("a", me));
        assert_eq!(states.snapshot("a").generation, 1);

        assert!(!states.invalidate("a", 0));
        assert!(states.invalidate("a", 1));
        assert_eq!(states.get("a"), ResourceState::Unknown);

        assert!(states.try_acquire_loading("a", me));
        assert!(states.set("a", ResourceState::Error, me));
        assert!(states.try_acquire_loading("a", me));
    }

    #[test]
    fn only_owner_completes() {
        let states = Arc::new(StateTracker::new(4));
        let me = thread::current().id();
        assert!(states.try_acquire_loading("a", me));

        let other = {
            let states = states.clone();
            thread::spawn(move || {
                let id = thread::current().id();
                states.set("a", ResourceState::Loaded, id)
            })
            .join()
            .unwrap()
        };

        assert!(!other);
        assert_eq!(states.get("a"), ResourceState::Loading);
    }

    #[test]
    fn wait_wakes_up() {
        let states = Arc::new(StateTracker::new(1));
        let me = thread::current().id();
        assert!(states.try_acquire_loading("a", me));

        let waiter = {
            let states = states.clone();
            thread::spawn(move || states.wait_for("a", ResourceState::Loaded, Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        states.set("a", ResourceState::Loaded, me);
        assert_eq!(waiter.join().unwrap(), ResourceState::Loaded);
    }

    #[test]
    fn wait_reports_error() {
        let states = Arc::new(StateTracker::new(1));
        let me = thread::current().id();
        assert!(states.try_acquire_loading("a", me));

        let waiter = {
            let states = states.clone();
            thread::spawn(move || states.wait_for("a", ResourceState::Loaded, Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        states.set("a", ResourceState::Error, me);
        assert_eq!(waiter.join().unwrap(), ResourceState::Error);
    }

    #[test]
    fn wait_never_blocks_owner() {
        let states = StateTracker::new(1);
        let me = thread::current().id();
        assert!(states.try_acquire_loading("a", me));

        let start = Instant::now();
        let state = states.wait_for("a", ResourceState::Loaded, Duration::from_secs(5));
        assert_eq!(state, ResourceState::Loading);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn wait_times_out() {
        let states = Arc::new(StateTracker::new(1));
        let loader = {
            let states = states.clone();
            thread::spawn(move || {
                let id = thread::current().id();
                assert!(states.try_acquire_loading("a", id));
            })
        };
        loader.join().unwrap();

        let start = Instant::now();
        let timeout = Duration::from_millis(100);
        let state = states.wait_for("a", ResourceState::Loaded, timeout);
        assert_eq!(state, ResourceState::Loading);

        let elapsed = start.elapsed();
        assert!(elapsed >= timeout);
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn wait_never_blocks_on_unknown() {
        let states = StateTracker::new(1);

        let start = Instant::now();
        let state = states.wait_for("a", ResourceState::Loaded, Duration::from_secs(5));
        assert_eq!(state, ResourceState::Unknown);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn clear_keeps_loads_in_flight() {
        let states = Arc::new(StateTracker::new(1));
        let me = thread::current().id();
        assert!(states.try_acquire_loading("a", me));
        assert!(states.try_acquire_loading("b", me));
        assert!(states.set("b", ResourceState::Loaded, me));

        let waiter = {
            let states = states.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let state = states.wait_for("a", ResourceState::Loaded, Duration::from_secs(5));
                (state, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(50));
        states.clear();
        assert_eq!(states.len(), 1);
        assert_eq!(states.get("b"), ResourceState::Unknown);

        // Nobody else could start loading "a" while it is in flight.
        let other = {
            let states = states.clone();
            thread::spawn(move || states.try_acquire_loading("a", thread::current().id()))
        };
        assert!(!other.join().unwrap());

        thread::sleep(Duration::from_millis(50));
        assert!(states.set("a", ResourceState::Loaded, me));

        let (state, elapsed) = waiter.join().unwrap();
        assert_eq!(state, ResourceState::Loaded);
        assert!(elapsed < Duration::from_secs(2));
    }
}
