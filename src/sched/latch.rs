use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

/// We define various kinds of latches, which are all a primitive signaling
/// mechanism. A latch starts as false. Eventually someone calls `set()` and
/// it becomes true. You can test if it has been set by calling `is_set()`.
pub trait Latch {
    /// Set the latch, signalling others.
    fn set(&self);
    /// Test if the latch is set.
    fn is_set(&self) -> bool;
}

/// A Latch starts as false and eventually becomes true. You can block until
/// it becomes true.
#[derive(Default)]
pub struct LockLatch {
    m: Mutex<bool>,
    v: Condvar,
}

impl LockLatch {
    #[inline]
    pub fn new() -> LockLatch {
        LockLatch::default()
    }

    /// Block until latch is set.
    pub fn wait(&self) {
        let mut guard = self.m.lock().unwrap();
        while !*guard {
            guard = self.v.wait(guard).unwrap();
        }
    }
}

impl Latch for LockLatch {
    #[inline]
    fn set(&self) {
        let mut guard = self.m.lock().unwrap();
        *guard = true;
        self.v.notify_all();
    }

    #[inline]
    fn is_set(&self) -> bool {
        *self.m.lock().unwrap()
    }
}

/// Counting latches track the number of pending jobs. Calling `set()` does not
/// necessarily make the latch be considered set; instead, it just decrements the
/// counter. The latch is only set once the counter reaches zero.
#[derive(Debug)]
pub struct CountLatch {
    counter: AtomicUsize,
}

impl Default for CountLatch {
    fn default() -> Self {
        CountLatch::new()
    }
}

impl CountLatch {
    #[inline]
    pub fn new() -> CountLatch {
        CountLatch {
            counter: AtomicUsize::new(1),
        }
    }

    #[inline]
    pub fn increment(&self) {
        debug_assert!(!self.is_set());
        self.counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets the number of outstanding `set` calls.
    #[inline]
    pub fn pending(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }
}

impl Latch for CountLatch {
    #[inline]
    fn is_set(&self) -> bool {
        // Need to acquire any memory reads before latch was set:
        self.counter.load(Ordering::SeqCst) == 0
    }

    #[inline]
    fn set(&self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn lock_latch() {
        let latch = Arc::new(LockLatch::new());
        assert!(!latch.is_set());

        let th = {
            let latch = latch.clone();
            thread::spawn(move || latch.set())
        };

        latch.wait();
        assert!(latch.is_set());
        th.join().unwrap();
    }

    #[test]
    fn count_latch() {
        let latch = CountLatch::new();
        latch.increment();
        latch.increment();
        assert_eq!(latch.pending(), 3);

        latch.set();
        latch.set();
        assert!(!latch.is_set());
        latch.set();
        assert!(latch.is_set());
    }
}
