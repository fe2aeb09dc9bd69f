//! A small work-stealing thread pool, used to run asynchronous loads.
//!
//! Jobs are pushed into a global injector queue and picked up by whatever worker has nothing
//! to do. A headless `Scheduler` owns no thread at all and runs every job inline.

pub mod latch;

mod scheduler;
mod unwind;

use std::any::Any;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// The type for a panic handling closure. Note that this same closure
/// may be invoked multiple times in parallel.
pub type PanicHandler = dyn Fn(Box<dyn Any + Send>) + Send + Sync;

/// Setup parameters for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerParams {
    /// The number of worker threads. Jobs run inline on the calling thread with 0.
    pub workers: usize,
    /// The stack size of worker threads, platform default if `None`.
    pub stack_size: Option<usize>,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        SchedulerParams {
            workers: 2,
            stack_size: None,
        }
    }
}

pub struct Scheduler {
    scheduler: Option<Arc<scheduler::Scheduler>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    terminated: Mutex<bool>,
}

impl Scheduler {
    pub fn new(params: SchedulerParams, panic_handler: Option<Box<PanicHandler>>) -> Result<Self> {
        if params.workers == 0 {
            return Ok(Scheduler::headless());
        }

        let (scheduler, handles) =
            scheduler::Scheduler::new(params.workers, params.stack_size, panic_handler)?;

        info!("Scheduler is up with {} workers.", params.workers);
        Ok(Scheduler {
            scheduler: Some(scheduler),
            handles: Mutex::new(handles),
            terminated: Mutex::new(false),
        })
    }

    /// Creates a scheduler which runs every job on the spawning thread.
    pub fn headless() -> Self {
        Scheduler {
            scheduler: None,
            handles: Mutex::new(Vec::new()),
            terminated: Mutex::new(false),
        }
    }

    #[inline]
    pub fn is_headless(&self) -> bool {
        self.scheduler.is_none()
    }

    /// Gets the number of worker threads.
    #[inline]
    pub fn workers(&self) -> usize {
        self.scheduler.as_ref().map(|v| v.num_threads()).unwrap_or(0)
    }

    /// Spawn an asynchronous job. Jobs spawned after `terminate` run inline.
    pub fn spawn<F>(&self, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(ref scheduler) = self.scheduler {
            let terminated = self.terminated.lock().unwrap();
            if !*terminated {
                // Ensure that workers cannot terminate until this job has executed.
                scheduler.terminate_inc();
                scheduler.inject(scheduler::Scheduler::job(scheduler, func));
                return;
            }
        }

        if let Err(err) = unwind::halt_unwinding(func) {
            match self.scheduler {
                Some(ref scheduler) => scheduler.handle_panic(err),
                None => error!("A job panicked."),
            }
        }
    }

    /// Signals that the workers should quit once every pending job is done, and blocks
    /// the current thread until they did so. Terminating twice is a no-op.
    pub fn terminate(&self) {
        if let Some(ref scheduler) = self.scheduler {
            {
                let mut terminated = self.terminated.lock().unwrap();
                if *terminated {
                    return;
                }

                *terminated = true;
                scheduler.terminate_dec();
            }

            scheduler.notify_all();
            let handles: Vec<_> = self.handles.lock().unwrap().drain(..).collect();
            for v in handles {
                if v.join().is_err() {
                    warn!("Worker thread exits abnormally.");
                }
            }

            info!("Scheduler is terminated.");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.terminate();
    }
}

pub mod prelude {
    pub use super::latch::{CountLatch, Latch, LockLatch};
    pub use super::{PanicHandler, Scheduler, SchedulerParams};
}

#[cfg(test)]
mod test {
    use super::latch::{CountLatch, Latch};
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn spawn_and_terminate() {
        let params = SchedulerParams {
            workers: 4,
            stack_size: None,
        };

        let sched = Scheduler::new(params, None).unwrap();
        assert_eq!(sched.workers(), 4);

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = counter.clone();
            sched.spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        // Pending jobs are drained before workers quit.
        sched.terminate();
        assert_eq!(counter.load(Ordering::SeqCst), 100);

        sched.terminate();
        let c2 = counter.clone();
        sched.spawn(move || {
            c2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 101);
    }

    #[test]
    fn headless() {
        let sched = Scheduler::new(SchedulerParams { workers: 0, stack_size: None }, None).unwrap();
        assert!(sched.is_headless());

        let me = thread::current().id();
        let latch = Arc::new(CountLatch::new());
        let l2 = latch.clone();
        sched.spawn(move || {
            assert_eq!(thread::current().id(), me);
            l2.set();
        });

        assert!(latch.is_set());
    }

    #[test]
    fn panics_are_handled() {
        let panics = Arc::new(AtomicUsize::new(0));
        let handler = {
            let panics = panics.clone();
            move |_: Box<dyn Any + Send>| {
                panics.fetch_add(1, Ordering::SeqCst);
            }
        };

        let params = SchedulerParams {
            workers: 2,
            stack_size: None,
        };

        let sched = Scheduler::new(params, Some(Box::new(handler))).unwrap();
        sched.spawn(|| panic!("boom"));
        sched.spawn(|| {});
        sched.terminate();

        assert_eq!(panics.load(Ordering::SeqCst), 1);
    }
}
