use std::iter;
use std::mem;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_deque as deque;

use crate::errors::{Error, Result};

use super::latch::{CountLatch, Latch, LockLatch};
use super::unwind::{self, AbortIfPanic};
use super::PanicHandler;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct Scheduler {
    terminator: CountLatch,
    watcher: Watcher,
    threads: Vec<ThreadInfo>,
    injector: deque::Injector<Job>,
    panic_handler: Option<Box<PanicHandler>>,
}

struct ThreadInfo {
    stealer: deque::Stealer<Job>,
    primed: LockLatch,
}

impl Scheduler {
    /// Spawns `num` worker threads, and blocks until every one of them is up.
    pub fn new(
        num: usize,
        stack_size: Option<usize>,
        panic_handler: Option<Box<PanicHandler>>,
    ) -> Result<(Arc<Self>, Vec<JoinHandle<()>>)> {
        let workers: Vec<_> = (0..num).map(|_| deque::Worker::new_fifo()).collect();
        let threads = workers
            .iter()
            .map(|v| ThreadInfo {
                stealer: v.stealer(),
                primed: LockLatch::new(),
            })
            .collect();

        let scheduler = Arc::new(Scheduler {
            threads,
            injector: deque::Injector::new(),
            panic_handler,
            terminator: CountLatch::new(),
            watcher: Watcher(Mutex::new(()), Condvar::new()),
        });

        let mut handles = Vec::with_capacity(num);
        for (i, w) in workers.into_iter().enumerate() {
            let sc = scheduler.clone();
            let mut b = thread::Builder::new().name(format!("crayon-res-worker-{}", i));

            if let Some(stack_size) = stack_size {
                b = b.stack_size(stack_size);
            }

            match b.spawn(move || Scheduler::main_loop(sc, i, w)) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    scheduler.terminate_dec();
                    scheduler.watcher.notify_all();
                    for v in handles {
                        let _ = v.join();
                    }

                    let msg = format!("Failed to spawn worker thread: {}", err);
                    return Err(Error::AllocationFailure(msg));
                }
            }
        }

        for v in &scheduler.threads {
            v.primed.wait();
        }

        Ok((scheduler, handles))
    }

    /// Push a job into the "external jobs" queue; it will be taken by whatever
    /// worker has nothing to do.
    pub fn inject(&self, job: Job) {
        self.injector.push(job);
        self.watcher.notify_one();
    }

    /// Handles panic.
    pub fn handle_panic(&self, err: Box<dyn ::std::any::Any + Send>) {
        match self.panic_handler {
            Some(ref handler) => {
                // If the customizable panic handler itself panics,
                // then we abort.
                let abort_guard = AbortIfPanic;
                handler(err);
                mem::forget(abort_guard);
            }
            None => {
                error!("A job panicked: {}", panic_message(&*err));
            }
        }
    }

    /// Wraps `func` into a job which reports its panic, and permits termination once done.
    pub fn job<F>(scheduler: &Arc<Self>, func: F) -> Job
    where
        F: FnOnce() + Send + 'static,
    {
        let sched = scheduler.clone();
        Box::new(move || {
            if let Err(err) = unwind::halt_unwinding(func) {
                sched.handle_panic(err);
            }

            sched.terminate_dec(); // permit workers to terminate now
        })
    }

    #[inline]
    pub fn terminate_dec(&self) {
        self.terminator.set();
    }

    #[inline]
    pub fn terminate_inc(&self) {
        self.terminator.increment();
    }

    #[inline]
    pub fn notify_all(&self) {
        self.watcher.notify_all();
    }

    #[inline]
    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    fn main_loop(scheduler: Arc<Scheduler>, index: usize, worker: deque::Worker<Job>) {
        scheduler.threads[index].primed.set();

        let mut ms = 1;
        while !scheduler.terminator.is_set() {
            if let Some(job) = scheduler.find_job(index, &worker) {
                job();
                ms = 1;
            } else {
                scheduler.watcher.wait_timeout(ms);
                ms = (ms * 2).min(48);
            }
        }

        trace!("Worker {} terminated.", index);
    }

    fn find_job(&self, index: usize, worker: &deque::Worker<Job>) -> Option<Job> {
        worker.pop().or_else(|| {
            iter::repeat_with(|| {
                self.injector.steal_batch_and_pop(worker).or_else(|| {
                    self.threads
                        .iter()
                        .enumerate()
                        .filter(|&(i, _)| i != index)
                        .map(|(_, v)| v.stealer.steal())
                        .collect()
                })
            })
            .find(|v| !v.is_retry())
            .and_then(|v| v.success())
        })
    }
}

struct Watcher(Mutex<()>, Condvar);

impl Watcher {
    #[inline]
    fn wait_timeout(&self, ms: u64) {
        let duration = Duration::from_millis(ms);
        let v = self.0.lock().unwrap();
        let _ = self.1.wait_timeout(v, duration);
    }

    #[inline]
    fn notify_one(&self) {
        self.1.notify_one()
    }

    #[inline]
    fn notify_all(&self) {
        self.1.notify_all()
    }
}

fn panic_message(err: &(dyn ::std::any::Any + Send)) -> &str {
    if let Some(v) = err.downcast_ref::<&'static str>() {
        v
    } else if let Some(v) = err.downcast_ref::<String>() {
        v.as_str()
    } else {
        "<unknown>"
    }
}
