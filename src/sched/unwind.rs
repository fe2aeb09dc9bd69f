use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::thread;

/// Executes `func` and captures any panic, translating that panic into a
/// `Err` result. `func` is treated as exception safe, the panic payload is
/// handed to the panic handler of the scheduler afterwards.
pub fn halt_unwinding<F, R>(func: F) -> thread::Result<R>
where
    F: FnOnce() -> R,
{
    panic::catch_unwind(AssertUnwindSafe(func))
}

/// Aborts the process if dropped while unwinding. Forget it on the happy path.
pub struct AbortIfPanic;

impl Drop for AbortIfPanic {
    fn drop(&mut self) {
        let _ = writeln!(&mut io::stderr(), "detected unexpected panic; aborting");
        process::abort();
    }
}
