//! Inline callback execution with stack depth tracking
//!
//! Inline execution runs callbacks directly on the thread which schedules
//! them. It has minimal overhead, which makes it a good choice for short
//! callbacks, but every inline handler which completes another future runs
//! that future's inline handlers further down the same stack.
//!
//! The stack-checking flavour of inline execution keeps a per-thread count of
//! nested inline callbacks, and hands callbacks over to the worker pool once
//! that count exceeds a configurable limit. Chains of any length can then be
//! driven by inline handlers without exhausting the stack.

use crate::executor::{Executor, Job, Rejected};
use crate::runtime::Runtime;
use std::cell::Cell;
use tracing::trace;


thread_local! {
    /// Number of stack-checked inline callbacks running on this thread
    static DEPTH: Cell<usize> = Cell::new(0);
}


/// Nesting depth of stack-checked inline callbacks on the current thread
pub fn inline_depth() -> usize {
    DEPTH.with(Cell::get)
}


/// Run a job inline if the nesting limit allows it, else defer it to the
/// runtime's default worker pool tier
pub(crate) fn run_stack_checked(runtime: &Runtime, job: Job) -> Result<(), Rejected> {
    let depth = inline_depth();
    if depth >= runtime.config().stack_check_depth() {
        trace!(depth, "inline nesting limit reached, deferring to worker pool");
        return Executor::AsyncDefault.dispatch(runtime, job);
    }
    let _guard = DepthGuard::enter(depth);
    job.run();
    Ok(())
}


/// Restores the previous nesting depth on scope exit, even when unwinding
struct DepthGuard {
    previous: usize,
}
//
impl DepthGuard {
    fn enter(previous: usize) -> Self {
        DEPTH.with(|depth| depth.set(previous + 1));
        DepthGuard { previous }
    }
}
//
impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(self.previous));
    }
}
