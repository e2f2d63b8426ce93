//! One-at-a-time execution of asynchronous operations
//!
//! A `FutureFifo` starts each operation added to it only once every operation
//! added before it has completed, whatever their outcome. Operations return a
//! future, and the next operation waits for that future rather than for the
//! operation's closure to return.

use crate::completion::{Completion, HandlerResult};
use crate::executor::Executor;
use crate::future::Future;
use crate::promise::Promise;
use crate::runtime::Runtime;
use parking_lot::Mutex;
use tracing::trace;


/// Serializer of asynchronous operations
pub struct FutureFifo {
    runtime: Runtime,

    /// Completes once every operation added so far has completed
    tail: Mutex<Future<()>>,
}
//
impl FutureFifo {
    /// Create a serializer in the global runtime
    pub fn new() -> Self {
        Self::with_runtime(Runtime::global())
    }

    /// Create a serializer in a specific runtime
    pub fn with_runtime(runtime: &Runtime) -> Self {
        FutureFifo {
            runtime: runtime.clone(),
            tail: Mutex::new(Future::completed_in(runtime, Completion::Success(()))),
        }
    }

    /// Queue an operation behind every operation added so far
    ///
    /// The operation starts under the given executor. A failed or cancelled
    /// operation does not stop the operations queued behind it. Cancelling the
    /// returned future only reaches the operation itself, once it has started.
    ///
    pub fn add<T, F>(&self, executor: Executor, operation: F) -> Future<T>
        where T: Clone + Send + 'static,
              F: FnOnce() -> Future<T> + Send + 'static
    {
        let promise = Promise::with_runtime(&self.runtime);
        let result = promise.future();
        let mut tail = self.tail.lock();
        let next = tail.on_complete(executor, move |_| {
            let running = operation();
            if let Err(conflict) = promise.delegate_to(running.clone()) {
                trace!(future = %conflict.future, "queued operation result superseded");
            }
            HandlerResult::DelegateTo(
                running.on_complete(Executor::Immediate, |_| HandlerResult::Success(())))
        });
        *tail = next;
        result
    }
}
//
impl Default for FutureFifo {
    fn default() -> Self {
        Self::new()
    }
}
