//! Handler chaining
//!
//! Attaching a handler to a future immediately returns a derived future,
//! which completes with whatever the handler eventually produces. Each kind
//! of handler only cares about some outcomes: a success handler has nothing
//! to do with a failure, for example. Outcomes which a handler does not care
//! about bypass it and are forwarded to the derived future unchanged, without
//! ever being dispatched to the handler's executor.
//!
//! The derived future also keeps a link back to its source, so that the
//! cancellation requests it receives are relayed upstream.
//!
//! Handlers are shielded in two ways. A panicking handler fails its derived
//! future instead of taking the executor thread down. And if the handler's
//! executor refuses to schedule it, the derived future fails with the
//! executor's error instead of staying pending forever.

use crate::completion::{CancelToken, Completion, FutureError, HandlerResult};
use crate::executor::{Executor, Job, Rejected};
use crate::future::{Future, Node};
use crate::promise::Promise;
use crate::runtime::Runtime;
use std::panic::{self, AssertUnwindSafe};
use tracing::{trace, warn};


impl<T: Clone + Send + 'static> Future<T> {
    /// Run a handler once the future completes, whatever its outcome
    pub fn on_complete<S, F>(&self, executor: Executor, handler: F) -> Future<S>
        where S: Clone + Send + 'static,
              F: FnOnce(Completion<T>) -> HandlerResult<S> + Send + 'static
    {
        self.attach(executor, Ok, handler)
    }

    /// Run a handler if the future succeeds
    ///
    /// Failures and cancellations are forwarded to the derived future.
    ///
    pub fn on_success<S, F>(&self, executor: Executor, handler: F) -> Future<S>
        where S: Clone + Send + 'static,
              F: FnOnce(T) -> HandlerResult<S> + Send + 'static
    {
        self.attach(executor, Completion::forward, handler)
    }

    /// Transform the value of a successful future
    pub fn map<S, F>(&self, executor: Executor, f: F) -> Future<S>
        where S: Clone + Send + 'static,
              F: FnOnce(T) -> S + Send + 'static
    {
        self.on_success(executor, move |value| HandlerResult::Success(f(value)))
    }

    /// Run a handler if the future fails, giving it a chance to recover
    ///
    /// Successes and cancellations are forwarded to the derived future.
    ///
    pub fn on_fail<F>(&self, executor: Executor, handler: F) -> Future<T>
        where F: FnOnce(FutureError) -> HandlerResult<T> + Send + 'static
    {
        self.attach(executor,
                    |completion| match completion {
                        Completion::Fail(error) => Ok(error),
                        other => Err(other),
                    },
                    handler)
    }

    /// Run a handler if the future is cancelled
    ///
    /// Successes and failures are forwarded to the derived future.
    ///
    pub fn on_cancel<F>(&self, executor: Executor, handler: F) -> Future<T>
        where F: FnOnce(Option<CancelToken>) -> HandlerResult<T> + Send + 'static
    {
        self.attach(executor,
                    |completion| match completion {
                        Completion::Cancelled(token) => Ok(token),
                        other => Err(other),
                    },
                    handler)
    }

    /// Run a computation under some executor, and get its outcome as a future
    pub fn spawn<F>(runtime: &Runtime, executor: Executor, f: F) -> Future<T>
        where F: FnOnce() -> HandlerResult<T> + Send + 'static
    {
        let executor = executor.capture(runtime);
        let affinity = executor.serial_affinity(runtime);
        let promise = Promise::derived(runtime, Vec::new(), affinity);
        let future = promise.future();
        run_handler(runtime, &executor, promise, (), move |()| f());
        future
    }

    /// Common machinery of all handler kinds
    ///
    /// `split` picks the outcomes that the handler is about, and converts
    /// every other outcome into the derived future's final outcome.
    ///
    fn attach<V, S, P, F>(&self, executor: Executor, split: P, handler: F) -> Future<S>
        where V: Send + 'static,
              S: Clone + Send + 'static,
              P: FnOnce(Completion<T>) -> Result<V, Completion<S>> + Send + 'static,
              F: FnOnce(V) -> HandlerResult<S> + Send + 'static
    {
        let runtime = self.runtime().clone();
        let executor = executor.capture(&runtime);
        let affinity = executor.serial_affinity(&runtime);
        let promise = Promise::derived(&runtime, vec![self.weak_node()], affinity);
        let derived = promise.future();
        trace!(source = %self.id(), derived = %derived.id(), ?executor, "handler attached");

        // Bypassed outcomes are left to the completion loop, which keeps the
        // stack flat along chains of handlers that do not care about them
        self.subscribe_relay(move |completion| match split(completion) {
            Ok(input) => {
                run_handler(&runtime, &executor, promise, input, handler);
                None
            },
            Err(bypassed) => Some(promise.complete_deferred(bypassed)),
        });
        derived
    }
}


/// Dispatch a handler, then settle the derived future with its result
fn run_handler<V, S, F>(runtime: &Runtime,
                        executor: &Executor,
                        promise: Promise<S>,
                        input: V,
                        handler: F)
    where V: Send + 'static,
          S: Clone + Send + 'static,
          F: FnOnce(V) -> HandlerResult<S> + Send + 'static
{
    let derived = promise.future();
    let job = Job::new(move || {
        let result = panic::catch_unwind(AssertUnwindSafe(move || handler(input)))
                            .unwrap_or_else(|payload| {
                                let error = FutureError::from_panic(payload);
                                warn!(%error, "handler panicked");
                                HandlerResult::Fail(error)
                            });
        if let Err(conflict) = promise.resolve(result) {
            trace!(future = %conflict.future, "handler result arrived too late");
        }
    });
    if let Err(Rejected { error, job }) = executor.dispatch(runtime, job) {
        warn!(future = %derived.id(), %error, "handler could not be dispatched");
        derived.shared().escalate(FutureError::Dispatch(error));
        drop(job);
    }
}
