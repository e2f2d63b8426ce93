//! Producer side of a promise/future pair
//!
//! A `Promise` is the exclusive writer of a future's outcome. The producer
//! holds onto it until the outcome is known, then completes it exactly once.
//! Completion methods take the promise by shared reference, so that a
//! producer may share its promise with whichever code paths compete to
//! complete it, such as a worker and a cancellation hook. The first one to
//! complete the future wins, and the others are told so.
//!
//! If a promise is dropped before its future is completed, the future fails
//! with `FutureError::BrokenPromise`, so that consumers do not hang forever.

use crate::cancel::{CancelRequest, CancelResponse};
use crate::completion::{AlreadyCompleted, CancelToken, Completion, FutureError,
                        HandlerResult};
use crate::executor::{DispatchError, Job, QueueId, Rejected};
use crate::future::{Future, Node, Shared, Step};
use crate::runtime::Runtime;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{trace, warn};


/// Exclusive writer of a future's outcome
pub struct Promise<T> {
    /// Shared state of the future being produced
    shared: Arc<Shared<T>>,

    /// Same shared state, seen independently of its result type
    node: Arc<dyn Node>,

    /// Whether dropping the promise should break it
    armed: AtomicBool,
}
//
impl<T: Clone + Send + 'static> Promise<T> {
    /// Create a promise in the global runtime
    pub fn new() -> Self {
        Self::with_runtime(Runtime::global())
    }

    /// Create a promise in a specific runtime
    pub fn with_runtime(runtime: &Runtime) -> Self {
        Self::derived(runtime, Vec::new(), None)
    }

    /// Create a promise whose future was derived from other futures
    pub(crate) fn derived(runtime: &Runtime,
                          upstream: Vec<Weak<dyn Node>>,
                          affinity: Option<QueueId>) -> Self {
        let shared = Shared::new(runtime.clone(), upstream, affinity);
        let node: Arc<dyn Node> = shared.clone();
        Promise { shared, node, armed: AtomicBool::new(true) }
    }

    /// Handle to the future which this promise completes
    pub fn future(&self) -> Future<T> {
        Future::from_shared(self.shared.clone())
    }

    /// Check if the future is completed already
    pub fn is_completed(&self) -> bool {
        self.shared.is_completed()
    }

    /// Complete the future
    pub fn complete(&self, completion: Completion<T>) -> Result<(), AlreadyCompleted> {
        self.shared.try_complete(completion).map_err(|(conflict, _)| conflict)
    }

    /// Complete the future, or hand the outcome over to a fallback if the
    /// future is completed already
    pub fn complete_or_else<F>(&self, completion: Completion<T>, on_conflict: F)
        where F: FnOnce(Completion<T>)
    {
        if let Err((_, rejected)) = self.shared.try_complete(completion) {
            on_conflict(rejected)
        }
    }

    /// Complete the future with a value
    pub fn complete_with_success(&self, value: T) -> Result<(), AlreadyCompleted> {
        self.complete(Completion::Success(value))
    }

    /// Complete the future with an error
    pub fn complete_with_fail(&self, error: FutureError) -> Result<(), AlreadyCompleted> {
        self.complete(Completion::Fail(error))
    }

    /// Complete the future with a plain error message
    pub fn complete_with_fail_message<M: Into<String>>(&self, message: M)
        -> Result<(), AlreadyCompleted>
    {
        self.complete(Completion::fail_with_message(message))
    }

    /// Complete the future as cancelled
    pub fn complete_with_cancel(&self, token: Option<CancelToken>)
        -> Result<(), AlreadyCompleted>
    {
        self.complete(Completion::Cancelled(token))
    }

    /// Settle the future with a handler result, which may delegate to another
    /// future
    pub fn resolve(&self, result: HandlerResult<T>) -> Result<(), AlreadyCompleted> {
        match result.into_completion() {
            Ok(completion) => self.complete(completion),
            Err(future) => self.delegate_to(future),
        }
    }

    /// Make the future adopt the eventual outcome of another future
    ///
    /// Once delegated, the promise is no longer responsible for the outcome,
    /// so dropping it does not break it anymore. An error means that the
    /// future was completed through another path, before the delegation
    /// could take effect.
    ///
    pub fn delegate_to(&self, future: Future<T>) -> Result<(), AlreadyCompleted> {
        self.shared.follow(future.shared())?;
        self.armed.store(false, Ordering::Release);
        Ok(())
    }

    /// Leave the completion of the future to the caller's completion loop
    pub(crate) fn complete_deferred(self, completion: Completion<T>) -> Step {
        self.armed.store(false, Ordering::Release);
        self.shared.clone().step(completion)
    }

    /// Fail the future, unless it is completed already
    ///
    /// Returns whether this call completed the future.
    ///
    pub fn fail_if_not_completed(&self, error: FutureError) -> bool {
        self.complete(Completion::Fail(error)).is_ok()
    }

    /// Register a reaction to cancellation requests
    ///
    /// Hooks run on whichever thread requests cancellation, and may be called
    /// several times. They are discarded once the future completes.
    ///
    pub fn on_request_cancel<F>(&self, hook: F)
        where F: Fn(&CancelRequest) -> CancelResponse<T> + Send + Sync + 'static
    {
        if !self.shared.add_cancel_hook(Arc::new(hook)) {
            trace!(future = %self.shared.id(), "cancel hook registered on completed future");
        }
    }

    /// Honor every cancellation request by completing as `Cancelled`
    pub fn cancel_on_request(&self) {
        self.on_request_cancel(|request| CancelResponse::Complete(request.cancelled()))
    }

    /// Fail the future with `FutureError::TimedOut` unless it completes within
    /// some delay
    ///
    /// The timer does not keep the future alive.
    ///
    pub fn fail_after<M: Into<String>>(&self, delay: Duration, message: M)
        -> Result<(), DispatchError>
    {
        let weak_shared = Arc::downgrade(&self.shared);
        let message = message.into();
        let job = Job::new(move || {
            if let Some(shared) = weak_shared.upgrade() {
                shared.escalate(FutureError::TimedOut(message));
            }
        });
        self.shared.runtime().schedule_after(delay, job).map_err(Rejected::into_error)
    }
}
//
impl<T: Clone + Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}
//
impl<T> Drop for Promise<T> {
    /// If the promise is dropped before the future has reached its final
    /// status, fail the future in order to prevent consumers from hanging
    fn drop(&mut self) {
        if self.armed.load(Ordering::Acquire) && self.node.escalate(FutureError::BrokenPromise) {
            warn!(future = %self.node.id(), "promise dropped without being completed");
        }
    }
}
//
impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Promise").field("future", &self.node.id()).finish()
    }
}
