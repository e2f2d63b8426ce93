//! Read-only handles to the eventual outcome of an asynchronous operation
//!
//! A `Future` is the consumer side of a promise/future pair. It starts out
//! pending and eventually holds a `Completion`, which it keeps forever after.
//! Futures are cheap to clone, and their clones all observe the same outcome.
//!
//! Under the hood, every future is a reference-counted shared state, which
//! holds either the list of things to do once the outcome is known, or the
//! outcome itself:
//!
//! - Subscribers, which are the raw callbacks behind handlers and
//!   combinators. They are drained exactly once, in registration order, at
//!   the moment of completion.
//! - Followers, which are futures that have adopted this future's outcome
//!   through delegation. Completing a future completes its followers, their
//!   own followers, and so on, through a worklist rather than through
//!   recursion, so that arbitrarily long delegation chains are safe.
//!   Subscribers which merely pass an outcome on to another future hand that
//!   completion back to the same worklist, so outcomes which bypass a long
//!   chain of handlers are just as safe.
//! - Cancellation hooks and upstream links, through which cancellation
//!   requests are relayed back to the original producer.
//!
//! Everything that is only needed while the future is pending is discarded
//! on completion, so completed futures hold nothing but their outcome.

mod chain;
mod wait;

pub use self::wait::WaitError;

use crate::cancel::{CancelHook, CancelRequest, CancelResponse};
use crate::completion::{AlreadyCompleted, CancelToken, Completion, FutureError};
use crate::executor::{Job, QueueId, Rejected};
use crate::promise::Promise;
use crate::runtime::Runtime;
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{trace, warn};


/// Unique identifier of a future, used in diagnostics
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FutureId(u64);
//
impl FutureId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        FutureId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}
//
impl fmt::Display for FutureId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "future#{}", self.0)
    }
}


/// Raw callback receiving a future's outcome
///
/// A subscriber may return the completion of another future instead of
/// performing it, leaving it to the completion loop that called it.
///
pub(crate) type Subscriber<T> = Box<dyn FnOnce(Completion<T>) -> Option<Step> + Send>;


/// Deferred completion of a future, which may uncover more of them
pub(crate) struct Step(Box<dyn FnOnce() -> Vec<Step>>);


/// Run deferred completions until none are left
fn run_steps(mut worklist: Vec<Step>) {
    while let Some(Step(step)) = worklist.pop() {
        worklist.extend(step());
    }
}


/// Link in a graph of futures, seen independently of their result type
///
/// Cancellation requests travel from derived futures to the futures they were
/// derived from, which may have a different result type.
///
pub(crate) trait Node: Send + Sync {
    /// Identifier of the underlying future
    fn id(&self) -> FutureId;

    /// Run the cancellation hooks of a pending future, and report the futures
    /// which the request should be relayed to
    fn cancel_step(&self, request: &CancelRequest) -> Vec<Arc<dyn Node>>;

    /// Fail the future unless it is completed already, and tell whether it
    /// was still pending
    fn escalate(&self, error: FutureError) -> bool;
}


/// State shared by all handles to a future
pub(crate) struct Shared<T> {
    id: FutureId,
    runtime: Runtime,
    state: Mutex<State<T>>,
    completed: Condvar,
}
//
enum State<T> {
    Pending(Pending<T>),
    Completed(Completion<T>),
}
//
struct Pending<T> {
    subscribers: Vec<Subscriber<T>>,
    followers: Vec<Arc<Shared<T>>>,
    cancel_hooks: Vec<Arc<CancelHook<T>>>,
    upstream: Vec<Weak<dyn Node>>,

    /// Serial context which the producer of this future runs on, if known
    affinity: Option<QueueId>,
}
//
impl<T: Clone + Send + 'static> Shared<T> {
    /// Set up a pending future
    pub(crate) fn new(runtime: Runtime,
                      upstream: Vec<Weak<dyn Node>>,
                      affinity: Option<QueueId>) -> Arc<Self> {
        Self::with_state(runtime, State::Pending(Pending {
            subscribers: Vec::new(),
            followers: Vec::new(),
            cancel_hooks: Vec::new(),
            upstream,
            affinity,
        }))
    }

    /// Set up a future which is completed from the start
    fn completed(runtime: Runtime, completion: Completion<T>) -> Arc<Self> {
        Self::with_state(runtime, State::Completed(completion))
    }

    fn with_state(runtime: Runtime, state: State<T>) -> Arc<Self> {
        Arc::new(Shared {
            id: FutureId::next(),
            runtime,
            state: Mutex::new(state),
            completed: Condvar::new(),
        })
    }

    pub(crate) fn id(&self) -> FutureId {
        self.id
    }

    pub(crate) fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Current outcome of the future, if any
    pub(crate) fn snapshot(&self) -> Option<Completion<T>> {
        match *self.state.lock() {
            State::Pending(_) => None,
            State::Completed(ref completion) => Some(completion.clone()),
        }
    }

    pub(crate) fn is_completed(&self) -> bool {
        matches!(*self.state.lock(), State::Completed(_))
    }

    /// Complete the future and every future that delegated to it
    ///
    /// If the future was completed already, the rejected outcome is handed
    /// back along with the error.
    ///
    pub(crate) fn try_complete(&self, completion: Completion<T>)
        -> Result<(), (AlreadyCompleted, Completion<T>)>
    {
        run_steps(self.settle(completion)?);
        Ok(())
    }

    /// Package the completion of this future for a completion loop to run
    pub(crate) fn step(self: Arc<Self>, completion: Completion<T>) -> Step {
        Step(Box::new(move || match self.settle(completion) {
            Ok(more) => more,
            Err((conflict, _)) => {
                trace!(future = %conflict.future,
                       "relayed outcome arrived after another completion");
                Vec::new()
            },
        }))
    }

    /// Transition to the completed state, fire the subscribers, and hand the
    /// completion of followers and relayed outcomes back to the caller
    fn settle(&self, completion: Completion<T>)
        -> Result<Vec<Step>, (AlreadyCompleted, Completion<T>)>
    {
        let previous = {
            let mut state = self.state.lock();
            if let State::Completed(_) = *state {
                return Err((AlreadyCompleted { future: self.id }, completion));
            }
            mem::replace(&mut *state, State::Completed(completion.clone()))
        };
        self.completed.notify_all();
        let pending = match previous {
            State::Pending(pending) => pending,
            State::Completed(_) => return Ok(Vec::new()),
        };
        trace!(future = %self.id,
               subscribers = pending.subscribers.len(),
               followers = pending.followers.len(),
               "future completed");

        let mut steps = pending.followers
                               .into_iter()
                               .map(|follower| follower.step(completion.clone()))
                               .collect::<Vec<_>>();
        let mut subscribers = pending.subscribers;
        if let Some(last) = subscribers.pop() {
            for subscriber in subscribers {
                steps.extend(subscriber(completion.clone()));
            }
            steps.extend(last(completion));
        }
        Ok(steps)
    }

    /// Register a callback for the future's outcome
    ///
    /// If the future is completed already, the callback is run right away on
    /// the calling thread.
    ///
    pub(crate) fn subscribe(&self, subscriber: Subscriber<T>) {
        let completion = {
            let mut state = self.state.lock();
            match *state {
                State::Pending(ref mut pending) => {
                    pending.subscribers.push(subscriber);
                    return;
                },
                State::Completed(ref completion) => completion.clone(),
            }
        };
        run_steps(subscriber(completion).into_iter().collect());
    }

    /// Register a producer-side reaction to cancellation requests
    ///
    /// Returns false if the future is completed already, in which case the
    /// hook is dropped without ever being called.
    ///
    pub(crate) fn add_cancel_hook(&self, hook: Arc<CancelHook<T>>) -> bool {
        match *self.state.lock() {
            State::Pending(ref mut pending) => {
                pending.cancel_hooks.push(hook);
                true
            },
            State::Completed(_) => false,
        }
    }

    /// Make this pending future adopt the eventual outcome of `inner`
    ///
    /// Fails if this future is completed before the delegation could take
    /// effect, either before the call or while `inner`'s outcome was being
    /// adopted.
    ///
    pub(crate) fn follow(self: &Arc<Self>, inner: &Arc<Shared<T>>)
        -> Result<(), AlreadyCompleted>
    {
        let delegating_to_self = Arc::ptr_eq(self, inner);
        match *self.state.lock() {
            State::Completed(_) => return Err(AlreadyCompleted { future: self.id }),
            State::Pending(ref mut pending) => {
                if !delegating_to_self {
                    let inner_node: Arc<dyn Node> = inner.clone();
                    pending.upstream.push(Arc::downgrade(&inner_node));
                }
            },
        }
        if delegating_to_self {
            warn!(future = %self.id, "future asked to delegate to itself");
            self.escalate(FutureError::SelfDelegation);
            return Ok(());
        }

        let ready = {
            let mut state = inner.state.lock();
            match *state {
                State::Pending(ref mut pending) => {
                    trace!(outer = %self.id, inner = %inner.id, "delegation registered");
                    pending.followers.push(self.clone());
                    return Ok(());
                },
                State::Completed(ref completion) => completion.clone(),
            }
        };
        self.try_complete(ready).map_err(|(conflict, _)| conflict)
    }
}
//
impl<T: Clone + Send + 'static> Node for Shared<T> {
    fn id(&self) -> FutureId {
        self.id
    }

    fn cancel_step(&self, request: &CancelRequest) -> Vec<Arc<dyn Node>> {
        let (hooks, upstream) = match *self.state.lock() {
            State::Completed(_) => {
                trace!(future = %self.id, "cancel request reached a completed future");
                return Vec::new();
            },
            State::Pending(ref pending) => {
                (pending.cancel_hooks.clone(),
                 pending.upstream.iter().filter_map(Weak::upgrade).collect())
            },
        };
        for hook in hooks {
            if let CancelResponse::Complete(completion) = hook(request) {
                if let Err((conflict, _)) = self.try_complete(completion) {
                    trace!(future = %conflict.future,
                           "cancel hook lost the race against the producer");
                }
            }
        }
        upstream
    }

    fn escalate(&self, error: FutureError) -> bool {
        match self.try_complete(Completion::Fail(error)) {
            Ok(()) => true,
            Err((conflict, _)) => {
                trace!(future = %conflict.future, "escalated failure arrived too late");
                false
            },
        }
    }
}


/// Relay a cancellation request from a future to the futures it depends on
pub(crate) fn relay_cancel(origin: Arc<dyn Node>, request: &CancelRequest) {
    let mut visited = HashSet::new();
    let mut worklist = vec![origin];
    while let Some(node) = worklist.pop() {
        if !visited.insert(node.id()) {
            continue;
        }
        trace!(future = %node.id(), "processing cancel request");
        let upstream = node.cancel_step(request);
        if request.forwards_upstream() {
            worklist.extend(upstream);
        }
    }
}


/// Read-only handle to the eventual outcome of an asynchronous operation
pub struct Future<T> {
    shared: Arc<Shared<T>>,
}
//
impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Future { shared: self.shared.clone() }
    }
}
//
impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Future").field("id", &self.shared.id).finish()
    }
}
//
impl<T> Future<T> {
    /// Identifier of this future
    pub fn id(&self) -> FutureId {
        self.shared.id
    }

    /// Runtime whose executors serve this future's handlers
    pub fn runtime(&self) -> &Runtime {
        &self.shared.runtime
    }

    /// Check if two handles refer to the same future
    pub fn ptr_eq(&self, other: &Future<T>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}
//
impl<T: Clone + Send + 'static> Future<T> {
    pub(crate) fn from_shared(shared: Arc<Shared<T>>) -> Self {
        Future { shared }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared<T>> {
        &self.shared
    }

    /// Type-erased link to this future, which does not keep it alive
    pub(crate) fn weak_node(&self) -> Weak<dyn Node> {
        let node: Arc<dyn Node> = self.shared.clone();
        Arc::downgrade(&node)
    }

    /// Build a completed future in the given runtime
    pub fn completed_in(runtime: &Runtime, completion: Completion<T>) -> Self {
        Future::from_shared(Shared::completed(runtime.clone(), completion))
    }

    /// Build a completed future in the global runtime
    pub fn completed(completion: Completion<T>) -> Self {
        Self::completed_in(Runtime::global(), completion)
    }

    /// Build a successful future in the global runtime
    pub fn success(value: T) -> Self {
        Self::completed(Completion::Success(value))
    }

    /// Build a failed future in the global runtime
    pub fn fail(error: FutureError) -> Self {
        Self::completed(Completion::Fail(error))
    }

    /// Build a cancelled future in the global runtime
    pub fn cancelled(token: Option<CancelToken>) -> Self {
        Self::completed(Completion::Cancelled(token))
    }

    /// Build a future which completes with a fixed outcome after some delay
    ///
    /// Cancellation requests complete the future early as `Cancelled`, and
    /// release it from the timer, which then only holds an empty slot until
    /// the deadline.
    ///
    pub fn after_delay(runtime: &Runtime, delay: Duration, completion: Completion<T>) -> Self {
        let promise = Promise::with_runtime(runtime);
        let future = promise.future();
        let slot = Arc::new(Mutex::new(Some(promise)));
        {
            let slot = Arc::downgrade(&slot);
            future.shared.add_cancel_hook(Arc::new(move |request: &CancelRequest| {
                let promise = slot.upgrade().and_then(|slot| slot.lock().take());
                if let Some(promise) = promise {
                    if let Err(conflict) = promise.complete(request.cancelled()) {
                        trace!(future = %conflict.future, "delay cancelled after expiring");
                    }
                }
                CancelResponse::Ignore
            }));
        }
        let job = Job::new(move || {
            let promise = slot.lock().take();
            match promise {
                Some(promise) => {
                    if let Err(conflict) = promise.complete(completion) {
                        trace!(future = %conflict.future,
                               "delayed outcome arrived after another completion");
                    }
                },
                None => trace!("delayed outcome arrived after cancellation"),
            }
        });
        if let Err(Rejected { error, job }) = runtime.schedule_after(delay, job) {
            future.shared.escalate(FutureError::Dispatch(error));
            drop(job);
        }
        future
    }

    /// Outcome of the future if it is completed, without blocking
    pub fn current_result(&self) -> Option<Completion<T>> {
        self.shared.snapshot()
    }

    /// Check if the future is completed, without blocking
    pub fn is_completed(&self) -> bool {
        self.shared.is_completed()
    }

    /// Ask for the operation behind this future to be cancelled
    ///
    /// The request is relayed to every future this one was derived from, up
    /// to the original producers, which may or may not honor it. This never
    /// changes the state of the future directly, and has no effect at all on
    /// completed futures.
    ///
    pub fn request_cancel(&self, token: Option<CancelToken>) {
        self.request_cancel_with(CancelRequest::new(token))
    }

    /// Ask for cancellation, with full control over the request
    pub fn request_cancel_with(&self, request: CancelRequest) {
        relay_cancel(self.shared.clone(), &request)
    }

    /// Run a raw callback on whichever thread completes the future, or right
    /// away if it is completed already
    pub(crate) fn subscribe_inline<F>(&self, callback: F)
        where F: FnOnce(Completion<T>) + Send + 'static
    {
        self.shared.subscribe(Box::new(move |completion| {
            callback(completion);
            None
        }))
    }

    /// Like `subscribe_inline()`, but the callback may pass the completion of
    /// another future back to the completion loop
    pub(crate) fn subscribe_relay<F>(&self, callback: F)
        where F: FnOnce(Completion<T>) -> Option<Step> + Send + 'static
    {
        self.shared.subscribe(Box::new(callback))
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use crate::cancel::{CancelRequest, CancelResponse};
    use crate::completion::{CancelToken, Completion, FutureError, HandlerResult};
    use crate::executor::Executor;
    use crate::future::*;
    use crate::promise::Promise;
    use crate::test_util::{init_test_logging, test_runtime};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::{Duration, Instant};

    /// Check that pre-completed futures report their outcome right away
    #[test]
    fn completed_constructors() {
        init_test_logging();
        assert_eq!(Future::success(42).current_result(), Some(Completion::Success(42)));
        let error = FutureError::message("nope");
        assert_eq!(Future::<u8>::fail(error.clone()).current_result(),
                   Some(Completion::Fail(error)));
        let cancelled = Future::<u8>::cancelled(None);
        assert!(cancelled.is_completed());
        assert_eq!(cancelled.current_result(), Some(Completion::Cancelled(None)));
        assert!(cancelled.runtime().ptr_eq(Runtime::global()));
    }

    /// Check that a future completes exactly once, and that its clones see
    /// the same outcome
    #[test]
    fn complete_once() {
        init_test_logging();
        let runtime = test_runtime();
        let promise = Promise::with_runtime(&runtime);
        let future = promise.future();
        let clone = future.clone();
        assert!(!future.is_completed());
        assert_eq!(future.current_result(), None);

        assert!(promise.complete(Completion::Success(1)).is_ok());
        let conflict = promise.complete(Completion::Success(2)).unwrap_err();
        assert_eq!(conflict.future, future.id());
        assert_eq!(clone.current_result(), Some(Completion::Success(1)));
        assert!(clone.ptr_eq(&future));
    }

    /// Check that subscribers fire once, in registration order
    #[test]
    fn subscriber_order() {
        init_test_logging();
        let runtime = test_runtime();
        let promise = Promise::<u32>::with_runtime(&runtime);
        let future = promise.future();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for index in 0..5 {
            let log = log.clone();
            future.subscribe_inline(move |completion| {
                log.lock().push((index, completion));
            });
        }
        assert!(log.lock().is_empty());
        promise.complete(Completion::Success(7)).unwrap();
        let expected = (0..5).map(|index| (index, Completion::Success(7)))
                             .collect::<Vec<_>>();
        assert_eq!(*log.lock(), expected);

        // Late subscribers run immediately
        let late = Arc::new(AtomicUsize::new(0));
        let c_late = late.clone();
        future.subscribe_inline(move |_| { c_late.fetch_add(1, Ordering::SeqCst); });
        assert_eq!(late.load(Ordering::SeqCst), 1);
    }

    /// Check that cancellation requests reach the producer's hook
    #[test]
    fn cancel_reaches_hook() {
        init_test_logging();
        let runtime = test_runtime();
        let promise = Promise::<u32>::with_runtime(&runtime);
        let calls = Arc::new(AtomicUsize::new(0));
        let c_calls = calls.clone();
        promise.on_request_cancel(move |request| {
            c_calls.fetch_add(1, Ordering::SeqCst);
            CancelResponse::Complete(request.cancelled())
        });
        let future = promise.future();
        let token = CancelToken::new("stop");
        future.request_cancel(Some(token.clone()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(future.current_result(), Some(Completion::Cancelled(Some(token))));

        // Requests on completed futures are ignored
        future.request_cancel(None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Check that producers without a hook are not forced into cancellation
    #[test]
    fn cancel_is_cooperative() {
        init_test_logging();
        let runtime = test_runtime();
        let promise = Promise::<u32>::with_runtime(&runtime);
        let future = promise.future();
        future.request_cancel(None);
        assert!(!future.is_completed());

        let ignoring = Promise::<u32>::with_runtime(&runtime);
        ignoring.on_request_cancel(|_| CancelResponse::Ignore);
        ignoring.future().request_cancel_with(CancelRequest::default());
        assert!(!ignoring.is_completed());

        promise.complete(Completion::Success(3)).unwrap();
        ignoring.complete(Completion::Success(4)).unwrap();
    }

    /// Check that a delegation chain much longer than any reasonable stack
    /// completes iteratively
    #[test]
    fn long_delegation_chain() {
        init_test_logging();
        let runtime = test_runtime();
        let root = Promise::<u64>::with_runtime(&runtime);
        let mut outer = Vec::new();
        let mut inner = root.future();
        for _ in 0..100_000 {
            let promise = Promise::<u64>::with_runtime(&runtime);
            promise.delegate_to(inner).unwrap();
            inner = promise.future();
            outer.push(promise);
        }
        root.complete(Completion::Success(9)).unwrap();
        assert_eq!(inner.current_result(), Some(Completion::Success(9)));
    }

    /// Check that a future cannot adopt its own outcome
    #[test]
    fn self_delegation() {
        init_test_logging();
        let runtime = test_runtime();
        let promise = Promise::<u8>::with_runtime(&runtime);
        promise.delegate_to(promise.future()).unwrap();
        assert_eq!(promise.future().current_result(),
                   Some(Completion::Fail(FutureError::SelfDelegation)));
    }

    /// Check that delayed futures complete on time, and can be cancelled
    #[test]
    fn delayed_future() {
        init_test_logging();
        let runtime = test_runtime();
        let start = Instant::now();
        let delayed = Future::after_delay(&runtime,
                                          Duration::from_millis(30),
                                          Completion::Success("late"));
        assert_eq!(delayed.blocking_wait_until_completed(), Completion::Success("late"));
        assert!(start.elapsed() >= Duration::from_millis(30));

        let cancelled = Future::after_delay(&runtime,
                                            Duration::from_secs(3600),
                                            Completion::Success("never"));
        cancelled.request_cancel(None);
        assert_eq!(cancelled.current_result(), Some(Completion::Cancelled(None)));
    }

    /// Check that a cancelled delay does not keep its runtime alive until the
    /// deadline
    #[test]
    fn cancelled_delay_releases_runtime() {
        init_test_logging();
        let runtime = test_runtime();
        let weak_runtime = runtime.downgrade();
        let delayed = Future::after_delay(&runtime,
                                          Duration::from_secs(3600),
                                          Completion::Success(0u8));
        delayed.request_cancel(None);
        assert_eq!(delayed.current_result(), Some(Completion::Cancelled(None)));
        drop(delayed);
        drop(runtime);
        assert!(weak_runtime.upgrade().is_none());
    }

    /// Check that handlers registered while the future completes on another
    /// thread all run, and run only once
    #[test]
    fn concurrent_registration() {
        init_test_logging();
        const REGISTRARS: usize = 8;
        const HANDLERS_PER_REGISTRAR: usize = 500;
        for _ in 0..20 {
            let runtime = test_runtime();
            let promise = Promise::<usize>::with_runtime(&runtime);
            let future = promise.future();
            let calls = Arc::new(AtomicUsize::new(0));
            let barrier = Arc::new(Barrier::new(REGISTRARS + 1));
            let registrars = (0..REGISTRARS).map(|_| {
                let future = future.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..HANDLERS_PER_REGISTRAR {
                        let calls = calls.clone();
                        future.on_complete(Executor::Immediate, move |_| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            HandlerResult::Success(())
                        });
                    }
                })
            }).collect::<Vec<_>>();
            let completer = {
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    promise.complete(Completion::Success(1)).unwrap();
                })
            };
            for registrar in registrars {
                registrar.join().unwrap();
            }
            completer.join().unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), REGISTRARS * HANDLERS_PER_REGISTRAR);
        }
    }

    /// Check that a delegation racing against a direct completion reports
    /// whether it took effect
    #[test]
    fn delegation_races_completion() {
        init_test_logging();
        let runtime = test_runtime();
        let inner = Future::completed_in(&runtime, Completion::Success(2u8));
        for _ in 0..200 {
            let promise = Arc::new(Promise::<u8>::with_runtime(&runtime));
            let c_promise = promise.clone();
            let completer = thread::spawn(move || c_promise.complete(Completion::Success(1)));
            let delegated = promise.delegate_to(inner.clone());
            let completed = completer.join().unwrap();
            assert_ne!(delegated.is_ok(), completed.is_ok());
            let expected = if delegated.is_ok() { 2 } else { 1 };
            assert_eq!(promise.future().current_result(), Some(Completion::Success(expected)));
        }

        let done = Promise::<u8>::with_runtime(&runtime);
        done.complete(Completion::Success(3)).unwrap();
        let conflict = done.delegate_to(inner.clone()).unwrap_err();
        assert_eq!(conflict.future, done.future().id());
    }
}
