//! Priority-ordered execution of jobs, under a concurrency limit
//!
//! A `FutureQueue` holds on to jobs until it has room to run them. Jobs are
//! started most urgent tier first, and in submission order within a tier. A
//! job keeps its slot until the future it produced completes, so jobs which
//! delegate to some longer-running asynchronous operation are accounted for
//! until that operation is over.
//!
//! Less urgent tiers only get a share of the concurrency limit, so that some
//! room is left for urgent jobs: three quarters for `Utility` jobs, half of it
//! for `Background` jobs, and at least one slot in any case. A job which does
//! not fit blocks the tiers below it, so that it is not starved by a stream of
//! less urgent jobs.
//!
//! Cancelling jobs through the queue is not cooperative: their futures are
//! completed as `Cancelled` right away and their slot is freed, after the
//! operation they delegated to has been asked to stop.

use crate::completion::HandlerResult;
use crate::executor::{Executor, Priority};
use crate::future::Future;
use crate::promise::Promise;
use crate::runtime::Runtime;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace, warn};


/// Default number of jobs which may run at the same time
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Default time after which a running job is failed as timed out
pub const DEFAULT_MAX_EXECUTION_TIME: Duration = Duration::from_secs(45);


/// Priority queue of jobs producing futures
pub struct FutureQueue {
    inner: Arc<QueueInner>,
}
//
impl FutureQueue {
    /// Create a queue in the global runtime
    pub fn new() -> Self {
        Self::with_runtime(Runtime::global())
    }

    /// Create a queue in a specific runtime
    pub fn with_runtime(runtime: &Runtime) -> Self {
        FutureQueue {
            inner: Arc::new(QueueInner {
                runtime: runtime.clone(),
                state: Mutex::new(QueueState {
                    max_concurrent: DEFAULT_MAX_CONCURRENT,
                    max_execution_time: Some(DEFAULT_MAX_EXECUTION_TIME),
                    pending: Priority::ALL.iter().map(|_| VecDeque::new()).collect(),
                    executing: Vec::new(),
                    next_job: 0,
                    dispatching: false,
                }),
            }),
        }
    }

    /// Maximal number of jobs running at the same time
    pub fn max_concurrent(&self) -> usize {
        self.inner.state.lock().max_concurrent
    }

    /// Change the concurrency limit
    ///
    /// A limit of zero pauses the queue. Jobs which are already running keep
    /// running when the limit is lowered.
    ///
    pub fn set_max_concurrent(&self, max_concurrent: usize) {
        self.inner.state.lock().max_concurrent = max_concurrent;
        self.inner.dispatch();
    }

    /// Change the time after which jobs started from now on are failed with
    /// `FutureError::TimedOut`, or disable that timeout
    pub fn set_max_execution_time(&self, max_execution_time: Option<Duration>) {
        self.inner.state.lock().max_execution_time = max_execution_time;
    }

    /// Queue a job
    pub fn add<T, F>(&self, executor: Executor, priority: Priority, operation: F) -> Future<T>
        where T: Clone + Send + 'static,
              F: FnOnce() -> HandlerResult<T> + Send + 'static
    {
        self.add_tagged(executor, priority, None, operation)
    }

    /// Queue a job with a tag, which identifies it in diagnostics
    pub fn add_tagged<T, F>(&self,
                            executor: Executor,
                            priority: Priority,
                            tag: Option<String>,
                            operation: F) -> Future<T>
        where T: Clone + Send + 'static,
              F: FnOnce() -> HandlerResult<T> + Send + 'static
    {
        let promise = Arc::new(Promise::with_runtime(&self.inner.runtime));
        let result = promise.future();

        let cancel = {
            let promise = promise.clone();
            Box::new(move || {
                promise.future().request_cancel(None);
                if let Err(conflict) = promise.complete_with_cancel(None) {
                    trace!(future = %conflict.future, "cancelled job was already over");
                }
            })
        };

        let start = {
            let runtime = self.inner.runtime.clone();
            let result = result.clone();
            Box::new(move |time_limit: Option<Duration>, on_done: Box<dyn FnOnce() + Send>| {
                if !promise.is_completed() {
                    let running = Future::spawn(&runtime, executor, operation);
                    if let Err(conflict) = promise.delegate_to(running) {
                        trace!(future = %conflict.future, "job completed before starting");
                    }
                    if let Some(time_limit) = time_limit {
                        if let Err(error) = promise.fail_after(time_limit, "queued job timed out") {
                            warn!(future = %result.id(), %error, "job timeout not armed");
                        }
                    }
                }
                result.subscribe_inline(move |_| on_done());
            })
        };

        {
            let mut state = self.inner.state.lock();
            let id = state.next_job;
            state.next_job += 1;
            trace!(job = id, future = %result.id(), %priority, ?tag, "job queued");
            state.pending[priority.index()].push_back(PendingJob {
                job: JobInfo { id, priority, tag, cancel },
                start,
            });
        }
        self.inner.dispatch();
        result
    }

    /// Cancel every pending or running job of the given tier and of the tiers
    /// below it
    pub fn cancel_jobs_at_or_below(&self, priority: Priority) {
        let cancelled = {
            let mut state = self.inner.state.lock();
            let mut cancelled = Vec::new();
            for tier in state.pending.iter_mut().skip(priority.index()) {
                cancelled.extend(tier.drain(..).map(|pending| pending.job));
            }
            let (stopped, kept) = state.executing
                                       .drain(..)
                                       .partition::<Vec<_>, _>(|job| job.priority >= priority);
            state.executing = kept;
            cancelled.extend(stopped);
            cancelled
        };
        debug!(count = cancelled.len(), %priority, "cancelling queued jobs");
        for job in cancelled {
            (job.cancel)();
        }
        self.inner.dispatch();
    }

    /// Cancel every pending or running job
    pub fn cancel_all(&self) {
        self.cancel_jobs_at_or_below(Priority::UserInteractive)
    }

    /// Number of jobs waiting for a slot
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.iter().map(VecDeque::len).sum()
    }

    /// Number of jobs running
    pub fn executing_count(&self) -> usize {
        self.inner.state.lock().executing.len()
    }

    /// Number of jobs which are not over yet
    pub fn unfinished_count(&self) -> usize {
        let state = self.inner.state.lock();
        state.executing.len() + state.pending.iter().map(VecDeque::len).sum::<usize>()
    }

    /// Tags of the running jobs, in start order
    pub fn executing_tags(&self) -> Vec<Option<String>> {
        self.inner.state.lock().executing.iter().map(|job| job.tag.clone()).collect()
    }
}
//
impl Default for FutureQueue {
    fn default() -> Self {
        Self::new()
    }
}


/// Shared state of a queue and of the jobs it started
struct QueueInner {
    runtime: Runtime,
    state: Mutex<QueueState>,
}
//
impl QueueInner {
    /// Start jobs until the queue is full or empty
    ///
    /// Completion of a job may free a slot from within this loop, on the same
    /// thread or on another one. Only one thread runs the loop at a time, and
    /// it keeps going until nothing fits anymore.
    ///
    fn dispatch(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.dispatching {
                return;
            }
            state.dispatching = true;
        }
        loop {
            let (pending, time_limit) = {
                let mut state = self.state.lock();
                match state.pop_startable() {
                    Some(pending) => (pending, state.max_execution_time),
                    None => {
                        state.dispatching = false;
                        return;
                    },
                }
            };
            let id = pending.job_id;
            trace!(job = id, "starting job");
            let queue = Arc::downgrade(self);
            (pending.start)(time_limit, Box::new(move || finish(&queue, id)));
        }
    }
}


/// Release the slot of a job whose future completed
fn finish(queue: &Weak<QueueInner>, id: u64) {
    if let Some(queue) = queue.upgrade() {
        queue.state.lock().executing.retain(|job| job.id != id);
        trace!(job = id, "job over");
        queue.dispatch();
    }
}


/// Bookkeeping of a queue
struct QueueState {
    max_concurrent: usize,
    max_execution_time: Option<Duration>,

    /// Jobs waiting for a slot, one FIFO per tier, most urgent first
    pending: Vec<VecDeque<PendingJob>>,

    /// Jobs holding a slot, in start order
    executing: Vec<JobInfo>,

    next_job: u64,

    /// Whether some thread is starting jobs
    dispatching: bool,
}
//
impl QueueState {
    /// Number of slots which jobs of a given tier may use
    fn allowance(&self, priority: Priority) -> usize {
        let limit = self.max_concurrent;
        if limit == 0 {
            return 0;
        }
        match priority {
            Priority::Background => (limit / 2).max(1),
            Priority::Utility => (limit * 3 / 4).max(1),
            _ => limit,
        }
    }

    /// Take the next job if it fits, giving it a slot
    fn pop_startable(&mut self) -> Option<StartableJob> {
        let tier = self.pending.iter().position(|tier| !tier.is_empty())?;
        let priority = self.pending[tier].front()?.job.priority;
        if self.executing.len() >= self.allowance(priority) {
            return None;
        }
        let PendingJob { job, start } = self.pending[tier].pop_front()?;
        let job_id = job.id;
        self.executing.push(job);
        Some(StartableJob { job_id, start })
    }
}


/// Start a job under some time limit, and call back once its future completes
type StartFn = Box<dyn FnOnce(Option<Duration>, Box<dyn FnOnce() + Send>) + Send>;

/// What the queue knows about a job, whether pending or running
struct JobInfo {
    id: u64,
    priority: Priority,
    tag: Option<String>,

    /// Ask the job's operation to stop, and complete its future as cancelled
    cancel: Box<dyn FnOnce() + Send>,
}

struct PendingJob {
    job: JobInfo,
    start: StartFn,
}

struct StartableJob {
    job_id: u64,
    start: StartFn,
}
