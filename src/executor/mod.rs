//! Callback executors
//!
//! Whenever a handler is attached to a future, one important design issue is
//! to decide how that handler should be executed once the future completes.
//!
//! A traditional answer to this problem has been to run handlers directly on
//! the thread which completes the future, as part of the completion process.
//! While this approach, also known as inline execution, works and has minimal
//! scheduling overhead, it also has some issues that prevent it from being
//! universally applicable:
//!
//! - Long-running handlers can have a harmful impact on the producer
//! - Some handlers must run in a specific context, such as a thread which
//!   owns some non thread-safe resource
//! - Long chains of inline handlers grow the stack of the completing thread
//!
//! For this reason, every handler is associated with an `Executor`, a
//! stateless description of how the handler should eventually be run. The
//! threads which back these policies are owned by a `Runtime`.
//!
//! An executor never silently drops a callback. If a callback cannot be
//! scheduled, dispatch returns it along with the reason, so that the future
//! which was waiting on it can be failed instead of left hanging.

mod context;
pub mod inline;
mod pool;
mod serial;
mod timer;

pub use self::pool::Priority;
pub use self::serial::{QueueId, SerialQueue};
pub(crate) use self::context::current_queue_id;
pub(crate) use self::pool::WorkerPool;
pub(crate) use self::serial::SerialInner;
pub(crate) use self::timer::Timer;

use crate::runtime::{MainStrategy, Runtime};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{trace, warn};


/// Nullary callback waiting to be run by an executor
pub struct Job {
    task: Box<dyn FnOnce() + Send>,
}
//
impl Job {
    /// Wrap a callback into a job
    pub fn new<F: FnOnce() + Send + 'static>(task: F) -> Self {
        Job { task: Box::new(task) }
    }

    /// Run the callback, consuming the job
    pub fn run(self) {
        (self.task)()
    }
}
//
impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Job {{ .. }}")
    }
}


/// Reasons why an executor could not schedule a callback
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// A thread backing the execution context could not be started
    #[error("could not start thread `{name}`: {reason}")]
    Spawn { name: String, reason: String },

    /// The execution context does not accept work anymore
    #[error("execution context `{0}` is closed")]
    Closed(String),

    /// A custom scheduling policy refused the job
    #[error("custom executor refused the job: {0}")]
    Refused(String),
}


/// A job which could not be scheduled, handed back along with the reason
#[derive(Debug, Error)]
#[error("{error}")]
pub struct Rejected {
    /// Why the job could not be scheduled
    pub error: DispatchError,

    /// The job itself, which has not been run
    pub job: Job,
}
//
impl Rejected {
    /// Hand a job back to its submitter
    pub fn new(error: DispatchError, job: Job) -> Self {
        Rejected { error, job }
    }

    /// Drop the job, keeping only the reason why it was rejected
    pub fn into_error(self) -> DispatchError {
        self.error
    }
}


/// User-supplied scheduling function
///
/// The function receives each job and must either arrange for it to be run
/// eventually, or hand it back inside of a `Rejected`.
///
#[derive(Clone)]
pub struct CustomExecutor(Arc<dyn Fn(Job) -> Result<(), Rejected> + Send + Sync>);
//
impl CustomExecutor {
    /// Wrap a scheduling function
    pub fn new<F>(schedule: F) -> Self
        where F: Fn(Job) -> Result<(), Rejected> + Send + Sync + 'static
    {
        CustomExecutor(Arc::new(schedule))
    }

    fn schedule(&self, job: Job) -> Result<(), Rejected> {
        (self.0)(job)
    }
}
//
impl fmt::Debug for CustomExecutor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CustomExecutor({:p})", Arc::as_ptr(&self.0))
    }
}


/// Policy describing where and when a callback runs
#[derive(Clone, Debug)]
pub enum Executor {
    /// The runtime's configured default policy
    Primary,

    /// Best-effort reuse of the calling context
    ///
    /// On the main context, this behaves like `MainImmediate`. On a serial
    /// queue, it targets that queue. On a pool thread, it targets the same
    /// pool tier. Anywhere else, it falls back to `AsyncDefault`. This choice
    /// is advisory: code should not rely on any particular outcome.
    ///
    Current,

    /// Run synchronously on whichever thread schedules the callback
    ///
    /// This has minimal overhead, but beware that a handler which completes
    /// other futures will run their inline handlers on the same stack, so
    /// long chains of inline handlers grow the stack with chain length.
    ///
    Immediate,

    /// Like `Immediate`, but defer to `AsyncDefault` once the inline nesting
    /// depth of the current thread exceeds the runtime's configured limit
    StackCheckingImmediate,

    /// Dispatch to the runtime's default worker pool tier
    AsyncDefault,

    /// Dispatch to a specific worker pool tier
    Pool(Priority),

    /// The designated main context, as configured by the runtime's
    /// `MainStrategy`
    Main,

    /// Run synchronously if already on the main context, else defer to it
    MainImmediate,

    /// Always defer to the main context, even when already running on it
    MainAlwaysAsync,

    /// Dispatch to a user-created serial queue
    Queue(SerialQueue),

    /// Dispatch through a user-supplied scheduling function
    Custom(CustomExecutor),
}
//
impl Default for Executor {
    fn default() -> Self {
        Executor::Primary
    }
}
//
impl Executor {
    /// Build a fully custom executor
    pub fn custom<F>(schedule: F) -> Self
        where F: Fn(Job) -> Result<(), Rejected> + Send + Sync + 'static
    {
        Executor::Custom(CustomExecutor::new(schedule))
    }

    /// Check if this policy is resolved against the runtime or the calling
    /// context rather than describing a scheduling mechanism itself
    pub fn is_meta(&self) -> bool {
        matches!(*self, Executor::Primary | Executor::Current)
    }

    /// Run a callback under this policy
    pub fn execute<F>(&self, runtime: &Runtime, f: F) -> Result<(), DispatchError>
        where F: FnOnce() + Send + 'static
    {
        self.dispatch(runtime, Job::new(f)).map_err(Rejected::into_error)
    }

    /// Run a callback under this policy once some delay has elapsed
    ///
    /// The delay is measured by the runtime's timer thread. If the runtime is
    /// gone by the time the delay has elapsed, the callback is dropped.
    ///
    pub fn execute_after<F>(&self,
                            runtime: &Runtime,
                            delay: Duration,
                            f: F) -> Result<(), DispatchError>
        where F: FnOnce() + Send + 'static
    {
        let executor = self.capture(runtime);
        let weak_runtime = runtime.downgrade();
        let job = Job::new(move || {
            if let Some(runtime) = weak_runtime.upgrade() {
                if let Err(rejected) = executor.dispatch(&runtime, Job::new(f)) {
                    warn!(error = %rejected.error,
                          "delayed callback could not be dispatched");
                }
            }
        });
        runtime.schedule_after(delay, job).map_err(Rejected::into_error)
    }

    /// Resolve `Current` against the calling context
    ///
    /// Handlers capture their executor when they are attached, so that
    /// `Current` refers to the context of the caller, not to the context of
    /// whichever thread later completes the future.
    ///
    pub(crate) fn capture(&self, runtime: &Runtime) -> Executor {
        match *self {
            Executor::Current => context::current_executor(runtime),
            ref other => other.clone(),
        }
    }

    /// Serial context which a callback scheduled under this policy runs on,
    /// if there is exactly one
    pub(crate) fn serial_affinity(&self, runtime: &Runtime) -> Option<QueueId> {
        match self.policy(runtime) {
            Policy::MainImmediate | Policy::MainAsync => Some(runtime.main_id()),
            Policy::Queue(queue) => Some(queue.id()),
            _ => None,
        }
    }

    /// Schedule a job under this policy, or hand it back
    pub(crate) fn dispatch(&self, runtime: &Runtime, job: Job) -> Result<(), Rejected> {
        match self.policy(runtime) {
            Policy::Inline => {
                job.run();
                Ok(())
            },
            Policy::StackChecked => inline::run_stack_checked(runtime, job),
            Policy::Pool(priority) => runtime.pool(priority).submit(job),
            Policy::MainImmediate => {
                if current_queue_id() == Some(runtime.main_id()) {
                    job.run();
                    Ok(())
                } else {
                    Self::submit_to_main(runtime, job)
                }
            },
            Policy::MainAsync => Self::submit_to_main(runtime, job),
            Policy::Queue(queue) => queue.submit(job),
            Policy::Custom(custom) => {
                trace!(executor = ?custom, "handing job to custom executor");
                custom.schedule(job)
            },
        }
    }

    fn submit_to_main(runtime: &Runtime, job: Job) -> Result<(), Rejected> {
        match runtime.main_queue() {
            Ok(main) => main.submit(job),
            Err(error) => Err(Rejected::new(error, job)),
        }
    }

    /// Resolve meta-policies down to a concrete scheduling mechanism
    fn policy(&self, runtime: &Runtime) -> Policy {
        match *self {
            Executor::Primary => match *runtime.config().primary() {
                // Ruled out by configuration validation
                Executor::Primary | Executor::Current => Policy::Inline,
                ref primary => primary.policy(runtime),
            },
            Executor::Current => context::current_executor(runtime).policy(runtime),
            Executor::Immediate => Policy::Inline,
            Executor::StackCheckingImmediate => Policy::StackChecked,
            Executor::AsyncDefault => Policy::Pool(runtime.config().async_priority()),
            Executor::Pool(priority) => Policy::Pool(priority),
            Executor::Main => match runtime.config().main_strategy() {
                MainStrategy::Immediate => Policy::MainImmediate,
                MainStrategy::AlwaysAsync => Policy::MainAsync,
            },
            Executor::MainImmediate => Policy::MainImmediate,
            Executor::MainAlwaysAsync => Policy::MainAsync,
            Executor::Queue(ref queue) => Policy::Queue(queue.clone()),
            Executor::Custom(ref custom) => Policy::Custom(custom.clone()),
        }
    }
}


/// Concrete scheduling mechanism behind an executor
enum Policy {
    Inline,
    StackChecked,
    Pool(Priority),
    MainImmediate,
    MainAsync,
    Queue(SerialQueue),
    Custom(CustomExecutor),
}
