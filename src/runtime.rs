//! Execution resources shared by a family of futures
//!
//! A `Runtime` owns the threads which back the executors: one worker pool per
//! priority tier, the designated main serial context, and a timer thread for
//! delayed work. All of them are started lazily on first use.
//!
//! Every future carries a handle to the runtime it was created in, and passes
//! it on to the futures derived from it. Programs which are happy with the
//! defaults can use `Runtime::global()`, whose configuration is fixed. Others
//! build their own runtime with `Runtime::builder()`, and keep its settings
//! for its whole lifetime: there is no way to reconfigure a runtime once it is
//! running.

use crate::executor::{DispatchError, Executor, Job, Priority, QueueId, Rejected,
                      SerialQueue, Timer, WorkerPool};
use crate::promise::Promise;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;


/// Behaviour of the `Main` executor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MainStrategy {
    /// Run inline when already on the main context, like `MainImmediate`
    Immediate,

    /// Always defer to the main context, like `MainAlwaysAsync`
    AlwaysAsync,
}


/// Settings of a runtime
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    primary: Executor,
    main_strategy: MainStrategy,
    async_priority: Priority,
    worker_threads: [usize; 5],
    stack_check_depth: usize,
    thread_name_prefix: String,
}
//
impl Default for RuntimeConfig {
    fn default() -> Self {
        let cores = thread::available_parallelism().map_or(1, |n| n.get());
        RuntimeConfig {
            primary: Executor::Immediate,
            main_strategy: MainStrategy::Immediate,
            async_priority: Priority::Default,
            worker_threads: [cores, cores, cores, (cores / 2).max(1), 1],
            stack_check_depth: 20,
            thread_name_prefix: "futures".to_owned(),
        }
    }
}
//
impl RuntimeConfig {
    /// Policy that `Executor::Primary` stands for
    pub fn primary(&self) -> &Executor {
        &self.primary
    }

    /// Behaviour of `Executor::Main`
    pub fn main_strategy(&self) -> MainStrategy {
        self.main_strategy
    }

    /// Pool tier that `Executor::AsyncDefault` dispatches to
    pub fn async_priority(&self) -> Priority {
        self.async_priority
    }

    /// Number of worker threads of a pool tier
    pub fn worker_threads(&self, priority: Priority) -> usize {
        self.worker_threads[priority.index()]
    }

    /// Number of nested inline callbacks which `StackCheckingImmediate`
    /// tolerates before deferring to the worker pool
    pub fn stack_check_depth(&self) -> usize {
        self.stack_check_depth
    }

    /// Prefix of the names of every thread the runtime starts
    pub fn thread_name_prefix(&self) -> &str {
        &self.thread_name_prefix
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.primary {
            Executor::Primary => return Err(ConfigError::MetaPrimary("Primary")),
            Executor::Current => return Err(ConfigError::MetaPrimary("Current")),
            _ => {},
        }
        for &priority in Priority::ALL.iter() {
            if self.worker_threads(priority) == 0 {
                return Err(ConfigError::NoWorkers(priority));
            }
        }
        Ok(())
    }
}


/// Invalid runtime configuration
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The primary executor would have to resolve to itself or to the
    /// calling context
    #[error("the primary executor must be a concrete policy, not `{0}`")]
    MetaPrimary(&'static str),

    /// A pool tier was configured without any worker thread
    #[error("pool tier `{0}` needs at least one worker thread")]
    NoWorkers(Priority),
}


/// Builder for runtimes with non-default settings
#[derive(Clone, Debug, Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
}
//
impl RuntimeBuilder {
    /// Set the policy that `Executor::Primary` stands for
    pub fn primary(mut self, executor: Executor) -> Self {
        self.config.primary = executor;
        self
    }

    /// Set the behaviour of `Executor::Main`
    pub fn main_strategy(mut self, strategy: MainStrategy) -> Self {
        self.config.main_strategy = strategy;
        self
    }

    /// Set the pool tier that `Executor::AsyncDefault` dispatches to
    pub fn async_priority(mut self, priority: Priority) -> Self {
        self.config.async_priority = priority;
        self
    }

    /// Set the number of worker threads of a pool tier
    pub fn worker_threads(mut self, priority: Priority, threads: usize) -> Self {
        self.config.worker_threads[priority.index()] = threads;
        self
    }

    /// Set the inline nesting limit of `StackCheckingImmediate`
    pub fn stack_check_depth(mut self, depth: usize) -> Self {
        self.config.stack_check_depth = depth;
        self
    }

    /// Set the prefix of the runtime's thread names
    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Check the configuration and build the runtime
    pub fn build(self) -> Result<Runtime, ConfigError> {
        Runtime::new(self.config)
    }
}


/// Handle to a set of execution resources
///
/// Handles are cheap to clone. The runtime's threads wind down once every
/// handle is gone.
///
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}
//
struct RuntimeInner {
    config: RuntimeConfig,
    main_id: QueueId,
    main: Mutex<Option<SerialQueue>>,
    pools: Vec<WorkerPool>,
    timer: Mutex<Option<Timer>>,
}
//
impl Runtime {
    /// Start configuring a new runtime
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// Build a runtime from a configuration
    pub fn new(config: RuntimeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        debug!(?config, "runtime created");
        Ok(Self::from_valid_config(config))
    }

    /// Process-wide runtime with the default configuration
    pub fn global() -> &'static Runtime {
        static GLOBAL: OnceLock<Runtime> = OnceLock::new();
        GLOBAL.get_or_init(|| Self::from_valid_config(RuntimeConfig::default()))
    }

    fn from_valid_config(config: RuntimeConfig) -> Self {
        let pools = Priority::ALL.iter()
                                 .map(|&priority| {
                                     WorkerPool::new(&config.thread_name_prefix,
                                                     priority,
                                                     config.worker_threads(priority))
                                 })
                                 .collect();
        Runtime {
            inner: Arc::new(RuntimeInner {
                config,
                main_id: QueueId::next(),
                main: Mutex::new(None),
                pools,
                timer: Mutex::new(None),
            })
        }
    }

    /// Settings of this runtime
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Create a promise whose future belongs to this runtime
    pub fn promise<T: Clone + Send + 'static>(&self) -> Promise<T> {
        Promise::with_runtime(self)
    }

    /// The designated main serial context, started on first use
    pub fn main_queue(&self) -> Result<SerialQueue, DispatchError> {
        let mut main = self.inner.main.lock();
        if let Some(ref queue) = *main {
            return Ok(queue.clone());
        }
        let label = format!("{}-main", self.inner.config.thread_name_prefix);
        let queue = SerialQueue::spawn(self.inner.main_id, label)?;
        *main = Some(queue.clone());
        Ok(queue)
    }

    /// Check if two handles refer to the same runtime
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Identifier of the main context, known before it is started
    pub(crate) fn main_id(&self) -> QueueId {
        self.inner.main_id
    }

    pub(crate) fn pool(&self, priority: Priority) -> &WorkerPool {
        &self.inner.pools[priority.index()]
    }

    /// Hand a job over to the timer thread, starting it on first use
    pub(crate) fn schedule_after(&self, delay: Duration, job: Job) -> Result<(), Rejected> {
        let deadline = Instant::now() + delay;
        let mut timer = self.inner.timer.lock();
        if timer.is_none() {
            let name = format!("{}-timer", self.inner.config.thread_name_prefix);
            match Timer::start(name) {
                Ok(started) => *timer = Some(started),
                Err(error) => return Err(Rejected::new(error, job)),
            }
        }
        match *timer {
            Some(ref timer) => timer.schedule(deadline, job),
            None => Err(Rejected::new(DispatchError::Closed("timer".to_owned()), job)),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Arc::downgrade(&self.inner))
    }
}
//
impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Runtime")
         .field("main", &self.inner.main_id)
         .field("config", &self.inner.config)
         .finish()
    }
}


/// Runtime handle which does not keep the runtime's threads alive
pub(crate) struct WeakRuntime(Weak<RuntimeInner>);
//
impl WeakRuntime {
    pub(crate) fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }
}
