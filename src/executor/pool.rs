//! Prioritized worker pools
//!
//! Each runtime owns one pool of worker threads per priority tier. Threads
//! are only spawned once a tier receives its first job, so that programs which
//! never leave the inline executors never pay for them.

use crate::completion::panic_message;
use crate::executor::context::{self, WorkerContext};
use crate::executor::{DispatchError, Job, Rejected};
use crossbeam_channel::{unbounded, Receiver, SendError, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, error, warn};


/// Priority tier of the worker pool, from most to least urgent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    /// Work which a user is actively waiting on, such as UI feedback
    UserInteractive,

    /// Work which a user requested and expects shortly
    UserInitiated,

    /// Default tier for asynchronous work
    Default,

    /// Long-running work which a user is aware of
    Utility,

    /// Maintenance work which nobody is waiting on
    Background,
}
//
impl Priority {
    /// Every tier, from most to least urgent
    pub const ALL: [Priority; 5] = [Priority::UserInteractive,
                                    Priority::UserInitiated,
                                    Priority::Default,
                                    Priority::Utility,
                                    Priority::Background];

    /// Short name of the tier, used in worker thread names
    pub fn label(self) -> &'static str {
        match self {
            Priority::UserInteractive => "interactive",
            Priority::UserInitiated => "initiated",
            Priority::Default => "default",
            Priority::Utility => "utility",
            Priority::Background => "background",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}
//
impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}


/// Lazily started pool of worker threads fed by a shared job queue
pub(crate) struct WorkerPool {
    priority: Priority,
    name: String,
    threads: usize,
    sender: Sender<Job>,
    receiver: Receiver<Job>,
    started: AtomicBool,
    start_lock: Mutex<()>,
}
//
impl WorkerPool {
    /// Set up a pool, without spawning any thread yet
    pub(crate) fn new(prefix: &str, priority: Priority, threads: usize) -> Self {
        let (sender, receiver) = unbounded();
        WorkerPool {
            priority,
            name: format!("{}-{}", prefix, priority.label()),
            threads,
            sender,
            receiver,
            started: AtomicBool::new(false),
            start_lock: Mutex::new(()),
        }
    }

    /// Queue a job for execution by one of the workers
    pub(crate) fn submit(&self, job: Job) -> Result<(), Rejected> {
        if let Err(error) = self.ensure_started() {
            return Err(Rejected::new(error, job));
        }
        self.sender.send(job).map_err(|SendError(job)| {
            Rejected::new(DispatchError::Closed(self.name.clone()), job)
        })
    }

    fn ensure_started(&self) -> Result<(), DispatchError> {
        if self.started.load(Ordering::Acquire) {
            return Ok(());
        }
        let _lock = self.start_lock.lock();
        if self.started.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut spawned = 0;
        for index in 0..self.threads {
            let name = format!("{}-{}", self.name, index);
            let receiver = self.receiver.clone();
            let priority = self.priority;
            match thread::Builder::new()
                                  .name(name.clone())
                                  .spawn(move || worker_loop(priority, receiver)) {
                Ok(_) => spawned += 1,
                Err(io_error) if spawned == 0 => {
                    error!(thread = %name, error = %io_error,
                           "could not start any worker thread");
                    return Err(DispatchError::Spawn { name,
                                                      reason: io_error.to_string() });
                },
                Err(io_error) => {
                    warn!(thread = %name, error = %io_error, spawned,
                          "worker pool runs with fewer threads than configured");
                    break;
                },
            }
        }
        debug!(pool = %self.name, threads = spawned, "worker pool started");
        self.started.store(true, Ordering::Release);
        Ok(())
    }
}


/// Run jobs until every sender of the pool's queue is gone
fn worker_loop(priority: Priority, receiver: Receiver<Job>) {
    context::enter(WorkerContext::Pool(priority));
    for job in receiver.iter() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job.run())) {
            error!(%priority, panic = %panic_message(&*payload),
                   "job panicked on worker thread");
        }
    }
    debug!(%priority, "worker thread exiting");
}
