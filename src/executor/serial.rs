//! Serial execution contexts
//!
//! A serial queue runs the jobs submitted to it one at a time, in submission
//! order, on a dedicated thread. This is the execution context of choice for
//! handlers which touch state owned by a single thread. The runtime's main
//! context is a serial queue too.

use crate::completion::panic_message;
use crate::executor::context::{self, WorkerContext};
use crate::executor::{DispatchError, Job, Rejected};
use crossbeam_channel::{unbounded, SendError, Sender};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error};


/// Unique identifier of a serial execution context
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueId(u64);
//
impl QueueId {
    /// Reserve a fresh identifier
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        QueueId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}
//
impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "queue#{}", self.0)
    }
}


/// Handle to a serial execution context
///
/// Handles are cheap to clone. The backing thread exits once every handle is
/// gone and every job submitted so far has run.
///
#[derive(Clone)]
pub struct SerialQueue {
    inner: Arc<SerialInner>,
}
//
pub(crate) struct SerialInner {
    id: QueueId,
    label: String,
    sender: Sender<Job>,
}
//
impl SerialQueue {
    /// Start a new serial queue, whose thread bears the given label
    pub fn new<L: Into<String>>(label: L) -> Result<Self, DispatchError> {
        Self::spawn(QueueId::next(), label.into())
    }

    /// Start a serial queue with a pre-reserved identifier
    pub(crate) fn spawn(id: QueueId, label: String) -> Result<Self, DispatchError> {
        let (sender, receiver) = unbounded::<Job>();
        let inner = Arc::new(SerialInner { id, label: label.clone(), sender });
        let weak_inner = Arc::downgrade(&inner);
        let thread_label = label.clone();
        thread::Builder::new()
                        .name(label.clone())
                        .spawn(move || {
                            context::enter(WorkerContext::Serial { id, queue: weak_inner });
                            debug!(queue = %thread_label, "serial queue started");
                            for job in receiver.iter() {
                                let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.run()));
                                if let Err(payload) = outcome {
                                    error!(queue = %thread_label,
                                           panic = %panic_message(&*payload),
                                           "job panicked on serial queue");
                                }
                            }
                            debug!(queue = %thread_label, "serial queue exiting");
                        })
                        .map_err(|io_error| {
                            error!(queue = %label, error = %io_error,
                                   "could not start serial queue");
                            DispatchError::Spawn { name: label.clone(),
                                                   reason: io_error.to_string() }
                        })?;
        Ok(SerialQueue { inner })
    }

    /// Recover a handle from the thread-local execution context
    pub(crate) fn from_inner(inner: Arc<SerialInner>) -> Self {
        SerialQueue { inner }
    }

    /// Identifier of this queue
    pub fn id(&self) -> QueueId {
        self.inner.id
    }

    /// Label of this queue, which is also the name of its thread
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Check if the calling code is running on this queue
    pub fn is_current(&self) -> bool {
        context::current_queue_id() == Some(self.inner.id)
    }

    /// Queue a job behind every job submitted so far
    pub(crate) fn submit(&self, job: Job) -> Result<(), Rejected> {
        self.inner.sender.send(job).map_err(|SendError(job)| {
            Rejected::new(DispatchError::Closed(self.inner.label.clone()), job)
        })
    }
}
//
impl PartialEq for SerialQueue {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}
//
impl fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SerialQueue")
         .field("id", &self.inner.id)
         .field("label", &self.inner.label)
         .finish()
    }
}
