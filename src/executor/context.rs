//! Per-thread record of the execution context a thread belongs to

use crate::executor::{Executor, Priority, QueueId, SerialInner, SerialQueue};
use crate::runtime::Runtime;
use std::cell::RefCell;
use std::sync::Weak;


/// Execution context backing a thread
pub(crate) enum WorkerContext {
    /// The thread of a serial queue
    Serial { id: QueueId, queue: Weak<SerialInner> },

    /// A worker thread of some pool tier
    Pool(Priority),
}


thread_local! {
    static CURRENT: RefCell<Option<WorkerContext>> = RefCell::new(None);
}


/// Mark the calling thread as belonging to some execution context
pub(crate) fn enter(context: WorkerContext) {
    CURRENT.with(|current| *current.borrow_mut() = Some(context));
}


/// Identifier of the serial queue running the calling code, if any
pub(crate) fn current_queue_id() -> Option<QueueId> {
    CURRENT.with(|current| match *current.borrow() {
        Some(WorkerContext::Serial { id, .. }) => Some(id),
        _ => None,
    })
}


/// Concrete executor which targets the calling context
pub(crate) fn current_executor(runtime: &Runtime) -> Executor {
    CURRENT.with(|current| match *current.borrow() {
        Some(WorkerContext::Serial { id, .. }) if id == runtime.main_id() => {
            Executor::MainImmediate
        },
        Some(WorkerContext::Serial { ref queue, .. }) => {
            queue.upgrade()
                 .map(|inner| Executor::Queue(SerialQueue::from_inner(inner)))
                 .unwrap_or(Executor::AsyncDefault)
        },
        Some(WorkerContext::Pool(priority)) => Executor::Pool(priority),
        None => Executor::AsyncDefault,
    })
}
