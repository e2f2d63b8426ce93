//! Composable futures and promises for threaded programs
//!
//! Picture yourself in a situation where: you delegate work to another thread,
//! a worker pool, an IO callback or a timer. You know that the result is going
//! to take some time to arrive, and you have other things to do meanwhile, so
//! you would rather not wait for it. But you would like to say right now what
//! should happen to the result once it is there, where that code should run,
//! and what to do if the work fails or is cancelled.
//!
//! This crate models that situation with a pair of handles:
//!
//! - A `Promise` is held by the producer of the result. It is the exclusive
//!   writer of the outcome, and completes it exactly once with a
//!   `Completion`: success, failure or cancellation.
//! - A `Future` is held by any number of consumers. It can be queried without
//!   blocking, and handlers can be attached to it. Attaching a handler builds
//!   a new future right away, which will complete with whatever the handler
//!   returns once it has run.
//!
//! Handlers run under an `Executor`, a policy describing where and when a
//! callback runs: inline, on a tier of the worker pool, on the designated
//! main serial context, on a serial queue of your own, or through a custom
//! scheduling function. The threads behind these policies belong to a
//! `Runtime`, which every future carries along and passes to the futures
//! derived from it.
//!
//! A handler may also return another future instead of a final outcome. The
//! derived future then adopts that future's eventual outcome. Chains of such
//! delegations are resolved iteratively, so a retry loop that delegates to
//! itself thousands of times does not grow the call stack.
//!
//! Consumers may request the cancellation of a future. The request travels
//! up the chain of futures until it reaches the promise it all started from,
//! whose producer decides whether it wants to honor it.
//!
//! Finally, combinators wait on several futures at once: `combine2` and
//! friends for a fixed number of heterogeneous futures, `Batch` for a dynamic
//! collection of futures of the same type. The other way around, `FutureFifo`
//! and `FutureQueue` hold asynchronous jobs back, running them one at a time
//! or by priority under a concurrency limit.

pub mod batch;
pub mod cancel;
pub mod combine;
pub mod completion;
pub mod executor;
pub mod fifo;
pub mod future;
pub mod polling;
pub mod promise;
pub mod queue;
pub mod runtime;

#[cfg(test)]
pub(crate) mod test_util;

pub use crate::batch::Batch;
pub use crate::cancel::{CancelRequest, CancelResponse};
pub use crate::combine::{combine2, combine3, combine4, combine_all};
pub use crate::completion::{AlreadyCompleted, CancelToken, Completion,
                            FutureError, HandlerResult};
pub use crate::executor::{CustomExecutor, DispatchError, Executor, Job,
                          Priority, QueueId, Rejected, SerialQueue};
pub use crate::fifo::FutureFifo;
pub use crate::future::{Future, FutureId, WaitError};
pub use crate::polling::{Status, StatusMonitor};
pub use crate::promise::Promise;
pub use crate::queue::FutureQueue;
pub use crate::runtime::{ConfigError, MainStrategy, Runtime, RuntimeBuilder,
                         RuntimeConfig};
