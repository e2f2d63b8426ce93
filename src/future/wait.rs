//! Blocking synchronization with a future's outcome
//!
//! Blocking is the least efficient way to wait for a future, since it ties
//! up a whole thread, but it remains the simplest way to bridge asynchronous
//! code into synchronous code. parking_lot's condition variable does the
//! heavy lifting here.
//!
//! One waiting pattern can never work: blocking a serial execution context on
//! a future whose handler is scheduled on that very same context. That handler
//! would only run once the wait is over. Such waits are detected and reported
//! instead of hanging forever.

use crate::completion::Completion;
use crate::executor::{current_queue_id, QueueId};
use crate::future::{Future, FutureId, State};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::error;


/// Reasons why a blocking wait cannot be performed
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WaitError {
    /// The calling serial context is the one that would complete the future
    #[error("waiting on {future} from {queue} would deadlock, since its handler runs there")]
    WouldDeadlock { future: FutureId, queue: QueueId },
}


impl<T: Clone + Send + 'static> Future<T> {
    /// Block until the future completes, or report a wait that would never
    /// end
    pub fn try_blocking_wait(&self) -> Result<Completion<T>, WaitError> {
        let shared = self.shared();
        let mut state = shared.state.lock();
        loop {
            match *state {
                State::Completed(ref completion) => return Ok(completion.clone()),
                State::Pending(ref pending) => {
                    if let Some(queue) = pending.affinity {
                        if current_queue_id() == Some(queue) {
                            return Err(WaitError::WouldDeadlock { future: shared.id(),
                                                                  queue });
                        }
                    }
                },
            }
            shared.completed.wait(&mut state);
        }
    }

    /// Block until the future completes
    ///
    /// # Panics
    ///
    /// Waiting from the serial context that the future's handler is scheduled
    /// on is a programming error, which is reported through a panic since the
    /// wait could not possibly end.
    ///
    pub fn blocking_wait_until_completed(&self) -> Completion<T> {
        match self.try_blocking_wait() {
            Ok(completion) => completion,
            Err(wait_error) => {
                error!(error = %wait_error, "blocking wait can never end");
                panic!("{}", wait_error);
            },
        }
    }

    /// Block until the future completes or a timeout elapses, whichever
    /// happens first
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Completion<T>> {
        let deadline = Instant::now() + timeout;
        let shared = self.shared();
        let mut state = shared.state.lock();
        loop {
            if let State::Completed(ref completion) = *state {
                return Some(completion.clone());
            }
            if shared.completed.wait_until(&mut state, deadline).timed_out() {
                return match *state {
                    State::Completed(ref completion) => Some(completion.clone()),
                    State::Pending(_) => None,
                };
            }
        }
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use crate::completion::Completion;
    use crate::executor::{Executor, SerialQueue};
    use crate::future::*;
    use crate::promise::Promise;
    use crate::test_util::{init_test_logging, test_runtime};
    use crossbeam_channel::bounded;
    use std::thread;
    use std::time::Duration;

    /// Check that blocking waits return once another thread completes the
    /// future
    #[test]
    fn wait_for_other_thread() {
        init_test_logging();
        let runtime = test_runtime();
        let promise = Promise::<u32>::with_runtime(&runtime);
        let future = promise.future();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            promise.complete(Completion::Success(5)).unwrap();
        });
        assert_eq!(future.blocking_wait_until_completed(), Completion::Success(5));
        producer.join().unwrap();
    }

    /// Check that timed waits give up on pending futures, and succeed on
    /// completed ones
    #[test]
    fn timed_wait() {
        init_test_logging();
        let runtime = test_runtime();
        let promise = Promise::<u32>::with_runtime(&runtime);
        let future = promise.future();
        assert_eq!(future.wait_timeout(Duration::from_millis(10)), None);
        promise.complete(Completion::Success(1)).unwrap();
        assert_eq!(future.wait_timeout(Duration::from_millis(10)),
                   Some(Completion::Success(1)));
    }

    /// Check that waiting on a future from the serial context it completes
    /// on is reported rather than hanging
    #[test]
    fn deadlock_detection() {
        init_test_logging();
        let runtime = test_runtime();
        let queue = SerialQueue::new("wait-deadlock").unwrap();
        let promise = Promise::<u32>::with_runtime(&runtime);
        let derived = promise.future().map(Executor::Queue(queue.clone()), |x| x + 1);

        let (tx, rx) = bounded(1);
        let waited = derived.clone();
        Executor::Queue(queue).execute(&runtime, move || {
            tx.send(waited.try_blocking_wait()).unwrap();
        }).unwrap();
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            Err(WaitError::WouldDeadlock { future, .. }) => assert_eq!(future, derived.id()),
            other => panic!("unexpected wait outcome {:?}", other),
        }

        // Once the producer is done, the handler can run and waiting works
        promise.complete(Completion::Success(1)).unwrap();
        assert_eq!(derived.blocking_wait_until_completed(), Completion::Success(2));
    }
}
