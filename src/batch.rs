//! Dynamic collections of futures of the same type
//!
//! A `Batch` watches a vector of futures and exposes two derived futures:
//!
//! - The *results* future always succeeds once every input has completed,
//!   with the outcome of each input, in input order.
//! - The *aggregate* future succeeds with every value in input order if all
//!   inputs succeed, and otherwise settles with the first unfavorable outcome
//!   as soon as it arrives.
//!
//! An optional item handler sees each outcome as it arrives, along with the
//! future it came from and the index of that future.

use crate::completion::Completion;
use crate::future::Future;
use crate::promise::Promise;
use crate::runtime::Runtime;
use parking_lot::Mutex;
use std::mem;
use std::sync::Arc;
use tracing::trace;


/// Callback observing every input outcome of a batch, in completion order
type ItemHandler<T> = dyn Fn(Completion<T>, &Future<T>, usize) + Send + Sync;


/// Joint view of a collection of futures
pub struct Batch<T> {
    futures: Vec<Future<T>>,
    results: Future<Vec<Completion<T>>>,
    aggregate: Future<Vec<T>>,
}
//
impl<T: Clone + Send + 'static> Batch<T> {
    /// Watch a collection of futures
    pub fn new(futures: Vec<Future<T>>) -> Self {
        Self::build(futures, None)
    }

    /// Watch a collection of futures, calling a handler whenever one of them
    /// completes
    ///
    /// The handler runs on whichever thread completes each input, before the
    /// batch's own futures take that outcome into account.
    ///
    pub fn with_item_handler<F>(futures: Vec<Future<T>>, handler: F) -> Self
        where F: Fn(Completion<T>, &Future<T>, usize) + Send + Sync + 'static
    {
        Self::build(futures, Some(Arc::new(handler)))
    }

    fn build(futures: Vec<Future<T>>, handler: Option<Arc<ItemHandler<T>>>) -> Self {
        let runtime = futures.first()
                             .map_or_else(|| Runtime::global().clone(),
                                          |first| first.runtime().clone());
        let upstream = futures.iter().map(Future::weak_node).collect::<Vec<_>>();
        let results = Arc::new(Promise::derived(&runtime, upstream.clone(), None));
        let aggregate = Arc::new(Promise::derived(&runtime, upstream, None));
        let batch = Batch {
            results: results.future(),
            aggregate: aggregate.future(),
            futures,
        };

        if batch.futures.is_empty() {
            settle(&results, Completion::Success(Vec::new()));
            settle(&aggregate, Completion::Success(Vec::new()));
            return batch;
        }

        let progress = Arc::new(Mutex::new(Progress {
            outcomes: vec![None; batch.futures.len()],
            remaining: batch.futures.len(),
        }));
        for (index, future) in batch.futures.iter().enumerate() {
            let source = Arc::downgrade(future.shared());
            let handler = handler.clone();
            let progress = progress.clone();
            let results = results.clone();
            let aggregate = aggregate.clone();
            future.subscribe_inline(move |completion| {
                if let Some(ref handler) = handler {
                    if let Some(source) = source.upgrade() {
                        handler(completion.clone(), &Future::from_shared(source), index);
                    }
                }
                if let Err(unfavorable) = completion.clone().forward::<Vec<T>>() {
                    settle(&aggregate, unfavorable);
                }
                if let Some(outcomes) = progress.lock().record(index, completion) {
                    let values = outcomes.iter()
                                         .map(|outcome| outcome.value().cloned())
                                         .collect::<Option<Vec<T>>>();
                    if let Some(values) = values {
                        settle(&aggregate, Completion::Success(values));
                    }
                    settle(&results, Completion::Success(outcomes));
                }
            });
        }
        batch
    }

    /// The futures being watched, in input order
    pub fn futures(&self) -> &[Future<T>] {
        &self.futures
    }

    /// Future of every input outcome, in input order
    pub fn results_future(&self) -> &Future<Vec<Completion<T>>> {
        &self.results
    }

    /// Future of every input value, or of the first unfavorable outcome
    pub fn aggregate(&self) -> &Future<Vec<T>> {
        &self.aggregate
    }

    /// Ask for every input to be cancelled
    pub fn request_cancel_all(&self) {
        for future in &self.futures {
            future.request_cancel(None);
        }
    }
}


/// Complete one of the batch's futures, which an earlier unfavorable outcome
/// may have completed already
fn settle<T: Clone + Send + 'static>(promise: &Promise<T>, completion: Completion<T>) {
    if let Err(conflict) = promise.complete(completion) {
        trace!(future = %conflict.future, "batch outcome superseded");
    }
}


/// Outcomes recorded so far
struct Progress<T> {
    outcomes: Vec<Option<Completion<T>>>,
    remaining: usize,
}
//
impl<T> Progress<T> {
    /// Record an outcome, and hand every outcome over once the last one is in
    fn record(&mut self, index: usize, completion: Completion<T>) -> Option<Vec<Completion<T>>> {
        self.outcomes[index] = Some(completion);
        self.remaining -= 1;
        if self.remaining > 0 {
            return None;
        }
        mem::take(&mut self.outcomes).into_iter().collect()
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use crate::batch::*;
    use crate::cancel::CancelResponse;
    use crate::completion::FutureError;
    use crate::test_util::{init_test_logging, test_runtime};
    use std::thread;

    fn promises(runtime: &Runtime, count: usize) -> Vec<Promise<u32>> {
        (0..count).map(|_| Promise::with_runtime(runtime)).collect()
    }

    /// Check that results are reported in input order, whatever the
    /// completion order
    #[test]
    fn results_in_input_order() {
        init_test_logging();
        let runtime = test_runtime();
        let inputs = promises(&runtime, 3);
        let batch = Batch::new(inputs.iter().map(Promise::future).collect());
        assert_eq!(batch.futures().len(), 3);

        inputs[2].complete_with_success(2).unwrap();
        inputs[0].complete_with_fail_message("zero").unwrap();
        assert_eq!(batch.aggregate().current_result(),
                   Some(Completion::fail_with_message("zero")));
        assert!(!batch.results_future().is_completed());

        inputs[1].complete_with_success(1).unwrap();
        assert_eq!(batch.results_future().current_result(),
                   Some(Completion::Success(vec![Completion::fail_with_message("zero"),
                                                 Completion::Success(1),
                                                 Completion::Success(2)])));
    }

    /// Check that an all-successful batch aggregates its values
    #[test]
    fn aggregate_values() {
        init_test_logging();
        let runtime = test_runtime();
        let inputs = promises(&runtime, 4);
        let batch = Batch::new(inputs.iter().map(Promise::future).collect());
        let workers = inputs.into_iter().enumerate().map(|(index, promise)| {
            thread::spawn(move || promise.complete_with_success(index as u32 * 10).unwrap())
        }).collect::<Vec<_>>();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(batch.aggregate().blocking_wait_until_completed(),
                   Completion::Success(vec![0, 10, 20, 30]));
    }

    /// Check that the item handler sees each outcome with its source
    #[test]
    fn item_handler() {
        init_test_logging();
        let runtime = test_runtime();
        let inputs = promises(&runtime, 3);
        let futures = inputs.iter().map(Promise::future).collect::<Vec<_>>();
        let expected_ids = futures.iter().map(Future::id).collect::<Vec<_>>();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let c_seen = seen.clone();
        let batch = Batch::with_item_handler(futures, move |completion, source, index| {
            c_seen.lock().push((index, source.id(), completion));
        });

        inputs[1].complete_with_success(1).unwrap();
        inputs[0].complete_with_cancel(None).unwrap();
        inputs[2].complete_with_success(2).unwrap();
        assert_eq!(*seen.lock(),
                   vec![(1, expected_ids[1], Completion::Success(1)),
                        (0, expected_ids[0], Completion::Cancelled(None)),
                        (2, expected_ids[2], Completion::Success(2))]);
        assert_eq!(batch.aggregate().current_result(), Some(Completion::Cancelled(None)));
    }

    /// Check that empty batches complete right away
    #[test]
    fn empty_batch() {
        init_test_logging();
        let batch = Batch::<u32>::new(Vec::new());
        assert_eq!(batch.results_future().current_result(), Some(Completion::Success(Vec::new())));
        assert_eq!(batch.aggregate().current_result(), Some(Completion::Success(Vec::new())));
    }

    /// Check that cancellation reaches every input
    #[test]
    fn cancellation() {
        init_test_logging();
        let runtime = test_runtime();
        let inputs = promises(&runtime, 2);
        inputs[0].cancel_on_request();
        inputs[1].on_request_cancel(|_| {
            CancelResponse::Complete(Completion::Fail(FutureError::message("refused")))
        });
        let batch = Batch::new(inputs.iter().map(Promise::future).collect());
        batch.aggregate().request_cancel(None);
        assert_eq!(batch.results_future().current_result(),
                   Some(Completion::Success(vec![Completion::Cancelled(None),
                                                 Completion::fail_with_message("refused")])));

        let again = promises(&runtime, 2);
        for promise in &again {
            promise.cancel_on_request();
        }
        let batch = Batch::new(again.iter().map(Promise::future).collect());
        batch.request_cancel_all();
        assert!(batch.results_future().is_completed());
    }
}
