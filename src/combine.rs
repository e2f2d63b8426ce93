//! Waiting on several futures at once
//!
//! Combinators build a future out of several input futures, which succeeds
//! once every input has succeeded. The first unfavorable outcome, be it a
//! failure or a cancellation, settles the combined future right away. The
//! remaining inputs keep running: nobody is forced to stop, although a
//! cancellation request on the combined future is relayed to every input.
//!
//! When several inputs are completed already by the time they are combined,
//! they are examined in argument order, so the unfavorable outcome with the
//! lowest index is the one that gets reported.

use crate::batch::Batch;
use crate::completion::Completion;
use crate::executor::Executor;
use crate::future::Future;
use crate::promise::Promise;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;


/// Wait for two futures, possibly of different types
pub fn combine2<A, B>(a: &Future<A>, b: &Future<B>) -> Future<(A, B)>
    where A: Clone + Send + 'static,
          B: Clone + Send + 'static
{
    let promise = Arc::new(Promise::derived(a.runtime(),
                                            vec![a.weak_node(), b.weak_node()],
                                            None));
    let combined = promise.future();
    let slots = Arc::new(Mutex::new((None, None)));

    {
        let promise = promise.clone();
        let slots = slots.clone();
        a.subscribe_inline(move |completion| match completion.forward() {
            Ok(value) => {
                let ready = {
                    let mut slots = slots.lock();
                    slots.0 = Some(value);
                    take_pair(&mut slots)
                };
                settle(&promise, ready);
            },
            Err(unfavorable) => settle_early(&promise, unfavorable),
        });
    }
    b.subscribe_inline(move |completion| match completion.forward() {
        Ok(value) => {
            let ready = {
                let mut slots = slots.lock();
                slots.1 = Some(value);
                take_pair(&mut slots)
            };
            settle(&promise, ready);
        },
        Err(unfavorable) => settle_early(&promise, unfavorable),
    });
    combined
}


/// Wait for three futures, possibly of different types
pub fn combine3<A, B, C>(a: &Future<A>,
                         b: &Future<B>,
                         c: &Future<C>) -> Future<(A, B, C)>
    where A: Clone + Send + 'static,
          B: Clone + Send + 'static,
          C: Clone + Send + 'static
{
    combine2(&combine2(a, b), c).map(Executor::Immediate, |((a, b), c)| (a, b, c))
}


/// Wait for four futures, possibly of different types
pub fn combine4<A, B, C, D>(a: &Future<A>,
                            b: &Future<B>,
                            c: &Future<C>,
                            d: &Future<D>) -> Future<(A, B, C, D)>
    where A: Clone + Send + 'static,
          B: Clone + Send + 'static,
          C: Clone + Send + 'static,
          D: Clone + Send + 'static
{
    combine2(&combine2(a, b), &combine2(c, d))
        .map(Executor::Immediate, |((a, b), (c, d))| (a, b, c, d))
}


/// Wait for any number of futures of the same type
///
/// Values are reported in input order. Combining nothing succeeds right away
/// with an empty vector.
///
pub fn combine_all<T>(futures: Vec<Future<T>>) -> Future<Vec<T>>
    where T: Clone + Send + 'static
{
    Batch::new(futures).aggregate().clone()
}


fn take_pair<A, B>(slots: &mut (Option<A>, Option<B>)) -> Option<(A, B)> {
    if slots.0.is_some() && slots.1.is_some() {
        Some((slots.0.take()?, slots.1.take()?))
    } else {
        None
    }
}

fn settle<T: Clone + Send + 'static>(promise: &Promise<T>, ready: Option<T>) {
    if let Some(values) = ready {
        // An unfavorable outcome may have won already
        if let Err(conflict) = promise.complete(Completion::Success(values)) {
            trace!(future = %conflict.future, "combined values arrived after a failure");
        }
    }
}

fn settle_early<T: Clone + Send + 'static>(promise: &Promise<T>, unfavorable: Completion<T>) {
    if let Err(conflict) = promise.complete(unfavorable) {
        trace!(future = %conflict.future, "later unfavorable outcome ignored");
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use crate::cancel::CancelResponse;
    use crate::combine::*;
    use crate::completion::{CancelToken, FutureError};
    use crate::runtime::Runtime;
    use crate::test_util::{init_test_logging, test_runtime};
    use proptest::prelude::*;

    /// Check that heterogeneous futures are combined into a tuple
    #[test]
    fn pairs_and_tuples() {
        init_test_logging();
        let runtime = test_runtime();
        let a = Promise::<u8>::with_runtime(&runtime);
        let b = Promise::<&'static str>::with_runtime(&runtime);
        let c = Future::completed_in(&runtime, Completion::Success(1.5f32));
        let pair = combine2(&a.future(), &b.future());
        let triple = combine3(&a.future(), &b.future(), &c);
        let quad = combine4(&a.future(), &b.future(), &c, &a.future());

        b.complete_with_success("b").unwrap();
        assert!(!pair.is_completed());
        a.complete_with_success(1).unwrap();
        assert_eq!(pair.current_result(), Some(Completion::Success((1, "b"))));
        assert_eq!(triple.current_result(), Some(Completion::Success((1, "b", 1.5))));
        assert_eq!(quad.current_result(), Some(Completion::Success((1, "b", 1.5, 1))));
    }

    /// Check that the first unfavorable outcome wins without waiting for the
    /// other inputs
    #[test]
    fn first_unfavorable_wins() {
        init_test_logging();
        let runtime = test_runtime();
        let a = Promise::<u8>::with_runtime(&runtime);
        let b = Promise::<u8>::with_runtime(&runtime);
        let pair = combine2(&a.future(), &b.future());
        b.complete_with_fail_message("b failed").unwrap();
        assert_eq!(pair.current_result(), Some(Completion::fail_with_message("b failed")));
        a.complete_with_cancel(None).unwrap();
        assert_eq!(pair.current_result(), Some(Completion::fail_with_message("b failed")));
    }

    /// Check that already-completed inputs are examined in argument order
    #[test]
    fn lowest_index_wins_among_completed() {
        init_test_logging();
        let runtime = test_runtime();
        let token = CancelToken::new(0u8);
        let a = Future::<u8>::completed_in(&runtime, Completion::Cancelled(Some(token.clone())));
        let b = Future::<u8>::completed_in(&runtime, Completion::fail_with_message("b"));
        assert_eq!(combine2(&a, &b).current_result(),
                   Some(Completion::Cancelled(Some(token))));
        assert_eq!(combine2(&b, &a).current_result(),
                   Some(Completion::fail_with_message("b")));
    }

    /// Check that cancelling a combined future reaches every input
    #[test]
    fn cancel_reaches_inputs() {
        init_test_logging();
        let runtime = test_runtime();
        let a = Promise::<u8>::with_runtime(&runtime);
        let b = Promise::<u8>::with_runtime(&runtime);
        a.cancel_on_request();
        b.on_request_cancel(|_| {
            CancelResponse::Complete(Completion::Fail(FutureError::message("b stopped")))
        });
        let triple = combine3(&a.future(), &b.future(), &a.future());
        triple.request_cancel(None);
        assert_eq!(a.future().current_result(), Some(Completion::Cancelled(None)));
        assert_eq!(b.future().current_result(),
                   Some(Completion::fail_with_message("b stopped")));
        assert!(triple.current_result().map_or(false, |c| !c.is_success()));
    }

    /// Check that combining nothing succeeds immediately
    #[test]
    fn empty_combination() {
        init_test_logging();
        let combined = combine_all(Vec::<Future<u8>>::new());
        assert_eq!(combined.current_result(), Some(Completion::Success(Vec::new())));
        assert!(combined.runtime().ptr_eq(Runtime::global()));
    }

    /// Outcome of one input in a randomized scenario
    #[derive(Clone, Debug)]
    enum Outcome {
        Success(u32),
        Fail,
        Cancel,
    }

    fn outcome() -> impl Strategy<Value = Outcome> {
        prop_oneof![
            (0..1000u32).prop_map(Outcome::Success),
            Just(Outcome::Fail),
            Just(Outcome::Cancel),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Whatever the completion order, the combined outcome is either every
        /// value in input order, or the first unfavorable outcome to arrive
        #[test]
        fn completion_orders(outcomes in prop::collection::vec(outcome(), 0..8),
                             order_seed in any::<u64>()) {
            init_test_logging();
            let runtime = test_runtime();
            let promises = outcomes.iter()
                                   .map(|_| Promise::<u32>::with_runtime(&runtime))
                                   .collect::<Vec<_>>();
            let combined = combine_all(promises.iter().map(Promise::future).collect());

            let mut order = (0..outcomes.len()).collect::<Vec<_>>();
            let mut seed = order_seed;
            for i in (1..order.len()).rev() {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                order.swap(i, (seed >> 33) as usize % (i + 1));
            }

            let mut first_unfavorable = None;
            for &index in order.iter() {
                let completion = match outcomes[index] {
                    Outcome::Success(value) => Completion::Success(value),
                    Outcome::Fail => Completion::fail_with_message(format!("input {}", index)),
                    Outcome::Cancel => Completion::Cancelled(None),
                };
                if !completion.is_success() && first_unfavorable.is_none() {
                    first_unfavorable = Some(completion.clone());
                }
                promises[index].complete(completion).unwrap();
            }

            let expected = match first_unfavorable {
                Some(unfavorable) => unfavorable.forward::<Vec<u32>>()
                                                .err()
                                                .unwrap(),
                None => Completion::Success(outcomes.iter().map(|outcome| match *outcome {
                    Outcome::Success(value) => value,
                    _ => unreachable!(),
                }).collect()),
            };
            prop_assert_eq!(combined.current_result(), Some(expected));
        }
    }
}
