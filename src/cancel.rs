//! Cooperative cancellation of asynchronous operations
//!
//! Any holder of a future may ask for the underlying operation to be
//! cancelled. Note that the precise semantics of cancellation are up to the
//! producer: a request never forces a future into the cancelled state. It is
//! relayed up the chain of futures until it reaches the promise that started
//! it all, whose producer may then decide to complete early, or ignore the
//! request entirely.
//!
//! It is highly recommended that producers of long-running operations
//! register a cancellation hook on their promise, and perform early
//! termination whenever reasonably feasible.

use crate::completion::{CancelToken, Completion};


/// Request for the cancellation of an asynchronous operation
#[derive(Clone, Debug, PartialEq)]
pub struct CancelRequest {
    /// Payload which a producer may attach to its `Cancelled` outcome
    token: Option<CancelToken>,

    /// Whether the request should travel past the future it was issued on
    forward: bool,
}
//
impl CancelRequest {
    /// Build a request which is relayed all the way to the original producer
    pub fn new(token: Option<CancelToken>) -> Self {
        CancelRequest { token, forward: true }
    }

    /// Build a request which only reaches the hooks of the future it is
    /// issued on, and is never relayed upstream
    pub fn local(token: Option<CancelToken>) -> Self {
        CancelRequest { token, forward: false }
    }

    /// Token attached to this request
    pub fn token(&self) -> Option<&CancelToken> {
        self.token.as_ref()
    }

    /// Whether this request is relayed to upstream futures
    pub fn forwards_upstream(&self) -> bool {
        self.forward
    }

    /// The outcome which a producer honoring this request would report
    pub fn cancelled<T>(&self) -> Completion<T> {
        Completion::Cancelled(self.token.clone())
    }
}
//
impl Default for CancelRequest {
    fn default() -> Self {
        CancelRequest::new(None)
    }
}


/// Reaction of a producer to a cancellation request
#[derive(Clone, Debug, PartialEq)]
pub enum CancelResponse<T> {
    /// Keep running as if nothing happened
    Ignore,

    /// Complete the future right away with the given outcome
    ///
    /// This competes with the producer's own completion call: whichever
    /// reaches the future first wins, and the other one is rejected.
    ///
    Complete(Completion<T>),
}


/// Producer-side reaction to cancellation requests, see
/// `Promise::on_request_cancel()`
pub(crate) type CancelHook<T> =
    dyn Fn(&CancelRequest) -> CancelResponse<T> + Send + Sync;
