//! Facilities to represent the outcome of asynchronous operations
//!
//! Every future in this crate starts in a pending state and ends, exactly
//! once, in one of three final states: it succeeded with a value, it failed
//! with an error, or it was cancelled. This module provides the `Completion`
//! type which represents that final state, along with the error and token
//! payloads that it carries.
//!
//! Handlers which are attached to a future return a slightly richer type,
//! `HandlerResult`, which can additionally ask the handler-chaining engine to
//! adopt the outcome of another future. That extra case is deliberately kept
//! out of `Completion`, so that it can never be observed in a completed
//! future's stored state.

use crate::executor::DispatchError;
use crate::future::{Future, FutureId};
use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;


/// Final outcome of an asynchronous operation
///
/// Once a future holds a `Completion`, that value never changes anymore.
///
#[derive(Clone, Debug, PartialEq)]
pub enum Completion<T> {
    /// The operation produced a value
    Success(T),

    /// The operation failed
    Fail(FutureError),

    /// The operation was cancelled, possibly with a token explaining why
    Cancelled(Option<CancelToken>),
}
//
impl<T> Completion<T> {
    /// Build a cancelled completion without any token
    pub fn cancelled() -> Self {
        Completion::Cancelled(None)
    }

    /// Build a failed completion from a plain error message
    pub fn fail_with_message<M: Into<String>>(message: M) -> Self {
        Completion::Fail(FutureError::message(message))
    }

    /// Check if the operation succeeded
    pub fn is_success(&self) -> bool {
        matches!(*self, Completion::Success(_))
    }

    /// Check if the operation failed
    pub fn is_fail(&self) -> bool {
        matches!(*self, Completion::Fail(_))
    }

    /// Check if the operation was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(*self, Completion::Cancelled(_))
    }

    /// Access the result of a successful operation
    pub fn value(&self) -> Option<&T> {
        match *self {
            Completion::Success(ref value) => Some(value),
            _ => None,
        }
    }

    /// Extract the result of a successful operation
    pub fn into_value(self) -> Option<T> {
        match self {
            Completion::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Access the error of a failed operation
    pub fn error(&self) -> Option<&FutureError> {
        match *self {
            Completion::Fail(ref error) => Some(error),
            _ => None,
        }
    }

    /// Transform the value of a successful completion, forwarding failures
    /// and cancellations unchanged
    pub fn map<S, F: FnOnce(T) -> S>(self, f: F) -> Completion<S> {
        match self {
            Completion::Success(value) => Completion::Success(f(value)),
            Completion::Fail(error) => Completion::Fail(error),
            Completion::Cancelled(token) => Completion::Cancelled(token),
        }
    }

    /// Re-type an unsuccessful completion
    ///
    /// Failures and cancellations carry no value, so they can be forwarded to
    /// a future of any type. Success is handed back to the caller.
    ///
    pub(crate) fn forward<S>(self) -> Result<T, Completion<S>> {
        match self {
            Completion::Success(value) => Ok(value),
            Completion::Fail(error) => Err(Completion::Fail(error)),
            Completion::Cancelled(token) => Err(Completion::Cancelled(token)),
        }
    }
}
//
impl<T, E> From<Result<T, E>> for Completion<T>
    where E: StdError + Send + Sync + 'static
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Completion::Success(value),
            Err(error) => Completion::Fail(FutureError::from_cause(error)),
        }
    }
}


/// Value returned by a handler attached to a future
///
/// This is a superset of `Completion`: a handler may either produce a final
/// outcome right away, or delegate to another future whose eventual outcome
/// will be adopted instead.
///
pub enum HandlerResult<T> {
    /// Complete the derived future with a value
    Success(T),

    /// Fail the derived future
    Fail(FutureError),

    /// Cancel the derived future
    Cancelled(Option<CancelToken>),

    /// Complete the derived future with the outcome of another future
    DelegateTo(Future<T>),
}
//
impl<T> HandlerResult<T> {
    /// Build a failed handler result from a plain error message
    pub fn fail_with_message<M: Into<String>>(message: M) -> Self {
        HandlerResult::Fail(FutureError::message(message))
    }

    /// Split the delegation case from the final outcomes
    pub(crate) fn into_completion(self) -> Result<Completion<T>, Future<T>> {
        match self {
            HandlerResult::Success(value) => Ok(Completion::Success(value)),
            HandlerResult::Fail(error) => Ok(Completion::Fail(error)),
            HandlerResult::Cancelled(token) => Ok(Completion::Cancelled(token)),
            HandlerResult::DelegateTo(future) => Err(future),
        }
    }
}
//
impl<T> From<Completion<T>> for HandlerResult<T> {
    fn from(completion: Completion<T>) -> Self {
        match completion {
            Completion::Success(value) => HandlerResult::Success(value),
            Completion::Fail(error) => HandlerResult::Fail(error),
            Completion::Cancelled(token) => HandlerResult::Cancelled(token),
        }
    }
}
//
impl<T> From<Future<T>> for HandlerResult<T> {
    fn from(future: Future<T>) -> Self {
        HandlerResult::DelegateTo(future)
    }
}
//
impl<T: fmt::Debug> fmt::Debug for HandlerResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            HandlerResult::Success(ref value) =>
                f.debug_tuple("Success").field(value).finish(),
            HandlerResult::Fail(ref error) =>
                f.debug_tuple("Fail").field(error).finish(),
            HandlerResult::Cancelled(ref token) =>
                f.debug_tuple("Cancelled").field(token).finish(),
            HandlerResult::DelegateTo(ref future) =>
                f.debug_tuple("DelegateTo").field(&future.id()).finish(),
        }
    }
}


/// Error payload of a failed future
///
/// This type is cheap to clone, since a single failure may need to be
/// delivered to any number of handlers.
///
#[derive(Clone, Debug, Error)]
pub enum FutureError {
    /// The producer reported a failure through a plain message
    #[error("{0}")]
    Message(String),

    /// The producer reported a failure through an opaque error
    #[error(transparent)]
    Cause(Arc<dyn StdError + Send + Sync>),

    /// The producer reported an opaque error along with some context
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        cause: Arc<dyn StdError + Send + Sync>,
    },

    /// The promise was dropped before completing its future
    #[error("promise was dropped without being completed")]
    BrokenPromise,

    /// An executor could not schedule the callback this future waited for
    #[error("executor could not dispatch a callback")]
    Dispatch(#[source] DispatchError),

    /// A handler panicked while computing this future's outcome
    #[error("handler panicked: {0}")]
    HandlerPanicked(String),

    /// A handler asked a future to adopt its own outcome
    #[error("a future cannot delegate to itself")]
    SelfDelegation,

    /// A deadline elapsed before the producer completed the future
    #[error("timed out: {0}")]
    TimedOut(String),
}
//
impl FutureError {
    /// Build an error from a plain message
    pub fn message<M: Into<String>>(message: M) -> Self {
        FutureError::Message(message.into())
    }

    /// Build an error from an opaque cause
    pub fn from_cause<E: StdError + Send + Sync + 'static>(cause: E) -> Self {
        FutureError::Cause(Arc::new(cause))
    }

    /// Build an error from an opaque cause, with an extra context message
    pub fn with_context<M, E>(message: M, cause: E) -> Self
        where M: Into<String>,
              E: StdError + Send + Sync + 'static
    {
        FutureError::Context { message: message.into(), cause: Arc::new(cause) }
    }

    /// Convert a caught panic payload into an error
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        FutureError::HandlerPanicked(panic_message(&*payload))
    }

    /// Access the opaque cause of this error, if any
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match *self {
            FutureError::Cause(ref cause)
            | FutureError::Context { ref cause, .. } => Some(&**cause),
            _ => None,
        }
    }
}
//
impl PartialEq for FutureError {
    /// Opaque causes are compared by identity, everything else by value
    fn eq(&self, other: &Self) -> bool {
        use self::FutureError::*;
        match (self, other) {
            (Message(a), Message(b)) => a == b,
            (Cause(a), Cause(b)) => Arc::ptr_eq(a, b),
            (Context { message: ma, cause: ca },
             Context { message: mb, cause: cb }) =>
                ma == mb && Arc::ptr_eq(ca, cb),
            (BrokenPromise, BrokenPromise) => true,
            (Dispatch(a), Dispatch(b)) => a == b,
            (HandlerPanicked(a), HandlerPanicked(b)) => a == b,
            (SelfDelegation, SelfDelegation) => true,
            (TimedOut(a), TimedOut(b)) => a == b,
            _ => false,
        }
    }
}


/// Readable description of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_owned()
    }
}


/// Opaque payload attached to a cancelled completion
///
/// The library never inspects it: tokens are forwarded verbatim from the
/// canceller to whoever observes the `Cancelled` outcome. Two tokens are equal
/// if they are clones of one another.
///
#[derive(Clone)]
pub struct CancelToken(Arc<dyn Any + Send + Sync>);
//
impl CancelToken {
    /// Wrap an arbitrary payload into a token
    pub fn new<P: Any + Send + Sync>(payload: P) -> Self {
        CancelToken(Arc::new(payload))
    }

    /// Try to access the payload as a concrete type
    pub fn downcast_ref<P: Any>(&self) -> Option<&P> {
        self.0.downcast_ref::<P>()
    }
}
//
impl PartialEq for CancelToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
//
impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CancelToken({:p})", Arc::as_ptr(&self.0))
    }
}


/// Error returned to a producer which tries to complete a future twice
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("future {future} was already completed")]
pub struct AlreadyCompleted {
    /// The future which rejected the second completion
    pub future: FutureId,
}


/// Unit tests
#[cfg(test)]
mod tests {
    use crate::completion::*;
    use std::error::Error;
    use std::io;

    /// Check that the predicates match the variants
    #[test]
    fn predicates() {
        let success: Completion<u32> = Completion::Success(5);
        assert!(success.is_success());
        assert!(!success.is_fail());
        assert!(!success.is_cancelled());
        assert_eq!(success.value(), Some(&5));

        let fail: Completion<u32> = Completion::fail_with_message("nope");
        assert!(fail.is_fail());
        assert_eq!(fail.error(), Some(&FutureError::message("nope")));
        assert_eq!(fail.value(), None);

        let cancelled: Completion<u32> = Completion::cancelled();
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.into_value(), None);
    }

    /// Check that mapping only touches successful completions
    #[test]
    fn map_forwards_failures() {
        assert_eq!(Completion::Success(2).map(|x| x * 3), Completion::Success(6));

        let fail: Completion<u32> = Completion::fail_with_message("bad");
        assert_eq!(fail.map(|x| x * 3),
                   Completion::Fail(FutureError::message("bad")));

        let token = CancelToken::new("reason");
        let cancelled: Completion<u32> = Completion::Cancelled(Some(token.clone()));
        assert_eq!(cancelled.map(|x| x + 1), Completion::Cancelled(Some(token)));
    }

    /// Check that standard results convert into completions
    #[test]
    fn from_result() {
        let ok: Result<u8, io::Error> = Ok(1);
        assert_eq!(Completion::from(ok), Completion::Success(1));

        let err: Result<u8, io::Error> =
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"));
        match Completion::from(err) {
            Completion::Fail(error) => {
                assert_eq!(error.to_string(), "disk on fire");
                assert!(error.cause().is_some());
            },
            other => panic!("unexpected completion {:?}", other),
        }
    }

    /// Check that context errors expose both their message and their cause
    #[test]
    fn error_context() {
        let cause = io::Error::new(io::ErrorKind::NotFound, "missing");
        let error = FutureError::with_context("loading config", cause);
        assert_eq!(error.to_string(), "loading config");
        assert_eq!(error.source().map(|e| e.to_string()),
                   Some("missing".to_owned()));
    }

    /// Check that panic payloads are turned into readable errors
    #[test]
    fn panic_payloads() {
        let error = FutureError::from_panic(Box::new("boom"));
        assert_eq!(error, FutureError::HandlerPanicked("boom".to_owned()));

        let error = FutureError::from_panic(Box::new(String::from("bang")));
        assert_eq!(error, FutureError::HandlerPanicked("bang".to_owned()));

        let error = FutureError::from_panic(Box::new(42u8));
        assert!(matches!(error, FutureError::HandlerPanicked(_)));
    }

    /// Check that tokens are compared by identity and keep their payload
    #[test]
    fn cancel_tokens() {
        let token = CancelToken::new(17u32);
        assert_eq!(token, token.clone());
        assert_ne!(token, CancelToken::new(17u32));
        assert_eq!(token.downcast_ref::<u32>(), Some(&17));
        assert_eq!(token.downcast_ref::<i64>(), None);
    }

    /// Check that completions convert into non-delegating handler results
    #[test]
    fn handler_result_conversion() {
        let result: HandlerResult<u8> = Completion::Success(3).into();
        match result.into_completion() {
            Ok(Completion::Success(3)) => {},
            _ => panic!("completion was not preserved"),
        }
    }
}
