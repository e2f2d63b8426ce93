//! Polling-based future monitoring
//!
//! This module provides a way to monitor futures through polling. It provides
//! maximal performance in scenarios where a consumer does not need to
//! synchronize with a future, but only to periodically check whether it has
//! completed, as is the case for example when refreshing a user interface at
//! a fixed rate.
//!
//! A monitor reads the future's status from a triple buffer, which the
//! future's completion writes into. Checking the status thus never contends
//! with the future's lock, nor with any other monitor.

use crate::completion::Completion;
use crate::future::{Future, FutureId};
use triple_buffer::{Output, TripleBuffer};


/// Status of a monitored future
#[derive(Clone, Debug, PartialEq)]
pub enum Status<T> {
    /// The future has not completed yet
    Pending,

    /// The future has completed with this outcome
    Completed(Completion<T>),
}


/// Lock-free observer of a future's status
pub struct StatusMonitor<T: Send> {
    /// Identifier of the monitored future
    future: FutureId,

    /// The future's status will be read through this triple buffer
    output: Output<Status<T>>,
}
//
impl<T: Clone + Send + 'static> StatusMonitor<T> {
    /// Identifier of the monitored future
    pub fn future_id(&self) -> FutureId {
        self.future
    }

    /// Access the latest status of the future
    pub fn status(&mut self) -> &Status<T> {
        self.output.read()
    }

    /// Check if the future has completed
    pub fn is_completed(&mut self) -> bool {
        matches!(*self.status(), Status::Completed(_))
    }
}


impl<T: Clone + Send + 'static> Future<T> {
    /// Set up a polling monitor for this future
    pub fn monitor(&self) -> StatusMonitor<T> {
        let (mut input, output) = TripleBuffer::new(&Status::Pending).split();
        self.subscribe_inline(move |completion| input.write(Status::Completed(completion)));
        StatusMonitor { future: self.id(), output }
    }
}
