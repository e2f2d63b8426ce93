//! Timer thread for delayed jobs
//!
//! Delayed jobs are kept in a deadline-ordered heap by a single thread, which
//! sleeps on its submission channel until either a new job arrives or the
//! earliest deadline elapses. Jobs that are due run directly on the timer
//! thread, so they should only hand work over to some other executor.

use crate::completion::panic_message;
use crate::executor::{DispatchError, Job, Rejected};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, SendError, Sender};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Instant;
use tracing::{debug, error, trace};


/// Handle to the timer thread, which exits when the handle is dropped
pub(crate) struct Timer {
    name: String,
    sender: Sender<(Instant, Job)>,
}
//
impl Timer {
    /// Start the timer thread
    pub(crate) fn start(name: String) -> Result<Self, DispatchError> {
        let (sender, receiver) = unbounded();
        thread::Builder::new()
                        .name(name.clone())
                        .spawn(move || timer_loop(receiver))
                        .map_err(|io_error| DispatchError::Spawn {
                            name: name.clone(),
                            reason: io_error.to_string(),
                        })?;
        debug!(timer = %name, "timer thread started");
        Ok(Timer { name, sender })
    }

    /// Run a job once the deadline has passed
    pub(crate) fn schedule(&self, deadline: Instant, job: Job) -> Result<(), Rejected> {
        self.sender.send((deadline, job)).map_err(|SendError((_, job))| {
            Rejected::new(DispatchError::Closed(self.name.clone()), job)
        })
    }
}


/// Job waiting in the timer heap
struct Entry {
    deadline: Instant,
    sequence: u64,
    job: Job,
}
//
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
//
impl Eq for Entry {}
//
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
//
impl Ord for Entry {
    /// Reversed, so that the max-heap pops the earliest deadline first, with
    /// submission order breaking ties
    fn cmp(&self, other: &Self) -> Ordering {
        other.deadline.cmp(&self.deadline)
             .then_with(|| other.sequence.cmp(&self.sequence))
    }
}


fn timer_loop(receiver: Receiver<(Instant, Job)>) {
    let mut heap = BinaryHeap::new();
    let mut sequence = 0;
    loop {
        let received = match heap.peek() {
            Some(&Entry { deadline, .. }) => receiver.recv_deadline(deadline),
            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok((deadline, job)) => {
                heap.push(Entry { deadline, sequence, job });
                sequence += 1;
            },
            Err(RecvTimeoutError::Timeout) => {},
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        while heap.peek().map_or(false, |entry| entry.deadline <= now) {
            if let Some(entry) = heap.pop() {
                trace!(sequence = entry.sequence, "running delayed job");
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry.job.run()));
                if let Err(payload) = outcome {
                    error!(panic = %panic_message(&*payload), "delayed job panicked");
                }
            }
        }
    }
    debug!(dropped = heap.len(), "timer thread exiting");
}
