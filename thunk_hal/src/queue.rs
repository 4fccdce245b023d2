//! Operation queue: multi-producer / single-consumer hand-off of tracked jobs.
//!
//! Producers push under a short mutex; the loop thread swaps the whole
//! backlog out in one step, so jobs pushed while a drain is executing land in
//! the next tick's batch. Capacity is unbounded.

use crate::action::Job;
use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Debug, Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    closed: bool,
}

/// FIFO of jobs waiting for the loop thread.
#[derive(Debug, Default)]
pub struct OperationQueue {
    state: Mutex<QueueState>,
}

impl OperationQueue {
    /// Create an empty, open queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job. A closed queue hands the job back.
    pub fn push(&self, job: Job) -> Result<(), Job> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(job);
        }
        state.jobs.push_back(job);
        Ok(())
    }

    /// Take every queued job, in arrival order, without blocking on producers.
    pub fn drain(&self) -> VecDeque<Job> {
        std::mem::take(&mut self.state.lock().jobs)
    }

    /// Close the queue and return whatever was still waiting.
    ///
    /// Later pushes are rejected.
    pub fn close(&self) -> VecDeque<Job> {
        let mut state = self.state.lock();
        state.closed = true;
        std::mem::take(&mut state.jobs)
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }

    /// Whether no jobs are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, SubmitPolicy};

    fn job(id: u64) -> Job {
        Action::new(SubmitPolicy::TrackedWrite, "noop", |_| Ok(()))
            .into_job(id)
            .0
    }

    #[test]
    fn drain_preserves_arrival_order() {
        let queue = OperationQueue::new();
        for id in 0..5 {
            queue.push(job(id)).unwrap();
        }
        let ids: Vec<_> = queue.drain().iter().map(Job::id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn push_after_drain_goes_to_next_batch() {
        let queue = OperationQueue::new();
        queue.push(job(1)).unwrap();
        let first = queue.drain();
        queue.push(job(2)).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn closed_queue_rejects_push() {
        let queue = OperationQueue::new();
        queue.push(job(1)).unwrap();
        let remaining = queue.close();
        assert_eq!(remaining.len(), 1);
        assert!(queue.is_closed());
        let rejected = queue.push(job(2)).unwrap_err();
        assert_eq!(rejected.id(), 2);
    }
}
