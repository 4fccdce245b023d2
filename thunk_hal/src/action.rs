//! Actions and submission policies.
//!
//! An [`Action`] is one controller call captured as a closure together with
//! the [`SubmitPolicy`] that decides where it runs. Tracked actions are turned
//! into type-erased [`Job`]s, queued, and executed on the loop thread; the
//! typed result travels back through a one-shot completion.

use crate::completion::{Waiter, completion};
use crate::error::DispatchError;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, ThreadId};
use thunk_common::i2c::{I2cController, I2cError};

/// Whether an action mutates controller state or only observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Observes state and produces a value.
    Read,
    /// Mutates state; no value.
    Write,
}

/// Where and how an action is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmitPolicy {
    /// Queued; caller blocks until it ran on the loop thread.
    TrackedWrite,
    /// Queued; caller blocks until it ran and receives the value.
    TrackedRead,
    /// Runs immediately on the calling thread, outside queue ordering.
    UntrackedWrite,
    /// Runs immediately on the calling thread; value must be thread-safe
    /// to read without the loop thread.
    UntrackedRead,
}

impl SubmitPolicy {
    /// Every policy, for exhaustive tests.
    pub const ALL: [SubmitPolicy; 4] = [
        SubmitPolicy::TrackedWrite,
        SubmitPolicy::TrackedRead,
        SubmitPolicy::UntrackedWrite,
        SubmitPolicy::UntrackedRead,
    ];

    /// Read or write classification.
    pub const fn kind(self) -> ActionKind {
        match self {
            SubmitPolicy::TrackedRead | SubmitPolicy::UntrackedRead => ActionKind::Read,
            SubmitPolicy::TrackedWrite | SubmitPolicy::UntrackedWrite => ActionKind::Write,
        }
    }

    /// Whether the action goes through the ordered queue.
    pub const fn is_tracked(self) -> bool {
        matches!(self, SubmitPolicy::TrackedWrite | SubmitPolicy::TrackedRead)
    }
}

type Payload<T> = Box<dyn FnOnce(&dyn I2cController) -> Result<T, I2cError> + Send>;

/// A controller call waiting to be executed.
pub struct Action<T> {
    policy: SubmitPolicy,
    label: &'static str,
    payload: Payload<T>,
}

impl<T: Send + 'static> Action<T> {
    /// Capture `payload` under `policy`. `label` names the capability in logs
    /// and errors.
    pub fn new<F>(policy: SubmitPolicy, label: &'static str, payload: F) -> Self
    where
        F: FnOnce(&dyn I2cController) -> Result<T, I2cError> + Send + 'static,
    {
        Self {
            policy,
            label,
            payload: Box::new(payload),
        }
    }

    /// Submission policy.
    pub fn policy(&self) -> SubmitPolicy {
        self.policy
    }

    /// Capability label.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Run the payload on the current thread against `target`.
    ///
    /// Controller failures become [`DispatchError::Execution`]; a panic in
    /// the payload becomes [`DispatchError::PayloadPanicked`].
    pub fn run(self, target: &dyn I2cController) -> Result<T, DispatchError> {
        let label = self.label;
        let payload = self.payload;
        match catch_unwind(AssertUnwindSafe(|| payload(target))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(DispatchError::Execution { label, source }),
            Err(_) => Err(DispatchError::PayloadPanicked { label }),
        }
    }

    /// Erase the result type: the returned job completes the returned waiter.
    pub(crate) fn into_job(self, id: u64) -> (Job, Waiter<T>) {
        let (completer, waiter) = completion();
        let label = self.label;
        let kind = self.policy.kind();
        let run = Box::new(move |target: &dyn I2cController| {
            let outcome = self.run(target);
            let report = outcome.as_ref().map(|_| ()).map_err(|e| e.to_string());
            completer.complete(outcome);
            report
        });
        let job = Job {
            id,
            label,
            kind,
            submitted_by: thread::current().id(),
            run,
        };
        (job, waiter)
    }
}

/// Type-erased tracked action, owned by the queue until executed.
///
/// Dropping a job without executing it releases its caller with
/// [`DispatchError::Closed`].
pub struct Job {
    id: u64,
    label: &'static str,
    kind: ActionKind,
    submitted_by: ThreadId,
    run: Box<dyn FnOnce(&dyn I2cController) -> Result<(), String> + Send>,
}

impl Job {
    /// Sequence number assigned at submission.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Capability label.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Read or write.
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Thread that submitted the job.
    pub fn submitted_by(&self) -> ThreadId {
        self.submitted_by
    }

    /// Run the payload and complete the caller. Returns the failure message
    /// if the payload failed.
    pub fn execute(self, target: &dyn I2cController) -> Result<(), String> {
        (self.run)(target)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("submitted_by", &self.submitted_by)
            .finish_non_exhaustive()
    }
}
