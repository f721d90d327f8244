//! Cancelable one-shot timers.
//!
//! The reconnect state machine only needs "run this after N milliseconds,
//! unless cancelled first". [`Scheduler`] is that primitive; [`TokioScheduler`]
//! is the production implementation.

use std::fmt;
use std::time::Duration;

/// Work to run when a timer fires.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Schedules one-shot tasks.
pub trait Scheduler: Send + Sync {
    /// Runs `task` once `delay` has elapsed, unless the returned handle is
    /// cancelled first. Implementations must not run `task` inline.
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle;
}

/// Cancels a scheduled task. Dropping the handle leaves the task scheduled.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl TimerHandle {
    /// Creates a handle that runs `cancel` when cancelled.
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Creates a handle with nothing to cancel.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    /// Cancels the task. Has no effect if it already ran.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelable", &self.cancel.is_some())
            .finish()
    }
}

/// Schedules tasks on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    /// Creates a scheduler spawning onto `handle`.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates a scheduler for the runtime this thread is running in, if any.
    pub fn try_current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        TimerHandle::new(move || join.abort())
    }
}
