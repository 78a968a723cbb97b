//! Task definitions for the event loop.
//!
//! A task is a single unit of deferred work. Its [`TaskKind`] is fixed at
//! creation and decides which queue (or the timer heap) holds it until the
//! driver runs it. Tasks are consumed when run, so a task can never execute
//! twice.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use super::error::CallbackError;
use super::EventLoop;

/// Result type returned by every loop callback.
pub type CallbackResult = anyhow::Result<()>;

/// One-shot callback run on the driving thread.
pub type Callback = Box<dyn FnOnce(&mut EventLoop) -> CallbackResult>;

/// Callback of a repeating timer, invoked once per period.
pub type RepeatingCallback = Box<dyn FnMut(&mut EventLoop) -> CallbackResult>;

/// Unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(val: u64) -> Self {
        Self(val)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// Scheduling class of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Preempts all other deferred work at every drain point.
    Immediate,
    /// Continuation run right after the immediate queue empties.
    Microtask,
    /// Delayed work held by the timer heap.
    Timer,
    /// I/O-class work and worker pool completions.
    PollIO,
    /// Work that runs after the poll phase.
    Check,
    /// Cleanup work run at the end of a tick.
    Close,
}

impl TaskKind {
    /// Whether tasks of this kind are drained between callbacks.
    #[inline]
    pub fn is_priority(&self) -> bool {
        matches!(self, TaskKind::Immediate | TaskKind::Microtask)
    }

    /// Short lowercase label used in logs and stats.
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::Immediate => "immediate",
            TaskKind::Microtask => "microtask",
            TaskKind::Timer => "timer",
            TaskKind::PollIO => "poll",
            TaskKind::Check => "check",
            TaskKind::Close => "close",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Observability record of a task.
///
/// Handed to loop observers once the task completes and to the unhandled
/// error hook when its callback fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMeta {
    /// Task identifier.
    pub id: TaskId,
    /// Scheduling class.
    pub kind: TaskKind,
    /// Absolute due time, timers only.
    pub due_time: Option<Instant>,
    /// When the task was created.
    pub created_at: Instant,
    /// When the driver started running the callback.
    pub started_at: Option<Instant>,
    /// When the callback returned.
    pub completed_at: Option<Instant>,
}

impl TaskMeta {
    /// Wall time spent inside the callback, once it has completed.
    pub fn run_duration(&self) -> Option<Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }
}

/// Work carried by a task.
pub enum Payload {
    /// Runs once and is dropped.
    Once(Callback),
    /// Interval timer body, re-armed after every run.
    Repeating {
        /// Distance between consecutive runs.
        period: Duration,
        /// The callback itself.
        callback: RepeatingCallback,
    },
}

/// A unit of deferred work owned by exactly one queue or the timer heap.
pub struct Task {
    meta: TaskMeta,
    payload: Payload,
}

impl std::fmt::Debug for Task {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.meta.id)
            .field("kind", &self.meta.kind)
            .field("due_time", &self.meta.due_time)
            .field("repeating", &self.is_repeating())
            .finish()
    }
}

impl Task {
    /// Create a one-shot task of the given kind.
    pub fn new<F>(
        id: TaskId,
        kind: TaskKind,
        callback: F,
    ) -> Self
    where
        F: FnOnce(&mut EventLoop) -> CallbackResult + 'static,
    {
        Self {
            meta: TaskMeta {
                id,
                kind,
                due_time: None,
                created_at: Instant::now(),
                started_at: None,
                completed_at: None,
            },
            payload: Payload::Once(Box::new(callback)),
        }
    }

    /// Create a one-shot timer task due at `due`.
    pub fn timer<F>(
        id: TaskId,
        due: Instant,
        callback: F,
    ) -> Self
    where
        F: FnOnce(&mut EventLoop) -> CallbackResult + 'static,
    {
        let mut task = Self::new(id, TaskKind::Timer, callback);
        task.meta.due_time = Some(due);
        task
    }

    /// Create a repeating timer task first due at `due`.
    pub fn repeating<F>(
        id: TaskId,
        due: Instant,
        period: Duration,
        callback: F,
    ) -> Self
    where
        F: FnMut(&mut EventLoop) -> CallbackResult + 'static,
    {
        Self {
            meta: TaskMeta {
                id,
                kind: TaskKind::Timer,
                due_time: Some(due),
                created_at: Instant::now(),
                started_at: None,
                completed_at: None,
            },
            payload: Payload::Repeating {
                period,
                callback: Box::new(callback),
            },
        }
    }

    /// Rebuild a task from parts, used to re-arm interval timers.
    pub(crate) fn from_parts(
        meta: TaskMeta,
        payload: Payload,
    ) -> Self {
        Self { meta, payload }
    }

    /// Get the task ID.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.meta.id
    }

    /// Get the task kind.
    #[inline]
    pub fn kind(&self) -> TaskKind {
        self.meta.kind
    }

    /// Due time of a timer task.
    #[inline]
    pub fn due_time(&self) -> Option<Instant> {
        self.meta.due_time
    }

    /// Observability record.
    #[inline]
    pub fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    /// Whether this is an interval timer.
    #[inline]
    pub fn is_repeating(&self) -> bool {
        matches!(self.payload, Payload::Repeating { .. })
    }

    /// Split the task for execution.
    pub(crate) fn into_parts(self) -> (TaskMeta, Payload) {
        (self.meta, self.payload)
    }
}

/// Run a callback body, turning both errors and panics into [`CallbackError`].
pub(crate) fn guard<F>(body: F) -> Result<(), CallbackError>
where
    F: FnOnce() -> CallbackResult,
{
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(CallbackError::Failed(err)),
        Err(panic) => Err(CallbackError::Panicked(panic_message(panic.as_ref()))),
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Monotonic task ID source. One per event loop.
#[derive(Debug)]
pub struct TaskIdGenerator {
    next_id: u64,
}

impl TaskIdGenerator {
    /// Create a new task ID generator.
    #[inline]
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Generate the next task ID.
    #[inline]
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        TaskId(id)
    }
}

impl Default for TaskIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
