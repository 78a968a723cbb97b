//! Error taxonomy of the event loop.

use std::time::Duration;

use crate::util::config::ConfigError;

use super::task::TaskMeta;
use super::timer::TimerId;
use super::worker_pool::CompletionHandle;

/// Invalid scheduling operation, reported synchronously to the caller.
#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("event loop is stopping or stopped")]
    Stopped,

    #[error("event loop is already running")]
    AlreadyRunning,

    #[error("delay of {0:?} is too far in the future")]
    DelayOutOfRange(Duration),

    #[error("{0} is not pending (already fired or cancelled)")]
    TimerNotPending(TimerId),

    #[error("{0} is not waiting in the worker queue")]
    WorkNotQueued(CompletionHandle),

    #[error("configuration is locked once the loop has started or work is outstanding")]
    ConfigLocked,

    #[error("worker pool size must be at least 1, got {0}")]
    InvalidPoolSize(usize),

    #[error("invalid loop configuration: {0}")]
    InvalidConfig(#[source] ConfigError),

    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

/// Error raised by a callback running on the driving thread.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("callback failed: {0}")]
    Failed(#[source] anyhow::Error),

    #[error("callback panicked: {0}")]
    Panicked(String),
}

/// Error outcome of a worker pool payload, delivered to its completion.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker payload failed: {0}")]
    Failed(#[source] anyhow::Error),

    #[error("worker payload panicked: {0}")]
    Panicked(String),

    #[error("worker payload was cancelled before it started")]
    Cancelled,

    #[error("worker payload produced a value of an unexpected type")]
    UnexpectedOutput,
}

/// Reason a run of the loop ended abnormally.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error("unhandled error in {} task {}: {}", .task.kind, .task.id, .error)]
    Unhandled {
        task: TaskMeta,
        #[source]
        error: CallbackError,
    },
}

impl LoopError {
    /// The callback error behind an unhandled-error termination.
    pub fn callback_error(&self) -> Option<&CallbackError> {
        match self {
            LoopError::Unhandled { error, .. } => Some(error),
            LoopError::Scheduling(_) => None,
        }
    }
}
