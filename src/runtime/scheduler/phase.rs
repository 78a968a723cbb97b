//! Phases of a tick and the driver state machine.
//!
//! ```text
//!   ┌──────────────┐
//!   │   timers     │  due timers, ascending due time
//!   ├──────────────┤
//!   │    poll      │  I/O-class tasks + worker completions (may wait here)
//!   ├──────────────┤
//!   │    check     │  run_on_check callbacks
//!   ├──────────────┤
//!   │    close     │  run_on_close callbacks
//!   └──────────────┘
//! ```
//!
//! Immediate and microtask queues are drained at the start of every tick and
//! after every single callback.

use super::task::TaskKind;

/// Named stage of a tick, visited in fixed cyclic order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Expired timers.
    Timers,
    /// I/O-class tasks and worker completions.
    Poll,
    /// Work scheduled to run after poll.
    Check,
    /// Cleanup callbacks.
    Close,
}

impl Phase {
    /// All phases in execution order.
    pub const fn all() -> &'static [Phase] {
        &[Phase::Timers, Phase::Poll, Phase::Check, Phase::Close]
    }

    /// Phase after this one within a tick, `None` after close.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Timers => Some(Phase::Poll),
            Phase::Poll => Some(Phase::Check),
            Phase::Check => Some(Phase::Close),
            Phase::Close => None,
        }
    }

    /// Kind of the tasks this phase runs.
    pub fn task_kind(&self) -> TaskKind {
        match self {
            Phase::Timers => TaskKind::Timer,
            Phase::Poll => TaskKind::PollIO,
            Phase::Check => TaskKind::Check,
            Phase::Close => TaskKind::Close,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let name = match self {
            Phase::Timers => "timers",
            Phase::Poll => "poll",
            Phase::Check => "check",
            Phase::Close => "close",
        };
        f.write_str(name)
    }
}

/// State of the loop driver within one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Running immediate and microtask work until both queues are empty,
    /// then entering (or resuming) `resume`.
    DrainPriority {
        /// Phase to continue with afterwards.
        resume: Phase,
        /// Whether `resume` was already entered this tick.
        entered: bool,
    },
    /// Running callbacks of a phase.
    Running(Phase),
    /// Blocked until a worker completion arrives or a timer becomes due.
    WaitForWork,
    /// The tick finished.
    TickComplete,
}

impl DriverState {
    /// State at the start of a tick.
    #[inline]
    pub fn tick_start() -> Self {
        DriverState::DrainPriority {
            resume: Phase::Timers,
            entered: false,
        }
    }

    /// Phase the driver is in or about to enter.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            DriverState::DrainPriority { resume, .. } => Some(*resume),
            DriverState::Running(phase) => Some(*phase),
            DriverState::WaitForWork => Some(Phase::Poll),
            DriverState::TickComplete => None,
        }
    }
}

/// How far a call to [`super::EventLoop::run_with_mode`] drives the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Run ticks until no work remains or a stop is requested.
    #[default]
    Default,
    /// Run a single tick, waiting for work in the poll phase if needed.
    Once,
    /// Run a single tick without ever blocking.
    NoWait,
}

impl RunMode {
    /// Whether the driver may block in the poll phase.
    #[inline]
    pub fn may_block(&self) -> bool {
        !matches!(self, RunMode::NoWait)
    }
}
