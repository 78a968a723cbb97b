//! Loop statistics and observer hooks.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

use super::phase::Phase;
use super::task::{TaskKind, TaskMeta};

/// Loop statistics.
///
/// Counters are atomic because worker threads update the busy peak and job
/// counters while the driver updates the rest.
#[derive(Debug, Default)]
pub struct LoopStats {
    /// Completed ticks.
    pub ticks: AtomicU64,
    /// Immediate callbacks run.
    pub immediates_run: AtomicU64,
    /// Microtask callbacks run.
    pub microtasks_run: AtomicU64,
    /// Timer callbacks run.
    pub timers_fired: AtomicU64,
    /// Timers cancelled before firing.
    pub timers_cancelled: AtomicU64,
    /// Poll callbacks run, worker completions included.
    pub poll_callbacks_run: AtomicU64,
    /// Check callbacks run.
    pub check_callbacks_run: AtomicU64,
    /// Close callbacks run.
    pub close_callbacks_run: AtomicU64,
    /// Payloads handed to the worker pool.
    pub jobs_submitted: AtomicU64,
    /// Worker completions delivered to the poll queue.
    pub jobs_completed: AtomicU64,
    /// Completions carrying an error.
    pub jobs_failed: AtomicU64,
    /// Payloads cancelled while waiting for a slot.
    pub jobs_cancelled: AtomicU64,
    /// Highest number of simultaneously busy workers.
    pub peak_busy_workers: AtomicUsize,
    /// Time spent inside callbacks on the driving thread, in microseconds.
    pub callback_time_us: AtomicU64,
    /// Callback errors seen by the unhandled-error path.
    pub unhandled_errors: AtomicU64,
}

impl LoopStats {
    /// Record a finished callback.
    pub fn record_task(
        &self,
        meta: &TaskMeta,
    ) {
        let counter = match meta.kind {
            TaskKind::Immediate => &self.immediates_run,
            TaskKind::Microtask => &self.microtasks_run,
            TaskKind::Timer => &self.timers_fired,
            TaskKind::PollIO => &self.poll_callbacks_run,
            TaskKind::Check => &self.check_callbacks_run,
            TaskKind::Close => &self.close_callbacks_run,
        };
        counter.fetch_add(1, Ordering::SeqCst);

        if let Some(duration) = meta.run_duration() {
            let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
            self.callback_time_us.fetch_add(micros, Ordering::SeqCst);
        }
    }

    /// Record a completed tick.
    #[inline]
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a cancelled timer.
    #[inline]
    pub fn record_timer_cancelled(&self) {
        self.timers_cancelled.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a worker submission.
    #[inline]
    pub fn record_job_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a delivered worker completion.
    #[inline]
    pub fn record_job_completed(
        &self,
        failed: bool,
    ) {
        self.jobs_completed.fetch_add(1, Ordering::SeqCst);
        if failed {
            self.jobs_failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Record a payload cancelled in the wait queue.
    #[inline]
    pub fn record_job_cancelled(&self) {
        self.jobs_cancelled.fetch_add(1, Ordering::SeqCst);
    }

    /// Record an error that reached the unhandled-error path.
    #[inline]
    pub fn record_unhandled(&self) {
        self.unhandled_errors.fetch_add(1, Ordering::SeqCst);
    }

    /// Update the busy-worker peak.
    #[inline]
    pub fn update_peak_busy(
        &self,
        current: usize,
    ) {
        self.peak_busy_workers.fetch_max(current, Ordering::SeqCst);
    }

    /// Total callbacks run on the driving thread.
    pub fn callbacks_run(&self) -> u64 {
        [
            &self.immediates_run,
            &self.microtasks_run,
            &self.timers_fired,
            &self.poll_callbacks_run,
            &self.check_callbacks_run,
            &self.close_callbacks_run,
        ]
        .iter()
        .map(|counter| counter.load(Ordering::SeqCst))
        .sum()
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::SeqCst);
        StatsSnapshot {
            ticks: load(&self.ticks),
            immediates_run: load(&self.immediates_run),
            microtasks_run: load(&self.microtasks_run),
            timers_fired: load(&self.timers_fired),
            timers_cancelled: load(&self.timers_cancelled),
            poll_callbacks_run: load(&self.poll_callbacks_run),
            check_callbacks_run: load(&self.check_callbacks_run),
            close_callbacks_run: load(&self.close_callbacks_run),
            jobs_submitted: load(&self.jobs_submitted),
            jobs_completed: load(&self.jobs_completed),
            jobs_failed: load(&self.jobs_failed),
            jobs_cancelled: load(&self.jobs_cancelled),
            peak_busy_workers: self.peak_busy_workers.load(Ordering::SeqCst),
            callback_time_us: load(&self.callback_time_us),
            unhandled_errors: load(&self.unhandled_errors),
        }
    }
}

/// Serializable copy of [`LoopStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub immediates_run: u64,
    pub microtasks_run: u64,
    pub timers_fired: u64,
    pub timers_cancelled: u64,
    pub poll_callbacks_run: u64,
    pub check_callbacks_run: u64,
    pub close_callbacks_run: u64,
    pub jobs_submitted: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
    pub peak_busy_workers: usize,
    pub callback_time_us: u64,
    pub unhandled_errors: u64,
}

/// Hooks called by the driver. All methods default to no-ops.
pub trait LoopObserver {
    /// A new tick is starting.
    fn on_tick_start(
        &mut self,
        _tick: u64,
    ) {
    }

    /// The driver entered `phase`.
    fn on_phase_enter(
        &mut self,
        _phase: Phase,
    ) {
    }

    /// A callback returned (successfully or not).
    fn on_task_complete(
        &mut self,
        _meta: &TaskMeta,
    ) {
    }
}

/// Observer that does nothing.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl LoopObserver for NoopObserver {}
