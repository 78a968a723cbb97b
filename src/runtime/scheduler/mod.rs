//! Phase-ordered event loop
//!
//! [`EventLoop`] runs every callback on the thread that calls
//! [`EventLoop::run`]. Blocking payloads go to a fixed-size [`WorkerPool`];
//! their results come back as poll-phase tasks over a channel, which is the
//! only state shared with the worker threads.
//!
//! Each tick walks the phases in order (timers, poll, check, close). The
//! immediate and microtask queues are drained fully at the start of the tick
//! and after every single callback.

pub mod error;
pub mod phase;
pub mod queue;
pub mod stats;
pub mod task;
pub mod timer;
pub mod worker_pool;

pub use error::{CallbackError, LoopError, SchedulingError, WorkerError};
pub use phase::{DriverState, Phase, RunMode};
pub use queue::{PhaseQueues, PriorityQueues, TaskQueue};
pub use stats::{LoopObserver, LoopStats, NoopObserver, StatsSnapshot};
pub use task::{CallbackResult, Task, TaskId, TaskIdGenerator, TaskKind, TaskMeta};
pub use timer::{PopDue, TimerHeap, TimerId};
pub use worker_pool::{CompletionHandle, PoolConfig, SlotState, WorkerPool};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, debug_span, info, trace, warn};

use crate::util::config::LoopConfig;
use task::{guard, Payload};
use worker_pool::{Completion, LoopMessage, WorkOutput};

const STOP_NONE: u8 = 0;
const STOP_GRACEFUL: u8 = 1;
const STOP_FORCED: u8 = 2;

/// Driver-side continuation of a worker payload.
type Continuation = Box<dyn FnOnce(&mut EventLoop, WorkOutput) -> CallbackResult>;

/// Global handler for callback errors.
type ErrorHook = Box<dyn FnMut(&CallbackError, &TaskMeta) -> ErrorAction>;

/// Decision of the unhandled-error hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Keep running with the next callback.
    Continue,
    /// Force-terminate the loop; `run` returns the error.
    Stop,
}

/// Lifecycle of an event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    /// Accepting work.
    Active,
    /// Graceful stop requested: pending work drains, new work is refused.
    Stopping,
    /// Terminated; nothing more will run.
    Stopped,
}

/// Requests a stop from any thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    signal: Arc<AtomicU8>,
    sender: Sender<LoopMessage>,
}

impl StopHandle {
    /// Ask the loop to stop. `force` discards pending work; otherwise the loop
    /// drains what is already scheduled first.
    pub fn stop(
        &self,
        force: bool,
    ) {
        let level = if force { STOP_FORCED } else { STOP_GRACEFUL };
        self.signal.fetch_max(level, Ordering::SeqCst);
        // The driver may be blocked waiting on the channel.
        let _ = self.sender.send(LoopMessage::Wake);
    }
}

/// Position of the driver inside the current phase.
#[derive(Debug, Clone, Copy)]
struct PhaseCursor {
    /// Time captured when the timers phase started.
    now: Instant,
    /// Timers inserted at or after this sequence (anything scheduled during
    /// the current tick) wait for the next tick.
    watermark: u64,
    /// Callbacks the current queue phase may still run.
    budget: usize,
}

/// Single-threaded, phase-ordered event loop.
pub struct EventLoop {
    config: LoopConfig,
    ids: TaskIdGenerator,
    priority: PriorityQueues,
    phases: PhaseQueues,
    timers: TimerHeap,
    pool: WorkerPool,
    sender: Sender<LoopMessage>,
    receiver: Receiver<LoopMessage>,
    continuations: HashMap<CompletionHandle, Continuation>,
    stats: Arc<LoopStats>,
    observer: Box<dyn LoopObserver>,
    error_hook: Option<ErrorHook>,
    status: LoopStatus,
    stop_signal: Arc<AtomicU8>,
    state: DriverState,
    cursor: PhaseCursor,
    tick: u64,
    running: bool,
    started: bool,
}

impl std::fmt::Debug for EventLoop {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("status", &self.status)
            .field("tick", &self.tick)
            .field("state", &self.state)
            .field("priority", &self.priority.len())
            .field("phases", &self.phases.len())
            .field("timers", &self.timers.len())
            .field("outstanding_jobs", &self.continuations.len())
            .field("pool", &self.pool)
            .finish()
    }
}

impl From<&LoopConfig> for PoolConfig {
    fn from(config: &LoopConfig) -> Self {
        Self {
            size: config.worker_pool_size,
            name_prefix: config.worker_name_prefix.clone(),
            stack_size: config.worker_stack_size,
        }
    }
}

impl EventLoop {
    /// Create an event loop with the default configuration.
    pub fn new() -> Self {
        Self::build(LoopConfig::default())
    }

    /// Create an event loop with a custom configuration.
    pub fn with_config(config: LoopConfig) -> Result<Self, SchedulingError> {
        if config.worker_pool_size == 0 {
            return Err(SchedulingError::InvalidPoolSize(0));
        }
        config.validate().map_err(SchedulingError::InvalidConfig)?;
        Ok(Self::build(config))
    }

    fn build(config: LoopConfig) -> Self {
        let (sender, receiver) = channel::unbounded();
        let stats = Arc::new(LoopStats::default());
        let pool = WorkerPool::new(PoolConfig::from(&config), sender.clone(), stats.clone());
        let now = Instant::now();

        Self {
            config,
            ids: TaskIdGenerator::new(),
            priority: PriorityQueues::new(),
            phases: PhaseQueues::new(),
            timers: TimerHeap::new(),
            pool,
            sender,
            receiver,
            continuations: HashMap::new(),
            stats,
            observer: Box::new(NoopObserver),
            error_hook: None,
            status: LoopStatus::Active,
            stop_signal: Arc::new(AtomicU8::new(STOP_NONE)),
            state: DriverState::TickComplete,
            cursor: PhaseCursor {
                now,
                watermark: 0,
                budget: 0,
            },
            tick: 0,
            running: false,
            started: false,
        }
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    fn ensure_open(&self) -> Result<(), SchedulingError> {
        match self.status {
            LoopStatus::Stopped => Err(SchedulingError::Stopped),
            _ => Ok(()),
        }
    }

    fn due_after(delay: Duration) -> Result<Instant, SchedulingError> {
        Instant::now()
            .checked_add(delay)
            .ok_or(SchedulingError::DelayOutOfRange(delay))
    }

    fn ensure_accepting(&self) -> Result<(), SchedulingError> {
        match self.status {
            LoopStatus::Active => Ok(()),
            _ => Err(SchedulingError::Stopped),
        }
    }

    /// Queue a callback that preempts all other deferred work.
    ///
    /// Still allowed while a graceful stop drains the loop.
    pub fn run_immediate<F>(
        &mut self,
        callback: F,
    ) -> Result<TaskId, SchedulingError>
    where
        F: FnOnce(&mut EventLoop) -> CallbackResult + 'static,
    {
        self.ensure_open()?;
        let id = self.ids.next();
        self.priority.push(Task::new(id, TaskKind::Immediate, callback));
        trace!(%id, "immediate queued");
        Ok(id)
    }

    /// Queue a microtask, run once the immediate queue is empty.
    ///
    /// Still allowed while a graceful stop drains the loop.
    pub fn run_microtask<F>(
        &mut self,
        callback: F,
    ) -> Result<TaskId, SchedulingError>
    where
        F: FnOnce(&mut EventLoop) -> CallbackResult + 'static,
    {
        self.ensure_open()?;
        let id = self.ids.next();
        self.priority.push(Task::new(id, TaskKind::Microtask, callback));
        trace!(%id, "microtask queued");
        Ok(id)
    }

    /// Run `callback` in a timers phase once `delay` has elapsed.
    ///
    /// A zero delay still waits for a later timers phase.
    pub fn schedule_timer<F>(
        &mut self,
        delay: Duration,
        callback: F,
    ) -> Result<TimerId, SchedulingError>
    where
        F: FnOnce(&mut EventLoop) -> CallbackResult + 'static,
    {
        self.ensure_accepting()?;
        let due = Self::due_after(delay)?;
        let id = self.ids.next();
        let timer = self.timers.schedule(Task::timer(id, due, callback));
        trace!(%timer, ?delay, "timer scheduled");
        Ok(timer)
    }

    /// Run `callback` every `period` until the timer is cancelled.
    pub fn schedule_interval<F>(
        &mut self,
        period: Duration,
        callback: F,
    ) -> Result<TimerId, SchedulingError>
    where
        F: FnMut(&mut EventLoop) -> CallbackResult + 'static,
    {
        self.ensure_accepting()?;
        let due = Self::due_after(period)?;
        let id = self.ids.next();
        let task = Task::repeating(id, due, period, callback);
        let timer = self.timers.schedule(task);
        trace!(%timer, ?period, "interval scheduled");
        Ok(timer)
    }

    /// Cancel a timer that has not fired yet.
    pub fn cancel_timer(
        &mut self,
        timer: TimerId,
    ) -> Result<(), SchedulingError> {
        self.timers.cancel(timer)?;
        self.stats.record_timer_cancelled();
        trace!(%timer, "timer cancelled");
        Ok(())
    }

    /// Queue an I/O-class callback for the next poll phase.
    pub fn run_on_poll<F>(
        &mut self,
        callback: F,
    ) -> Result<TaskId, SchedulingError>
    where
        F: FnOnce(&mut EventLoop) -> CallbackResult + 'static,
    {
        self.push_phase_task(TaskKind::PollIO, callback)
    }

    /// Queue a callback for the next check phase.
    pub fn run_on_check<F>(
        &mut self,
        callback: F,
    ) -> Result<TaskId, SchedulingError>
    where
        F: FnOnce(&mut EventLoop) -> CallbackResult + 'static,
    {
        self.push_phase_task(TaskKind::Check, callback)
    }

    /// Queue a callback for the next close phase.
    pub fn run_on_close<F>(
        &mut self,
        callback: F,
    ) -> Result<TaskId, SchedulingError>
    where
        F: FnOnce(&mut EventLoop) -> CallbackResult + 'static,
    {
        self.push_phase_task(TaskKind::Close, callback)
    }

    fn push_phase_task<F>(
        &mut self,
        kind: TaskKind,
        callback: F,
    ) -> Result<TaskId, SchedulingError>
    where
        F: FnOnce(&mut EventLoop) -> CallbackResult + 'static,
    {
        self.ensure_accepting()?;
        let id = self.ids.next();
        self.phases.push(Task::new(id, kind, callback));
        trace!(%id, %kind, "phase task queued");
        Ok(id)
    }

    /// Run `work` on the worker pool.
    ///
    /// `on_complete` runs in a later poll phase with exactly the value `work`
    /// returned, or the [`WorkerError`] it failed with.
    pub fn submit_to_worker_pool<T, W, C>(
        &mut self,
        work: W,
        on_complete: C,
    ) -> Result<CompletionHandle, SchedulingError>
    where
        T: Send + 'static,
        W: FnOnce() -> anyhow::Result<T> + Send + 'static,
        C: FnOnce(&mut EventLoop, Result<T, WorkerError>) -> CallbackResult + 'static,
    {
        self.ensure_accepting()?;

        let erased: worker_pool::Work = Box::new(move || match work() {
            Ok(value) => Ok(Box::new(value) as Box<dyn std::any::Any + Send>),
            Err(err) => Err(WorkerError::Failed(err)),
        });
        let continuation: Continuation = Box::new(move |event_loop, outcome| {
            let outcome = outcome.and_then(|value| {
                value
                    .downcast::<T>()
                    .map(|value| *value)
                    .map_err(|_| WorkerError::UnexpectedOutput)
            });
            on_complete(event_loop, outcome)
        });

        let handle = self.pool.submit(erased)?;
        self.continuations.insert(handle, continuation);
        Ok(handle)
    }

    /// Cancel a payload that is still waiting for a free worker.
    ///
    /// Its continuation then receives [`WorkerError::Cancelled`] in the next
    /// poll phase. Payloads already running cannot be cancelled.
    pub fn cancel_work(
        &mut self,
        handle: CompletionHandle,
    ) -> Result<(), SchedulingError> {
        if !self.continuations.contains_key(&handle) || !self.pool.cancel(handle) {
            return Err(SchedulingError::WorkNotQueued(handle));
        }
        self.stats.record_job_cancelled();
        self.deliver(Completion {
            handle,
            outcome: Err(WorkerError::Cancelled),
            finished_at: Instant::now(),
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Hooks and configuration
    // ------------------------------------------------------------------

    /// Register the global handler for callback errors.
    ///
    /// Without one, any callback error terminates the loop.
    pub fn on_unhandled_error<H>(
        &mut self,
        handler: H,
    ) where
        H: FnMut(&CallbackError, &TaskMeta) -> ErrorAction + 'static,
    {
        self.error_hook = Some(Box::new(handler));
    }

    /// Replace the loop observer.
    pub fn set_observer<O>(
        &mut self,
        observer: O,
    ) where
        O: LoopObserver + 'static,
    {
        self.observer = Box::new(observer);
    }

    /// Change the worker pool size. Only possible before the first run and
    /// while no payload is outstanding.
    pub fn set_worker_pool_size(
        &mut self,
        size: usize,
    ) -> Result<(), SchedulingError> {
        if size == 0 {
            return Err(SchedulingError::InvalidPoolSize(size));
        }
        if self.started || self.pool.is_started() || !self.continuations.is_empty() {
            return Err(SchedulingError::ConfigLocked);
        }
        self.config.worker_pool_size = size;
        self.pool = WorkerPool::new(
            PoolConfig::from(&self.config),
            self.sender.clone(),
            self.stats.clone(),
        );
        Ok(())
    }

    /// Handle that can stop the loop from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            signal: self.stop_signal.clone(),
            sender: self.sender.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Effective configuration.
    #[inline]
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Statistics.
    #[inline]
    pub fn stats(&self) -> &Arc<LoopStats> {
        &self.stats
    }

    /// The worker pool.
    #[inline]
    pub fn worker_pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Lifecycle state.
    #[inline]
    pub fn status(&self) -> LoopStatus {
        self.status
    }

    /// Whether `run` is currently executing.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Number of the current (or last) tick, starting at 1.
    #[inline]
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Phase being executed, `None` outside of `run`.
    pub fn current_phase(&self) -> Option<Phase> {
        if self.is_running() {
            self.state.phase()
        } else {
            None
        }
    }

    /// Timers that have not fired or been cancelled.
    #[inline]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Queued callbacks (priority and phase queues).
    #[inline]
    pub fn pending_tasks(&self) -> usize {
        self.priority.len() + self.phases.len()
    }

    /// Worker payloads whose completion has not reached the poll queue yet.
    #[inline]
    pub fn outstanding_jobs(&self) -> usize {
        self.continuations.len()
    }

    /// Whether any task, timer or worker payload is still pending.
    pub fn is_alive(&self) -> bool {
        !self.priority.is_empty()
            || !self.phases.is_empty()
            || !self.timers.is_empty()
            || !self.continuations.is_empty()
    }

    // ------------------------------------------------------------------
    // Stopping
    // ------------------------------------------------------------------

    /// Stop the loop.
    ///
    /// Graceful (`force == false`): refuse new timers, phase tasks and worker
    /// payloads, cancel intervals, and return from `run` once the remaining
    /// work drained. Forced: discard everything pending and return from `run`
    /// right after the current callback.
    pub fn stop(
        &mut self,
        force: bool,
    ) {
        if force {
            self.force_stop();
        } else {
            self.begin_graceful_stop();
        }
    }

    fn begin_graceful_stop(&mut self) {
        if self.status != LoopStatus::Active {
            return;
        }
        self.status = LoopStatus::Stopping;
        let intervals = self.timers.cancel_repeating();
        info!(intervals, "graceful stop requested, draining");
    }

    fn force_stop(&mut self) {
        if self.status == LoopStatus::Stopped {
            return;
        }
        self.status = LoopStatus::Stopped;

        let tasks = self.priority.clear() + self.phases.clear();
        let timers = self.timers.clear();
        let jobs = self.pool.cancel_queued();
        for _ in &jobs {
            self.stats.record_job_cancelled();
        }
        self.continuations.clear();
        info!(tasks, timers, jobs = jobs.len(), "event loop stopped, pending work discarded");
    }

    fn poll_stop_signal(&mut self) {
        match self.stop_signal.swap(STOP_NONE, Ordering::SeqCst) {
            STOP_FORCED => self.force_stop(),
            STOP_GRACEFUL => self.begin_graceful_stop(),
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Driver
    // ------------------------------------------------------------------

    /// Run ticks until no work remains or the loop is stopped.
    ///
    /// Returns the callback error if one terminated the loop.
    pub fn run(&mut self) -> Result<(), LoopError> {
        self.run_with_mode(RunMode::Default).map(|_| ())
    }

    /// Drive the loop according to `mode`. Returns whether work remains.
    pub fn run_with_mode(
        &mut self,
        mode: RunMode,
    ) -> Result<bool, LoopError> {
        if self.running {
            return Err(SchedulingError::AlreadyRunning.into());
        }
        if self.status == LoopStatus::Stopped {
            return Err(SchedulingError::Stopped.into());
        }

        self.running = true;
        self.started = true;
        debug!(?mode, "event loop running");
        let result = self.drive(mode);
        self.running = false;
        self.state = DriverState::TickComplete;

        match &result {
            Ok(alive) => debug!(alive, ticks = self.tick, "event loop returned"),
            Err(err) => warn!(error = %err, "event loop terminated"),
        }
        result
    }

    fn drive(
        &mut self,
        mode: RunMode,
    ) -> Result<bool, LoopError> {
        loop {
            self.poll_stop_signal();
            if self.status == LoopStatus::Stopped {
                return Ok(false);
            }

            if !self.is_alive() {
                if self.status == LoopStatus::Stopping {
                    self.status = LoopStatus::Stopped;
                    info!("event loop drained and stopped");
                }
                return Ok(false);
            }

            self.run_tick(mode)?;

            if self.status == LoopStatus::Stopped {
                return Ok(false);
            }
            if mode != RunMode::Default {
                return Ok(self.is_alive());
            }
        }
    }

    /// One full pass over the phases.
    fn run_tick(
        &mut self,
        mode: RunMode,
    ) -> Result<(), LoopError> {
        self.tick += 1;
        let _span = debug_span!("tick", tick = self.tick).entered();
        self.observer.on_tick_start(self.tick);
        self.state = DriverState::tick_start();
        self.cursor.watermark = self.timers.watermark();

        loop {
            self.poll_stop_signal();
            if self.status == LoopStatus::Stopped {
                return Ok(());
            }

            match self.state {
                DriverState::DrainPriority { resume, entered } => {
                    if let Some(task) = self.priority.pop() {
                        self.run_task(task)?;
                    } else if entered {
                        self.state = DriverState::Running(resume);
                    } else {
                        self.enter_phase(resume);
                    }
                }
                DriverState::Running(phase) => match self.next_in_phase(phase) {
                    Some(task) => {
                        self.run_task(task)?;
                        self.state = DriverState::DrainPriority {
                            resume: phase,
                            entered: true,
                        };
                    }
                    None => self.state = self.after_phase(phase, mode),
                },
                DriverState::WaitForWork => {
                    self.wait_for_work();
                    self.state = DriverState::DrainPriority {
                        resume: Phase::Poll,
                        entered: false,
                    };
                }
                DriverState::TickComplete => break,
            }
        }

        self.stats.record_tick();
        Ok(())
    }

    fn enter_phase(
        &mut self,
        phase: Phase,
    ) {
        self.observer.on_phase_enter(phase);

        match phase {
            Phase::Timers => self.cursor.now = Instant::now(),
            Phase::Poll => {
                self.collect_completions();
                self.cursor.budget = self.phases.get(phase).map_or(0, TaskQueue::len);
            }
            Phase::Check | Phase::Close => {
                self.cursor.budget = self.phases.get(phase).map_or(0, TaskQueue::len);
            }
        }

        trace!(%phase, budget = self.cursor.budget, "phase entered");
        self.state = DriverState::Running(phase);
    }

    /// Next callback of `phase`. Tasks queued after the phase was entered
    /// wait for the next tick.
    fn next_in_phase(
        &mut self,
        phase: Phase,
    ) -> Option<Task> {
        match phase {
            Phase::Timers => self
                .timers
                .pop_due_before(self.cursor.now, self.cursor.watermark),
            _ => {
                if self.cursor.budget == 0 {
                    return None;
                }
                self.cursor.budget -= 1;
                self.phases.get_mut(phase).and_then(TaskQueue::pop_front)
            }
        }
    }

    fn after_phase(
        &mut self,
        phase: Phase,
        mode: RunMode,
    ) -> DriverState {
        if phase == Phase::Poll && mode.may_block() && self.should_wait() {
            return DriverState::WaitForWork;
        }
        match phase.next() {
            Some(next) => DriverState::DrainPriority {
                resume: next,
                entered: false,
            },
            None => DriverState::TickComplete,
        }
    }

    /// Nothing is runnable, but a timer or a worker payload will produce work.
    fn should_wait(&mut self) -> bool {
        if !self.priority.is_empty() || !self.phases.is_empty() {
            return false;
        }
        if self.continuations.is_empty() && self.timers.is_empty() {
            return false;
        }
        match self.timers.next_due() {
            Some(due) => due > Instant::now(),
            None => true,
        }
    }

    /// Block until a worker completion, a wake-up, or the next timer.
    fn wait_for_work(&mut self) {
        let timeout = self
            .timers
            .next_due()
            .map(|due| due.saturating_duration_since(Instant::now()));
        trace!(?timeout, outstanding = self.continuations.len(), "waiting for work");

        let message = match timeout {
            Some(timeout) => match self.receiver.recv_timeout(timeout) {
                Ok(message) => Some(message),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
            },
            None => self.receiver.recv().ok(),
        };

        if let Some(message) = message {
            self.accept(message);
        }
    }

    /// Move every completion already sent by the workers into the poll queue.
    fn collect_completions(&mut self) {
        while let Ok(message) = self.receiver.try_recv() {
            self.accept(message);
        }
    }

    fn accept(
        &mut self,
        message: LoopMessage,
    ) {
        match message {
            LoopMessage::Completion(completion) => self.deliver(completion),
            LoopMessage::Wake => {}
        }
    }

    /// Turn a completion into a poll-phase task.
    fn deliver(
        &mut self,
        completion: Completion,
    ) {
        let Some(continuation) = self.continuations.remove(&completion.handle) else {
            trace!(handle = %completion.handle, "dropping completion of a discarded job");
            return;
        };

        let failed = completion.outcome.is_err();
        self.stats.record_job_completed(failed);
        trace!(
            handle = %completion.handle,
            failed,
            waited = ?completion.finished_at.elapsed(),
            "completion delivered"
        );

        let outcome = completion.outcome;
        let id = self.ids.next();
        self.phases.push(Task::new(id, TaskKind::PollIO, move |event_loop| {
            continuation(event_loop, outcome)
        }));
    }

    fn run_task(
        &mut self,
        task: Task,
    ) -> Result<(), LoopError> {
        let (mut meta, payload) = task.into_parts();
        meta.started_at = Some(Instant::now());
        trace!(id = %meta.id, kind = %meta.kind, "running task");

        let result = match payload {
            Payload::Once(callback) => guard(|| callback(self)),
            Payload::Repeating {
                period,
                mut callback,
            } => {
                let result = guard(|| callback(self));
                self.rearm_interval(&meta, period, callback);
                result
            }
        };

        meta.completed_at = Some(Instant::now());
        self.stats.record_task(&meta);
        self.observer.on_task_complete(&meta);

        match result {
            Ok(()) => Ok(()),
            Err(error) => self.handle_callback_error(meta, error),
        }
    }

    fn rearm_interval(
        &mut self,
        meta: &TaskMeta,
        period: Duration,
        callback: task::RepeatingCallback,
    ) {
        let now = Instant::now();
        let next_due = match meta.due_time.unwrap_or(now).checked_add(period) {
            Some(next) if next > now => next,
            Some(_) => now,
            None => {
                warn!(id = %meta.id, ?period, "interval period out of range, cancelling");
                let _ = self.timers.cancel(TimerId::from(meta.id));
                return;
            }
        };

        let next = TaskMeta {
            due_time: Some(next_due),
            started_at: None,
            completed_at: None,
            ..meta.clone()
        };
        if !self
            .timers
            .rearm(Task::from_parts(next, Payload::Repeating { period, callback }))
        {
            trace!(id = %meta.id, "interval not re-armed");
        }
    }

    fn handle_callback_error(
        &mut self,
        meta: TaskMeta,
        error: CallbackError,
    ) -> Result<(), LoopError> {
        self.stats.record_unhandled();
        warn!(id = %meta.id, kind = %meta.kind, error = %error, "callback failed");

        let action = match self.error_hook.as_mut() {
            Some(hook) => hook(&error, &meta),
            None => ErrorAction::Stop,
        };

        match action {
            ErrorAction::Continue => {
                debug!(id = %meta.id, "error hook resumed the loop");
                Ok(())
            }
            ErrorAction::Stop => {
                self.force_stop();
                Err(LoopError::Unhandled { task: meta, error })
            }
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
