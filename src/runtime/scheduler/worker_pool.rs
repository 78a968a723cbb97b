//! Worker pool for blocking payloads.
//!
//! A fixed number of worker threads pull jobs from one shared FIFO wait queue.
//! Results never call back into application code from a worker; they travel
//! over the completion channel and the driver turns them into poll-phase tasks.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam::channel::Sender;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use super::error::{SchedulingError, WorkerError};
use super::stats::LoopStats;
use super::task::panic_message;

/// Type-erased worker output.
pub(crate) type WorkOutput = Result<Box<dyn Any + Send>, WorkerError>;

/// Type-erased worker payload.
pub(crate) type Work = Box<dyn FnOnce() -> WorkOutput + Send>;

/// Handle identifying one submitted payload and its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompletionHandle(pub u64);

impl std::fmt::Display for CompletionHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Job({})", self.0)
    }
}

/// Result of a finished payload, sent from a worker to the driver.
pub(crate) struct Completion {
    pub handle: CompletionHandle,
    pub outcome: WorkOutput,
    pub finished_at: Instant,
}

/// Messages the driver receives on its channel.
pub(crate) enum LoopMessage {
    /// A payload finished.
    Completion(Completion),
    /// Wake a blocked driver, e.g. for a stop request.
    Wake,
}

/// Worker slot state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Waiting for a job.
    Idle,
    /// Running a job.
    Busy,
}

impl SlotState {
    /// Convert from u8 (for atomic storage).
    #[inline]
    fn from_u8(val: u8) -> Self {
        match val {
            1 => SlotState::Busy,
            _ => SlotState::Idle,
        }
    }

    /// Convert to u8 (for atomic storage).
    #[inline]
    fn as_u8(&self) -> u8 {
        match self {
            SlotState::Idle => 0,
            SlotState::Busy => 1,
        }
    }
}

/// One execution unit of the pool. Only its state is visible to the driver.
#[derive(Debug, Default)]
pub struct WorkerSlot {
    state: AtomicU8,
    /// Handle value of the running job plus one, zero while idle.
    current: AtomicU64,
}

impl WorkerSlot {
    /// Current state.
    #[inline]
    pub fn state(&self) -> SlotState {
        SlotState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Job running in this slot, valid only while busy.
    pub fn current_job(&self) -> Option<CompletionHandle> {
        match self.current.load(Ordering::SeqCst) {
            0 => None,
            n => Some(CompletionHandle(n - 1)),
        }
    }

    fn begin(
        &self,
        handle: CompletionHandle,
    ) {
        self.current.store(handle.0 + 1, Ordering::SeqCst);
        self.state.store(SlotState::Busy.as_u8(), Ordering::SeqCst);
    }

    fn finish(&self) {
        self.state.store(SlotState::Idle.as_u8(), Ordering::SeqCst);
        self.current.store(0, Ordering::SeqCst);
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub size: usize,
    /// Worker thread name prefix.
    pub name_prefix: String,
    /// Stack size of worker threads.
    pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 4,
            name_prefix: "phaseloop-worker".to_string(),
            stack_size: None,
        }
    }
}

struct Job {
    handle: CompletionHandle,
    work: Work,
}

/// State shared between the pool handle and its threads.
struct Shared {
    queue: Mutex<VecDeque<Job>>,
    available: Condvar,
    shutdown: AtomicBool,
    slots: Vec<WorkerSlot>,
    busy: AtomicUsize,
    stats: Arc<LoopStats>,
}

/// Fixed-size pool of worker threads. Threads start on the first submission.
pub struct WorkerPool {
    config: PoolConfig,
    shared: Arc<Shared>,
    workers: Vec<thread::JoinHandle<()>>,
    sender: Sender<LoopMessage>,
    next_handle: u64,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.config.size)
            .field("started", &self.is_started())
            .field("busy", &self.busy_count())
            .field("queued", &self.queued_len())
            .finish()
    }
}

impl WorkerPool {
    /// Create a pool that delivers completions on `sender`.
    pub(crate) fn new(
        config: PoolConfig,
        sender: Sender<LoopMessage>,
        stats: Arc<LoopStats>,
    ) -> Self {
        let slots = (0..config.size).map(|_| WorkerSlot::default()).collect();
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            slots,
            busy: AtomicUsize::new(0),
            stats,
        });

        Self {
            config,
            shared,
            workers: Vec::new(),
            sender,
            next_handle: 1,
        }
    }

    /// Spawn the worker threads if they are not running yet.
    fn ensure_started(&mut self) -> Result<(), SchedulingError> {
        if self.is_started() {
            return Ok(());
        }

        for worker_id in 0..self.config.size {
            let shared = self.shared.clone();
            let sender = self.sender.clone();
            let mut builder =
                thread::Builder::new().name(format!("{}-{}", self.config.name_prefix, worker_id));
            if let Some(stack_size) = self.config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            match builder.spawn(move || worker_loop(worker_id, &shared, &sender)) {
                Ok(worker) => self.workers.push(worker),
                Err(err) => {
                    warn!(worker_id, error = %err, "worker spawn failed, rolling back start");
                    self.abort_start();
                    return Err(err.into());
                }
            }
        }

        debug!(workers = self.config.size, "worker pool started");
        Ok(())
    }

    /// Join the threads of a partial start so the next submission retries.
    fn abort_start(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.available.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        self.shared.shutdown.store(false, Ordering::SeqCst);
    }

    /// Queue a payload, starting the threads on first use.
    pub(crate) fn submit(
        &mut self,
        work: Work,
    ) -> Result<CompletionHandle, SchedulingError> {
        self.ensure_started()?;

        let handle = CompletionHandle(self.next_handle);
        self.next_handle += 1;

        self.shared.queue.lock().push_back(Job { handle, work });
        self.shared.available.notify_one();
        self.shared.stats.record_job_submitted();
        trace!(%handle, "job queued");
        Ok(handle)
    }

    /// Remove a payload that is still waiting in the queue.
    ///
    /// Returns `false` if it already started (or finished).
    pub(crate) fn cancel(
        &self,
        handle: CompletionHandle,
    ) -> bool {
        let mut queue = self.shared.queue.lock();
        match queue.iter().position(|job| job.handle == handle) {
            Some(index) => {
                queue.remove(index);
                true
            }
            None => false,
        }
    }

    /// Drop every waiting payload, returning their handles in queue order.
    pub(crate) fn cancel_queued(&self) -> Vec<CompletionHandle> {
        let mut queue = self.shared.queue.lock();
        queue.drain(..).map(|job| job.handle).collect()
    }

    /// Configured number of workers.
    #[inline]
    pub fn size(&self) -> usize {
        self.config.size
    }

    /// Pool configuration.
    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Whether the threads have been spawned.
    #[inline]
    pub fn is_started(&self) -> bool {
        !self.workers.is_empty()
    }

    /// Number of slots currently running a payload.
    #[inline]
    pub fn busy_count(&self) -> usize {
        self.shared.busy.load(Ordering::SeqCst)
    }

    /// Number of payloads waiting for a free slot.
    #[inline]
    pub fn queued_len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Snapshot of every slot's state.
    pub fn slot_states(&self) -> Vec<SlotState> {
        self.shared.slots.iter().map(WorkerSlot::state).collect()
    }

    /// Jobs currently running, one per busy slot.
    pub fn running_jobs(&self) -> Vec<CompletionHandle> {
        self.shared
            .slots
            .iter()
            .filter_map(WorkerSlot::current_job)
            .collect()
    }

    /// Stop the threads after their current payload, dropping queued ones.
    pub fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        let dropped = self.cancel_queued().len();
        self.shared.available.notify_all();

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("worker thread panicked outside a payload");
            }
        }

        if dropped > 0 {
            debug!(dropped, "worker pool shut down with queued jobs");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.is_started() {
            self.shutdown();
        }
    }
}

/// Worker thread main loop.
fn worker_loop(
    worker_id: usize,
    shared: &Shared,
    sender: &Sender<LoopMessage>,
) {
    let slot = &shared.slots[worker_id];

    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if shared.shutdown.load(Ordering::SeqCst) {
                    break None;
                }
                if let Some(job) = queue.pop_front() {
                    // Marked busy under the lock so busy + queued never
                    // undercounts outstanding work.
                    slot.begin(job.handle);
                    let busy = shared.busy.fetch_add(1, Ordering::SeqCst) + 1;
                    shared.stats.update_peak_busy(busy);
                    break Some(job);
                }
                shared.available.wait(&mut queue);
            }
        };

        let Some(job) = job else {
            break;
        };

        trace!(worker_id, handle = %job.handle, "job started");

        let outcome = match panic::catch_unwind(AssertUnwindSafe(job.work)) {
            Ok(outcome) => outcome,
            Err(panic) => Err(WorkerError::Panicked(panic_message(panic.as_ref()))),
        };

        if let Err(err) = &outcome {
            warn!(worker_id, handle = %job.handle, error = %err, "job failed");
        }

        shared.busy.fetch_sub(1, Ordering::SeqCst);
        slot.finish();

        let completion = Completion {
            handle: job.handle,
            outcome,
            finished_at: Instant::now(),
        };
        if sender.send(LoopMessage::Completion(completion)).is_err() {
            debug!(worker_id, "event loop gone, dropping completion");
        }
    }

    trace!(worker_id, "worker exiting");
}
