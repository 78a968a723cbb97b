//! Task queues for the event loop
//!
//! All queues here are owned by the driving thread, so they are plain
//! `VecDeque`s without locking. The only cross-thread path into the loop is the
//! worker completion channel.

use std::collections::VecDeque;

use super::phase::Phase;
use super::task::{Task, TaskKind};

/// FIFO queue holding tasks of a single kind.
#[derive(Debug)]
pub struct TaskQueue {
    /// Kind every task in this queue must have.
    kind: TaskKind,
    /// Inner deque.
    inner: VecDeque<Task>,
    /// Number of tasks ever pushed.
    enqueued_total: u64,
}

impl TaskQueue {
    /// Create a new empty queue for `kind`.
    #[inline]
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            inner: VecDeque::new(),
            enqueued_total: 0,
        }
    }

    /// Kind of the tasks held here.
    #[inline]
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Push a task to the back of the queue.
    #[inline]
    pub fn push(
        &mut self,
        task: Task,
    ) {
        debug_assert_eq!(task.kind(), self.kind, "task pushed into the wrong queue");
        self.enqueued_total += 1;
        self.inner.push_back(task);
    }

    /// Pop a task from the front of the queue.
    #[inline]
    pub fn pop_front(&mut self) -> Option<Task> {
        self.inner.pop_front()
    }

    /// Peek at the front task without removing it.
    #[inline]
    pub fn peek_front(&self) -> Option<&Task> {
        self.inner.front()
    }

    /// Get the number of tasks in the queue.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Total number of tasks pushed over the queue's lifetime.
    #[inline]
    pub fn enqueued_total(&self) -> u64 {
        self.enqueued_total
    }

    /// Drop every queued task, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let n = self.inner.len();
        self.inner.clear();
        n
    }
}

/// The two priority tiers drained between callbacks.
///
/// Immediate tasks always come out before microtasks, and draining re-checks
/// the immediate queue after every microtask, so work queued during a drain
/// still runs before control returns to the phase scheduler.
#[derive(Debug)]
pub struct PriorityQueues {
    immediate: TaskQueue,
    microtask: TaskQueue,
}

impl PriorityQueues {
    /// Create empty priority queues.
    pub fn new() -> Self {
        Self {
            immediate: TaskQueue::new(TaskKind::Immediate),
            microtask: TaskQueue::new(TaskKind::Microtask),
        }
    }

    /// Push a task into the queue matching its kind.
    pub fn push(
        &mut self,
        task: Task,
    ) {
        match task.kind() {
            TaskKind::Immediate => self.immediate.push(task),
            TaskKind::Microtask => self.microtask.push(task),
            other => debug_assert!(false, "{} task pushed into priority queues", other),
        }
    }

    /// Pop the highest priority task available.
    pub fn pop(&mut self) -> Option<Task> {
        if let Some(task) = self.immediate.pop_front() {
            return Some(task);
        }
        self.microtask.pop_front()
    }

    /// Get total number of tasks.
    pub fn len(&self) -> usize {
        self.immediate.len() + self.microtask.len()
    }

    /// Check if both tiers are empty.
    pub fn is_empty(&self) -> bool {
        self.immediate.is_empty() && self.microtask.is_empty()
    }

    /// Immediate tier.
    #[inline]
    pub fn immediate(&self) -> &TaskQueue {
        &self.immediate
    }

    /// Microtask tier.
    #[inline]
    pub fn microtask(&self) -> &TaskQueue {
        &self.microtask
    }

    /// Drop every queued task.
    pub fn clear(&mut self) -> usize {
        self.immediate.clear() + self.microtask.clear()
    }
}

impl Default for PriorityQueues {
    fn default() -> Self {
        Self::new()
    }
}

/// FIFO queues for the poll, check and close phases.
#[derive(Debug)]
pub struct PhaseQueues {
    poll: TaskQueue,
    check: TaskQueue,
    close: TaskQueue,
}

impl PhaseQueues {
    /// Create empty phase queues.
    pub fn new() -> Self {
        Self {
            poll: TaskQueue::new(Phase::Poll.task_kind()),
            check: TaskQueue::new(Phase::Check.task_kind()),
            close: TaskQueue::new(Phase::Close.task_kind()),
        }
    }

    /// Queue owned by `phase`. The timers phase has no queue.
    pub fn get(
        &self,
        phase: Phase,
    ) -> Option<&TaskQueue> {
        match phase {
            Phase::Timers => None,
            Phase::Poll => Some(&self.poll),
            Phase::Check => Some(&self.check),
            Phase::Close => Some(&self.close),
        }
    }

    /// Mutable queue owned by `phase`.
    pub fn get_mut(
        &mut self,
        phase: Phase,
    ) -> Option<&mut TaskQueue> {
        match phase {
            Phase::Timers => None,
            Phase::Poll => Some(&mut self.poll),
            Phase::Check => Some(&mut self.check),
            Phase::Close => Some(&mut self.close),
        }
    }

    /// Push a task into the queue matching its kind.
    pub fn push(
        &mut self,
        task: Task,
    ) {
        match task.kind() {
            TaskKind::PollIO => self.poll.push(task),
            TaskKind::Check => self.check.push(task),
            TaskKind::Close => self.close.push(task),
            other => debug_assert!(false, "{} task pushed into phase queues", other),
        }
    }

    /// Total queued tasks over all phases.
    pub fn len(&self) -> usize {
        self.poll.len() + self.check.len() + self.close.len()
    }

    /// Check if every phase queue is empty.
    pub fn is_empty(&self) -> bool {
        self.poll.is_empty() && self.check.is_empty() && self.close.is_empty()
    }

    /// Drop every queued task.
    pub fn clear(&mut self) -> usize {
        self.poll.clear() + self.check.clear() + self.close.clear()
    }
}

impl Default for PhaseQueues {
    fn default() -> Self {
        Self::new()
    }
}
