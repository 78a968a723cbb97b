//! Timer heap
//!
//! Min-heap of timer tasks keyed by `(due_time, sequence)`. The sequence
//! number makes equal due times pop in insertion order. Cancelling only flips
//! the entry's flag; cancelled entries are discarded when they reach the root.

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::rc::Rc;
use std::time::Instant;

use super::error::SchedulingError;
use super::task::{Task, TaskId, TaskKind};

/// Handle of a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl From<TaskId> for TimerId {
    fn from(id: TaskId) -> Self {
        Self(id.inner())
    }
}

impl std::fmt::Display for TimerId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Timer({})", self.0)
    }
}

/// A timer task waiting in the heap.
#[derive(Debug)]
pub struct TimerEntry {
    due: Instant,
    seq: u64,
    task: Task,
    cancelled: Rc<Cell<bool>>,
}

impl TimerEntry {
    /// Absolute due time.
    #[inline]
    pub fn due_time(&self) -> Instant {
        self.due
    }

    /// Whether the timer was cancelled after insertion.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

impl Ord for TimerEntry {
    /// Reversed so `BinaryHeap` pops the earliest `(due, seq)` first.
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TimerEntry {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

/// Bookkeeping for a timer that has not fired (or is an interval).
#[derive(Debug)]
struct LiveTimer {
    cancelled: Rc<Cell<bool>>,
    repeating: bool,
}

/// Min-heap of pending timers.
#[derive(Debug, Default)]
pub struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    live: HashMap<TimerId, LiveTimer>,
    next_seq: u64,
}

impl TimerHeap {
    /// Create an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a timer task. Its ID doubles as the timer ID.
    pub fn schedule(
        &mut self,
        task: Task,
    ) -> TimerId {
        debug_assert_eq!(task.kind(), TaskKind::Timer);
        let id = TimerId::from(task.id());
        let cancelled = Rc::new(Cell::new(false));
        self.live.insert(
            id,
            LiveTimer {
                cancelled: cancelled.clone(),
                repeating: task.is_repeating(),
            },
        );
        self.push_entry(task, cancelled);
        id
    }

    fn push_entry(
        &mut self,
        task: Task,
        cancelled: Rc<Cell<bool>>,
    ) {
        let due = task.due_time().unwrap_or_else(Instant::now);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TimerEntry {
            due,
            seq,
            task,
            cancelled,
        });
    }

    /// Cancel a pending timer.
    ///
    /// Fails with [`SchedulingError::TimerNotPending`] when the timer already
    /// fired or was cancelled before. An interval can cancel itself from its
    /// own callback; it is then not re-armed.
    pub fn cancel(
        &mut self,
        id: TimerId,
    ) -> Result<(), SchedulingError> {
        match self.live.remove(&id) {
            Some(timer) => {
                timer.cancelled.set(true);
                Ok(())
            }
            None => Err(SchedulingError::TimerNotPending(id)),
        }
    }

    /// Whether `id` is still pending.
    #[inline]
    pub fn contains(
        &self,
        id: TimerId,
    ) -> bool {
        self.live.contains_key(&id)
    }

    /// Number of pending (not fired, not cancelled) timers.
    #[inline]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether no timer is pending.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Sequence watermark: entries inserted from now on compare `>=` it.
    ///
    /// The driver takes a watermark at the start of every tick so timers
    /// scheduled by any callback of that tick wait for the next one.
    #[inline]
    pub fn watermark(&self) -> u64 {
        self.next_seq
    }

    /// Due time of the earliest live timer.
    pub fn next_due(&mut self) -> Option<Instant> {
        self.discard_cancelled_root();
        self.heap.peek().map(|entry| entry.due)
    }

    fn discard_cancelled_root(&mut self) {
        while self.heap.peek().is_some_and(TimerEntry::is_cancelled) {
            self.heap.pop();
        }
    }

    /// Pop the earliest timer due at `now` that was inserted before
    /// `watermark`.
    ///
    /// One-shot timers stop being pending once popped. Intervals stay pending
    /// until the caller hands them back to [`TimerHeap::rearm`] or cancels them.
    pub fn pop_due_before(
        &mut self,
        now: Instant,
        watermark: u64,
    ) -> Option<Task> {
        self.discard_cancelled_root();
        let root = self.heap.peek()?;
        if root.due > now || root.seq >= watermark {
            return None;
        }
        let entry = self.heap.pop()?;
        let id = TimerId::from(entry.task.id());
        if !entry.task.is_repeating() {
            self.live.remove(&id);
        }
        Some(entry.task)
    }

    /// Lazily pop every timer due at `now`, in due order.
    ///
    /// Timers inserted while the iterator is alive are not yielded.
    pub fn pop_due(
        &mut self,
        now: Instant,
    ) -> PopDue<'_> {
        let watermark = self.watermark();
        PopDue {
            heap: self,
            now,
            watermark,
        }
    }

    /// Put an interval timer back after it ran.
    ///
    /// Returns `false` (and drops the task) if it was cancelled meanwhile.
    pub fn rearm(
        &mut self,
        task: Task,
    ) -> bool {
        let id = TimerId::from(task.id());
        let cancelled = match self.live.get(&id) {
            Some(timer) if !timer.cancelled.get() => timer.cancelled.clone(),
            _ => return false,
        };
        self.push_entry(task, cancelled);
        true
    }

    /// Cancel every interval timer, returning how many were cancelled.
    pub fn cancel_repeating(&mut self) -> usize {
        let before = self.live.len();
        self.live.retain(|_, timer| {
            if timer.repeating {
                timer.cancelled.set(true);
            }
            !timer.repeating
        });
        before - self.live.len()
    }

    /// Drop every timer, returning how many were pending.
    pub fn clear(&mut self) -> usize {
        let n = self.live.len();
        self.live.clear();
        self.heap.clear();
        n
    }
}

/// Iterator returned by [`TimerHeap::pop_due`].
#[derive(Debug)]
pub struct PopDue<'a> {
    heap: &'a mut TimerHeap,
    now: Instant,
    watermark: u64,
}

impl Iterator for PopDue<'_> {
    type Item = Task;

    fn next(&mut self) -> Option<Task> {
        self.heap.pop_due_before(self.now, self.watermark)
    }
}
