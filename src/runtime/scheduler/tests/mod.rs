//! Scheduler unit tests
//!
//! Task identity and metadata here; queues, timers, the worker pool and the
//! driver have their own files.

use std::time::{Duration, Instant};

use crate::runtime::scheduler::task::guard;
use crate::runtime::scheduler::{
    CallbackError, DriverState, LoopStats, Phase, RunMode, Task, TaskId, TaskIdGenerator,
    TaskKind,
};


#[cfg(test)]
mod task_id_tests {
    use super::*;

    #[test]
    fn test_task_id_inner() {
        let id = TaskId(42);
        assert_eq!(id.inner(), 42);
        assert_eq!(TaskId::from(42), id);
    }

    #[test]
    fn test_task_id_display() {
        assert_eq!(TaskId(7).to_string(), "Task(7)");
    }

    #[test]
    fn test_generator_is_monotonic() {
        let mut ids = TaskIdGenerator::new();
        let first = ids.next();
        let second = ids.next();
        assert_eq!(first, TaskId(1));
        assert!(second > first);
    }
}

#[cfg(test)]
mod task_kind_tests {
    use super::*;

    #[test]
    fn test_priority_kinds() {
        assert!(TaskKind::Immediate.is_priority());
        assert!(TaskKind::Microtask.is_priority());
        assert!(!TaskKind::Timer.is_priority());
        assert!(!TaskKind::PollIO.is_priority());
        assert!(!TaskKind::Check.is_priority());
        assert!(!TaskKind::Close.is_priority());
    }

    #[test]
    fn test_labels() {
        assert_eq!(TaskKind::PollIO.to_string(), "poll");
        assert_eq!(TaskKind::Immediate.label(), "immediate");
    }

    #[test]
    fn test_phase_kinds() {
        let kinds: Vec<TaskKind> = Phase::all().iter().map(Phase::task_kind).collect();
        assert_eq!(
            kinds,
            [TaskKind::Timer, TaskKind::PollIO, TaskKind::Check, TaskKind::Close]
        );
    }
}

#[cfg(test)]
mod task_tests {
    use super::*;

    #[test]
    fn test_new_task_meta() {
        let task = Task::new(TaskId(3), TaskKind::Check, |_| Ok(()));
        assert_eq!(task.id(), TaskId(3));
        assert_eq!(task.kind(), TaskKind::Check);
        assert_eq!(task.due_time(), None);
        assert!(!task.is_repeating());
        assert_eq!(task.meta().run_duration(), None);
    }

    #[test]
    fn test_timer_task_carries_due_time() {
        let due = Instant::now() + Duration::from_millis(10);
        let task = Task::timer(TaskId(1), due, |_| Ok(()));
        assert_eq!(task.kind(), TaskKind::Timer);
        assert_eq!(task.due_time(), Some(due));
    }

    #[test]
    fn test_repeating_task() {
        let task = Task::repeating(TaskId(1), Instant::now(), Duration::from_millis(5), |_| Ok(()));
        assert!(task.is_repeating());
        assert!(format!("{:?}", task).contains("repeating: true"));
    }

    #[test]
    fn test_run_duration() {
        let task = Task::new(TaskId(1), TaskKind::PollIO, |_| Ok(()));
        let mut meta = task.meta().clone();
        let start = Instant::now();
        meta.started_at = Some(start);
        meta.completed_at = Some(start + Duration::from_millis(3));
        assert_eq!(meta.run_duration(), Some(Duration::from_millis(3)));
    }
}

#[cfg(test)]
mod guard_tests {
    use super::*;

    #[test]
    fn test_guard_ok() {
        assert!(guard(|| Ok(())).is_ok());
    }

    #[test]
    fn test_guard_error() {
        let err = guard(|| Err(anyhow::anyhow!("boom"))).unwrap_err();
        assert!(matches!(err, CallbackError::Failed(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_guard_panic_str() {
        let err = guard(|| panic!("static message")).unwrap_err();
        match err {
            CallbackError::Panicked(msg) => assert_eq!(msg, "static message"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_guard_panic_string() {
        let n = 5;
        let err = guard(|| panic!("formatted {}", n)).unwrap_err();
        match err {
            CallbackError::Panicked(msg) => assert_eq!(msg, "formatted 5"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}

#[cfg(test)]
mod phase_tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        assert_eq!(Phase::Timers.next(), Some(Phase::Poll));
        assert_eq!(Phase::Poll.next(), Some(Phase::Check));
        assert_eq!(Phase::Check.next(), Some(Phase::Close));
        assert_eq!(Phase::Close.next(), None);
        assert_eq!(Phase::all().len(), 4);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Timers.to_string(), "timers");
        assert_eq!(Phase::Close.to_string(), "close");
    }

    #[test]
    fn test_driver_state_phase() {
        assert_eq!(DriverState::tick_start().phase(), Some(Phase::Timers));
        assert_eq!(DriverState::Running(Phase::Check).phase(), Some(Phase::Check));
        assert_eq!(DriverState::WaitForWork.phase(), Some(Phase::Poll));
        assert_eq!(DriverState::TickComplete.phase(), None);
    }

    #[test]
    fn test_run_mode_blocking() {
        assert_eq!(RunMode::default(), RunMode::Default);
        assert!(RunMode::Default.may_block());
        assert!(RunMode::Once.may_block());
        assert!(!RunMode::NoWait.may_block());
    }
}

#[cfg(test)]
mod stats_tests {
    use super::*;

    #[test]
    fn test_record_task_accumulates_callback_time() {
        let stats = LoopStats::default();
        let task = Task::new(TaskId(1), TaskKind::Check, |_| Ok(()));
        let mut meta = task.meta().clone();
        let start = Instant::now();
        meta.started_at = Some(start);
        meta.completed_at = Some(start + Duration::from_micros(1500));

        stats.record_task(&meta);
        stats.record_task(&meta);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.check_callbacks_run, 2);
        assert_eq!(snapshot.callback_time_us, 3000);
    }
}
