//! Unhandled error routing
//!
//! A failing poll callback goes to the registered hook, whose decision either
//! keeps the loop running or terminates it.

use std::cell::RefCell;
use std::rc::Rc;

use phaseloop::{CallbackError, ErrorAction, EventLoop, LoopError, LoopStatus, TaskKind, TaskMeta};

type Seen = Rc<RefCell<Vec<(TaskKind, String)>>>;

fn loop_with_hook(action: ErrorAction) -> (EventLoop, Seen) {
    let seen = Seen::default();
    let mut event_loop = EventLoop::new();
    let s = seen.clone();
    event_loop.on_unhandled_error(move |error: &CallbackError, meta: &TaskMeta| {
        s.borrow_mut().push((meta.kind, error.to_string()));
        action
    });
    (event_loop, seen)
}

#[test]
fn test_hook_continue_keeps_running() {
    let (mut event_loop, seen) = loop_with_hook(ErrorAction::Continue);
    let ran = Rc::new(RefCell::new(Vec::new()));

    event_loop
        .run_on_poll(|_| Err(anyhow::anyhow!("connection reset")))
        .unwrap();
    let r = ran.clone();
    event_loop
        .run_on_check(move |_| {
            r.borrow_mut().push("check");
            Ok(())
        })
        .unwrap();

    event_loop.run().unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, TaskKind::PollIO);
    assert!(seen[0].1.contains("connection reset"));
    assert_eq!(*ran.borrow(), ["check"]);
    assert_eq!(event_loop.status(), LoopStatus::Active);
}

#[test]
fn test_hook_stop_terminates() {
    let (mut event_loop, seen) = loop_with_hook(ErrorAction::Stop);
    let ran = Rc::new(RefCell::new(false));

    event_loop
        .run_on_poll(|_| Err(anyhow::anyhow!("connection reset")))
        .unwrap();
    let r = ran.clone();
    event_loop
        .run_on_check(move |_| {
            *r.borrow_mut() = true;
            Ok(())
        })
        .unwrap();

    let err = event_loop.run().unwrap_err();
    assert!(matches!(err, LoopError::Unhandled { .. }));
    assert_eq!(seen.borrow().len(), 1);
    assert!(!*ran.borrow());
    assert_eq!(event_loop.status(), LoopStatus::Stopped);
}

#[test]
fn test_worker_failure_surfaces_through_poll_callback() {
    let (mut event_loop, seen) = loop_with_hook(ErrorAction::Continue);

    event_loop
        .submit_to_worker_pool(
            || -> anyhow::Result<u64> { anyhow::bail!("file not found") },
            |_, result| {
                // Propagating the worker error makes this poll callback fail.
                let _size = result?;
                Ok(())
            },
        )
        .unwrap();

    event_loop.run().unwrap();
    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, TaskKind::PollIO);
    assert!(seen[0].1.contains("worker payload failed"));
}

#[test]
fn test_panic_in_timer_is_contained() {
    let (mut event_loop, seen) = loop_with_hook(ErrorAction::Continue);

    event_loop
        .schedule_timer(std::time::Duration::ZERO, |_| panic!("timer bug"))
        .unwrap();

    event_loop.run().unwrap();
    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, TaskKind::Timer);
    assert!(seen[0].1.contains("panicked"));
}
