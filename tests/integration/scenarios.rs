//! End-to-end ordering scenarios
//!
//! Everything is scheduled from outside any callback, then the loop runs to
//! completion and the recorded order is checked.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use phaseloop::{EventLoop, Phase};

type Trace = Rc<RefCell<Vec<(&'static str, Option<Phase>)>>>;

fn record(
    trace: &Trace,
    label: &'static str,
) -> impl FnOnce(&mut EventLoop) -> phaseloop::Result<()> + 'static {
    let trace = trace.clone();
    move |event_loop| {
        trace.borrow_mut().push((label, event_loop.current_phase()));
        Ok(())
    }
}

fn labels(trace: &Trace) -> Vec<&'static str> {
    trace.borrow().iter().map(|(label, _)| *label).collect()
}

#[test]
fn test_immediate_microtask_timer_check() {
    let trace = Trace::default();
    let mut event_loop = EventLoop::new();

    event_loop.run_immediate(record(&trace, "A")).unwrap();
    event_loop.run_microtask(record(&trace, "B")).unwrap();
    event_loop.schedule_timer(Duration::ZERO, record(&trace, "C")).unwrap();
    event_loop.run_on_check(record(&trace, "D")).unwrap();

    event_loop.run().unwrap();
    assert_eq!(labels(&trace), ["A", "B", "C", "D"]);
    assert_eq!(trace.borrow()[2].1, Some(Phase::Timers));
    assert_eq!(trace.borrow()[3].1, Some(Phase::Check));
}

#[test]
fn test_microtask_from_timer_runs_before_next_timer() {
    let trace = Trace::default();
    let mut event_loop = EventLoop::new();

    let t = trace.clone();
    event_loop
        .schedule_timer(Duration::ZERO, move |event_loop| {
            t.borrow_mut().push(("timer 1", event_loop.current_phase()));
            event_loop.run_microtask(record(&t, "microtask"))?;
            Ok(())
        })
        .unwrap();
    event_loop.schedule_timer(Duration::ZERO, record(&trace, "timer 2")).unwrap();

    event_loop.run().unwrap();
    assert_eq!(labels(&trace), ["timer 1", "microtask", "timer 2"]);
    // The drain happens inside the timers phase.
    assert_eq!(trace.borrow()[1].1, Some(Phase::Timers));
}

#[test]
fn test_close_callbacks_run_last_in_tick() {
    let trace = Trace::default();
    let mut event_loop = EventLoop::new();

    event_loop.run_on_close(record(&trace, "close")).unwrap();
    event_loop.run_on_check(record(&trace, "check")).unwrap();
    event_loop.run_on_poll(record(&trace, "poll")).unwrap();

    event_loop.run().unwrap();
    assert_eq!(labels(&trace), ["poll", "check", "close"]);
    assert_eq!(event_loop.tick_count(), 1);
}

#[test]
fn test_many_ticks_until_drained() {
    let count = Rc::new(RefCell::new(0u32));
    let mut event_loop = EventLoop::new();

    fn again(
        count: Rc<RefCell<u32>>,
        event_loop: &mut EventLoop,
    ) -> phaseloop::Result<()> {
        *count.borrow_mut() += 1;
        if *count.borrow() < 10 {
            event_loop.run_on_check(move |event_loop| again(count, event_loop))?;
        }
        Ok(())
    }

    let c = count.clone();
    event_loop
        .run_on_check(move |event_loop| again(c, event_loop))
        .unwrap();

    event_loop.run().unwrap();
    assert_eq!(*count.borrow(), 10);
    assert_eq!(event_loop.tick_count(), 10);
    assert!(!event_loop.is_alive());
}
