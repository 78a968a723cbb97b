//! Worker pool end to end
//!
//! Five gated payloads on a pool of two: exactly two run at first, every
//! payload runs exactly once, and all five completions reach the poll phase.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel;
use phaseloop::runtime::scheduler::SlotState;
use phaseloop::{EventLoop, LoopConfig, Phase};

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_five_payloads_on_two_workers() {
    let config = LoopConfig {
        worker_pool_size: 2,
        ..LoopConfig::default()
    };
    let mut event_loop = EventLoop::with_config(config).unwrap();

    let (open, gate) = channel::unbounded::<()>();
    let runs: Arc<Vec<AtomicUsize>> = Arc::new((0..5).map(|_| AtomicUsize::new(0)).collect());
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let delivered = Rc::new(RefCell::new(Vec::new()));

    for index in 0..5usize {
        let gate = gate.clone();
        let runs = runs.clone();
        let in_flight = in_flight.clone();
        let max_in_flight = max_in_flight.clone();
        let delivered = delivered.clone();

        event_loop
            .submit_to_worker_pool(
                move || {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(now, Ordering::SeqCst);
                    runs[index].fetch_add(1, Ordering::SeqCst);
                    let _ = gate.recv();
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(index)
                },
                move |event_loop, result| {
                    assert_eq!(event_loop.current_phase(), Some(Phase::Poll));
                    delivered.borrow_mut().push(result?);
                    Ok(())
                },
            )
            .unwrap();
    }

    let pool = event_loop.worker_pool();
    wait_until(|| pool.busy_count() == 2);
    assert_eq!(pool.slot_states(), [SlotState::Busy, SlotState::Busy]);
    assert_eq!(pool.queued_len(), 3);
    let running = pool.running_jobs();
    assert_eq!(running.len(), 2);
    assert_ne!(running[0], running[1]);

    drop(open);
    event_loop.run().unwrap();

    let mut delivered = delivered.borrow().clone();
    delivered.sort_unstable();
    assert_eq!(delivered, [0, 1, 2, 3, 4]);
    assert!(runs.iter().all(|count| count.load(Ordering::SeqCst) == 1));
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 2);

    let stats = event_loop.stats().snapshot();
    assert_eq!(stats.jobs_submitted, 5);
    assert_eq!(stats.jobs_completed, 5);
    assert_eq!(stats.peak_busy_workers, 2);
    assert_eq!(event_loop.worker_pool().busy_count(), 0);
}

#[test]
fn test_chained_submissions_preserve_order() {
    let order = Rc::new(RefCell::new(Vec::new()));
    let mut event_loop = EventLoop::new();

    fn submit_step(
        event_loop: &mut EventLoop,
        step: u32,
        order: Rc<RefCell<Vec<u32>>>,
    ) -> phaseloop::Result<()> {
        event_loop.submit_to_worker_pool(
            move || Ok(step),
            move |event_loop, result| {
                let step = result?;
                order.borrow_mut().push(step);
                if step < 4 {
                    submit_step(event_loop, step + 1, order)?;
                }
                Ok(())
            },
        )?;
        Ok(())
    }

    submit_step(&mut event_loop, 0, order.clone()).unwrap();
    event_loop.run().unwrap();
    assert_eq!(*order.borrow(), [0, 1, 2, 3, 4]);
}

#[test]
fn test_slow_payload_does_not_block_driver() {
    let mut event_loop = EventLoop::new();
    let check_ran_at = Rc::new(RefCell::new(None));
    let started = Instant::now();

    event_loop
        .submit_to_worker_pool(
            || {
                thread::sleep(Duration::from_millis(100));
                Ok(())
            },
            |_, result| {
                result?;
                Ok(())
            },
        )
        .unwrap();
    let c = check_ran_at.clone();
    event_loop
        .run_on_check(move |_| {
            *c.borrow_mut() = Some(started.elapsed());
            Ok(())
        })
        .unwrap();

    event_loop.run().unwrap();
    let check_ran_at = check_ran_at.borrow().expect("check callback ran");
    assert!(check_ran_at < Duration::from_millis(100));
}
