//! # phaseloop benchmarks
//!
//! Criterion.rs benchmarks.
//!
//! ## Groups
//! - `timers`: timer heap insert / cancel / pop churn
//! - `queues`: priority drain throughput through the driver
//! - `workers`: worker pool round trip
//!
//! ## Usage
//! ```bash
//! cargo bench          # run everything
//! cargo bench timers   # timer heap only
//! ```

use std::hint::black_box;
use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, Criterion};
use phaseloop::runtime::scheduler::{Task, TaskId, TimerHeap};
use phaseloop::{EventLoop, LoopConfig};

// ============================================================================
// Timer heap
// ============================================================================

fn bench_timer_heap_churn(c: &mut Criterion) {
    c.bench_function("timer_heap_churn", |b| {
        b.iter(|| {
            let base = Instant::now();
            let mut heap = TimerHeap::new();
            let mut ids = Vec::with_capacity(1000);
            for i in 0..1000u64 {
                let due = base + Duration::from_micros((i * 7919) % 1000);
                ids.push(heap.schedule(Task::timer(TaskId(i), due, |_| Ok(()))));
            }
            for id in ids.iter().step_by(3) {
                let _ = heap.cancel(*id);
            }
            heap.pop_due(base + Duration::from_millis(1)).count()
        })
    });
}

// ============================================================================
// Driver
// ============================================================================

fn bench_microtask_drain(c: &mut Criterion) {
    c.bench_function("microtask_drain_1000", |b| {
        b.iter(|| {
            let mut event_loop = EventLoop::new();
            for i in 0..1000u32 {
                event_loop
                    .run_microtask(move |_| {
                        black_box(i);
                        Ok(())
                    })
                    .unwrap();
            }
            event_loop.run().unwrap();
            event_loop.tick_count()
        })
    });
}

fn bench_phase_ticks(c: &mut Criterion) {
    c.bench_function("check_chain_100_ticks", |b| {
        fn again(
            remaining: u32,
            event_loop: &mut EventLoop,
        ) -> phaseloop::Result<()> {
            if remaining > 0 {
                event_loop.run_on_check(move |event_loop| again(remaining - 1, event_loop))?;
            }
            Ok(())
        }

        b.iter(|| {
            let mut event_loop = EventLoop::new();
            event_loop
                .run_on_check(|event_loop| again(99, event_loop))
                .unwrap();
            event_loop.run().unwrap();
            event_loop.tick_count()
        })
    });
}

// ============================================================================
// Worker pool
// ============================================================================

fn bench_worker_round_trip(c: &mut Criterion) {
    let config = LoopConfig {
        worker_pool_size: 4,
        ..LoopConfig::default()
    };

    c.bench_function("worker_round_trip_64", |b| {
        b.iter(|| {
            let mut event_loop = EventLoop::with_config(config.clone()).unwrap();
            for i in 0..64u64 {
                event_loop
                    .submit_to_worker_pool(
                        move || Ok(black_box(i).wrapping_mul(2654435761)),
                        |_, result| {
                            black_box(result?);
                            Ok(())
                        },
                    )
                    .unwrap();
            }
            event_loop.run().unwrap();
        })
    });
}

criterion_group!(timers, bench_timer_heap_churn);
criterion_group!(queues, bench_microtask_drain, bench_phase_ticks);
criterion_group!(workers, bench_worker_round_trip);
criterion_main!(timers, queues, workers);
