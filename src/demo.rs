//! Built-in demonstration workload
//!
//! Schedules a mix of immediates, microtasks, timers, worker payloads, check
//! and close callbacks, and records the order in which the loop runs them.
//! Used by the `phaseloop demo` command.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::runtime::scheduler::{EventLoop, Phase, StatsSnapshot};
use crate::util::config::LoopConfig;

/// One executed callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    /// Tick in which it ran.
    pub tick: u64,
    /// Phase the driver was in or about to enter.
    pub phase: Option<String>,
    /// What ran.
    pub label: String,
}

/// Outcome of a demo run.
#[derive(Debug, Clone, Serialize)]
pub struct DemoReport {
    /// Execution order.
    pub trace: Vec<TraceEntry>,
    /// Loop statistics after the run.
    pub stats: StatsSnapshot,
}

/// Shared recorder used by the demo callbacks.
#[derive(Debug, Clone, Default)]
struct Recorder(Rc<RefCell<Vec<TraceEntry>>>);

impl Recorder {
    fn record(
        &self,
        event_loop: &EventLoop,
        label: impl Into<String>,
    ) {
        self.0.borrow_mut().push(TraceEntry {
            tick: event_loop.tick_count(),
            phase: event_loop.current_phase().map(|phase: Phase| phase.to_string()),
            label: label.into(),
        });
    }

    fn take(&self) -> Vec<TraceEntry> {
        self.0.take()
    }
}

/// Checksum standing in for blocking hashing work.
fn checksum(data: &[u8]) -> u64 {
    data.iter()
        .fold(0xcbf2_9ce4_8422_2325u64, |hash, byte| {
            (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
        })
}

/// Run the demo workload with `jobs` worker payloads.
pub fn run_demo(
    config: LoopConfig,
    jobs: usize,
) -> anyhow::Result<DemoReport> {
    let mut event_loop = EventLoop::with_config(config)?;
    let recorder = Recorder::default();

    let r = recorder.clone();
    event_loop.run_on_close(move |event_loop| {
        r.record(event_loop, "close: release resources");
        Ok(())
    })?;

    let r = recorder.clone();
    event_loop.run_on_check(move |event_loop| {
        r.record(event_loop, "check: after first poll");
        Ok(())
    })?;

    let r = recorder.clone();
    event_loop.schedule_timer(Duration::from_millis(5), move |event_loop| {
        r.record(event_loop, "timer: 5ms");
        let r = r.clone();
        event_loop.run_microtask(move |event_loop| {
            r.record(event_loop, "microtask: queued by 5ms timer");
            Ok(())
        })?;
        Ok(())
    })?;

    let r = recorder.clone();
    event_loop.schedule_timer(Duration::ZERO, move |event_loop| {
        r.record(event_loop, "timer: 0ms");
        Ok(())
    })?;

    for job in 0..jobs {
        let r = recorder.clone();
        event_loop.submit_to_worker_pool(
            move || {
                thread::sleep(Duration::from_millis(2));
                Ok(checksum(format!("payload-{}", job).as_bytes()))
            },
            move |event_loop, result| {
                let sum = result?;
                r.record(event_loop, format!("poll: job {} checksum {:016x}", job, sum));
                Ok(())
            },
        )?;
    }

    let r = recorder.clone();
    event_loop.run_microtask(move |event_loop| {
        r.record(event_loop, "microtask");
        Ok(())
    })?;

    let r = recorder.clone();
    event_loop.run_immediate(move |event_loop| {
        r.record(event_loop, "immediate");
        Ok(())
    })?;

    event_loop.run()?;

    let stats = event_loop.stats().snapshot();
    info!(ticks = stats.ticks, callbacks = recorder.0.borrow().len(), "demo finished");

    Ok(DemoReport {
        trace: recorder.take(),
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_runs_everything() {
        let config = LoopConfig {
            worker_pool_size: 2,
            ..LoopConfig::default()
        };
        let report = run_demo(config, 3).unwrap();

        let labels: Vec<&str> = report.trace.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels[0], "immediate");
        assert_eq!(labels[1], "microtask");
        assert_eq!(labels[2], "timer: 0ms");
        assert_eq!(labels.iter().filter(|l| l.starts_with("poll: job")).count(), 3);
        assert!(labels.contains(&"close: release resources"));
        assert_eq!(report.stats.jobs_completed, 3);
    }

    #[test]
    fn test_checksum_is_stable() {
        assert_eq!(checksum(b""), 0xcbf2_9ce4_8422_2325);
        assert_ne!(checksum(b"a"), checksum(b"b"));
    }
}
