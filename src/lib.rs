//! phaseloop
//!
//! A single-threaded, phase-ordered event loop with a bounded worker pool and
//! strict task-priority tiers.
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! use phaseloop::EventLoop;
//!
//! let order = Rc::new(RefCell::new(Vec::new()));
//! let mut event_loop = EventLoop::new();
//!
//! let o = order.clone();
//! event_loop.run_on_check(move |_| { o.borrow_mut().push("check"); Ok(()) }).unwrap();
//! let o = order.clone();
//! event_loop.schedule_timer(Duration::ZERO, move |_| { o.borrow_mut().push("timer"); Ok(()) }).unwrap();
//! let o = order.clone();
//! event_loop.run_microtask(move |_| { o.borrow_mut().push("microtask"); Ok(()) }).unwrap();
//! let o = order.clone();
//! event_loop.run_immediate(move |_| { o.borrow_mut().push("immediate"); Ok(()) }).unwrap();
//!
//! event_loop.run().unwrap();
//! assert_eq!(*order.borrow(), ["immediate", "microtask", "timer", "check"]);
//! ```

#![warn(rust_2018_idioms)]

// Public modules
pub mod demo;
pub mod runtime;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use runtime::scheduler::{
    CallbackError, CompletionHandle, ErrorAction, EventLoop, LoopError, LoopObserver, LoopStatus,
    Phase, RunMode, SchedulingError, StopHandle, TaskKind, TaskMeta, TimerId, WorkerError,
};
pub use util::config::LoopConfig;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "phaseloop";
