//! Runtime system
//!
//! This module contains the event loop scheduler and its worker pool.

pub mod scheduler;
