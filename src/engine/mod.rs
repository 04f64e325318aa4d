//! Sequential multi-transaction execution
//!
//! Drives an ordered list of steps through build → sign → simulate →
//! submit → confirm, one step at a time, and stops at the first failure.

mod executor;
mod step;

pub use executor::ExecutionEngine;
pub use step::{BuildFn, ProgressObserver, StepDescriptor};
