//! Cycle execution and scheduling.
//!
//! - `Pipeline`: runs one fetch, dedup, filter and notify cycle
//! - `Scheduler`: serializes cycles from the timer and manual triggers

pub mod orchestrator;
pub mod scheduler;

pub use orchestrator::Pipeline;
pub use scheduler::{Scheduler, SchedulerHandle, SchedulerState, TriggerOutcome};
