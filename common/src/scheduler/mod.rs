// Scheduler module

pub mod engine;

pub use engine::{Scheduler, SchedulerConfig, SchedulerEngine};
