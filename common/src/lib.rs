// Common library shared by the scheduler and worker binaries

pub mod config;
pub mod db;
pub mod errors;
pub mod fetch;
pub mod lock;
pub mod models;
pub mod queue;
pub mod retry;
pub mod schedule;
pub mod scheduler;
pub mod suppression;
pub mod telemetry;
pub mod tiers;
pub mod tracker;
pub mod worker;
