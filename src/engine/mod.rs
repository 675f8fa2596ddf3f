//! Core engine: sweeps built from step chains on the task scheduler.

pub mod chain;
pub mod orchestrator;
pub mod report;
pub mod safety;

pub use orchestrator::{ItemState, Orchestrator, Progress, SweepContext};
pub use report::{OperationStats, SweepReport};
