//! Core types: stage status, run state and run records.

mod result;
mod status;

pub use result::{RunReport, RunResult, StageRecord};
pub use status::{RunState, StageStatus};
