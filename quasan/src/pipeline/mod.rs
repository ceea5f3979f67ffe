//! Pipeline orchestration.
//!
//! ```text
//! Init -> ReadsCollected -> StrategyChosen -> { StageRunning(i) -> } StageDone(i) ... -> Completed
//!                                   any failure -> Aborted
//! ```

mod orchestrator;

pub use orchestrator::Orchestrator;
