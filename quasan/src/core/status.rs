//! Stage status and run state enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to a stage in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Canonical outputs already existed.
    Skipped,
    /// The tool ran and its outputs were saved.
    Ran,
    /// The stage was aborted or its tool failed.
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => write!(f, "skipped"),
            Self::Ran => write!(f, "ran"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Orchestrator state. Stage indices refer to the run's stage plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "stage")]
pub enum RunState {
    /// Nothing done yet.
    Init,
    /// The read inventory is built.
    ReadsCollected,
    /// Strategy and tag are fixed.
    StrategyChosen,
    /// Stage `i` is running its tool.
    StageRunning(usize),
    /// Stage `i` is done (ran or skipped).
    StageDone(usize),
    /// A fatal error stopped the run.
    Aborted,
    /// Every planned stage is done.
    Completed,
}

impl RunState {
    /// Returns true for `Aborted` and `Completed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Aborted | Self::Completed)
    }

    /// Returns true if `next` is a legal successor of `self` in a plan of
    /// `stages` stages.
    #[must_use]
    pub fn can_advance_to(self, next: Self, stages: usize) -> bool {
        match (self, next) {
            (s, Self::Aborted) => !s.is_terminal(),
            (Self::Init, Self::ReadsCollected) | (Self::ReadsCollected, Self::StrategyChosen) => true,
            (Self::StrategyChosen, Self::StageRunning(0) | Self::StageDone(0)) => stages > 0,
            (Self::StrategyChosen, Self::Completed) => stages == 0,
            (Self::StageRunning(i), Self::StageDone(j)) => i == j,
            (Self::StageDone(i), Self::StageRunning(j) | Self::StageDone(j)) => j == i + 1 && j < stages,
            (Self::StageDone(i), Self::Completed) => i + 1 == stages,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::ReadsCollected => write!(f, "reads_collected"),
            Self::StrategyChosen => write!(f, "strategy_chosen"),
            Self::StageRunning(i) => write!(f, "stage_running({i})"),
            Self::StageDone(i) => write!(f, "stage_done({i})"),
            Self::Aborted => write!(f, "aborted"),
            Self::Completed => write!(f, "completed"),
        }
    }
}
