//! Run / skip / abort decisions.
//!
//! This is the only place that decides from file presence whether a stage
//! needs to run. Checks go through [`ArtifactProbe`] so the decision logic can
//! be tested without touching the filesystem.

use crate::errors::PreconditionError;
use crate::reads::ReadInventory;
use crate::stages::{Precondition, Stage};
use std::fs;
use std::path::Path;
use tracing::info;

/// What the orchestrator does with a stage.
#[derive(Debug, Clone)]
pub enum GateDecision {
    /// Every canonical output exists; nothing to do.
    Skip,
    /// Run the tool.
    Run,
    /// A precondition is unmet.
    Abort(PreconditionError),
}

impl GateDecision {
    /// Returns true for [`GateDecision::Skip`].
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip)
    }

    /// Returns true for [`GateDecision::Run`].
    #[must_use]
    pub fn is_run(&self) -> bool {
        matches!(self, Self::Run)
    }
}

/// Answers "does this artifact exist and is it non-empty?".
#[cfg_attr(test, mockall::automock)]
pub trait ArtifactProbe: Send + Sync {
    /// A file with length > 0, or a directory with at least one entry.
    fn is_non_empty(&self, path: &Path) -> bool;
}

/// Probes the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl ArtifactProbe for FsProbe {
    fn is_non_empty(&self, path: &Path) -> bool {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => fs::read_dir(path).is_ok_and(|mut d| d.next().is_some()),
            Ok(meta) => meta.len() > 0,
            Err(_) => false,
        }
    }
}

/// Decides per stage from artifact presence, preconditions and the force flag.
pub struct StageGate<'a> {
    probe: &'a dyn ArtifactProbe,
    force: bool,
}

impl<'a> StageGate<'a> {
    /// Creates a gate.
    #[must_use]
    pub fn new(probe: &'a dyn ArtifactProbe, force: bool) -> Self {
        Self { probe, force }
    }

    /// Decides what to do with `stage`.
    ///
    /// 1. force off and every expected output present: `Skip`
    /// 2. a precondition unmet: `Abort`
    /// 3. otherwise `Run`
    #[must_use]
    pub fn decide(&self, stage: &Stage, inventory: &ReadInventory) -> GateDecision {
        let expected = stage.expected_outputs();
        if !self.force && !expected.is_empty() && expected.iter().all(|p| self.probe.is_non_empty(p)) {
            info!(stage = stage.name(), "Artifact already exists, skipping");
            return GateDecision::Skip;
        }

        for precondition in stage.preconditions() {
            let met = match precondition {
                Precondition::ArtifactPresent(path) => self.probe.is_non_empty(path),
                Precondition::ReadsAvailable(technology) => inventory.has(*technology),
                Precondition::AnyReads => !inventory.is_empty(),
            };
            if !met {
                return GateDecision::Abort(PreconditionError::new(stage.name(), precondition.to_string()));
            }
        }
        GateDecision::Run
    }
}
