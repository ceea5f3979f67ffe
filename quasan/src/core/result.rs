//! Run records.

use super::status::{RunState, StageStatus};
use crate::artifacts::ArtifactDigest;
use crate::errors::QuasanError;
use crate::strategy::Strategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub stage: String,
    /// Program the stage runs.
    pub tool: String,
    /// Outcome.
    pub status: StageStatus,
    /// Wall-clock time spent in the stage.
    pub duration_ms: u64,
    /// Error message for failed stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Digests of the canonical outputs left on disk.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub digests: Vec<ArtifactDigest>,
}

impl StageRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(stage: impl Into<String>, tool: impl Into<String>, status: StageStatus) -> Self {
        Self {
            stage: stage.into(),
            tool: tool.into(),
            status,
            duration_ms: 0,
            error: None,
            digests: Vec::new(),
        }
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Sets the error message.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Sets the digests.
    #[must_use]
    pub fn with_digests(mut self, digests: Vec<ArtifactDigest>) -> Self {
        self.digests = digests;
        self
    }
}

/// Per-stage outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Sample id.
    pub sample_id: String,
    /// Strategy, once chosen.
    pub strategy: Option<Strategy>,
    /// Tag, once computed.
    pub tag: Option<String>,
    /// Stage records in plan order.
    pub stages: Vec<StageRecord>,
    /// Every state the orchestrator went through, starting at `Init`.
    pub transitions: Vec<RunState>,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunResult {
    /// Creates an empty result for a sample.
    #[must_use]
    pub fn new(sample_id: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            sample_id: sample_id.into(),
            strategy: None,
            tag: None,
            stages: Vec::new(),
            transitions: vec![RunState::Init],
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.transitions.last().copied().unwrap_or(RunState::Init)
    }

    /// Returns true if the run reached `Completed`.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state() == RunState::Completed
    }

    /// The status of a stage, if it was reached.
    #[must_use]
    pub fn status_of(&self, stage: &str) -> Option<StageStatus> {
        self.stages.iter().find(|r| r.stage == stage).map(|r| r.status)
    }

    /// Number of stages with the given status.
    #[must_use]
    pub fn count(&self, status: StageStatus) -> usize {
        self.stages.iter().filter(|r| r.status == status).count()
    }
}

/// A finished run: its record and, if it was aborted, the error.
#[derive(Debug)]
pub struct RunReport {
    /// The run record.
    pub result: RunResult,
    /// The fatal error, if any.
    pub error: Option<QuasanError>,
}

impl RunReport {
    /// Returns true if the run completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Converts into a `Result`, dropping the record of a failed run.
    ///
    /// # Errors
    ///
    /// The run's fatal error.
    pub fn into_result(self) -> Result<RunResult, QuasanError> {
        match self.error {
            None => Ok(self.result),
            Some(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_result_queries() {
        let mut result = RunResult::new("STRAIN01");
        result.stages.push(StageRecord::new("qc", "fastqc", StageStatus::Skipped));
        result.stages.push(StageRecord::new("assembly", "shovill", StageStatus::Ran).with_duration_ms(12));
        result.transitions.push(RunState::Completed);

        assert!(result.is_completed());
        assert_eq!(result.status_of("assembly"), Some(StageStatus::Ran));
        assert_eq!(result.status_of("annotation"), None);
        assert_eq!(result.count(StageStatus::Skipped), 1);
    }

    #[test]
    fn test_stage_record_serialization_skips_empty_fields() {
        let record = StageRecord::new("qc", "fastqc", StageStatus::Ran);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"stage": "qc", "tool": "fastqc", "status": "ran", "duration_ms": 0})
        );
    }

    #[test]
    fn test_into_result() {
        let report = RunReport {
            result: RunResult::new("S"),
            error: Some(crate::errors::InputError::new("/S", "missing").into()),
        };
        assert!(!report.is_success());
        assert_eq!(report.into_result().unwrap_err().kind(), "InputError");
    }
}
