//! Error types for the quasan pipeline.
//!
//! Every error in this taxonomy is fatal for the run: the orchestrator stops
//! the remaining stage sequence and keeps the artifacts of completed stages so
//! the next invocation resumes through the idempotent skip path.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for quasan operations.
#[derive(Debug, Error)]
pub enum QuasanError {
    /// The sample directory is missing or malformed.
    #[error("{0}")]
    Input(#[from] InputError),

    /// No sequencing technology could be used.
    #[error("{0}")]
    NoUsableReads(#[from] NoUsableReadsError),

    /// A stage was requested before its dependency produced output.
    #[error("{0}")]
    Precondition(#[from] PreconditionError),

    /// An external tool exited with a non-zero status or failed to spawn.
    #[error("{0}")]
    ToolExecution(#[from] ToolExecutionError),

    /// An external tool exited 0 without producing its declared outputs.
    #[error("{0}")]
    ToolContract(#[from] ToolContractViolation),

    /// Moving or cleaning up artifacts failed after the tool succeeded.
    #[error("{0}")]
    Artifact(#[from] ArtifactError),

    /// Read concatenation failed.
    #[error("{0}")]
    Aggregation(#[from] AggregationError),

    /// The configuration object is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QuasanError {
    /// Returns the taxonomy name of the error.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Input(_) => "InputError",
            Self::NoUsableReads(_) => "NoUsableReadsError",
            Self::Precondition(_) => "PreconditionError",
            Self::ToolExecution(_) => "ToolExecutionError",
            Self::ToolContract(_) => "ToolContractViolation",
            Self::Artifact(_) => "ArtifactError",
            Self::Aggregation(_) => "AggregationError",
            Self::Config(_) => "ConfigError",
            Self::Io(_) => "IoError",
        }
    }

    /// Returns the name of the stage the error is attached to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Precondition(e) => Some(&e.stage),
            Self::ToolExecution(e) => Some(&e.stage),
            Self::ToolContract(e) => Some(&e.stage),
            Self::Artifact(e) => Some(&e.stage),
            _ => None,
        }
    }

    /// Returns the stderr tail of a failed tool, if any.
    #[must_use]
    pub fn stderr_tail(&self) -> Option<&str> {
        match self {
            Self::ToolExecution(e) if !e.stderr_tail.is_empty() => Some(&e.stderr_tail),
            _ => None,
        }
    }
}

/// Error raised when the input directory is missing or invalid.
#[derive(Debug, Clone, Error)]
#[error("Input error at '{}': {message}", .path.display())]
pub struct InputError {
    /// The offending path.
    pub path: PathBuf,
    /// What is wrong with it.
    pub message: String,
}

impl InputError {
    /// Creates a new input error.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Error raised when no recognized technology has usable reads.
#[derive(Debug, Clone, Error)]
#[error("No usable reads under '{}': {message}", .root.display())]
pub struct NoUsableReadsError {
    /// The sample directory that was scanned.
    pub root: PathBuf,
    /// Details.
    pub message: String,
}

impl NoUsableReadsError {
    /// Creates a new error.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            message: message.into(),
        }
    }
}

/// Error raised when a stage's declared precondition is unmet.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' cannot run: missing {missing}")]
pub struct PreconditionError {
    /// The stage that was requested.
    pub stage: String,
    /// Human-readable description of the missing dependency.
    pub missing: String,
}

impl PreconditionError {
    /// Creates a new precondition error.
    #[must_use]
    pub fn new(stage: impl Into<String>, missing: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            missing: missing.into(),
        }
    }
}

/// Error raised when an external tool fails.
#[derive(Debug, Clone, Error)]
#[error(
    "Stage '{stage}' failed: {program} {}",
    describe_status(.exit_code.to_owned(), .signal.to_owned())
)]
pub struct ToolExecutionError {
    /// The stage the tool belongs to.
    pub stage: String,
    /// The program that was run.
    pub program: String,
    /// Exit status; `None` when the process could not be spawned or was killed by a signal.
    pub exit_code: Option<i32>,
    /// Signal that terminated the process, on Unix.
    pub signal: Option<i32>,
    /// Last lines of the tool's stderr (or the spawn error).
    pub stderr_tail: String,
}

impl ToolExecutionError {
    /// Creates a new tool execution error.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        program: impl Into<String>,
        exit_code: Option<i32>,
        stderr_tail: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            program: program.into(),
            exit_code,
            signal: None,
            stderr_tail: stderr_tail.into(),
        }
    }

    /// Records the signal that killed the process.
    #[must_use]
    pub fn with_signal(mut self, signal: Option<i32>) -> Self {
        self.signal = signal;
        self
    }
}

fn describe_status(exit_code: Option<i32>, signal: Option<i32>) -> String {
    match (exit_code, signal) {
        (Some(code), _) => format!("exited with status {code}"),
        (None, Some(signal)) => format!("was killed by signal {signal}"),
        (None, None) => "could not be started".to_string(),
    }
}

/// Error raised when a tool exits 0 but its declared outputs are missing.
#[derive(Debug, Clone, Error)]
#[error(
    "Stage '{stage}': {program} reported success but did not produce {}",
    .missing.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
)]
pub struct ToolContractViolation {
    /// The stage.
    pub stage: String,
    /// The program that was run.
    pub program: String,
    /// Declared outputs that do not exist.
    pub missing: Vec<PathBuf>,
}

/// Error raised when finalizing or cleaning up stage artifacts fails.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}': artifact error at '{}': {message}", .path.display())]
pub struct ArtifactError {
    /// The stage.
    pub stage: String,
    /// The path involved.
    pub path: PathBuf,
    /// The underlying failure.
    pub message: String,
}

impl ArtifactError {
    /// Creates a new artifact error.
    #[must_use]
    pub fn new(stage: impl Into<String>, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Error raised when read concatenation fails.
#[derive(Debug, Clone, Error)]
#[error("Read concatenation into '{}' failed: {message}", .target.display())]
pub struct AggregationError {
    /// The concatenation target.
    pub target: PathBuf,
    /// The underlying failure.
    pub message: String,
}

impl AggregationError {
    /// Creates a new aggregation error.
    #[must_use]
    pub fn new(target: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            message: message.into(),
        }
    }
}

/// Error raised by configuration loading or validation.
#[derive(Debug, Clone, Error)]
#[error("Invalid configuration field '{field}': {message}")]
pub struct ConfigError {
    /// The offending field.
    pub field: String,
    /// Details.
    pub message: String,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Convenience alias used across the crate.
pub type Result<T, E = QuasanError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_execution_error_message() {
        let err = ToolExecutionError::new("assembly", "shovill", Some(2), "out of memory");
        assert_eq!(err.to_string(), "Stage 'assembly' failed: shovill exited with status 2");

        let err = ToolExecutionError::new("assembly", "shovill", None, "No such file");
        assert!(err.to_string().contains("could not be started"));

        let err = ToolExecutionError::new("assembly", "shovill", None, "").with_signal(Some(9));
        assert_eq!(err.to_string(), "Stage 'assembly' failed: shovill was killed by signal 9");
    }

    #[test]
    fn test_quasan_error_kind_and_stage() {
        let err: QuasanError = PreconditionError::new("annotation", "assembly 'x.fa'").into();
        assert_eq!(err.kind(), "PreconditionError");
        assert_eq!(err.stage(), Some("annotation"));

        let err: QuasanError = InputError::new("/nope", "does not exist").into();
        assert_eq!(err.kind(), "InputError");
        assert_eq!(err.stage(), None);
    }

    #[test]
    fn test_stderr_tail_only_for_tools() {
        let err: QuasanError =
            ToolExecutionError::new("qc", "fastqc", Some(1), "java not found").into();
        assert_eq!(err.stderr_tail(), Some("java not found"));

        let err: QuasanError = ArtifactError::new("qc", "/x", "denied").into();
        assert_eq!(err.stderr_tail(), None);
    }

    #[test]
    fn test_contract_violation_lists_missing() {
        let err = ToolContractViolation {
            stage: "assembly".to_string(),
            program: "flye".to_string(),
            missing: vec![PathBuf::from("a/assembly.fasta"), PathBuf::from("a/assembly_graph.gfa")],
        };
        let msg = err.to_string();
        assert!(msg.contains("a/assembly.fasta"));
        assert!(msg.contains("a/assembly_graph.gfa"));
    }
}
