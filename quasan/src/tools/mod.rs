//! External tool invocation.
//!
//! A [`ToolInvoker`] runs one external program per call and reports success
//! only on exit status 0. It never removes partial outputs; whatever the tool
//! left in its scratch directory stays there until the stage is re-run.

mod process;

pub use process::{stderr_tail, ProcessInvoker, STDERR_TAIL_LINES};

use crate::errors::{ToolContractViolation, ToolExecutionError};
use crate::stages::CommandLine;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// One tool call of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Stage name, for errors and logs.
    pub stage: String,
    /// What to run.
    pub command: CommandLine,
    /// Files the tool promises to produce on exit 0.
    pub expected_outputs: Vec<PathBuf>,
}

impl Invocation {
    /// Creates an invocation.
    #[must_use]
    pub fn new(stage: impl Into<String>, command: CommandLine, expected_outputs: Vec<PathBuf>) -> Self {
        Self {
            stage: stage.into(),
            command,
            expected_outputs,
        }
    }
}

/// Outcome of a successful tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationReport {
    /// Exit status (always 0 for a returned report).
    pub exit_code: i32,
    /// Wall-clock time.
    pub duration: Duration,
}

/// Runs external tools.
#[async_trait]
pub trait ToolInvoker: Send + Sync + Debug {
    /// Runs the invocation to completion.
    ///
    /// # Errors
    ///
    /// `ToolExecutionError` on spawn failure or any non-zero exit.
    async fn invoke(&self, invocation: &Invocation) -> Result<InvocationReport, ToolExecutionError>;
}

/// Checks that every declared output exists after a successful call.
///
/// # Errors
///
/// `ToolContractViolation` listing the outputs that are missing.
pub fn verify_contract(invocation: &Invocation) -> Result<(), ToolContractViolation> {
    let missing: Vec<PathBuf> = invocation
        .expected_outputs
        .iter()
        .filter(|p| fs::symlink_metadata(p).is_err())
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ToolContractViolation {
            stage: invocation.stage.clone(),
            program: invocation.command.program.clone(),
            missing,
        })
    }
}
