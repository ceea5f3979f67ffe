//! Mock tool invoker.

use crate::errors::ToolExecutionError;
use crate::tools::{Invocation, InvocationReport, ToolInvoker};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::time::Duration;

/// A tool invoker that records calls instead of spawning processes.
///
/// On success it writes a small deterministic file at every declared output,
/// so the contract check and the artifact moves behave as with a real tool.
#[derive(Debug, Default)]
pub struct MockInvoker {
    failures: HashMap<String, i32>,
    silent: HashSet<String>,
    contents: HashMap<String, String>,
    calls: Mutex<Vec<Invocation>>,
}

impl MockInvoker {
    /// Creates a mock where every tool succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call of `stage` exit with `exit_code`.
    #[must_use]
    pub fn failing_on(mut self, stage: impl Into<String>, exit_code: i32) -> Self {
        self.failures.insert(stage.into(), exit_code);
        self
    }

    /// Makes `stage` exit 0 without producing its outputs.
    #[must_use]
    pub fn without_outputs(mut self, stage: impl Into<String>) -> Self {
        self.silent.insert(stage.into());
        self
    }

    /// Writes `content` into every output of `stage` instead of the default text.
    #[must_use]
    pub fn with_content(mut self, stage: impl Into<String>, content: impl Into<String>) -> Self {
        self.contents.insert(stage.into(), content.into());
        self
    }

    /// Returns every recorded invocation.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls.lock().clone()
    }

    /// Returns the stage names of the recorded invocations, in call order.
    #[must_use]
    pub fn stages(&self) -> Vec<String> {
        self.calls.lock().iter().map(|i| i.stage.clone()).collect()
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Forgets recorded calls.
    pub fn reset(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl ToolInvoker for MockInvoker {
    async fn invoke(&self, invocation: &Invocation) -> Result<InvocationReport, ToolExecutionError> {
        self.calls.lock().push(invocation.clone());

        if let Some(&code) = self.failures.get(&invocation.stage) {
            return Err(ToolExecutionError::new(
                &invocation.stage,
                &invocation.command.program,
                Some(code),
                format!("{} failed (mock)", invocation.command.program),
            ));
        }
        if !self.silent.contains(&invocation.stage) {
            for output in &invocation.expected_outputs {
                let materialize = || -> std::io::Result<()> {
                    if let Some(parent) = output.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    match self.contents.get(&invocation.stage) {
                        Some(content) => fs::write(output, content),
                        None => fs::write(output, format!("{}:{}\n", invocation.stage, output.display())),
                    }
                };
                materialize().map_err(|e| {
                    ToolExecutionError::new(
                        &invocation.stage,
                        &invocation.command.program,
                        None,
                        e.to_string(),
                    )
                })?;
            }
        }
        Ok(InvocationReport {
            exit_code: 0,
            duration: Duration::ZERO,
        })
    }
}
