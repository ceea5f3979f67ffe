//! Subprocess-backed invoker.

use super::{Invocation, InvocationReport, ToolInvoker};
use crate::errors::ToolExecutionError;
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info};

/// Number of stderr lines kept in a [`ToolExecutionError`].
pub const STDERR_TAIL_LINES: usize = 20;

/// Runs tools as child processes and waits for them.
///
/// There is no timeout: a hung tool hangs the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInvoker;

impl ProcessInvoker {
    /// Creates an invoker.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolInvoker for ProcessInvoker {
    async fn invoke(&self, invocation: &Invocation) -> Result<InvocationReport, ToolExecutionError> {
        let command = &invocation.command;
        info!(stage = %invocation.stage, "Running: {}", command);

        let mut child = Command::new(&command.program);
        child
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let started = Instant::now();
        let output = child.output().await.map_err(|e| {
            ToolExecutionError::new(&invocation.stage, &command.program, None, e.to_string())
        })?;
        let duration = started.elapsed();

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!(stage = %invocation.stage, "{}", line);
        }

        match output.status.code() {
            Some(0) => {
                info!(
                    stage = %invocation.stage,
                    duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                    "{} finished",
                    command.program
                );
                Ok(InvocationReport { exit_code: 0, duration })
            }
            code => Err(ToolExecutionError::new(
                &invocation.stage,
                &command.program,
                code,
                stderr_tail(&output.stderr, STDERR_TAIL_LINES),
            )
            .with_signal(terminating_signal(output.status))),
        }
    }
}

#[cfg(unix)]
fn terminating_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn terminating_signal(_status: ExitStatus) -> Option<i32> {
    None
}

/// Returns the last `lines` lines of a process' stderr.
#[must_use]
pub fn stderr_tail(stderr: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
