//! Structured command lines.
//!
//! Tools are always run from an argument vector, never a shell string. A
//! [`CommandTemplate`] is fixed when the plan is built; the read paths it
//! refers to are filled in by [`CommandTemplate::render`] right before the
//! stage runs.

use crate::reads::ReadPair;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A concrete program invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    /// Program name or path.
    pub program: String,
    /// Arguments, one element per argv entry.
    pub args: Vec<String>,
    /// Extra environment variables.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<(String, String)>,
}

impl CommandLine {
    /// Creates a command line without arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends a path argument.
    #[must_use]
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// One argv entry of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arg {
    /// A literal string.
    Literal(String),
    /// A fixed path.
    Path(PathBuf),
    /// The resolved strand-1 short-read file.
    ShortR1,
    /// The resolved strand-2 short-read file.
    ShortR2,
    /// Every long-read file, one argument each.
    LongReads,
    /// Every collected read file, one argument each.
    AllReads,
}

/// Read paths available when a template is rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedReads {
    /// The short-read pair, resolved only when a template needs it.
    pub pair: Option<ReadPair>,
    /// Long-read files.
    pub long: Vec<PathBuf>,
    /// Every collected read file.
    pub all: Vec<PathBuf>,
}

/// A command with read placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    program: String,
    args: Vec<Arg>,
    env: Vec<(String, String)>,
}

impl CommandTemplate {
    /// Creates a template for `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Appends a literal argument.
    #[must_use]
    pub fn arg(self, arg: impl Into<String>) -> Self {
        self.push(Arg::Literal(arg.into()))
    }

    /// Appends a flag and its value.
    #[must_use]
    pub fn flag(self, flag: &str, value: impl Into<String>) -> Self {
        self.arg(flag).arg(value)
    }

    /// Appends a path argument.
    #[must_use]
    pub fn path_arg(self, path: impl Into<PathBuf>) -> Self {
        self.push(Arg::Path(path.into()))
    }

    /// Appends any argument.
    #[must_use]
    pub fn push(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The program.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns true if rendering needs the short-read pair.
    #[must_use]
    pub fn needs_pair(&self) -> bool {
        self.args.iter().any(|a| matches!(a, Arg::ShortR1 | Arg::ShortR2))
    }

    /// Fills in read placeholders.
    ///
    /// # Errors
    ///
    /// Names the missing input when a placeholder has nothing to expand to.
    pub fn render(&self, reads: &ResolvedReads) -> Result<CommandLine, &'static str> {
        let mut command = CommandLine::new(&self.program);
        for arg in &self.args {
            command = match arg {
                Arg::Literal(s) => command.arg(s.as_str()),
                Arg::Path(p) => command.path_arg(p),
                Arg::ShortR1 => command.path_arg(&reads.pair.as_ref().ok_or("short-read pair")?.r1),
                Arg::ShortR2 => command.path_arg(&reads.pair.as_ref().ok_or("short-read pair")?.r2),
                Arg::LongReads => expand(command, &reads.long).ok_or("long reads")?,
                Arg::AllReads => expand(command, &reads.all).ok_or("read files")?,
            };
        }
        command.env = self.env.clone();
        Ok(command)
    }
}

fn expand(command: CommandLine, paths: &[PathBuf]) -> Option<CommandLine> {
    if paths.is_empty() {
        return None;
    }
    Some(paths.iter().fold(command, |c, p| c.path_arg(p)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pair() -> ReadPair {
        ReadPair {
            r1: PathBuf::from("/s/rawdata/illumina/S_R1.fastq.gz"),
            r2: PathBuf::from("/s/rawdata/illumina/S_R2.fastq.gz"),
        }
    }

    #[test]
    fn test_render_short_pair() {
        let template = CommandTemplate::new("shovill")
            .flag("--outdir", "/s/tmp/assembly/shovill")
            .arg("--R1")
            .push(Arg::ShortR1)
            .arg("--R2")
            .push(Arg::ShortR2)
            .flag("--cpus", "8");
        assert!(template.needs_pair());

        let reads = ResolvedReads {
            pair: Some(pair()),
            ..ResolvedReads::default()
        };
        let command = template.render(&reads).unwrap();

        assert_eq!(
            command.args,
            vec![
                "--outdir",
                "/s/tmp/assembly/shovill",
                "--R1",
                "/s/rawdata/illumina/S_R1.fastq.gz",
                "--R2",
                "/s/rawdata/illumina/S_R2.fastq.gz",
                "--cpus",
                "8",
            ]
        );
    }

    #[test]
    fn test_render_expands_read_lists() {
        let template = CommandTemplate::new("flye").arg("--nano-raw").push(Arg::LongReads);
        assert!(!template.needs_pair());

        let reads = ResolvedReads {
            long: vec![PathBuf::from("a.fastq.gz"), PathBuf::from("b.fastq.gz")],
            ..ResolvedReads::default()
        };
        let command = template.render(&reads).unwrap();
        assert_eq!(command.args, vec!["--nano-raw", "a.fastq.gz", "b.fastq.gz"]);
    }

    #[test]
    fn test_render_reports_missing_input() {
        let template = CommandTemplate::new("pypolca").push(Arg::ShortR1);
        assert_eq!(template.render(&ResolvedReads::default()), Err("short-read pair"));

        let template = CommandTemplate::new("fastqc").push(Arg::AllReads);
        assert_eq!(template.render(&ResolvedReads::default()), Err("read files"));
    }

    #[test]
    fn test_render_keeps_env() {
        let command = CommandTemplate::new("pgap.py")
            .env("PGAP_INPUT_DIR", "/db/pgap")
            .render(&ResolvedReads::default())
            .unwrap();
        assert_eq!(command.env, vec![("PGAP_INPUT_DIR".to_string(), "/db/pgap".to_string())]);
    }

    #[test]
    fn test_display_quotes_whitespace() {
        let command = CommandLine::new("prokka").args(["--genus", "Streptomyces sp."]);
        assert_eq!(command.to_string(), "prokka --genus 'Streptomyces sp.'");
    }
}
