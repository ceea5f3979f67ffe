//! Stage definitions.
//!
//! A [`Stage`] is one external tool call plus the normalization of its
//! outputs: where the tool writes (its scratch directory), which files it must
//! leave there, where those files end up, and which reports are merged into the
//! canonical report directory afterwards. The [`StagePlan`] orders the stages
//! of a run for the chosen strategy.

mod command;
mod plan;

pub use command::{Arg, CommandLine, CommandTemplate, ResolvedReads};
pub use plan::StagePlan;

use crate::artifacts::ArtifactMove;
use crate::reads::Technology;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The kind of work a stage performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Raw read quality check (FastQC).
    Qc,
    /// De novo assembly (Shovill or Flye).
    Assembly,
    /// Short-read polishing of a long-read assembly (pypolca).
    Polishing,
    /// Assembly completeness (BUSCO).
    Busco,
    /// Assembly statistics (QUAST).
    Quast,
    /// Genome annotation (Prokka or PGAP).
    Annotation,
    /// Biosynthetic gene cluster discovery (antiSMASH).
    Discovery,
    /// Report aggregation (MultiQC).
    Aggregation,
}

impl StageKind {
    /// Stage name used in logs, events and scratch paths.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Qc => "qc",
            Self::Assembly => "assembly",
            Self::Polishing => "polishing",
            Self::Busco => "busco",
            Self::Quast => "quast",
            Self::Annotation => "annotation",
            Self::Discovery => "discovery",
            Self::Aggregation => "aggregation",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Something that must hold before a stage may run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    /// A file (or non-empty directory) produced by an earlier stage.
    ArtifactPresent(PathBuf),
    /// Reads of a technology were collected.
    ReadsAvailable(Technology),
    /// At least one read file was collected.
    AnyReads,
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArtifactPresent(path) => write!(f, "artifact '{}'", path.display()),
            Self::ReadsAvailable(technology) => write!(f, "{technology} reads"),
            Self::AnyReads => write!(f, "read files"),
        }
    }
}

/// A report copied into the canonical report directory once the stage is done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSpec {
    /// Canonical artifact the report is read from.
    pub source: PathBuf,
    /// Subdirectory of the report directory.
    pub subdir: String,
    /// File name inside the subdirectory.
    pub file_name: String,
    /// Whether the placeholder token is replaced by the tag.
    pub substitute: bool,
}

/// A file written into the scratch directory before the tool starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedInput {
    /// Where to write it.
    pub path: PathBuf,
    /// Its contents.
    pub contents: String,
}

/// One step of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    kind: StageKind,
    scratch_dir: PathBuf,
    command: CommandTemplate,
    preconditions: Vec<Precondition>,
    outputs: Vec<ArtifactMove>,
    reports: Vec<ReportSpec>,
    inputs: Vec<GeneratedInput>,
}

impl Stage {
    /// Creates a stage writing under `scratch_dir`.
    #[must_use]
    pub fn new(kind: StageKind, scratch_dir: impl Into<PathBuf>, command: CommandTemplate) -> Self {
        Self {
            kind,
            scratch_dir: scratch_dir.into(),
            command,
            preconditions: Vec::new(),
            outputs: Vec::new(),
            reports: Vec::new(),
            inputs: Vec::new(),
        }
    }

    /// Adds a precondition.
    #[must_use]
    pub fn requires(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    /// Declares an output.
    #[must_use]
    pub fn output(mut self, artifact: ArtifactMove) -> Self {
        self.outputs.push(artifact);
        self
    }

    /// Declares a report to merge.
    #[must_use]
    pub fn report(mut self, report: ReportSpec) -> Self {
        self.reports.push(report);
        self
    }

    /// Declares a generated input file.
    #[must_use]
    pub fn input(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.inputs.push(GeneratedInput {
            path: path.into(),
            contents: contents.into(),
        });
        self
    }

    /// The stage kind.
    #[must_use]
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// The stage name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// The program the stage runs.
    #[must_use]
    pub fn tool(&self) -> &str {
        self.command.program()
    }

    /// The scratch directory.
    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// The command template.
    #[must_use]
    pub fn command(&self) -> &CommandTemplate {
        &self.command
    }

    /// Preconditions, in check order.
    #[must_use]
    pub fn preconditions(&self) -> &[Precondition] {
        &self.preconditions
    }

    /// Declared outputs, in finalize order.
    #[must_use]
    pub fn outputs(&self) -> &[ArtifactMove] {
        &self.outputs
    }

    /// Reports to merge.
    #[must_use]
    pub fn reports(&self) -> &[ReportSpec] {
        &self.reports
    }

    /// Generated inputs.
    #[must_use]
    pub fn inputs(&self) -> &[GeneratedInput] {
        &self.inputs
    }

    /// Canonical paths whose presence means the stage is done.
    #[must_use]
    pub fn expected_outputs(&self) -> Vec<PathBuf> {
        self.outputs.iter().map(ArtifactMove::canonical_check).collect()
    }

    /// Scratch paths the tool must produce.
    #[must_use]
    pub fn contract_outputs(&self) -> Vec<PathBuf> {
        self.outputs.iter().map(ArtifactMove::scratch_check).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_outputs() {
        let stage = Stage::new(StageKind::Discovery, "/s/tmp/discovery", CommandTemplate::new("antismash"))
            .requires(Precondition::ArtifactPresent(PathBuf::from("/s/annotation/x.gbk")))
            .output(ArtifactMove::new("/s/tmp/discovery/antismash", "/s/antismash").with_marker("index.html"));

        assert_eq!(stage.name(), "discovery");
        assert_eq!(stage.tool(), "antismash");
        assert_eq!(stage.expected_outputs(), vec![PathBuf::from("/s/antismash/index.html")]);
        assert_eq!(
            stage.contract_outputs(),
            vec![PathBuf::from("/s/tmp/discovery/antismash/index.html")]
        );
    }

    #[test]
    fn test_precondition_display() {
        assert_eq!(
            Precondition::ReadsAvailable(Technology::LongRead).to_string(),
            "long-read reads"
        );
        assert_eq!(
            Precondition::ArtifactPresent(PathBuf::from("a.fa")).to_string(),
            "artifact 'a.fa'"
        );
    }
}
