//! Pipeline configuration.
//!
//! A single [`PipelineConfig`] is built once at startup (from the command line
//! or a JSON file) and handed to every component constructor. Components only
//! read named fields; nothing in the core parses argv.

use crate::errors::{ConfigError, QuasanError};
use crate::strategy::Strategy;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Date format used for run dates and tags.
pub const RUN_DATE_FORMAT: &str = "%Y%m%d";

/// Genome annotation tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Annotator {
    /// Prokka, the default.
    #[default]
    Prokka,
    /// NCBI prokaryotic genome annotation pipeline (submission-style).
    Pgap,
}

impl Annotator {
    /// Directory name under `annotation/` and tool name in artifact names.
    #[must_use]
    pub fn tool_name(self) -> &'static str {
        match self {
            Self::Prokka => "prokka",
            Self::Pgap => "pgap",
        }
    }
}

impl fmt::Display for Annotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tool_name())
    }
}

/// Gram stain, passed to the annotator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gram {
    /// Gram positive.
    Pos,
    /// Gram negative.
    Neg,
}

impl fmt::Display for Gram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pos => write!(f, "pos"),
            Self::Neg => write!(f, "neg"),
        }
    }
}

/// Which stages were requested for this run.
///
/// Stages left out are not planned at all; this is how a run resumes from a
/// later stage without re-running (or even checking) the earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSelection {
    /// Raw read quality check.
    #[serde(default = "default_true")]
    pub qc: bool,
    /// Assembly, polishing and assembly QC.
    #[serde(default = "default_true")]
    pub assembly: bool,
    /// Genome annotation.
    #[serde(default = "default_true")]
    pub annotation: bool,
    /// Cluster discovery.
    #[serde(default = "default_true")]
    pub discovery: bool,
    /// Final report aggregation.
    #[serde(default = "default_true")]
    pub aggregation: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StageSelection {
    fn default() -> Self {
        Self::all()
    }
}

impl StageSelection {
    /// Every stage.
    #[must_use]
    pub fn all() -> Self {
        Self {
            qc: true,
            assembly: true,
            annotation: true,
            discovery: true,
            aggregation: true,
        }
    }

    /// No stage.
    #[must_use]
    pub fn none() -> Self {
        Self {
            qc: false,
            assembly: false,
            annotation: false,
            discovery: false,
            aggregation: false,
        }
    }

    /// Returns true if nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.qc || self.assembly || self.annotation || self.discovery || self.aggregation)
    }
}

/// Configuration for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// The sample directory (`STRAINXX/` containing `rawdata/`).
    pub sample_dir: PathBuf,
    /// Thread hint passed to external tools.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Memory budget in GB for tools that accept one.
    #[serde(default)]
    pub memory_gb: Option<u32>,
    /// Genome size estimate (e.g. `8m`).
    #[serde(default)]
    pub genome_size: Option<String>,
    /// BUSCO lineage dataset.
    #[serde(default = "default_busco_lineage")]
    pub busco_lineage: String,
    /// Annotation tool.
    #[serde(default)]
    pub annotator: Annotator,
    /// Gram stain for the annotator.
    #[serde(default)]
    pub gram: Option<Gram>,
    /// Locus tag prefix.
    #[serde(default)]
    pub locus_tag: Option<String>,
    /// Organism name (`Genus species`), required by PGAP.
    #[serde(default)]
    pub organism: Option<String>,
    /// BioProject accession for submission-style annotation.
    #[serde(default)]
    pub bioproject: Option<String>,
    /// BioSample accession for submission-style annotation.
    #[serde(default)]
    pub biosample: Option<String>,
    /// antiSMASH database directory.
    #[serde(default)]
    pub antismash_databases: Option<PathBuf>,
    /// PGAP reference data directory.
    #[serde(default)]
    pub pgap_data: Option<PathBuf>,
    /// Requested stages.
    #[serde(default)]
    pub stages: StageSelection,
    /// Re-run stages even if their canonical artifacts exist.
    #[serde(default)]
    pub force: bool,
    /// Strategy override.
    #[serde(default)]
    pub force_strategy: Option<Strategy>,
    /// Run date (`YYYYMMDD`) used in the tag; defaults to an existing tag or today.
    #[serde(default)]
    pub run_date: Option<String>,
    /// Program overrides, keyed by tool name (e.g. `"shovill" -> "/opt/conda/bin/shovill"`).
    #[serde(default)]
    pub tools: BTreeMap<String, PathBuf>,
    /// Placeholder token replaced by the tag in annotation reports.
    #[serde(default = "default_placeholder_token")]
    pub placeholder_token: String,
}

fn default_threads() -> usize {
    16
}

fn default_busco_lineage() -> String {
    "streptomycetales_odb10".to_string()
}

fn default_placeholder_token() -> String {
    "strain".to_string()
}

impl PipelineConfig {
    /// Creates a configuration with defaults for the given sample directory.
    #[must_use]
    pub fn new(sample_dir: impl Into<PathBuf>) -> Self {
        Self {
            sample_dir: sample_dir.into(),
            threads: default_threads(),
            memory_gb: None,
            genome_size: None,
            busco_lineage: default_busco_lineage(),
            annotator: Annotator::default(),
            gram: None,
            locus_tag: None,
            organism: None,
            bioproject: None,
            biosample: None,
            antismash_databases: None,
            pgap_data: None,
            stages: StageSelection::default(),
            force: false,
            force_strategy: None,
            run_date: None,
            tools: BTreeMap::new(),
            placeholder_token: default_placeholder_token(),
        }
    }

    /// Loads a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, QuasanError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            ConfigError::new(path.display().to_string(), format!("invalid JSON: {e}")).into()
        })
    }

    /// Sets the thread hint.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Sets the requested stages.
    #[must_use]
    pub fn with_stages(mut self, stages: StageSelection) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the force flag.
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Sets the annotator.
    #[must_use]
    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    /// Forces a strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.force_strategy = Some(strategy);
        self
    }

    /// Sets the run date (`YYYYMMDD`).
    #[must_use]
    pub fn with_run_date(mut self, date: impl Into<String>) -> Self {
        self.run_date = Some(date.into());
        self
    }

    /// Overrides the program used for a tool.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        self.tools.insert(tool.into(), program.into());
        self
    }

    /// Resolves the program to run for a tool name.
    #[must_use]
    pub fn program(&self, tool: &str) -> String {
        self.tools
            .get(tool)
            .map_or_else(|| tool.to_string(), |p| p.display().to_string())
    }

    /// Parses the configured run date, if any.
    pub fn parsed_run_date(&self) -> Result<Option<NaiveDate>, ConfigError> {
        self.run_date
            .as_deref()
            .map(|raw| {
                NaiveDate::parse_from_str(raw, RUN_DATE_FORMAT).map_err(|e| {
                    ConfigError::new("run_date", format!("'{raw}' is not YYYYMMDD: {e}"))
                })
            })
            .transpose()
    }

    /// Validates field values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::new("threads", "must be at least 1"));
        }
        if self.stages.is_empty() {
            return Err(ConfigError::new("stages", "no stage selected"));
        }
        if self.placeholder_token.is_empty() {
            return Err(ConfigError::new("placeholder_token", "must not be empty"));
        }
        self.parsed_run_date()?;
        if let Some(ref tag) = self.locus_tag {
            if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(ConfigError::new(
                    "locus_tag",
                    format!("'{tag}' may only contain letters, digits and '_'"),
                ));
            }
        }
        if self.annotator == Annotator::Pgap && self.organism.is_none() {
            return Err(ConfigError::new("organism", "required when annotating with PGAP"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::new("/data/STRAIN01");
        assert_eq!(config.threads, 16);
        assert_eq!(config.busco_lineage, "streptomycetales_odb10");
        assert_eq!(config.placeholder_token, "strain");
        assert_eq!(config.annotator, Annotator::Prokka);
        assert_eq!(config.stages, StageSelection::all());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial_json() {
        let json = r#"{
            "sample_dir": "/data/STRAIN01",
            "threads": 4,
            "annotator": "pgap",
            "organism": "Streptomyces coelicolor",
            "stages": {"qc": false},
            "force_strategy": "hybrid",
            "tools": {"shovill": "/opt/bin/shovill"}
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.threads, 4);
        assert_eq!(config.annotator, Annotator::Pgap);
        assert!(!config.stages.qc);
        assert!(config.stages.annotation);
        assert_eq!(config.force_strategy, Some(Strategy::Hybrid));
        assert_eq!(config.program("shovill"), "/opt/bin/shovill");
        assert_eq!(config.program("flye"), "flye");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = PipelineConfig::new("/s");

        assert_eq!(base.clone().with_threads(0).validate().unwrap_err().field, "threads");
        assert_eq!(
            base.clone().with_run_date("2021-04-26").validate().unwrap_err().field,
            "run_date"
        );
        assert_eq!(
            base.clone().with_annotator(Annotator::Pgap).validate().unwrap_err().field,
            "organism"
        );
        assert_eq!(
            base.clone().with_stages(StageSelection::none()).validate().unwrap_err().field,
            "stages"
        );

        let mut bad_tag = base;
        bad_tag.locus_tag = Some("ST-01".to_string());
        assert_eq!(bad_tag.validate().unwrap_err().field, "locus_tag");
    }

    #[test]
    fn test_parsed_run_date() {
        let config = PipelineConfig::new("/s").with_run_date("20210426");
        assert_eq!(
            config.parsed_run_date().unwrap(),
            NaiveDate::from_ymd_opt(2021, 4, 26)
        );
        assert_eq!(PipelineConfig::new("/s").parsed_run_date().unwrap(), None);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quasan.json");
        std::fs::write(&path, r#"{"sample_dir": "/s", "force": true}"#).unwrap();
        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert!(config.force);

        std::fs::write(&path, "{not json").unwrap();
        let err = PipelineConfig::from_json_file(&path).unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }
}
