//! Command-line entry point: runs the pipeline on one sample directory.

use anyhow::{Context, Result};
use clap::Parser;
use quasan::config::{Annotator, PipelineConfig, StageSelection};
use quasan::events::LoggingEventSink;
use quasan::pipeline::Orchestrator;
use quasan::strategy::Strategy;
use quasan::tools::ProcessInvoker;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Quality, assembly, annotation and BGC discovery for one sample", long_about = None)]
struct Args {
    /// Sample directory containing rawdata/
    #[arg(short = 'D', long, required = true)]
    indir: PathBuf,

    /// Run assembly, polishing and assembly QC
    #[arg(short, long)]
    assembly: bool,

    /// Run genome annotation
    #[arg(long, visible_alias = "an")]
    annotation: bool,

    /// Run raw read QC
    #[arg(short, long)]
    qualitycheck: bool,

    /// Run antiSMASH cluster discovery
    #[arg(long, visible_alias = "as")]
    antismash: bool,

    /// Run every stage and the final report (the default when no stage flag is given)
    #[arg(long)]
    all: bool,

    /// Log file
    #[arg(long, default_value = "Quasan.log")]
    logfile: PathBuf,

    /// JSON configuration file; command-line flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Thread hint passed to the tools
    #[arg(short, long)]
    threads: Option<usize>,

    /// Re-run stages whose outputs already exist
    #[arg(long)]
    force: bool,

    /// Force a strategy: illumina, longread or hybrid
    #[arg(long, value_parser = parse_strategy)]
    strategy: Option<Strategy>,

    /// Annotation tool: prokka or pgap
    #[arg(long, value_parser = parse_annotator)]
    annotator: Option<Annotator>,

    /// Write the run record as JSON to this file
    #[arg(long)]
    summary: Option<PathBuf>,
}

impl Args {
    fn stage_selection(&self) -> Option<StageSelection> {
        let any = self.assembly || self.annotation || self.qualitycheck || self.antismash;
        if self.all || !any {
            return None;
        }
        Some(StageSelection {
            qc: self.qualitycheck,
            assembly: self.assembly,
            annotation: self.annotation,
            discovery: self.antismash,
            aggregation: false,
        })
    }

    fn into_config(self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let mut config = PipelineConfig::from_json_file(path)
                    .with_context(|| format!("loading configuration {}", path.display()))?;
                config.sample_dir.clone_from(&self.indir);
                config
            }
            None => PipelineConfig::new(&self.indir),
        };
        if let Some(stages) = self.stage_selection() {
            config = config.with_stages(stages);
        } else if self.all {
            config = config.with_stages(StageSelection::all());
        }
        if let Some(threads) = self.threads {
            config = config.with_threads(threads);
        }
        if let Some(strategy) = self.strategy {
            config = config.with_strategy(strategy);
        }
        if let Some(annotator) = self.annotator {
            config = config.with_annotator(annotator);
        }
        if self.force {
            config = config.with_force(true);
        }
        Ok(config)
    }
}

fn parse_strategy(s: &str) -> Result<Strategy, String> {
    s.parse()
}

fn parse_annotator(s: &str) -> Result<Annotator, String> {
    match s {
        "prokka" => Ok(Annotator::Prokka),
        "pgap" => Ok(Annotator::Pgap),
        other => Err(format!("unknown annotator '{other}' (expected prokka or pgap)")),
    }
}

fn init_logging(logfile: &Path) -> Result<()> {
    let file = File::create(logfile).with_context(|| format!("creating log file {}", logfile.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(&args.logfile)?;

    let summary = args.summary.clone();
    let config = args.into_config()?;
    let orchestrator = Orchestrator::new(config, Arc::new(ProcessInvoker::new()))
        .context("invalid pipeline configuration")?
        .with_event_sink(Arc::new(LoggingEventSink::debug()));

    let report = orchestrator.run().await;

    if let Some(path) = summary {
        let json = serde_json::to_string_pretty(&report.result)?;
        std::fs::write(&path, json).with_context(|| format!("writing summary {}", path.display()))?;
    }

    match report.error {
        None => Ok(ExitCode::SUCCESS),
        Some(e) => {
            eprintln!("quasan: {e}");
            if let Some(stage) = e.stage() {
                eprintln!("failing stage: {stage}");
            }
            if let Some(tail) = e.stderr_tail().filter(|t| !t.is_empty()) {
                eprintln!("tool stderr (last lines):\n{tail}");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
