//! The run state machine.

use crate::artifacts::{ArtifactDigest, ArtifactManager, Substitution};
use crate::config::PipelineConfig;
use crate::core::{RunReport, RunResult, RunState, StageRecord, StageStatus};
use crate::errors::{ArtifactError, ConfigError, PreconditionError, QuasanError};
use crate::events::{EventSink, NoOpEventSink};
use crate::gate::{ArtifactProbe, FsProbe, GateDecision, StageGate};
use crate::layout::SampleLayout;
use crate::reads::{ReadCollector, ReadInventory, ReadPair, Technology};
use crate::stages::{ResolvedReads, Stage, StagePlan};
use crate::strategy::{self, Strategy, Tag};
use crate::tools::{verify_contract, Invocation, ToolInvoker};
use chrono::{Local, NaiveDate, Utc};
use serde_json::json;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Drives one sample through the stage sequence.
///
/// Execution is strictly sequential: each stage is gated, run, checked and
/// finalized before the next one is looked at. The first error stops the run;
/// canonical artifacts of finished stages stay on disk so the next run
/// resumes through the skip path.
pub struct Orchestrator {
    config: PipelineConfig,
    layout: SampleLayout,
    invoker: Arc<dyn ToolInvoker>,
    probe: Arc<dyn ArtifactProbe>,
    sink: Arc<dyn EventSink>,
    artifacts: ArtifactManager,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("sample", &self.layout.root())
            .field("invoker", &self.invoker)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator for `config.sample_dir`.
    ///
    /// # Errors
    ///
    /// `ConfigError` for invalid configuration, `InputError` if no sample id
    /// can be derived from the sample path.
    pub fn new(config: PipelineConfig, invoker: Arc<dyn ToolInvoker>) -> Result<Self, QuasanError> {
        config.validate()?;
        let layout = SampleLayout::new(&config.sample_dir)?;
        Ok(Self {
            config,
            layout,
            invoker,
            probe: Arc::new(FsProbe),
            sink: Arc::new(NoOpEventSink),
            artifacts: ArtifactManager::new(),
        })
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the artifact probe used by the gate.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn ArtifactProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// The sample layout.
    #[must_use]
    pub fn layout(&self) -> &SampleLayout {
        &self.layout
    }

    /// Runs the pipeline to completion or to the first fatal error.
    pub async fn run(&self) -> RunReport {
        let mut result = RunResult::new(self.layout.sample_id());
        info!(
            run_id = %result.run_id,
            sample = self.layout.sample_id(),
            "Starting pipeline in {}",
            self.layout.root().display()
        );
        self.emit(
            "run.started",
            json!({"run_id": result.run_id, "sample": self.layout.sample_id()}),
        )
        .await;

        let outcome = self.drive(&mut result).await;
        result.finished_at = Some(Utc::now());

        let error = match outcome {
            Ok(()) => {
                info!(
                    ran = result.count(StageStatus::Ran),
                    skipped = result.count(StageStatus::Skipped),
                    "Pipeline completed"
                );
                self.emit("run.completed", json!({"run_id": result.run_id})).await;
                None
            }
            Err(e) => {
                advance(&mut result, RunState::Aborted, 0);
                error!(kind = e.kind(), stage = e.stage().unwrap_or("-"), "Pipeline aborted: {}", e);
                if let Some(tail) = e.stderr_tail() {
                    error!("stderr tail:\n{}", tail);
                }
                self.emit(
                    "run.aborted",
                    json!({"run_id": result.run_id, "kind": e.kind(), "stage": e.stage(), "error": e.to_string()}),
                )
                .await;
                Some(e)
            }
        };
        RunReport { result, error }
    }

    async fn drive(&self, result: &mut RunResult) -> Result<(), QuasanError> {
        let collector = ReadCollector::new(&self.config, self.layout.clone(), Arc::clone(&self.invoker));
        let inventory = collector.collect().await?;
        advance(result, RunState::ReadsCollected, 0);
        self.emit(
            "run.reads_collected",
            json!({"technologies": inventory.technologies().map(|t| t.to_string()).collect::<Vec<_>>()}),
        )
        .await;

        let strategy = strategy::choose(&inventory, self.config.force_strategy, self.layout.root())?;
        let tag = Tag::new(self.run_date(strategy)?, strategy, self.layout.sample_id());
        let plan = StagePlan::build(&self.config, &self.layout, &tag, &inventory)?;
        result.strategy = Some(strategy);
        result.tag = Some(tag.to_string());
        advance(result, RunState::StrategyChosen, plan.len());
        info!(
            strategy = %strategy,
            tag = %tag,
            run_date = %tag.date(),
            stages = ?plan.names(),
            "Strategy chosen"
        );
        self.emit(
            "run.strategy_chosen",
            json!({"strategy": strategy, "tag": tag.to_string(), "stages": plan.names()}),
        )
        .await;

        let mut reads = RunReads {
            collector,
            inventory,
            pair: None,
        };
        let gate = StageGate::new(self.probe.as_ref(), self.config.force);
        let last_pair_consumer = plan.last_pair_consumer();

        for (index, stage) in plan.stages().iter().enumerate() {
            let started = Instant::now();
            match gate.decide(stage, &reads.inventory) {
                GateDecision::Skip => {
                    let record = StageRecord::new(stage.name(), stage.tool(), StageStatus::Skipped);
                    match self.settle_skipped(stage, &tag) {
                        Ok(digests) => {
                            result.stages.push(record.with_digests(digests));
                            self.emit("stage.skipped", json!({"stage": stage.name(), "index": index}))
                                .await;
                        }
                        Err(e) => {
                            let mut record = record.with_error(e.to_string());
                            record.status = StageStatus::Failed;
                            result.stages.push(record);
                            self.emit(
                                "stage.failed",
                                json!({"stage": stage.name(), "kind": e.kind(), "error": e.to_string()}),
                            )
                            .await;
                            return Err(e);
                        }
                    }
                }
                GateDecision::Abort(e) => {
                    warn!(stage = stage.name(), "Precondition unmet: {}", e.missing);
                    result.stages.push(
                        StageRecord::new(stage.name(), stage.tool(), StageStatus::Failed).with_error(e.to_string()),
                    );
                    self.emit("stage.failed", json!({"stage": stage.name(), "error": e.to_string()}))
                        .await;
                    return Err(e.into());
                }
                GateDecision::Run => {
                    advance(result, RunState::StageRunning(index), plan.len());
                    self.emit(
                        "stage.started",
                        json!({"stage": stage.name(), "index": index, "tool": stage.tool()}),
                    )
                    .await;

                    let outcome = self.execute(stage, &tag, &mut reads).await;
                    let record = StageRecord::new(stage.name(), stage.tool(), StageStatus::Ran)
                        .with_duration_ms(elapsed_ms(started));
                    match outcome {
                        Ok(digests) => {
                            result.stages.push(record.with_digests(digests));
                            self.emit(
                                "stage.completed",
                                json!({"stage": stage.name(), "duration_ms": elapsed_ms(started)}),
                            )
                            .await;
                        }
                        Err(e) => {
                            let mut record = record.with_error(e.to_string());
                            record.status = StageStatus::Failed;
                            result.stages.push(record);
                            self.emit(
                                "stage.failed",
                                json!({"stage": stage.name(), "kind": e.kind(), "error": e.to_string()}),
                            )
                            .await;
                            return Err(e);
                        }
                    }
                }
            }
            advance(result, RunState::StageDone(index), plan.len());

            if last_pair_consumer == Some(index) {
                self.artifacts.remove_scratch("reads", &self.layout.reads_scratch_dir())?;
                reads.pair = None;
            }
        }

        self.artifacts.remove_scratch("reads", &self.layout.reads_scratch_dir())?;
        advance(result, RunState::Completed, plan.len());
        if fs::remove_dir(self.layout.scratch_root()).is_ok() {
            debug!("Removed empty scratch root");
        }
        Ok(())
    }

    /// Runs one gated stage: tool, contract check, finalize, report merge.
    async fn execute(
        &self,
        stage: &Stage,
        tag: &Tag,
        reads: &mut RunReads,
    ) -> Result<Vec<ArtifactDigest>, QuasanError> {
        let name = stage.name();
        let scratch = stage.scratch_dir();
        self.artifacts.remove_scratch(name, scratch)?;
        fs::create_dir_all(scratch).map_err(|e| ArtifactError::new(name, scratch, e.to_string()))?;
        for input in stage.inputs() {
            fs::write(&input.path, &input.contents)
                .map_err(|e| ArtifactError::new(name, &input.path, e.to_string()))?;
        }

        let resolved = reads.resolve(stage.command().needs_pair())?;
        let command = stage
            .command()
            .render(&resolved)
            .map_err(|missing| PreconditionError::new(name, missing))?;
        let invocation = Invocation::new(name, command, stage.contract_outputs());

        info!(stage = name, tool = stage.tool(), "Starting {}", name);
        self.invoker.invoke(&invocation).await?;
        verify_contract(&invocation)?;
        self.artifacts.finalize(name, stage.outputs(), scratch)?;
        self.merge_reports(stage, tag, false)?;
        info!(stage = name, "{} finished", name);
        self.digests(stage)
    }

    /// Brings a skipped stage to StageDone: leftover scratch removed, reports
    /// that never made it into `multiqc/reports/` merged.
    fn settle_skipped(&self, stage: &Stage, tag: &Tag) -> Result<Vec<ArtifactDigest>, QuasanError> {
        self.artifacts.remove_scratch(stage.name(), stage.scratch_dir())?;
        self.merge_reports(stage, tag, true)?;
        self.digests(stage)
    }

    /// Copies a stage's reports into `multiqc/reports/`. With `missing_only`,
    /// reports already merged are left alone.
    fn merge_reports(&self, stage: &Stage, tag: &Tag, missing_only: bool) -> Result<(), ArtifactError> {
        let substitution = Substitution::new(&self.config.placeholder_token, tag.to_string());
        for report in stage.reports() {
            let report_dir = self.layout.report_dir().join(&report.subdir);
            if missing_only && report_dir.join(&report.file_name).is_file() {
                continue;
            }
            self.artifacts.merge_report(
                stage.name(),
                &report.source,
                &report_dir,
                &report.file_name,
                report.substitute.then_some(&substitution),
            )?;
        }
        Ok(())
    }

    fn digests(&self, stage: &Stage) -> Result<Vec<ArtifactDigest>, QuasanError> {
        stage
            .outputs()
            .iter()
            .map(|o| self.artifacts.digest(&o.canonical).map_err(QuasanError::from))
            .collect()
    }

    /// An existing tag date wins, then the configured date, then today.
    fn run_date(&self, strategy: Strategy) -> Result<NaiveDate, ConfigError> {
        if let Some(date) = strategy::discover_run_date(&self.layout, strategy) {
            return Ok(date);
        }
        Ok(self
            .config
            .parsed_run_date()?
            .unwrap_or_else(|| Local::now().date_naive()))
    }

    async fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.sink.emit(event_type, Some(data)).await;
    }
}

/// Reads as seen by the stages of one run. The short-read pair is resolved
/// (and concatenated if needed) the first time a running stage asks for it.
struct RunReads {
    collector: ReadCollector,
    inventory: ReadInventory,
    pair: Option<ReadPair>,
}

impl RunReads {
    fn resolve(&mut self, needs_pair: bool) -> Result<ResolvedReads, QuasanError> {
        if needs_pair && self.pair.is_none() {
            if let Some(set) = self.inventory.get(Technology::ShortPaired) {
                self.pair = Some(self.collector.resolve_pair(set)?);
            }
        }
        Ok(ResolvedReads {
            pair: self.pair.clone(),
            long: self
                .inventory
                .get(Technology::LongRead)
                .map(|s| s.paths().map(Path::to_path_buf).collect())
                .unwrap_or_default(),
            all: self.inventory.all_paths().map(Path::to_path_buf).collect(),
        })
    }
}

fn advance(result: &mut RunResult, next: RunState, stages: usize) {
    let current = result.state();
    debug_assert!(
        next == RunState::Aborted || current.can_advance_to(next, stages),
        "illegal transition {current} -> {next}"
    );
    debug!(from = %current, to = %next, "State transition");
    result.transitions.push(next);
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
