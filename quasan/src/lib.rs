//! # Quasan
//!
//! Resumable orchestration of a bacterial genome workflow: read QC, assembly,
//! assembly QC, annotation, biosynthetic gene cluster discovery and report
//! aggregation, one sample directory at a time.
//!
//! A run goes through:
//!
//! - **Read collection**: scan `rawdata/<technology>/`, convert BAM files,
//!   pair Illumina strands
//! - **Strategy selection**: Illumina-only, long-read-only or hybrid, with a
//!   run tag `YYYYMMDD_<strategy>_<sample>`
//! - **Gated stages**: a stage whose canonical outputs exist is skipped, one
//!   whose inputs are missing aborts the run
//! - **Artifact finalization**: tool outputs are written to a scratch area,
//!   checked, and moved to their canonical paths
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quasan::prelude::*;
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::new("/data/STRAIN01").with_threads(8);
//! let orchestrator = Orchestrator::new(config, Arc::new(ProcessInvoker::new()))?;
//! let report = orchestrator.run().await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod artifacts;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod gate;
pub mod layout;
pub mod pipeline;
pub mod reads;
pub mod stages;
pub mod strategy;
pub mod testing;
pub mod tools;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::artifacts::{ArtifactDigest, ArtifactManager, ArtifactMove};
    pub use crate::config::{Annotator, Gram, PipelineConfig, StageSelection};
    pub use crate::core::{RunReport, RunResult, RunState, StageRecord, StageStatus};
    pub use crate::errors::{
        AggregationError, ArtifactError, ConfigError, InputError, NoUsableReadsError,
        PreconditionError, QuasanError, ToolContractViolation, ToolExecutionError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::gate::{ArtifactProbe, FsProbe, GateDecision, StageGate};
    pub use crate::layout::SampleLayout;
    pub use crate::pipeline::Orchestrator;
    pub use crate::reads::{Platform, ReadCollector, ReadInventory, ReadSet, Technology};
    pub use crate::stages::{Stage, StageKind, StagePlan};
    pub use crate::strategy::{Strategy, Tag};
    pub use crate::tools::{Invocation, ProcessInvoker, ToolInvoker};
}
