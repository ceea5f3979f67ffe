//! Event sink system for observability.
//!
//! The orchestrator emits one event per state transition:
//!
//! - `run.started`, `run.reads_collected`, `run.strategy_chosen`,
//!   `run.completed`, `run.aborted`
//! - `stage.started`, `stage.skipped`, `stage.completed`, `stage.failed`

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
