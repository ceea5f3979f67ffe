//! Testing utilities for quasan pipelines.
//!
//! This module provides:
//! - [`MockInvoker`], a [`ToolInvoker`](crate::tools::ToolInvoker) that records
//!   calls and fakes tool outputs
//! - [`SampleFixture`], a builder for sample directory trees

mod fixtures;
mod mocks;

pub use fixtures::SampleFixture;
pub use mocks::MockInvoker;
