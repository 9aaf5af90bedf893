//! dq-pipeline - data-quality pipelines for SQL warehouses
//!
//! Pipelines are graphs of SQL steps: statements to execute, assertions that
//! fail the run when the data is wrong, and branch steps that route to a
//! cleansing step when a validation query reports failures.

pub mod catalog;
pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod warehouse;

// Re-export commonly used types
pub use core::config::PipelineConfig;
pub use core::{
    Assertion, Branch, DefinitionError, Edge, ExecutionStatus, Params, Pipeline, PipelineBuilder,
    RunState, Step, StepKind, StepState,
};
pub use execution::{ExecutionEngine, ExecutionError, ExecutionEvent};
pub use warehouse::{ImpalaShellClient, QueryResult, RowHandler, Warehouse, WarehouseError};
