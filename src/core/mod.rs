//! Core domain models for Pipeline
//!
//! This module defines the step and pipeline graph, the template and
//! assertion models, and the per-run execution state.

pub mod check;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod sql;
pub mod state;
pub mod step;
pub mod template;

pub use check::{Assertion, CheckPredicate, ColumnCheckKind, TableCheck};
pub use error::{DefinitionError, DefinitionResult};
pub use pipeline::*;
pub use state::*;
pub use step::*;
pub use template::Params;
