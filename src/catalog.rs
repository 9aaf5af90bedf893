//! Built-in pipeline definitions shipped with the binary

use crate::core::config::PipelineConfig;
use anyhow::{anyhow, Result};

pub const DEMO_DAG: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/pipelines/demo-dag.yaml"));
pub const AIRPORTS_QUALITY: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/pipelines/airports-quality.yaml"));

const BUILTINS: &[(&str, &str)] = &[("demo-dag", DEMO_DAG), ("airports-quality", AIRPORTS_QUALITY)];

/// Names of the built-in pipelines
pub fn names() -> Vec<&'static str> {
    BUILTINS.iter().map(|(name, _)| *name).collect()
}

/// Raw YAML of a built-in pipeline
pub fn source(name: &str) -> Option<&'static str> {
    BUILTINS
        .iter()
        .find(|(builtin, _)| builtin.eq_ignore_ascii_case(name))
        .map(|(_, yaml)| *yaml)
}

/// Load a built-in pipeline by name
pub fn builtin(name: &str) -> Result<PipelineConfig> {
    let yaml = source(name).ok_or_else(|| {
        anyhow!("Unknown built-in pipeline: {} (available: {})", name, names().join(", "))
    })?;
    PipelineConfig::from_yaml(yaml)
}

/// All built-in pipelines, parsed
pub fn list() -> Result<Vec<PipelineConfig>> {
    names().into_iter().map(builtin).collect()
}
