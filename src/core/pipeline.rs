//! Pipeline domain model
//!
//! A [`PipelineBuilder`] collects steps and edges and enforces the edge arity
//! rules as they are added. [`PipelineBuilder::build`] checks the whole graph
//! and freezes it into a [`Pipeline`], which is never mutated afterwards.

use crate::core::error::{DefinitionError, DefinitionResult};
use crate::core::step::{Step, StepKind};
use crate::core::template::Params;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Connection used when a pipeline does not name one
pub const DEFAULT_CONNECTION_ID: &str = "cdw-impala";

/// Outcome of a branch step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    True,
    False,
}

impl Branch {
    /// A non-zero count of bad rows selects the true (cleansing) branch
    pub fn from_failure_count(count: i64) -> Self {
        if count != 0 {
            Branch::True
        } else {
            Branch::False
        }
    }

    pub fn from_bool(value: bool) -> Self {
        if value {
            Branch::True
        } else {
            Branch::False
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::True => f.write_str("true"),
            Branch::False => f.write_str("false"),
        }
    }
}

/// Outgoing edge of a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    /// On success, proceed to this step
    Next(String),
    /// Two-armed edge of a conditional step
    Branch { on_true: String, on_false: String },
}

impl Edge {
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Next(to) => vec![to.as_str()],
            Edge::Branch { on_true, on_false } => vec![on_true.as_str(), on_false.as_str()],
        }
    }

    /// Successor for a branch outcome; single edges ignore the outcome
    pub fn follow(&self, branch: Option<Branch>) -> Option<&str> {
        match (self, branch) {
            (Edge::Next(to), _) => Some(to),
            (Edge::Branch { on_true, .. }, Some(Branch::True)) => Some(on_true),
            (Edge::Branch { on_false, .. }, Some(Branch::False)) => Some(on_false),
            (Edge::Branch { .. }, None) => None,
        }
    }
}

/// Task defaults handed to the orchestrator
///
/// These are carried as metadata only. Nothing in this crate retries a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultArgs {
    #[serde(default)]
    pub owner: Option<String>,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    #[serde(default)]
    pub depends_on_past: bool,

    /// First scheduled run; unset means the orchestrator's current time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
}

fn default_retry_delay_secs() -> u64 {
    5
}

impl Default for DefaultArgs {
    fn default() -> Self {
        Self {
            owner: None,
            retry_delay_secs: default_retry_delay_secs(),
            depends_on_past: false,
            start_date: None,
        }
    }
}

/// Pipeline-level metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMeta {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Connection id resolved to warehouse credentials at run time
    pub connection_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    #[serde(default)]
    pub catchup: bool,

    /// Whether the orchestrator registers the pipeline paused
    #[serde(default)]
    pub paused_on_creation: bool,

    #[serde(default)]
    pub default_args: DefaultArgs,
}

impl PipelineMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            connection_id: DEFAULT_CONNECTION_ID.to_string(),
            schedule: None,
            catchup: false,
            paused_on_creation: false,
            default_args: DefaultArgs::default(),
        }
    }
}

/// Mutable pipeline under construction
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    meta: PipelineMeta,
    steps: Vec<Step>,
    index: HashMap<String, usize>,
    edges: HashMap<String, Edge>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_meta(PipelineMeta::new(name))
    }

    pub fn with_meta(meta: PipelineMeta) -> Self {
        Self {
            meta,
            steps: Vec::new(),
            index: HashMap::new(),
            edges: HashMap::new(),
        }
    }

    pub fn meta_mut(&mut self) -> &mut PipelineMeta {
        &mut self.meta
    }

    /// Define a step from its parts
    pub fn define_step(
        &mut self,
        id: impl Into<String>,
        kind: StepKind,
        sql_template: impl Into<String>,
        params: Params,
    ) -> DefinitionResult<&Step> {
        self.define(Step::new(id, kind, sql_template).with_params(params))
    }

    /// Register a fully configured step
    pub fn define(&mut self, step: Step) -> DefinitionResult<&Step> {
        if self.index.contains_key(&step.id) {
            return Err(DefinitionError::DuplicateId(step.id));
        }
        step.validate()?;

        let position = self.steps.len();
        self.index.insert(step.id.clone(), position);
        self.steps.push(step);
        Ok(&self.steps[position])
    }

    fn require(&self, id: &str) -> DefinitionResult<&Step> {
        self.index
            .get(id)
            .map(|&i| &self.steps[i])
            .ok_or_else(|| DefinitionError::UnknownStep(id.to_string()))
    }

    /// Declare "on success, proceed from `from` to `to`"
    pub fn add_edge(&mut self, from: &str, to: &str) -> DefinitionResult<()> {
        let step = self.require(from)?;
        self.require(to)?;

        if step.is_branch() {
            return Err(DefinitionError::InvalidArity {
                step_id: from.to_string(),
                reason: "conditional steps take exactly two edges".to_string(),
            });
        }
        if self.edges.contains_key(from) {
            return Err(DefinitionError::InvalidArity {
                step_id: from.to_string(),
                reason: "step already has an outgoing edge".to_string(),
            });
        }

        self.edges.insert(from.to_string(), Edge::Next(to.to_string()));
        Ok(())
    }

    /// Declare the two successors of a conditional step
    pub fn add_conditional_edges(
        &mut self,
        from: &str,
        on_true: &str,
        on_false: &str,
    ) -> DefinitionResult<()> {
        let step = self.require(from)?;
        self.require(on_true)?;
        self.require(on_false)?;

        if !step.is_branch() {
            return Err(DefinitionError::InvalidArity {
                step_id: from.to_string(),
                reason: format!("{} steps take at most one edge", step.kind),
            });
        }
        if self.edges.contains_key(from) {
            return Err(DefinitionError::InvalidArity {
                step_id: from.to_string(),
                reason: "conditional step already has its two edges".to_string(),
            });
        }

        self.edges.insert(
            from.to_string(),
            Edge::Branch {
                on_true: on_true.to_string(),
                on_false: on_false.to_string(),
            },
        );
        Ok(())
    }

    /// Chain steps in order with single edges
    pub fn chain(&mut self, ids: &[&str]) -> DefinitionResult<()> {
        for pair in ids.windows(2) {
            self.add_edge(pair[0], pair[1])?;
        }
        Ok(())
    }

    /// Validate the whole graph and freeze it
    pub fn build(self) -> DefinitionResult<Pipeline> {
        if self.steps.is_empty() {
            return Err(DefinitionError::Empty);
        }

        for step in &self.steps {
            if step.is_branch() && !self.edges.contains_key(&step.id) {
                return Err(DefinitionError::InvalidArity {
                    step_id: step.id.clone(),
                    reason: "conditional step needs exactly two outgoing edges, found none"
                        .to_string(),
                });
            }
        }

        self.check_cycles()?;

        let targets: HashSet<&str> = self.edges.values().flat_map(Edge::targets).collect();
        let roots: Vec<String> = self
            .steps
            .iter()
            .filter(|s| !targets.contains(s.id.as_str()))
            .map(|s| s.id.clone())
            .collect();
        if roots.len() != 1 {
            return Err(DefinitionError::MultipleEntryPoints(roots));
        }

        for step in &self.steps {
            step.render()?;
        }

        let entry = roots.into_iter().next().ok_or(DefinitionError::Empty)?;
        Ok(Pipeline {
            meta: self.meta,
            steps: self.steps,
            index: self.index,
            edges: self.edges,
            entry,
        })
    }

    fn check_cycles(&self) -> DefinitionResult<()> {
        let mut visited = HashSet::new();
        let mut stack = HashSet::new();

        for step in &self.steps {
            if !visited.contains(step.id.as_str()) {
                self.dfs_check(&step.id, &mut visited, &mut stack)?;
            }
        }
        Ok(())
    }

    fn dfs_check<'a>(
        &'a self,
        step_id: &'a str,
        visited: &mut HashSet<&'a str>,
        stack: &mut HashSet<&'a str>,
    ) -> DefinitionResult<()> {
        visited.insert(step_id);
        stack.insert(step_id);

        if let Some(edge) = self.edges.get(step_id) {
            for target in edge.targets() {
                if stack.contains(target) {
                    return Err(DefinitionError::Cycle(target.to_string()));
                }
                if !visited.contains(target) {
                    self.dfs_check(target, visited, stack)?;
                }
            }
        }

        stack.remove(step_id);
        Ok(())
    }
}

/// A validated, immutable pipeline definition
#[derive(Debug, Clone)]
pub struct Pipeline {
    meta: PipelineMeta,
    steps: Vec<Step>,
    index: HashMap<String, usize>,
    edges: HashMap<String, Edge>,
    entry: String,
}

impl Pipeline {
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn meta(&self) -> &PipelineMeta {
        &self.meta
    }

    /// Steps in definition order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.index.get(id).map(|&i| &self.steps[i])
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// The single step with no incoming edge
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn successors(&self, id: &str) -> Vec<&str> {
        self.edges.get(id).map(Edge::targets).unwrap_or_default()
    }

    /// Rendered SQL of a step
    pub fn render(&self, id: &str) -> DefinitionResult<String> {
        self.step(id)
            .ok_or_else(|| DefinitionError::UnknownStep(id.to_string()))?
            .render()
    }

    /// Step that runs after `id` given a branch outcome
    pub fn next_step(&self, id: &str, branch: Option<Branch>) -> Option<&str> {
        self.edges.get(id).and_then(|edge| edge.follow(branch))
    }

    /// Walk the graph from the entry step, asking `decide` at every branch
    pub fn walk<F>(&self, mut decide: F) -> Vec<String>
    where
        F: FnMut(&Step) -> Branch,
    {
        let mut visited = Vec::new();
        let mut current = self.step(&self.entry);

        while let Some(step) = current {
            visited.push(step.id.clone());
            let branch = step.is_branch().then(|| decide(step));
            current = self
                .next_step(&step.id, branch)
                .and_then(|next| self.step(next));
        }

        visited
    }

    /// Serializable view of the graph for an external orchestrator
    pub fn to_graph(&self) -> PipelineGraph {
        PipelineGraph {
            meta: self.meta.clone(),
            entry: self.entry.clone(),
            steps: self
                .steps
                .iter()
                .map(|step| GraphStep {
                    id: step.id.clone(),
                    kind: step.kind,
                    sql: step.render().unwrap_or_else(|_| step.sql_template.clone()),
                    edge: self.edges.get(&step.id).cloned(),
                    handler: step.handler.clone(),
                })
                .collect(),
        }
    }
}

/// Exported pipeline graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineGraph {
    #[serde(flatten)]
    pub meta: PipelineMeta,
    pub entry: String,
    pub steps: Vec<GraphStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStep {
    pub id: String,
    pub kind: StepKind,
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge: Option<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
}
