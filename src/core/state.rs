//! Execution state models

use crate::core::pipeline::{Branch, Pipeline};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Run has not started
    Pending,
    /// Run is in progress
    Running,
    /// Every visited step succeeded
    Completed,
    /// A step failed; the rest were skipped
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "Pending",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Completed => "Completed",
            ExecutionStatus::Failed => "Failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Pending" => Some(ExecutionStatus::Pending),
            "Running" => Some(ExecutionStatus::Running),
            "Completed" => Some(ExecutionStatus::Completed),
            "Failed" => Some(ExecutionStatus::Failed),
            _ => None,
        }
    }
}

/// What a completed step produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// Statements ran; row count per the step's `return_last` setting
    Executed { statements: usize, rows: usize },
    /// Branch evaluated on the first cell of the validation query
    Branched { value: String, branch: Branch },
    /// Every check held
    Passed,
}

/// State of a single step within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepState {
    /// Not reached yet
    Pending,
    Running {
        started_at: DateTime<Utc>,
    },
    Completed {
        outcome: StepOutcome,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    Failed {
        error: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Branch not taken, or an upstream step failed
    Skipped {
        reason: String,
    },
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed { .. } | StepState::Failed { .. } | StepState::Skipped { .. }
        )
    }
}

/// State of one run of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Unique execution ID
    pub execution_id: Uuid,

    pub pipeline_name: String,

    pub status: ExecutionStatus,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Step states in definition order
    pub steps: Vec<(String, StepState)>,

    /// Steps in the order they ran
    pub visited: Vec<String>,
}

impl RunState {
    pub fn new(pipeline: &Pipeline) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            pipeline_name: pipeline.name().to_string(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            steps: pipeline
                .steps()
                .iter()
                .map(|s| (s.id.clone(), StepState::Pending))
                .collect(),
            visited: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self) {
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    pub fn step_state(&self, id: &str) -> Option<&StepState> {
        self.steps.iter().find(|(s, _)| s == id).map(|(_, state)| state)
    }

    pub fn set_step_state(&mut self, id: &str, state: StepState) {
        if let Some((_, slot)) = self.steps.iter_mut().find(|(s, _)| s == id) {
            if matches!(state, StepState::Running { .. }) {
                self.visited.push(id.to_string());
            }
            *slot = state;
        }
    }

    /// Mark every step that never ran as skipped
    pub fn skip_pending(&mut self, reason: &str) -> Vec<String> {
        let mut skipped = Vec::new();
        for (id, state) in self.steps.iter_mut() {
            if matches!(state, StepState::Pending) {
                *state = StepState::Skipped {
                    reason: reason.to_string(),
                };
                skipped.push(id.clone());
            }
        }
        skipped
    }

    pub fn completed_steps(&self) -> usize {
        self.count(|s| matches!(s, StepState::Completed { .. }))
    }

    pub fn skipped_steps(&self) -> usize {
        self.count(|s| matches!(s, StepState::Skipped { .. }))
    }

    /// The step whose failure ended the run
    pub fn failed_step(&self) -> Option<(&str, &str)> {
        self.steps.iter().find_map(|(id, state)| match state {
            StepState::Failed { error, .. } => Some((id.as_str(), error.as_str())),
            _ => None,
        })
    }

    fn count(&self, predicate: impl Fn(&StepState) -> bool) -> usize {
        self.steps.iter().filter(|(_, s)| predicate(s)).count()
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// Share of steps in a terminal state (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        self.count(StepState::is_terminal) as f64 / self.steps.len() as f64
    }
}
