//! Persistence layer for pipeline run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

pub use crate::core::ExecutionStatus;
use crate::core::RunState;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    pub pipeline_name: String,

    pub status: ExecutionStatus,

    pub started_at: DateTime<Utc>,

    /// When the run finished (if it did)
    pub completed_at: Option<DateTime<Utc>>,

    /// Steps in the order they ran
    pub visited_steps: Vec<String>,

    /// Step that stopped the run, with its error
    pub failed_step: Option<String>,
    pub error: Option<String>,

    /// Number of steps skipped because their branch was not taken
    /// or an upstream step failed
    pub skipped_steps: usize,

    pub total_steps: usize,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run summary, replacing any previous one with the same id
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()>;

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>>;

    /// Runs of one pipeline, newest first
    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>>;

    /// Most recent runs across all pipelines, newest first
    async fn recent_executions(&self, limit: usize) -> Result<Vec<ExecutionSummary>>;

    /// All pipeline names with at least one run
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or `--no-history` runs)
#[derive(Default)]
pub struct InMemoryPersistence {
    executions: RwLock<HashMap<Uuid, ExecutionSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sorted(&self, filter: impl Fn(&ExecutionSummary) -> bool) -> Vec<ExecutionSummary> {
        let execs = self.executions.read().await;
        let mut result: Vec<_> = execs.values().filter(|e| filter(e)).cloned().collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        result
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        let mut execs = self.executions.write().await;
        execs.insert(execution.execution_id, execution.clone());
        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>> {
        let execs = self.executions.read().await;
        Ok(execs.get(&execution_id).cloned())
    }

    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>> {
        Ok(self.sorted(|e| e.pipeline_name == pipeline_name).await)
    }

    async fn recent_executions(&self, limit: usize) -> Result<Vec<ExecutionSummary>> {
        let mut result = self.sorted(|_| true).await;
        result.truncate(limit);
        Ok(result)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let execs = self.executions.read().await;
        let mut names: Vec<String> = execs.values().map(|e| e.pipeline_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a finished run
pub fn create_summary(run: &RunState) -> ExecutionSummary {
    let failed = run.failed_step();
    ExecutionSummary {
        execution_id: run.execution_id,
        pipeline_name: run.pipeline_name.clone(),
        status: run.status,
        started_at: run.started_at.unwrap_or_else(Utc::now),
        completed_at: run.completed_at,
        visited_steps: run.visited.clone(),
        failed_step: failed.map(|(id, _)| id.to_string()),
        error: failed.map(|(_, error)| error.to_string()),
        skipped_steps: run.skipped_steps(),
        total_steps: run.total_steps(),
    }
}
