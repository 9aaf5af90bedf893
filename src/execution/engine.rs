//! Main execution engine - walks a pipeline from its entry step

use crate::{
    core::{Branch, ExecutionStatus, Pipeline, RunState, StepOutcome, StepState},
    execution::StepExecutor,
    warehouse::{HandlerRegistry, RowHandler, Warehouse},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
    },
    StepStarted {
        step_id: String,
    },
    BranchSelected {
        step_id: String,
        value: String,
        branch: Branch,
        next_step: Option<String>,
    },
    StepCompleted {
        step_id: String,
        next_step: Option<String>,
    },
    StepFailed {
        step_id: String,
        error: String,
    },
    StepSkipped {
        step_id: String,
        reason: String,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

pub const SKIP_BRANCH_NOT_TAKEN: &str = "branch not taken";
pub const SKIP_UPSTREAM_FAILED: &str = "upstream step failed";

/// Runs pipelines one step at a time
pub struct ExecutionEngine<W> {
    executor: StepExecutor<W>,
    event_handlers: Vec<EventHandler>,
}

impl<W: Warehouse> ExecutionEngine<W> {
    /// Engine with the default row handlers registered
    pub fn new(warehouse: W) -> Self {
        Self::with_handlers(warehouse, HandlerRegistry::default())
    }

    pub fn with_handlers(warehouse: W, handlers: HandlerRegistry) -> Self {
        Self {
            executor: StepExecutor::new(warehouse, handlers),
            event_handlers: Vec::new(),
        }
    }

    pub fn register_handler(&mut self, name: impl Into<String>, handler: Arc<dyn RowHandler>) {
        self.executor.handlers_mut().register(name, handler);
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Execute the pipeline and return the final run state
    ///
    /// The first failing step ends the run; every step that did not run is
    /// marked skipped.
    pub async fn execute(&self, pipeline: &Pipeline) -> RunState {
        let mut run = RunState::new(pipeline);
        let execution_id = run.execution_id;

        info!("Starting pipeline execution: {} ({})", pipeline.name(), execution_id);
        run.start();
        self.emit_event(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: pipeline.name().to_string(),
        });

        let mut current = Some(pipeline.entry().to_string());
        while let Some(step_id) = current.take() {
            let Some(step) = pipeline.step(&step_id) else {
                warn!("Step {} not found, stopping", step_id);
                break;
            };

            let started_at = Utc::now();
            run.set_step_state(&step_id, StepState::Running { started_at });
            self.emit_event(ExecutionEvent::StepStarted {
                step_id: step_id.clone(),
            });

            match self.executor.execute(step).await {
                Ok(execution) => {
                    let next_step = pipeline
                        .next_step(&step_id, execution.branch)
                        .map(str::to_string);

                    if let StepOutcome::Branched { value, branch } = &execution.outcome {
                        self.emit_event(ExecutionEvent::BranchSelected {
                            step_id: step_id.clone(),
                            value: value.clone(),
                            branch: *branch,
                            next_step: next_step.clone(),
                        });
                    }

                    run.set_step_state(
                        &step_id,
                        StepState::Completed {
                            outcome: execution.outcome,
                            started_at,
                            completed_at: Utc::now(),
                        },
                    );
                    self.emit_event(ExecutionEvent::StepCompleted {
                        step_id,
                        next_step: next_step.clone(),
                    });
                    current = next_step;
                }
                Err(e) => {
                    error!("Step {} failed: {}", step_id, e);
                    run.set_step_state(
                        &step_id,
                        StepState::Failed {
                            error: e.to_string(),
                            started_at,
                            failed_at: Utc::now(),
                        },
                    );
                    self.emit_event(ExecutionEvent::StepFailed {
                        step_id,
                        error: e.to_string(),
                    });
                    return self.finish(run, ExecutionStatus::Failed);
                }
            }
        }

        self.finish(run, ExecutionStatus::Completed)
    }

    fn finish(&self, mut run: RunState, status: ExecutionStatus) -> RunState {
        let reason = match status {
            ExecutionStatus::Failed => SKIP_UPSTREAM_FAILED,
            _ => SKIP_BRANCH_NOT_TAKEN,
        };
        for step_id in run.skip_pending(reason) {
            self.emit_event(ExecutionEvent::StepSkipped {
                step_id,
                reason: reason.to_string(),
            });
        }

        match status {
            ExecutionStatus::Failed => run.fail(),
            _ => run.complete(),
        }

        info!(
            "Pipeline execution finished: {} - {:?} ({} of {} steps ran)",
            run.pipeline_name,
            run.status,
            run.visited.len(),
            run.total_steps()
        );
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id: run.execution_id,
            status: run.status,
        });
        run
    }
}
