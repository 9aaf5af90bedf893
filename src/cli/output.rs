//! CLI output formatting

use crate::{
    core::{Branch, ExecutionStatus, Pipeline, StepKind, StepState},
    execution::ExecutionEvent,
    persistence::ExecutionSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static FORK: Emoji<'_, '_> = Emoji("🔀 ", "? ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a progress bar over a pipeline's steps
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Completed { .. } => style("COMPLETED").green().to_string(),
        StepState::Failed { .. } => style("FAILED").red().to_string(),
        StepState::Skipped { reason } => style(format!("SKIPPED ({})", reason)).dim().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// Format execution summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Pending => INFO,
    };

    let mut line = format!(
        "{} {} - {} - {} - {} ({} of {} steps ran)",
        status_icon,
        style(short_id(&summary.execution_id)).dim(),
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        summary.visited_steps.len(),
        summary.total_steps,
    );
    if let Some(step) = &summary.failed_step {
        line.push_str(&format!(" - failed at {}", style(step).red()));
    }
    line
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
        } => format!(
            "{} Starting pipeline {} ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(short_id(execution_id)).dim()
        ),
        ExecutionEvent::StepStarted { step_id } => {
            format!("{} {}", SPINNER, style(step_id).cyan())
        }
        ExecutionEvent::BranchSelected {
            step_id,
            value,
            branch,
            next_step,
        } => format!(
            "{} {} returned {} -> {} branch{}",
            FORK,
            style(step_id).cyan(),
            style(value).bold(),
            branch,
            next_step
                .as_ref()
                .map(|next| format!(" ({})", style(next).cyan()))
                .unwrap_or_default()
        ),
        ExecutionEvent::StepCompleted { step_id, next_step } => match next_step {
            Some(next) => {
                format!("{} {} → {}", CHECK, style(step_id).green(), style(next).cyan())
            }
            None => format!("{} {}", CHECK, style(step_id).green()),
        },
        ExecutionEvent::StepFailed { step_id, error } => {
            format!("{} {}: {}", CROSS, style(step_id).red(), style(error).dim())
        }
        ExecutionEvent::StepSkipped { step_id, reason } => {
            format!("{} {} ({})", SKIP, style(step_id).dim(), reason)
        }
        ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        } => {
            let status_str = match status {
                ExecutionStatus::Completed => {
                    format!("{} completed", style("successfully").green())
                }
                ExecutionStatus::Failed => style("failed").red().to_string(),
                other => format_status(*other),
            };
            format!(
                "{} Pipeline ({}) {}",
                INFO,
                style(short_id(execution_id)).dim(),
                status_str
            )
        }
    }
}

/// Format the walk of a pipeline, one numbered line per visited step
pub fn format_plan(
    pipeline: &Pipeline,
    visited: &[String],
    decide: impl Fn(&str) -> Branch,
) -> String {
    let mut lines = Vec::with_capacity(visited.len());
    for (i, step_id) in visited.iter().enumerate() {
        let Some(step) = pipeline.step(step_id) else {
            continue;
        };
        let mut line = format!("{:>3}. {} [{}]", i + 1, style(step_id).bold(), step.kind);
        if step.kind == StepKind::ConditionalCheck {
            line.push_str(&format!(" -> assume {}", decide(step_id)));
        }
        lines.push(line);
    }

    let skipped: Vec<&str> = pipeline
        .steps()
        .iter()
        .map(|s| s.id.as_str())
        .filter(|id| !visited.iter().any(|v| v == id))
        .collect();
    if !skipped.is_empty() {
        lines.push(format!("     {} {}", style("skipped:").dim(), skipped.join(", ")));
    }

    lines.join("\n")
}

/// Format multi-line text with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}
