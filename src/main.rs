use anyhow::{Context, Result};
use dq_pipeline::catalog;
use dq_pipeline::cli::commands::{
    ExportCommand, HistoryCommand, ListCommand, PlanCommand, RenderCommand, RunCommand,
    ValidateCommand,
};
use dq_pipeline::cli::output::*;
use dq_pipeline::cli::{Cli, Command};
use dq_pipeline::core::{Branch, ExecutionStatus};
use dq_pipeline::execution::{ExecutionEngine, ExecutionEvent};
use dq_pipeline::persistence::{
    create_summary, ExecutionSummary, InMemoryPersistence, PersistenceBackend,
};
use dq_pipeline::warehouse::{ConnectionsFile, ImpalaShellClient, PrintRowHandler, PRINT_ROWS};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    match &cli.command {
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Render(cmd) => render_pipeline(cmd)?,
        Command::Plan(cmd) => plan_pipeline(cmd)?,
        Command::Export(cmd) => export_pipeline(cmd)?,
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::List(cmd) => list_pipelines(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    let config = match cmd.source.load() {
        Ok(config) => config,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    };
    let pipeline = config.to_pipeline()?;
    let branches = pipeline.steps().iter().filter(|s| s.is_branch()).count();

    println!("{} Pipeline definition is valid!", CHECK);
    println!("  Name: {}", style(pipeline.name()).bold());
    println!("  Connection: {}", style(&pipeline.meta().connection_id).cyan());
    println!("  Steps: {}", style(pipeline.steps().len()).cyan());
    println!("  Branch steps: {}", style(branches).cyan());
    println!("  Entry: {}", style(pipeline.entry()).cyan());
    if let Some(schedule) = &pipeline.meta().schedule {
        println!("  Schedule: {}", style(schedule).dim());
    }

    if cmd.json {
        let json = serde_json::to_string_pretty(&config)?;
        println!("\n{}", json);
    }
    Ok(())
}

fn render_pipeline(cmd: &RenderCommand) -> Result<()> {
    let pipeline = cmd.source.load()?.to_pipeline()?;

    let step_ids: Vec<&str> = match &cmd.step {
        Some(id) => {
            if pipeline.step(id).is_none() {
                anyhow::bail!("Unknown step: {}", id);
            }
            vec![id.as_str()]
        }
        None => pipeline.steps().iter().map(|s| s.id.as_str()).collect(),
    };

    for id in step_ids {
        let sql = pipeline.render(id)?;
        println!("-- {}", style(id).bold());
        println!("{}\n", sql.trim_end());
    }
    Ok(())
}

fn plan_pipeline(cmd: &PlanCommand) -> Result<()> {
    let pipeline = cmd.source.load()?.to_pipeline()?;

    let assumptions: HashMap<&str, Branch> = cmd
        .branches
        .iter()
        .map(|(step, branch)| (step.as_str(), *branch))
        .collect();
    for step in assumptions.keys() {
        match pipeline.step(step) {
            Some(s) if s.is_branch() => {}
            Some(_) => anyhow::bail!("Step {} is not a branch step", step),
            None => anyhow::bail!("Unknown step: {}", step),
        }
    }

    let decide = |id: &str| assumptions.get(id).copied().unwrap_or(Branch::False);
    let visited = pipeline.walk(|step| decide(&step.id));

    println!("{} Plan for {}:", INFO, style(pipeline.name()).bold());
    println!("{}", format_plan(&pipeline, &visited, decide));
    Ok(())
}

fn export_pipeline(cmd: &ExportCommand) -> Result<()> {
    let pipeline = cmd.source.load()?.to_pipeline()?;
    let json = serde_json::to_string_pretty(&pipeline.to_graph())?;

    match &cmd.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{} Exported {} to {}", CHECK, pipeline.name(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    let config = cmd.source.load().context("Failed to load pipeline")?;
    let pipeline = config.to_pipeline()?;

    println!("{} Loaded pipeline: {}", INFO, style(pipeline.name()).bold());
    for (key, value) in &cmd.source.params {
        println!(
            "{} Parameter override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    let connections_path = cmd
        .connections
        .clone()
        .unwrap_or_else(ConnectionsFile::default_path);
    let connections = ConnectionsFile::from_file(&connections_path)?;
    let connection = connections.get(&pipeline.meta().connection_id)?.clone();
    debug!("Using connection {} at {}", pipeline.meta().connection_id, connection.address());

    let store = open_history(cmd.no_history).await?;

    let mut engine = ExecutionEngine::new(ImpalaShellClient::new(connection));

    // Console output goes through the progress bar so the two don't interleave
    let progress = create_progress_bar(pipeline.steps().len());
    let rows_bar = progress.clone();
    engine.register_handler(
        PRINT_ROWS,
        Arc::new(PrintRowHandler::with_writer(move |line| rows_bar.println(line))),
    );
    let bar = progress.clone();
    engine.add_event_handler(move |event| {
        bar.println(format_execution_event(&event));
        match &event {
            ExecutionEvent::StepStarted { step_id } => bar.set_message(step_id.clone()),
            ExecutionEvent::StepCompleted { .. }
            | ExecutionEvent::StepFailed { .. }
            | ExecutionEvent::StepSkipped { .. } => bar.inc(1),
            _ => {}
        }
    });

    let run = engine.execute(&pipeline).await;
    progress.finish_and_clear();

    println!("\n{}", style("Step states:").bold());
    for (step_id, state) in &run.steps {
        println!("  {:<32} {}", step_id, format_step_state(state));
    }

    let summary = create_summary(&run);
    store.save_execution(&summary).await?;
    if !cmd.no_history {
        println!(
            "\n{} Execution saved to history (ID: {})",
            INFO,
            style(summary.execution_id).dim()
        );
    }

    match run.status {
        ExecutionStatus::Completed => {
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(pipeline.name()).bold(),
                style("successfully").green()
            );
            Ok(())
        }
        _ => {
            println!(
                "\n{} {} {}",
                CROSS,
                style(pipeline.name()).bold(),
                style("failed").red()
            );
            if let Some((step, err)) = run.failed_step() {
                error!("Step {} failed: {}", step, err);
            }
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "sqlite")]
async fn open_history(ephemeral: bool) -> Result<Arc<dyn PersistenceBackend>> {
    if ephemeral {
        return Ok(Arc::new(InMemoryPersistence::new()));
    }
    let store = dq_pipeline::persistence::SqliteExecutionStore::with_default_path()
        .await
        .context("Failed to open execution history")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_history(ephemeral: bool) -> Result<Arc<dyn PersistenceBackend>> {
    if !ephemeral {
        tracing::warn!("Built without the sqlite feature; run history is not kept");
    }
    Ok(Arc::new(InMemoryPersistence::new()))
}

fn list_pipelines(cmd: &ListCommand) -> Result<()> {
    let configs = catalog::list()?;

    if cmd.json {
        let data: Vec<_> = configs
            .iter()
            .map(|c| {
                serde_json::json!({
                    "name": c.name,
                    "description": c.description,
                    "schedule": c.schedule,
                    "steps": c.steps.len(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "pipelines": data }))?);
        return Ok(());
    }

    println!("{} Built-in pipelines:", INFO);
    for config in &configs {
        println!(
            "  {} ({} steps){}",
            style(&config.name).bold(),
            style(config.steps.len()).cyan(),
            config
                .description
                .as_ref()
                .map(|d| format!(" - {}", style(d).dim()))
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_history(false).await?;

    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id =
            uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;
        match store.load_execution(exec_id).await? {
            Some(summary) => print_execution_details(&summary, cmd.details)?,
            None => println!("{} Execution not found", WARN),
        }
        return Ok(());
    }

    let executions: Vec<ExecutionSummary> = match &cmd.pipeline {
        Some(pipeline_name) => store
            .list_executions(pipeline_name)
            .await?
            .into_iter()
            .take(cmd.limit)
            .collect(),
        None => store.recent_executions(cmd.limit).await?,
    };

    if executions.is_empty() {
        println!("{} No executions found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Execution history (showing latest {}):", INFO, cmd.limit);
        for summary in &executions {
            println!("  {}", format_execution_summary(summary));
        }
    }

    Ok(())
}

fn print_execution_details(summary: &ExecutionSummary, details: bool) -> Result<()> {
    println!("{} Execution Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Steps: {} ran, {} skipped, {} total",
        style(summary.visited_steps.len()).cyan(),
        summary.skipped_steps,
        summary.total_steps
    );
    if let (Some(step), Some(err)) = (&summary.failed_step, &summary.error) {
        println!("  Failed at: {}", style(step).red());
        println!("{}", format_output(&format!("    {}", err), 10));
    }

    if details {
        println!("\n  {}", style("Visited steps:").bold());
        for (i, step) in summary.visited_steps.iter().enumerate() {
            println!("    {}. {}", i + 1, step);
        }
    }

    Ok(())
}

fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
