use anyhow::{Context, Result};
use pipeforge::cli::commands::{ExpandCommand, HistoryCommand, RunCommand, TriggersCommand, ValidateCommand};
use pipeforge::cli::output::*;
use pipeforge::cli::{Cli, Command};
use pipeforge::core::config::PipelineConfig;
use pipeforge::core::ExecutionStatus;
use pipeforge::execution::{DryRunExecutor, ExecutionEngine, ExecutionEvent, JobRunner};
use pipeforge::persistence::{InMemoryPersistence, PersistenceBackend, RunSummary};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Expand(cmd) => expand_pipeline(cmd)?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Triggers(cmd) => show_triggers(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

fn expand_pipeline(cmd: &ExpandCommand) -> Result<()> {
    let config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline definition")?;
    let pipeline = config.expand(&cmd.invocation())?;

    if cmd.outline {
        print!("{}", format_plan(&pipeline));
    } else if cmd.json {
        println!("{}", serde_json::to_string_pretty(&pipeline)?);
    } else {
        print!("{}", serde_yaml::to_string(&pipeline)?);
    }
    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => {
            println!("{} Pipeline definition is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Triggers: {}", style(config.trigger.len()).cyan());
            println!("  Job templates: {}", style(config.job_template_configs().count()).cyan());
            println!("  Stages: {}", style(config.stages.len()).cyan());
            for stage in &config.stages {
                println!("    {} ({} job references)", style(&stage.name).bold(), stage.jobs.len());
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    let config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline definition")?;
    println!("{} Loaded pipeline: {}", INFO, style(&config.name).bold());

    let invocation = cmd.invocation();
    for (key, value) in &invocation {
        println!("{} Parameter: {} = {}", INFO, style(key).cyan(), style(value).dim());
    }

    let pipeline = config.expand(&invocation)?;
    let stage_names: Vec<String> = pipeline.stages.iter().map(|s| s.name.clone()).collect();

    let store: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        open_store().await?
    };

    let mut executor = DryRunExecutor::new().with_step_delay(Duration::from_millis(cmd.step_delay_ms));
    for job in &cmd.fail_jobs {
        if !pipeline.jobs().any(|(_, j)| &j.name == job) {
            println!("{} No job named {} in the plan", WARN, style(job).yellow());
        }
        executor = executor.with_failure(job.clone());
    }
    let mut runner = JobRunner::new(executor);
    if let Some(secs) = cmd.timeout {
        runner = runner.with_timeout(secs);
    }
    let engine = ExecutionEngine::with_runner(runner, cmd.scheduling_strategy());

    let progress = create_progress_bar(pipeline.total_jobs());
    let bar = progress.clone();
    let show_output = cmd.show_output;
    engine
        .add_event_handler(move |event| {
            if matches!(event, ExecutionEvent::JobCompleted { .. } | ExecutionEvent::JobFailed { .. }) {
                bar.inc(1);
            }
            if let ExecutionEvent::StageStarted { stage, .. } = &event {
                bar.set_message(stage.clone());
            }
            bar.println(format_execution_event(&event));
            if let ExecutionEvent::JobCompleted { output, .. } = &event {
                if show_output && !output.is_empty() {
                    bar.println(format_output(output, 10));
                }
            }
        })
        .await;

    println!();
    let run = engine.execute(&pipeline).await?;
    progress.finish_and_clear();

    let summary = RunSummary::from_run(&pipeline.name, &stage_names, &run);
    store.save_run(&summary).await?;
    if !cmd.no_history {
        println!(
            "\n{} Run saved to history (ID: {})",
            INFO,
            style(&summary.run_id.to_string()[..8]).dim()
        );
    }

    if let (Some(started), Some(completed)) = (run.started_at, run.completed_at) {
        if let Ok(duration) = completed.signed_duration_since(started).to_std() {
            println!("{} Duration: {}", INFO, style(format_duration(duration)).dim());
        }
    }

    if run.status() == ExecutionStatus::Succeeded {
        println!(
            "\n{} {} completed {}",
            CHECK,
            style(&pipeline.name).bold(),
            style("successfully").green()
        );
    } else {
        println!("\n{} {}", CROSS, format_run_summary(&summary));
        error!("Pipeline {} failed: {}", pipeline.name, run.state);
        std::process::exit(1);
    }

    Ok(())
}

fn show_triggers(cmd: &TriggersCommand) -> Result<()> {
    let config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline definition")?;
    let definition = config.definition()?;
    let event = cmd.trigger_event().map_err(anyhow::Error::msg)?;

    let fired = definition.trigger.matching(&event);
    for trigger in definition.trigger.triggers() {
        let is_fired = fired.is_some_and(|f| std::ptr::eq(f, trigger));
        println!("{}", format_trigger(trigger, is_fired));
    }

    if definition.trigger.fires(&event) {
        println!("{} {} fires for {:?}", CHECK, style(&config.name).bold(), event);
        let required = definition.trigger.required_parameters();
        if !required.is_empty() {
            println!("  Required parameters: {}", style(required.join(", ")).cyan());
        }
    } else {
        println!("{} {} does not fire for {:?}", WARN, style(&config.name).bold(), event);
    }
    Ok(())
}

#[cfg(feature = "sqlite")]
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    Ok(Arc::new(pipeforge::persistence::SqliteRunStore::with_default_path().await?))
}

#[cfg(not(feature = "sqlite"))]
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    tracing::warn!("Built without the sqlite feature, run history is not kept");
    Ok(Arc::new(InMemoryPersistence::new()))
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_store().await?;

    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(summary) => print_run_details(&summary, cmd.json)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let runs = store.list_runs(cmd.pipeline.as_deref(), cmd.limit).await?;

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);
    for summary in &runs {
        println!("  {}", format_run_summary(summary));
    }

    Ok(())
}

fn print_run_details(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!("  Stages: {}/{}", summary.completed_stages, summary.total_stages);
    if let Some(stage) = &summary.failed_stage {
        println!("  Failed stage: {}", style(stage).red());
    }
    if let Some(job) = &summary.failed_job {
        println!("  Failed job: {}", style(job).red());
    }

    Ok(())
}
