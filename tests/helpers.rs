//! Shared helpers for the expansion and gating scenarios
#![allow(dead_code)]

use pipeforge::core::config::PipelineConfig;
use pipeforge::core::{ParamValue, ParameterLayer, Pipeline, PipelineRun, Stage};
use pipeforge::execution::{DryRunExecutor, ExecutionEngine, ExecutionEvent, SchedulingStrategy};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Path of a sample definition under `pipelines/`
pub fn pipeline_path(file: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("pipelines").join(file)
}

/// Load a sample definition, with its template files
pub fn load(file: &str) -> PipelineConfig {
    PipelineConfig::from_file(pipeline_path(file))
        .unwrap_or_else(|e| panic!("failed to load {}: {:#}", file, e))
}

/// Invocation layer from `key=value` pairs, typed the way `--param` is
pub fn params(pairs: &[(&str, &str)]) -> ParameterLayer {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), ParamValue::from_cli(v)))
        .collect()
}

/// Load and expand a sample definition
pub fn expand(file: &str, pairs: &[(&str, &str)]) -> Pipeline {
    load(file)
        .expand(&params(pairs))
        .unwrap_or_else(|e| panic!("failed to expand {}: {}", file, e))
}

pub fn job_names(stage: &Stage) -> Vec<&str> {
    stage.jobs.iter().map(|j| j.name.as_str()).collect()
}

pub fn step_labels<'a>(stage: &'a Stage, job: &str) -> Vec<&'a str> {
    stage
        .job(job)
        .unwrap_or_else(|| panic!("no job {} in stage {}", job, stage.name))
        .steps
        .iter()
        .map(|s| s.label.as_str())
        .collect()
}

/// Result of a dry run with the events it emitted
pub struct DryRun {
    pub run: PipelineRun,
    pub events: Vec<ExecutionEvent>,
}

impl DryRun {
    pub fn started_jobs(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::JobStarted { job, .. } => Some(job.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn started_stages(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::StageStarted { stage, .. } => Some(stage.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn skipped_stages(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::StageSkipped { stage, .. } => Some(stage.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Drive a plan through the dry-run executor, failing the named jobs
pub async fn dry_run(pipeline: &Pipeline, failing: &[&str]) -> DryRun {
    let executor = failing
        .iter()
        .fold(DryRunExecutor::new(), |executor, job| executor.with_failure(*job));
    let engine = ExecutionEngine::new(executor, SchedulingStrategy::Parallel);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine
        .add_event_handler(move |event| sink.lock().unwrap().push(event))
        .await;

    let run = engine.execute(pipeline).await.expect("run should start");
    let events = events.lock().unwrap().clone();
    DryRun { run, events }
}
