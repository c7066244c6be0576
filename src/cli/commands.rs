//! CLI command definitions

use crate::core::{ParamValue, ParameterLayer, TriggerEvent};
use crate::execution::SchedulingStrategy;
use clap::Args;

/// Expand a pipeline definition into its plan
#[derive(Debug, Args, Clone)]
pub struct ExpandCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Invocation parameters (key=value)
    #[arg(short, long = "param", value_parser = parse_key_value)]
    pub params: Vec<(String, String)>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Print a readable outline of stages, jobs and steps
    #[arg(long, conflicts_with = "json")]
    pub outline: bool,
}

impl ExpandCommand {
    pub fn invocation(&self) -> ParameterLayer {
        invocation_layer(&self.params)
    }
}

/// Validate a pipeline definition
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Expand and run a pipeline with the dry-run executor
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Invocation parameters (key=value)
    #[arg(short, long = "param", value_parser = parse_key_value)]
    pub params: Vec<(String, String)>,

    /// Make the named job fail (repeatable)
    #[arg(long = "fail-job")]
    pub fail_jobs: Vec<String>,

    /// Scheduling strategy for the jobs of a stage
    #[arg(long, value_enum, default_value_t = SchedulingStrategyArg::Parallel)]
    pub strategy: SchedulingStrategyArg,

    /// Stage-wide job limit for `parallel-limited`
    #[arg(long, default_value_t = 4)]
    pub max_jobs: usize,

    /// Per-job timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Simulated duration of each step in milliseconds
    #[arg(long, default_value_t = 0)]
    pub step_delay_ms: u64,

    /// Print the step log of each completed job
    #[arg(long)]
    pub show_output: bool,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

impl RunCommand {
    pub fn invocation(&self) -> ParameterLayer {
        invocation_layer(&self.params)
    }

    pub fn scheduling_strategy(&self) -> SchedulingStrategy {
        match self.strategy {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => SchedulingStrategy::LimitedParallel(self.max_jobs),
        }
    }
}

/// Report which trigger fires for an event
#[derive(Debug, Args, Clone)]
pub struct TriggersCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Event kind
    #[arg(long, value_enum)]
    pub event: EventArg,

    /// Target branch (pull requests) or scheduled branch
    #[arg(short, long)]
    pub branch: Option<String>,
}

impl TriggersCommand {
    pub fn trigger_event(&self) -> Result<TriggerEvent, String> {
        let branch = || {
            self.branch
                .clone()
                .ok_or_else(|| format!("--branch is required for {:?} events", self.event))
        };
        Ok(match self.event {
            EventArg::PullRequest => TriggerEvent::PullRequest { target_branch: branch()? },
            EventArg::Schedule => TriggerEvent::Schedule { branch: branch()? },
            EventArg::Manual => TriggerEvent::Manual,
        })
    }
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show a single run by ID
    #[arg(long)]
    pub run_id: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

/// Trigger event argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EventArg {
    PullRequest,
    Schedule,
    Manual,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 || parts[0].is_empty() {
        return Err(format!("Invalid key=value pair: {}", s));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

/// Build the invocation layer from `--param` pairs; later pairs win
pub fn invocation_layer(pairs: &[(String, String)]) -> ParameterLayer {
    pairs
        .iter()
        .map(|(key, raw)| (key.clone(), ParamValue::from_cli(raw)))
        .collect()
}
