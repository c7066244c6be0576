//! Job executor - the seam between the plan and whatever runs the steps

use crate::core::{ConcreteJob, StepKind};
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info};

/// Error types for job execution
#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    #[error("Step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// What a successful job reported
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutcome {
    /// One line per executed step
    pub output: Vec<String>,
}

/// Runs one concrete job and reports pass/fail
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn run(&self, job: &ConcreteJob) -> Result<JobOutcome, ExecutorError>;
}

/// Result of running a job through a [`JobRunner`]
#[derive(Debug, Clone)]
pub enum JobResult {
    Succeeded { output: Vec<String> },
    Failed { error: String },
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Succeeded { .. })
    }
}

/// Wraps an executor with a per-job timeout
pub struct JobRunner<E> {
    executor: E,
    timeout_secs: Option<u64>,
}

impl<E: JobExecutor> JobRunner<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            timeout_secs: None,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub async fn run(&self, job: &ConcreteJob) -> JobResult {
        info!("Running job: {}", job.name);

        let result = match self.timeout_secs {
            Some(secs) => match timeout(Duration::from_secs(secs), self.executor.run(job)).await {
                Ok(result) => result,
                Err(_) => Err(ExecutorError::Timeout(secs)),
            },
            None => self.executor.run(job).await,
        };

        match result {
            Ok(outcome) => {
                debug!("Job {} produced {} output lines", job.name, outcome.output.len());
                JobResult::Succeeded { output: outcome.output }
            }
            Err(e) => {
                error!("Job {} failed: {}", job.name, e);
                JobResult::Failed { error: e.to_string() }
            }
        }
    }
}

/// Executor that runs nothing
///
/// Every job succeeds except jobs that start with a guard step and jobs
/// named as simulated failures.
#[derive(Debug, Clone, Default)]
pub struct DryRunExecutor {
    failing_jobs: HashSet<String>,
    step_delay: Duration,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the named job fail at its last step
    pub fn with_failure(mut self, job: impl Into<String>) -> Self {
        self.failing_jobs.insert(job.into());
        self
    }

    /// Pretend each step takes this long
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }
}

#[async_trait]
impl JobExecutor for DryRunExecutor {
    async fn run(&self, job: &ConcreteJob) -> Result<JobOutcome, ExecutorError> {
        let mut output = Vec::with_capacity(job.steps.len());

        for (i, step) in job.steps.iter().enumerate() {
            if !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }

            if step.kind == StepKind::Fail {
                return Err(ExecutorError::StepFailed {
                    step: step.label.clone(),
                    message: step.args.get("message").cloned().unwrap_or_default(),
                });
            }

            let last = i + 1 == job.steps.len();
            if last && self.failing_jobs.contains(&job.name) {
                return Err(ExecutorError::StepFailed {
                    step: step.label.clone(),
                    message: "simulated failure".to_string(),
                });
            }

            output.push(format!("[{:?}] {}", step.kind, step.label));
        }

        if job.steps.is_empty() && self.failing_jobs.contains(&job.name) {
            return Err(ExecutorError::Internal(format!("simulated failure of job '{}'", job.name)));
        }

        Ok(JobOutcome { output })
    }
}
