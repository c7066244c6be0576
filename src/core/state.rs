//! Execution state models
//!
//! `RunState` is the stage-gating state machine: a stage is entered only
//! after every job of the previous stage succeeded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Overall run status, as recorded in run history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ExecutionStatus::Pending),
            "running" => Some(ExecutionStatus::Running),
            "succeeded" => Some(ExecutionStatus::Succeeded),
            "failed" => Some(ExecutionStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("Run already started")]
    AlreadyStarted,

    #[error("Run has no stages")]
    NoStages,

    #[error("Stage {stage} is not running (state: {state})")]
    StageNotRunning { stage: usize, state: String },

    #[error("Run is finished (state: {0})")]
    Finished(String),
}

/// Stage-gating state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Running { stage: usize },
    Succeeded,
    Failed { stage: usize, job: Option<String> },
}

impl RunState {
    pub fn status(&self) -> ExecutionStatus {
        match self {
            RunState::Pending => ExecutionStatus::Pending,
            RunState::Running { .. } => ExecutionStatus::Running,
            RunState::Succeeded => ExecutionStatus::Succeeded,
            RunState::Failed { .. } => ExecutionStatus::Failed,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed { .. })
    }

    /// `Pending -> Running(0)`
    pub fn start(&mut self, total_stages: usize) -> Result<(), StateError> {
        if self.is_finished() {
            return Err(StateError::Finished(self.to_string()));
        }
        if matches!(self, RunState::Running { .. }) {
            return Err(StateError::AlreadyStarted);
        }
        if total_stages == 0 {
            return Err(StateError::NoStages);
        }
        *self = RunState::Running { stage: 0 };
        Ok(())
    }

    /// `Running(i) -> Running(i+1)`, or `Succeeded` after the last stage
    ///
    /// Returns the index of the next stage to enter, if any.
    pub fn stage_succeeded(&mut self, stage: usize, total_stages: usize) -> Result<Option<usize>, StateError> {
        self.expect_running(stage)?;
        if stage + 1 < total_stages {
            *self = RunState::Running { stage: stage + 1 };
            Ok(Some(stage + 1))
        } else {
            *self = RunState::Succeeded;
            Ok(None)
        }
    }

    /// `Running(i) -> Failed { i, job }`
    pub fn job_failed(&mut self, stage: usize, job: Option<String>) -> Result<(), StateError> {
        self.expect_running(stage)?;
        *self = RunState::Failed { stage, job };
        Ok(())
    }

    fn expect_running(&self, stage: usize) -> Result<(), StateError> {
        match self {
            RunState::Running { stage: current } if *current == stage => Ok(()),
            RunState::Running { .. } | RunState::Pending => Err(StateError::StageNotRunning {
                stage,
                state: self.to_string(),
            }),
            finished => Err(StateError::Finished(finished.to_string())),
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Pending => write!(f, "pending"),
            RunState::Running { stage } => write!(f, "running stage {}", stage),
            RunState::Succeeded => write!(f, "succeeded"),
            RunState::Failed { stage, job: Some(job) } => write!(f, "failed in stage {} (job {})", stage, job),
            RunState::Failed { stage, job: None } => write!(f, "failed in stage {}", stage),
        }
    }
}

/// Progress of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique run ID
    pub run_id: Uuid,

    pub state: RunState,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    pub total_stages: usize,

    /// Stages whose jobs all succeeded
    pub completed_stages: usize,

    pub total_jobs: usize,

    /// Jobs in a terminal state
    pub finished_jobs: usize,
}

impl PipelineRun {
    pub fn new(total_stages: usize, total_jobs: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: RunState::Pending,
            started_at: None,
            completed_at: None,
            total_stages,
            completed_stages: 0,
            total_jobs,
            finished_jobs: 0,
        }
    }

    pub fn start(&mut self) -> Result<(), StateError> {
        self.state.start(self.total_stages)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn stage_succeeded(&mut self, stage: usize) -> Result<Option<usize>, StateError> {
        let next = self.state.stage_succeeded(stage, self.total_stages)?;
        self.completed_stages += 1;
        if next.is_none() {
            self.completed_at = Some(Utc::now());
        }
        Ok(next)
    }

    pub fn job_failed(&mut self, stage: usize, job: Option<String>) -> Result<(), StateError> {
        self.state.job_failed(stage, job)?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn status(&self) -> ExecutionStatus {
        self.state.status()
    }

    /// Fraction of jobs in a terminal state (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_jobs == 0 {
            return 0.0;
        }
        self.finished_jobs as f64 / self.total_jobs as f64
    }
}
