//! Persistence layer for run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

pub use crate::core::ExecutionStatus;
use crate::core::{PipelineRun, RunState};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run ID
    pub run_id: Uuid,

    pub pipeline_name: String,

    pub status: ExecutionStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Stages whose jobs all succeeded
    pub completed_stages: usize,

    pub total_stages: usize,

    /// Name of the stage the run failed in
    pub failed_stage: Option<String>,

    /// Name of the job that failed first, when known
    pub failed_job: Option<String>,
}

impl RunSummary {
    /// Summarize a run of the given stages
    pub fn from_run(pipeline_name: &str, stage_names: &[String], run: &PipelineRun) -> Self {
        let (failed_stage, failed_job) = match &run.state {
            RunState::Failed { stage, job } => (stage_names.get(*stage).cloned(), job.clone()),
            _ => (None, None),
        };
        Self {
            run_id: run.run_id,
            pipeline_name: pipeline_name.to_string(),
            status: run.status(),
            started_at: run.started_at.unwrap_or_else(Utc::now),
            completed_at: run.completed_at,
            completed_stages: run.completed_stages,
            total_stages: run.total_stages,
            failed_stage,
            failed_job,
        }
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save (or replace) a run
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// Most recent runs first, optionally for one pipeline
    async fn list_runs(&self, pipeline_name: Option<&str>, limit: usize) -> Result<Vec<RunSummary>>;

    /// All pipeline names with recorded runs
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or `--no-history` runs)
#[derive(Default)]
pub struct InMemoryPersistence {
    runs: RwLock<HashMap<Uuid, RunSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        self.runs.write().await.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn list_runs(&self, pipeline_name: Option<&str>, limit: usize) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut result: Vec<RunSummary> = runs
            .values()
            .filter(|r| pipeline_name.map_or(true, |name| r.pipeline_name == name))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|r| r.pipeline_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn summary(pipeline: &str, minutes_ago: i64, status: ExecutionStatus) -> RunSummary {
        RunSummary {
            run_id: Uuid::new_v4(),
            pipeline_name: pipeline.to_string(),
            status,
            started_at: Utc::now() - Duration::minutes(minutes_ago),
            completed_at: None,
            completed_stages: 0,
            total_stages: 3,
            failed_stage: None,
            failed_job: None,
        }
    }

    #[test]
    fn test_summary_records_failing_stage_and_job() {
        let mut run = PipelineRun::new(3, 3);
        run.start().unwrap();
        run.stage_succeeded(0).unwrap();
        run.job_failed(1, Some("Build".to_string())).unwrap();

        let stages = vec!["Validate".to_string(), "Package".to_string(), "Deploy".to_string()];
        let summary = RunSummary::from_run("release", &stages, &run);
        assert_eq!(summary.status, ExecutionStatus::Failed);
        assert_eq!(summary.completed_stages, 1);
        assert_eq!(summary.failed_stage.as_deref(), Some("Package"));
        assert_eq!(summary.failed_job.as_deref(), Some("Build"));
    }

    #[tokio::test]
    async fn test_in_memory_history() {
        let store = InMemoryPersistence::new();
        let old = summary("release", 30, ExecutionStatus::Succeeded);
        let new = summary("release", 1, ExecutionStatus::Failed);
        let other = summary("nightly", 5, ExecutionStatus::Succeeded);
        for run in [&old, &new, &other] {
            store.save_run(run).await.unwrap();
        }

        let runs = store.list_runs(Some("release"), 10).await.unwrap();
        assert_eq!(runs.iter().map(|r| r.run_id).collect::<Vec<_>>(), vec![new.run_id, old.run_id]);
        assert_eq!(store.list_runs(None, 1).await.unwrap()[0].run_id, new.run_id);
        assert_eq!(store.load_run(other.run_id).await.unwrap(), Some(other.clone()));
        assert_eq!(store.list_pipelines().await.unwrap(), vec!["nightly", "release"]);
    }
}
