//! Execution scheduler - parallelism slots for the jobs of one stage

use crate::core::{ConcreteJob, Stage};
use crate::execution::executor::ExecutorError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Strategy for scheduling the jobs of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// One job of the stage at a time
    Sequential,

    /// All jobs at once, bounded only by each matrix group's `max_parallel`
    #[default]
    Parallel,

    /// At most N jobs of the stage at once, plus the per-group bounds
    LimitedParallel(usize),
}

/// Builds per-stage schedules
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionScheduler {
    strategy: SchedulingStrategy,
}

impl ExecutionScheduler {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// One semaphore per bounded matrix group, plus an optional stage-wide one
    pub fn plan_stage(&self, stage: &Stage) -> StageSchedule {
        let stage_limit = match self.strategy {
            SchedulingStrategy::Sequential => Some(1),
            SchedulingStrategy::Parallel => None,
            SchedulingStrategy::LimitedParallel(max) => Some(max.max(1)),
        };

        let mut groups = HashMap::new();
        for job in &stage.jobs {
            if let Some(max) = job.max_parallel {
                groups
                    .entry(job.matrix_group.clone())
                    .or_insert_with(|| Arc::new(Semaphore::new(max.max(1))));
            }
        }

        StageSchedule {
            stage: stage_limit.map(|n| Arc::new(Semaphore::new(n))),
            groups,
        }
    }
}

/// Parallelism bounds for one stage
#[derive(Debug)]
pub struct StageSchedule {
    stage: Option<Arc<Semaphore>>,
    groups: HashMap<String, Arc<Semaphore>>,
}

/// Held while a job runs; dropping it frees the slot
#[derive(Debug)]
pub struct Slot {
    _group: Option<OwnedSemaphorePermit>,
    _stage: Option<OwnedSemaphorePermit>,
}

impl StageSchedule {
    /// Wait for a slot for this job
    ///
    /// The group permit is taken before the stage permit so that a job
    /// blocked on its group never holds a stage-wide slot.
    pub async fn acquire(&self, job: &ConcreteJob) -> Result<Slot, ExecutorError> {
        let group = match self.groups.get(&job.matrix_group) {
            Some(semaphore) => Some(
                semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| ExecutorError::Internal(e.to_string()))?,
            ),
            None => None,
        };
        let stage = match &self.stage {
            Some(semaphore) => Some(
                semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| ExecutorError::Internal(e.to_string()))?,
            ),
            None => None,
        };
        Ok(Slot {
            _group: group,
            _stage: stage,
        })
    }

    /// Free slots of a bounded matrix group
    pub fn available_slots(&self, group: &str) -> Option<usize> {
        self.groups.get(group).map(|s| s.available_permits())
    }

    pub fn has_stage_limit(&self) -> bool {
        self.stage.is_some()
    }
}
