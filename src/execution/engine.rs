//! Main execution engine - drives an expanded plan stage by stage

use crate::{
    core::{ExecutionStatus, Pipeline, PipelineRun, RunState, Stage, StateError},
    execution::{
        executor::{JobExecutor, JobResult, JobRunner},
        scheduler::{ExecutionScheduler, SchedulingStrategy},
    },
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during a run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        run_id: Uuid,
        pipeline_name: String,
        total_stages: usize,
        total_jobs: usize,
    },
    StageStarted {
        index: usize,
        stage: String,
        jobs: usize,
    },
    JobStarted {
        stage: String,
        job: String,
    },
    JobCompleted {
        stage: String,
        job: String,
        output: Vec<String>,
    },
    JobFailed {
        stage: String,
        job: String,
        error: String,
    },
    /// Aborted after a sibling failed in a fail-fast stage
    JobCancelled {
        stage: String,
        job: String,
    },
    StageCompleted {
        index: usize,
        stage: String,
    },
    StageFailed {
        index: usize,
        stage: String,
        job: Option<String>,
    },
    /// Never entered because an earlier stage failed
    StageSkipped {
        index: usize,
        stage: String,
    },
    PipelineCompleted {
        run_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

type Handlers = Arc<Mutex<Vec<EventHandler>>>;

async fn emit(handlers: &Handlers, event: ExecutionEvent) {
    let handlers = handlers.lock().await;
    for handler in handlers.iter() {
        handler(event.clone());
    }
}

/// Main pipeline execution engine
pub struct ExecutionEngine<E> {
    scheduler: ExecutionScheduler,
    runner: Arc<JobRunner<E>>,
    event_handlers: Handlers,
}

impl<E: JobExecutor + 'static> ExecutionEngine<E> {
    pub fn new(executor: E, strategy: SchedulingStrategy) -> Self {
        Self::with_runner(JobRunner::new(executor), strategy)
    }

    pub fn with_runner(runner: JobRunner<E>, strategy: SchedulingStrategy) -> Self {
        Self {
            scheduler: ExecutionScheduler::new(strategy),
            runner: Arc::new(runner),
            event_handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.lock().await.push(Arc::new(handler));
    }

    async fn emit_event(&self, event: ExecutionEvent) {
        emit(&self.event_handlers, event).await;
    }

    /// Execute the plan
    ///
    /// Stage i+1 is entered only after every job of stage i succeeded. The
    /// returned run records the failing stage and job, if any.
    pub async fn execute(&self, pipeline: &Pipeline) -> Result<PipelineRun, StateError> {
        let mut run = PipelineRun::new(pipeline.stages.len(), pipeline.total_jobs());
        let run_id = run.run_id;

        info!("Starting pipeline run: {} ({})", pipeline.name, run_id);
        self.emit_event(ExecutionEvent::PipelineStarted {
            run_id,
            pipeline_name: pipeline.name.clone(),
            total_stages: run.total_stages,
            total_jobs: run.total_jobs,
        })
        .await;

        run.start()?;
        let mut current = Some(0);

        while let Some(index) = current {
            let stage = &pipeline.stages[index];
            info!("Entering stage {} ({} jobs)", stage.name, stage.jobs.len());
            self.emit_event(ExecutionEvent::StageStarted {
                index,
                stage: stage.name.clone(),
                jobs: stage.jobs.len(),
            })
            .await;

            match self.run_stage(stage, &mut run).await {
                Ok(()) => {
                    self.emit_event(ExecutionEvent::StageCompleted {
                        index,
                        stage: stage.name.clone(),
                    })
                    .await;
                    current = run.stage_succeeded(index)?;
                }
                Err(job) => {
                    error!("Stage {} failed (job: {:?})", stage.name, job);
                    run.job_failed(index, job.clone())?;
                    self.emit_event(ExecutionEvent::StageFailed {
                        index,
                        stage: stage.name.clone(),
                        job,
                    })
                    .await;
                    current = None;
                }
            }
        }

        if let RunState::Failed { stage: failed, .. } = run.state {
            for (index, stage) in pipeline.stages.iter().enumerate().skip(failed + 1) {
                self.emit_event(ExecutionEvent::StageSkipped {
                    index,
                    stage: stage.name.clone(),
                })
                .await;
            }
        }

        let status = run.status();
        info!("Pipeline run finished: {} - {}", pipeline.name, run.state);
        self.emit_event(ExecutionEvent::PipelineCompleted { run_id, status }).await;

        Ok(run)
    }

    /// Run every job of a stage; `Err` carries the first failing job
    async fn run_stage(&self, stage: &Stage, run: &mut PipelineRun) -> Result<(), Option<String>> {
        let schedule = Arc::new(self.scheduler.plan_stage(stage));
        let mut tasks = JoinSet::new();

        for job in &stage.jobs {
            let job = job.clone();
            let stage_name = stage.name.clone();
            let runner = self.runner.clone();
            let schedule = schedule.clone();
            let handlers = self.event_handlers.clone();

            tasks.spawn(async move {
                let result = match schedule.acquire(&job).await {
                    Ok(_slot) => {
                        emit(
                            &handlers,
                            ExecutionEvent::JobStarted {
                                stage: stage_name,
                                job: job.name.clone(),
                            },
                        )
                        .await;
                        runner.run(&job).await
                    }
                    Err(e) => JobResult::Failed { error: e.to_string() },
                };
                (job.name, result)
            });
        }

        let mut finished: HashSet<String> = HashSet::new();
        let mut failure: Option<Option<String>> = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((job, JobResult::Succeeded { output })) => {
                    run.finished_jobs += 1;
                    finished.insert(job.clone());
                    self.emit_event(ExecutionEvent::JobCompleted {
                        stage: stage.name.clone(),
                        job,
                        output,
                    })
                    .await;
                }
                Ok((job, JobResult::Failed { error })) => {
                    run.finished_jobs += 1;
                    finished.insert(job.clone());
                    self.emit_event(ExecutionEvent::JobFailed {
                        stage: stage.name.clone(),
                        job: job.clone(),
                        error,
                    })
                    .await;
                    if failure.is_none() {
                        failure = Some(Some(job));
                        if stage.fail_fast {
                            warn!("Stage {} is fail-fast, aborting remaining jobs", stage.name);
                            tasks.abort_all();
                        }
                    }
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    error!("Job task in stage {} panicked: {}", stage.name, e);
                    run.finished_jobs += 1;
                    if failure.is_none() {
                        failure = Some(None);
                        if stage.fail_fast {
                            tasks.abort_all();
                        }
                    }
                }
            }
        }

        match failure {
            None => Ok(()),
            Some(job) => {
                for cancelled in stage.jobs.iter().filter(|j| !finished.contains(&j.name)) {
                    self.emit_event(ExecutionEvent::JobCancelled {
                        stage: stage.name.clone(),
                        job: cancelled.name.clone(),
                    })
                    .await;
                }
                Err(job)
            }
        }
    }
}
