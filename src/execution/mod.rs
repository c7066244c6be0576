//! Reference execution engine for expanded plans

pub mod engine;
pub mod executor;
pub mod scheduler;

pub use engine::{EventHandler, ExecutionEngine, ExecutionEvent};
pub use executor::{DryRunExecutor, ExecutorError, JobExecutor, JobOutcome, JobResult, JobRunner};
pub use scheduler::{ExecutionScheduler, SchedulingStrategy};
