//! pipeforge - expands parameterized CI job templates into gated multi-stage release plans

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use core::config::PipelineConfig;
pub use core::{
    ConcreteJob, ExecutionStatus, ExpansionError, ExpansionResult, ParamValue, ParameterLayer, Pipeline,
    PipelineDefinition, PipelineRun, RunState, Stage, TriggerEvent, TriggerPolicy,
};
pub use execution::{DryRunExecutor, ExecutionEngine, ExecutionEvent, JobExecutor, SchedulingStrategy};
