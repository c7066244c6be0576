//! Core domain models for pipeforge
//!
//! This module defines the template model, the expansion pipeline that
//! turns templates into concrete jobs and stages, and the run state machine.

pub mod condition;
pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod job;
pub mod matrix;
pub mod params;
pub mod pipeline;
pub mod stage;
pub mod state;
pub mod step;
pub mod template;
pub mod trigger;

pub use error::{ExpansionError, ExpansionResult};
pub use job::{ConcreteJob, ConcreteStep};
pub use params::{ParamValue, ParameterLayer, ParameterSet};
pub use pipeline::*;
pub use stage::*;
pub use state::*;
pub use step::{StepKind, StepTemplate};
pub use trigger::*;
