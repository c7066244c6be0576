//! Expansion error taxonomy
//!
//! Every error aborts expansion of the whole pipeline; no partial plan is
//! ever returned.

use thiserror::Error;

/// Errors raised while expanding templates into a pipeline plan
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpansionError {
    /// A declared parameter has no value from any layer
    #[error("Unresolved parameter '{name}' in {scope}")]
    UnresolvedParameter { name: String, scope: String },

    /// An interpolation references a name absent from the parameter set
    #[error("Unbound placeholder '{{{{ {placeholder} }}}}' in {location}")]
    UnboundPlaceholder { placeholder: String, location: String },

    /// Structural problem with a template or the stage graph
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    /// A condition expression could not be parsed or evaluated
    #[error("Malformed condition '{expression}': {reason}")]
    MalformedCondition { expression: String, reason: String },

    /// More than one branch of a conditional variable matched
    #[error("Ambiguous condition for variable '{variable}': branches {branches:?} all match")]
    AmbiguousCondition { variable: String, branches: Vec<String> },

    /// Two jobs in the same stage resolved to the same name
    #[error("Duplicate job name '{job}' in stage '{stage}'")]
    DuplicateJobName { job: String, stage: String },

    /// A step consumes an artifact no earlier step of the job produces
    #[error("Step '{step}' in job '{job}' consumes '{artifact}' which no earlier step produces")]
    MissingDependency { job: String, step: String, artifact: String },

    /// A recognized parameter holds a value outside its domain
    #[error("Invalid value '{value}' for parameter '{name}' (expected one of: {expected})")]
    InvalidParameterValue { name: String, value: String, expected: String },
}

impl ExpansionError {
    pub(crate) fn malformed(expression: &str, reason: impl Into<String>) -> Self {
        ExpansionError::MalformedCondition {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for expansion operations
pub type ExpansionResult<T> = std::result::Result<T, ExpansionError>;
