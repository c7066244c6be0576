//! Job template domain model

use crate::core::condition::ConditionalVariable;
use crate::core::params::ParameterDefaults;
use crate::core::step::{placeholders, StepTemplate, MATRIX_PREFIX};
use serde::{Deserialize, Serialize};

/// A single matrix dimension of a job template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixAxis {
    /// Axis name; steps reference the current value as `{{ matrix.<name> }}`
    pub name: String,

    /// Sequence parameter that supplies the axis values
    pub values_from: String,

    /// How many jobs of one expansion may run concurrently
    pub max_parallel: Option<usize>,
}

impl MatrixAxis {
    /// Binding name of the current axis value
    pub fn binding(&self) -> String {
        format!("{}{}", MATRIX_PREFIX, self.name)
    }
}

/// A reusable, parameterized job definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTemplate {
    /// Template name, also the stable prefix of generated job names
    pub name: String,

    /// Optional display name (interpolatable)
    pub display_name: Option<String>,

    /// Target platform label (interpolatable)
    pub platform: Option<String>,

    /// Agent pool image (interpolatable)
    pub pool: Option<String>,

    /// Declared parameters with their defaults
    pub parameters: ParameterDefaults,

    /// Variables evaluated per job after parameters are resolved
    pub variables: Vec<ConditionalVariable>,

    /// At most one matrix axis
    pub matrix: Option<MatrixAxis>,

    /// Steps in execution order
    pub steps: Vec<StepTemplate>,
}

impl JobTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            platform: None,
            pool: None,
            parameters: ParameterDefaults::new(),
            variables: Vec::new(),
            matrix: None,
            steps: Vec::new(),
        }
    }

    /// Every `matrix.*` name the template references, in order of appearance
    pub fn matrix_references(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .display_name
            .iter()
            .chain(self.platform.iter())
            .chain(self.pool.iter())
            .flat_map(|text| placeholders(text))
            .collect();
        for step in &self.steps {
            names.extend(step.referenced_names());
        }
        for variable in &self.variables {
            names.extend(variable.referenced_names().into_iter().map(str::to_string));
        }
        names.retain(|name| name.starts_with(MATRIX_PREFIX));
        names
    }
}
