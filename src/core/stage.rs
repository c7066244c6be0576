//! Stage composition
//!
//! A stage concatenates the concrete jobs of its job references, in order.

use crate::core::context::{render_layer, ExpansionContext};
use crate::core::error::{ExpansionError, ExpansionResult};
use crate::core::job::{ConcreteJob, JobComposer};
use crate::core::matrix::MatrixExpander;
use crate::core::params::{merge_layers, resolve, ParamValue, ParameterLayer};
use crate::core::template::JobTemplate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// Job templates by name
pub type TemplateRegistry = BTreeMap<String, JobTemplate>;

/// A reference from a stage to a job template, with caller overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReference {
    pub template: String,
    pub parameters: ParameterLayer,
}

impl JobReference {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            parameters: ParameterLayer::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// A stage as declared, before its jobs are expanded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDefinition {
    pub name: String,
    pub display_name: Option<String>,
    pub fail_fast: bool,
    pub parameters: ParameterLayer,
    /// Declared dependencies; empty means "the previous stage"
    pub depends_on: Vec<String>,
    pub jobs: Vec<JobReference>,
}

impl StageDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            fail_fast: true,
            parameters: ParameterLayer::new(),
            depends_on: Vec::new(),
            jobs: Vec::new(),
        }
    }

    pub fn with_job(mut self, job: JobReference) -> Self {
        self.jobs.push(job);
        self
    }
}

/// A composed stage of the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub fail_fast: bool,
    #[serde(default, skip_serializing_if = "ParameterLayer::is_empty")]
    pub parameters: ParameterLayer,
    /// As declared until the pipeline is chained, then the previous stage
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    pub jobs: Vec<ConcreteJob>,
}

impl Stage {
    pub fn job(&self, name: &str) -> Option<&ConcreteJob> {
        self.jobs.iter().find(|job| job.name == name)
    }
}

/// Composes stages from their definitions
pub struct StageComposer;

impl StageComposer {
    pub fn compose_stage(
        definition: &StageDefinition,
        templates: &TemplateRegistry,
        context: &ExpansionContext,
    ) -> ExpansionResult<Stage> {
        let stage_parameters = context.stage_parameters(&definition.name, &definition.parameters)?;
        let scope = context.layered(&stage_parameters);
        let mut jobs: Vec<ConcreteJob> = Vec::new();

        for (index, reference) in definition.jobs.iter().enumerate() {
            let template = templates.get(&reference.template).ok_or_else(|| {
                ExpansionError::InvalidTemplate(format!(
                    "stage '{}' references unknown job template '{}'",
                    definition.name, reference.template
                ))
            })?;

            let location = format!("job template '{}' in stage '{}'", template.name, definition.name);
            let reference_layer = render_layer(&reference.parameters, &scope, &location)?;
            let overrides = merge_layers([&scope, &reference_layer]);

            let base = resolve(&template.parameters, &overrides, &ParameterLayer::new(), &location)?;
            let axis_values = MatrixExpander::axis_values(template, &base)?;
            let mut skeletons = MatrixExpander::expand(template, &base, axis_values.as_deref())?;
            // each reference is its own expansion with its own parallelism bound
            for skeleton in &mut skeletons {
                skeleton.matrix_group = format!("{}#{}", skeleton.matrix_group, index);
            }
            if skeletons.is_empty() {
                debug!(stage = %definition.name, template = %template.name, "empty matrix, no jobs");
            }

            for skeleton in &skeletons {
                let params = resolve(&template.parameters, &overrides, &skeleton.runtime, &location)?;
                jobs.push(JobComposer::compose(skeleton, &params)?);
            }
        }

        let mut seen = HashSet::new();
        for job in &jobs {
            if !seen.insert(job.name.as_str()) {
                return Err(ExpansionError::DuplicateJobName {
                    job: job.name.clone(),
                    stage: definition.name.clone(),
                });
            }
        }

        info!(stage = %definition.name, jobs = jobs.len(), "composed stage");

        Ok(Stage {
            name: definition.name.clone(),
            display_name: definition.display_name.clone(),
            fail_fast: definition.fail_fast,
            parameters: stage_parameters,
            depends_on: definition.depends_on.clone(),
            jobs,
        })
    }
}
