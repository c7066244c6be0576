//! Pipeline domain model
//!
//! A pipeline is an ordered, non-empty list of stages forming a single
//! linear dependency chain.

use crate::core::condition::ConditionalVariable;
use crate::core::context::ExpansionContext;
use crate::core::error::{ExpansionError, ExpansionResult};
use crate::core::job::ConcreteJob;
use crate::core::params::{ParameterDefaults, ParameterLayer, ParameterSet};
use crate::core::stage::{Stage, StageComposer, StageDefinition, TemplateRegistry};
use crate::core::trigger::TriggerPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

/// A pipeline as declared: templates and stage definitions, not yet expanded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDefinition {
    pub name: String,
    pub trigger: TriggerPolicy,
    pub parameters: ParameterDefaults,
    pub variables: Vec<ConditionalVariable>,
    pub templates: TemplateRegistry,
    pub stages: Vec<StageDefinition>,
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trigger: TriggerPolicy::default(),
            parameters: ParameterDefaults::new(),
            variables: Vec::new(),
            templates: TemplateRegistry::new(),
            stages: Vec::new(),
        }
    }

    /// Expand every stage into the final plan
    ///
    /// Invocation parameters required by the trigger policy or declared
    /// without a default are checked before any stage is composed.
    pub fn expand(&self, invocation: &ParameterLayer) -> ExpansionResult<Pipeline> {
        for name in self.trigger.required_parameters() {
            if !invocation.contains_key(name) {
                return Err(ExpansionError::UnresolvedParameter {
                    name: name.to_string(),
                    scope: format!("pipeline '{}' (required by manual trigger)", self.name),
                });
            }
        }

        let context = ExpansionContext::new(&self.name, &self.parameters, invocation, &self.variables)?;

        let stages = self
            .stages
            .iter()
            .map(|stage| StageComposer::compose_stage(stage, &self.templates, &context))
            .collect::<ExpansionResult<Vec<_>>>()?;

        let pipeline = compose_pipeline(&self.name, self.trigger.clone(), context.scope().clone(), stages)?;
        info!(
            pipeline = %pipeline.name,
            stages = pipeline.stages.len(),
            jobs = pipeline.total_jobs(),
            "expanded pipeline"
        );
        Ok(pipeline)
    }
}

/// The expanded plan handed to an executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,

    #[serde(default, skip_serializing_if = "TriggerPolicy::is_empty")]
    pub trigger: TriggerPolicy,

    /// Pipeline parameters and variables the plan was expanded with
    pub parameters: ParameterSet,

    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn total_jobs(&self) -> usize {
        self.stages.iter().map(|s| s.jobs.len()).sum()
    }

    /// Every job with the index of its stage, in execution order
    pub fn jobs(&self) -> impl Iterator<Item = (usize, &ConcreteJob)> {
        self.stages
            .iter()
            .enumerate()
            .flat_map(|(i, stage)| stage.jobs.iter().map(move |job| (i, job)))
    }
}

/// Chain composed stages into a plan
///
/// Rejects an empty stage list, duplicate stage names, and any declared
/// dependency other than the immediately preceding stage. Each stage then
/// records its implicit dependency on the previous one.
pub fn compose_pipeline(
    name: &str,
    trigger: TriggerPolicy,
    parameters: ParameterSet,
    mut stages: Vec<Stage>,
) -> ExpansionResult<Pipeline> {
    if stages.is_empty() {
        return Err(ExpansionError::InvalidTemplate(format!(
            "pipeline '{}' has no stages",
            name
        )));
    }

    let mut seen = HashSet::new();
    for stage in &stages {
        if !seen.insert(stage.name.clone()) {
            return Err(ExpansionError::InvalidTemplate(format!(
                "pipeline '{}' declares stage '{}' more than once",
                name, stage.name
            )));
        }
    }

    let mut previous: Option<String> = None;
    for stage in &mut stages {
        let declared_ok = match (&previous, stage.depends_on.as_slice()) {
            (_, []) => true,
            (Some(prev), [only]) => only == prev,
            _ => false,
        };
        if !declared_ok {
            return Err(ExpansionError::InvalidTemplate(format!(
                "stage '{}' depends on [{}]; stages may only depend on the immediately preceding stage{}",
                stage.name,
                stage.depends_on.join(", "),
                previous
                    .as_ref()
                    .map(|p| format!(" ('{}')", p))
                    .unwrap_or_else(|| " (it is the first stage)".to_string())
            )));
        }
        stage.depends_on = previous.iter().cloned().collect();
        previous = Some(stage.name.clone());
    }

    Ok(Pipeline {
        name: name.to_string(),
        trigger,
        parameters,
        stages,
    })
}
