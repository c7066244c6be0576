//! Job composition
//!
//! Turns a matrix skeleton plus its resolved parameters into a concrete job:
//! variables are selected, false-conditioned steps are dropped, every string
//! is interpolated, and artifact flow inside the job is checked.

use crate::core::context::bind_variables;
use crate::core::domain::{self, ClosedDomain, TestRunType};
use crate::core::error::{ExpansionError, ExpansionResult};
use crate::core::matrix::{AxisValue, DerivedNames, JobSkeleton};
use crate::core::params::ParameterSet;
use crate::core::step::{interpolate, StepKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// A fully interpolated step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcreteStep {
    pub kind: StepKind,
    pub label: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub produces: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumes: Vec<String>,
}

impl ConcreteStep {
    /// Step that fails the job as soon as it runs
    pub fn guard(message: impl Into<String>) -> Self {
        let mut args = BTreeMap::new();
        args.insert("message".to_string(), message.into());
        Self {
            kind: StepKind::Fail,
            label: "Validate test run type".to_string(),
            args,
            produces: Vec::new(),
            consumes: Vec::new(),
        }
    }
}

/// One job of the final plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcreteJob {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub template: String,
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis_value: Option<AxisValue>,
    pub matrix_group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,
    #[serde(default)]
    pub derived: DerivedNames,
    /// Bindings owned by this job
    pub parameters: ParameterSet,
    pub steps: Vec<ConcreteStep>,
}

impl ConcreteJob {
    /// Whether the job starts with a failing guard step
    pub fn is_guarded(&self) -> bool {
        self.steps.first().is_some_and(|s| s.kind == StepKind::Fail)
    }
}

/// Composes concrete jobs from skeletons
pub struct JobComposer;

impl JobComposer {
    pub fn compose(skeleton: &JobSkeleton<'_>, params: &ParameterSet) -> ExpansionResult<ConcreteJob> {
        let template = skeleton.template;
        let job_location = format!("job '{}'", skeleton.name);
        let params = bind_variables(params, &template.variables, &job_location)?;

        let mut steps = Vec::with_capacity(template.steps.len() + 1);

        if let Some(value) = params.get(domain::TEST_RUN_TYPE) {
            if domain::parse_value::<TestRunType>(domain::TEST_RUN_TYPE, value).is_err() {
                debug!(job = %skeleton.name, test_run_type = %value, "inserting guard step");
                steps.push(ConcreteStep::guard(format!(
                    "Invalid testRunType '{}' (expected one of: {})",
                    value,
                    TestRunType::expected()
                )));
            }
        }

        let mut produced: HashSet<String> = HashSet::new();

        for step in &template.steps {
            if !step.is_included(&params)? {
                debug!(job = %skeleton.name, step = %step.label, "condition false, step dropped");
                continue;
            }

            let label = interpolate(&step.label, &params, &job_location)?;
            let location = format!("job '{}', step '{}'", skeleton.name, label);

            let args = step
                .args
                .iter()
                .map(|(k, v)| interpolate(v, &params, &location).map(|rendered| (k.clone(), rendered)))
                .collect::<ExpansionResult<BTreeMap<_, _>>>()?;
            let consumes = step
                .consumes
                .iter()
                .map(|a| interpolate(a, &params, &location))
                .collect::<ExpansionResult<Vec<_>>>()?;
            let produces = step
                .produces
                .iter()
                .map(|a| interpolate(a, &params, &location))
                .collect::<ExpansionResult<Vec<_>>>()?;

            for artifact in &consumes {
                if !produced.contains(artifact) {
                    return Err(ExpansionError::MissingDependency {
                        job: skeleton.name.clone(),
                        step: label,
                        artifact: artifact.clone(),
                    });
                }
            }
            produced.extend(produces.iter().cloned());

            steps.push(ConcreteStep {
                kind: step.kind,
                label,
                args,
                produces,
                consumes,
            });
        }

        let display_name = template
            .display_name
            .as_ref()
            .map(|d| interpolate(d, &params, &job_location))
            .transpose()?;
        let pool = template
            .pool
            .as_ref()
            .map(|p| interpolate(p, &params, &job_location))
            .transpose()?;

        Ok(ConcreteJob {
            name: skeleton.name.clone(),
            display_name,
            template: template.name.clone(),
            platform: skeleton.platform.clone(),
            pool,
            axis_value: skeleton.axis_value.clone(),
            matrix_group: skeleton.matrix_group.clone(),
            max_parallel: skeleton.max_parallel,
            derived: skeleton.derived.clone(),
            parameters: params,
            steps,
        })
    }
}
