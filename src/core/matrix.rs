//! Matrix expansion of job templates
//!
//! One skeleton is produced per axis value. Skeletons carry the resolved job
//! name, the derived artifact and requirement-file names, and the runtime
//! parameter layer that binds them.

use crate::core::domain;
use crate::core::error::{ExpansionError, ExpansionResult};
use crate::core::params::{ParamValue, ParameterLayer, ParameterSet};
use crate::core::step::interpolate;
use crate::core::template::JobTemplate;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Runtime binding of the job name
pub const JOB_NAME: &str = "jobName";
/// Runtime binding of the freeze artifact name
pub const FREEZE_ARTIFACT: &str = "freezeArtifact";
/// Runtime binding of the freeze file name
pub const FREEZE_FILE: &str = "freezeFile";
/// Runtime binding of the requirements file name
pub const REQUIREMENTS_FILE: &str = "requirementsFile";

/// One value along a matrix dimension
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AxisValue(String);

impl AxisValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AxisValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Names derived from the job's parameters and its axis value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedNames {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freeze_artifact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freeze_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements_file: Option<String>,
}

/// `{freezeArtifactStem}{platform}{testRunType}{pyVersion}`
pub fn freeze_artifact_name(stem: &str, platform: &str, test_run_type: &str, py_version: &str) -> String {
    format!("{}{}{}{}", stem, platform, test_run_type, py_version)
}

/// `{freezeFileStem}-{jobNameComponent}{pyVersion}.txt`
pub fn freeze_file_name(stem: &str, job_name_component: &str, py_version: &str) -> String {
    format!("{}-{}{}.txt", stem, job_name_component, py_version)
}

/// `requirements-{pyVersion}.txt`
pub fn requirements_file_name(py_version: &str) -> String {
    format!("requirements-{}.txt", py_version)
}

/// A job instance before its steps are composed
#[derive(Debug, Clone)]
pub struct JobSkeleton<'t> {
    pub template: &'t JobTemplate,

    /// Resolved, stage-unique job name
    pub name: String,

    pub platform: String,

    pub test_run_type: String,

    pub axis_value: Option<AxisValue>,

    pub derived: DerivedNames,

    /// Identifies the jobs of one expansion (shared parallelism bound)
    pub matrix_group: String,

    pub max_parallel: Option<usize>,

    /// Highest-precedence parameter layer for this job
    pub runtime: ParameterLayer,
}

/// Expands a job template along its matrix axis
pub struct MatrixExpander;

impl MatrixExpander {
    /// Reject `matrix.*` references that do not name the declared axis
    pub fn check_axis_references(template: &JobTemplate) -> ExpansionResult<()> {
        let bound = template.matrix.as_ref().map(|axis| axis.binding());
        for reference in template.matrix_references() {
            if bound.as_deref() != Some(reference.as_str()) {
                return Err(ExpansionError::InvalidTemplate(match &bound {
                    Some(bound) => format!(
                        "job template '{}' references '{}' but its matrix axis is bound as '{}'",
                        template.name, reference, bound
                    ),
                    None => format!(
                        "job template '{}' references '{}' but declares no matrix axis",
                        template.name, reference
                    ),
                }));
            }
        }
        Ok(())
    }

    /// Axis values supplied by the template's values parameter
    ///
    /// A template without an axis expands exactly once, signalled by `None`.
    pub fn axis_values(template: &JobTemplate, base: &ParameterSet) -> ExpansionResult<Option<Vec<AxisValue>>> {
        let Some(axis) = &template.matrix else {
            return Ok(None);
        };

        match base.get(&axis.values_from) {
            Some(ParamValue::List(items)) => Ok(Some(items.iter().map(AxisValue::new).collect())),
            Some(other) => Err(ExpansionError::InvalidTemplate(format!(
                "matrix axis '{}' of job template '{}' takes its values from '{}', which is not a sequence (got {})",
                axis.name, template.name, axis.values_from, other
            ))),
            None => Err(ExpansionError::UnresolvedParameter {
                name: axis.values_from.clone(),
                scope: format!("job template '{}'", template.name),
            }),
        }
    }

    /// Produce one skeleton per axis value, preserving order
    ///
    /// `axis_values == None` means the template has no axis and yields a
    /// single skeleton. An empty list yields no skeletons.
    pub fn expand<'t>(
        template: &'t JobTemplate,
        base: &ParameterSet,
        axis_values: Option<&[AxisValue]>,
    ) -> ExpansionResult<Vec<JobSkeleton<'t>>> {
        Self::check_axis_references(template)?;

        let location = format!("job template '{}'", template.name);
        let platform = match &template.platform {
            Some(label) => interpolate(label, base, &location)?,
            None => base.render(domain::PLATFORM).unwrap_or_default(),
        };
        let test_run_type = base.render(domain::TEST_RUN_TYPE).unwrap_or_default();
        let job_name_component = format!("{}{}", platform, test_run_type);
        let matrix_group = format!("{}{}", template.name, job_name_component);
        let max_parallel = template.matrix.as_ref().and_then(|axis| axis.max_parallel);

        let values: Vec<Option<&AxisValue>> = match axis_values {
            Some(values) => values.iter().map(Some).collect(),
            None => vec![None],
        };

        let mut skeletons = Vec::with_capacity(values.len());
        for value in values {
            let suffix = value.map(AxisValue::as_str).unwrap_or_default();
            let name = format!("{}{}", matrix_group, suffix);

            let mut runtime = ParameterLayer::new();
            runtime.insert(JOB_NAME.to_string(), ParamValue::from(name.clone()));

            let mut derived = DerivedNames::default();
            if let (Some(axis), Some(value)) = (&template.matrix, value) {
                runtime.insert(axis.binding(), ParamValue::from(value.as_str()));

                if let Some(stem) = base.render(domain::FREEZE_ARTIFACT_STEM) {
                    derived.freeze_artifact =
                        Some(freeze_artifact_name(&stem, &platform, &test_run_type, value.as_str()));
                }
                if let Some(stem) = base.render(domain::FREEZE_FILE_STEM) {
                    derived.freeze_file = Some(freeze_file_name(&stem, &job_name_component, value.as_str()));
                }
                derived.requirements_file = Some(requirements_file_name(value.as_str()));
            }

            for (binding, derived_name) in [
                (FREEZE_ARTIFACT, &derived.freeze_artifact),
                (FREEZE_FILE, &derived.freeze_file),
                (REQUIREMENTS_FILE, &derived.requirements_file),
            ] {
                if let Some(derived_name) = derived_name {
                    runtime.insert(binding.to_string(), ParamValue::from(derived_name.clone()));
                }
            }

            debug!(job = %name, template = %template.name, "expanded job skeleton");

            skeletons.push(JobSkeleton {
                template,
                name,
                platform: platform.clone(),
                test_run_type: test_run_type.clone(),
                axis_value: value.cloned(),
                derived,
                matrix_group: matrix_group.clone(),
                max_parallel,
                runtime,
            });
        }

        Ok(skeletons)
    }
}
