//! Pipeline definition files (YAML)

use crate::core::condition::{Condition, ConditionalVariable, VariableValue};
use crate::core::domain;
use crate::core::error::{ExpansionError, ExpansionResult};
use crate::core::matrix::MatrixExpander;
use crate::core::params::{ParamValue, ParameterDefaults, ParameterLayer};
use crate::core::pipeline::{Pipeline, PipelineDefinition};
use crate::core::stage::{JobReference, StageDefinition, TemplateRegistry};
use crate::core::step::{StepKind, StepTemplate};
use crate::core::template::{JobTemplate, MatrixAxis};
use crate::core::trigger::{Trigger, TriggerPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level pipeline definition loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Ordered triggers; the first satisfied one wins
    #[serde(default)]
    pub trigger: Vec<TriggerConfig>,

    /// Pipeline parameters; `~` means the invocation must supply it
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,

    /// Pipeline variables, visible to every stage and job
    #[serde(default)]
    pub variables: Vec<VariableConfig>,

    /// Template files, relative to the definition file
    #[serde(default)]
    pub templates: Vec<String>,

    /// Inline job templates
    #[serde(default)]
    pub job_templates: BTreeMap<String, JobTemplateConfig>,

    pub stages: Vec<StageConfig>,

    /// Job templates loaded from `templates` files
    #[serde(skip)]
    included: BTreeMap<String, JobTemplateConfig>,
}

/// One trigger entry; exactly one key must be set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<BranchFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual: Option<ManualConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchFilter {
    pub branches: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub cron: String,
    #[serde(default)]
    pub branches: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualConfig {
    #[serde(default)]
    pub required: Vec<String>,
}

/// A variable: either `value`, or `branches` with an optional `default`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableConfig {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub branches: Vec<BranchConfig>,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchConfig {
    pub when: String,
    pub value: String,
}

/// Job template as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTemplateConfig {
    /// Job-name prefix; defaults to the template's key
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub platform: Option<String>,

    #[serde(default)]
    pub pool: Option<String>,

    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,

    #[serde(default)]
    pub matrix: Option<MatrixConfig>,

    #[serde(default)]
    pub variables: Vec<VariableConfig>,

    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    /// Axis name, bound as `matrix.<axis>`
    pub axis: String,

    /// Sequence parameter supplying the values
    pub values: String,

    #[serde(default)]
    pub max_parallel: Option<usize>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    pub kind: StepKind,

    pub label: String,

    /// Condition expression; the step is dropped when it is false
    #[serde(default)]
    pub when: Option<String>,

    #[serde(default)]
    pub args: BTreeMap<String, String>,

    #[serde(default)]
    pub produces: Vec<String>,

    #[serde(default)]
    pub consumes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,

    #[serde(default)]
    pub display_name: Option<String>,

    /// Abort sibling jobs on the first failure
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,

    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,

    /// Only the immediately preceding stage is accepted
    #[serde(default)]
    pub depends_on: Vec<String>,

    pub jobs: Vec<JobRefConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRefConfig {
    pub template: String,

    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

fn default_fail_fast() -> bool {
    true
}

fn defaults_from_yaml(map: &BTreeMap<String, Value>, owner: &str) -> ExpansionResult<ParameterDefaults> {
    map.iter()
        .map(|(name, value)| {
            let value = ParamValue::from_yaml(value).map_err(|reason| {
                ExpansionError::InvalidTemplate(format!("parameter '{}' of {}: {}", name, owner, reason))
            })?;
            Ok((name.clone(), value))
        })
        .collect()
}

fn layer_from_yaml(map: &BTreeMap<String, Value>, owner: &str) -> ExpansionResult<ParameterLayer> {
    defaults_from_yaml(map, owner)?
        .into_iter()
        .map(|(name, value)| match value {
            Some(value) => Ok((name, value)),
            None => Err(ExpansionError::InvalidTemplate(format!(
                "parameter '{}' of {} has no value",
                name, owner
            ))),
        })
        .collect()
}

impl TriggerConfig {
    fn to_trigger(&self) -> ExpansionResult<Trigger> {
        match (&self.pull_request, &self.schedule, &self.manual) {
            (Some(pr), None, None) => Ok(Trigger::PullRequest {
                branches: pr.branches.clone(),
            }),
            (None, Some(schedule), None) => Ok(Trigger::Schedule {
                cron: schedule.cron.clone(),
                branches: schedule.branches.clone(),
            }),
            (None, None, Some(manual)) => Ok(Trigger::Manual {
                required: manual.required.clone(),
            }),
            _ => Err(ExpansionError::InvalidTemplate(
                "each trigger entry must set exactly one of pull_request, schedule, manual".to_string(),
            )),
        }
    }
}

impl VariableConfig {
    fn to_variable(&self) -> ExpansionResult<ConditionalVariable> {
        let value = match (&self.value, self.branches.is_empty()) {
            (Some(value), true) if self.default.is_none() => VariableValue::Plain(value.clone()),
            (None, true) if self.name == domain::PYPI_URL && self.default.is_none() => {
                return ConditionalVariable::pypi_url();
            }
            (None, false) => VariableValue::Branches {
                branches: self
                    .branches
                    .iter()
                    .map(|b| Ok((Condition::parse(&b.when)?, b.value.clone())))
                    .collect::<ExpansionResult<Vec<_>>>()?,
                default: self.default.clone(),
            },
            _ => {
                return Err(ExpansionError::InvalidTemplate(format!(
                    "variable '{}' must set either 'value' or 'branches' (with an optional 'default'); only '{}' may set neither",
                    self.name,
                    domain::PYPI_URL
                )))
            }
        };
        Ok(ConditionalVariable {
            name: self.name.clone(),
            value,
        })
    }
}

impl StepConfig {
    fn to_step(&self) -> ExpansionResult<StepTemplate> {
        let mut step = StepTemplate::new(self.kind, &self.label);
        if let Some(when) = &self.when {
            step = step.with_condition(Condition::parse(when)?);
        }
        step.args = self.args.clone();
        step.produces = self.produces.clone();
        step.consumes = self.consumes.clone();
        Ok(step)
    }
}

impl JobTemplateConfig {
    fn to_template(&self, key: &str) -> ExpansionResult<JobTemplate> {
        let mut template = JobTemplate::new(self.name.clone().unwrap_or_else(|| key.to_string()));
        let owner = format!("job template '{}'", key);
        template.display_name = self.display_name.clone();
        template.platform = self.platform.clone();
        template.pool = self.pool.clone();
        template.parameters = defaults_from_yaml(&self.parameters, &owner)?;
        template.variables = self
            .variables
            .iter()
            .map(VariableConfig::to_variable)
            .collect::<ExpansionResult<_>>()?;
        template.steps = self
            .steps
            .iter()
            .map(StepConfig::to_step)
            .collect::<ExpansionResult<_>>()?;

        if let Some(matrix) = &self.matrix {
            if !template.parameters.contains_key(&matrix.values) {
                return Err(ExpansionError::InvalidTemplate(format!(
                    "{} takes matrix values from undeclared parameter '{}'",
                    owner, matrix.values
                )));
            }
            template.matrix = Some(MatrixAxis {
                name: matrix.axis.clone(),
                values_from: matrix.values.clone(),
                max_parallel: matrix.max_parallel,
            });
        }

        MatrixExpander::check_axis_references(&template)?;
        Ok(template)
    }
}

impl StageConfig {
    fn to_definition(&self) -> ExpansionResult<StageDefinition> {
        let owner = format!("stage '{}'", self.name);
        let jobs = self
            .jobs
            .iter()
            .map(|job| {
                Ok(JobReference {
                    template: job.template.clone(),
                    parameters: layer_from_yaml(&job.parameters, &format!("{} job '{}'", owner, job.template))?,
                })
            })
            .collect::<ExpansionResult<_>>()?;
        Ok(StageDefinition {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            fail_fast: self.fail_fast,
            parameters: layer_from_yaml(&self.parameters, &owner)?,
            depends_on: self.depends_on.clone(),
            jobs,
        })
    }
}

impl PipelineConfig {
    /// Load a definition file and the template files it includes
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
        let mut config: PipelineConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse pipeline file {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for include in &config.templates {
            let template_path = base.join(include);
            let content = std::fs::read_to_string(&template_path)
                .with_context(|| format!("Failed to read template file {}", template_path.display()))?;
            let templates: BTreeMap<String, JobTemplateConfig> = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse template file {}", template_path.display()))?;
            for (name, template) in templates {
                if config.included.insert(name.clone(), template).is_some() {
                    anyhow::bail!("Job template '{}' is defined in more than one template file", name);
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a self-contained definition from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        if !config.templates.is_empty() {
            anyhow::bail!("Template files can only be included when loading from a file");
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the definition structure
    pub fn validate(&self) -> Result<()> {
        for name in self.included.keys() {
            if self.job_templates.contains_key(name) {
                anyhow::bail!("Job template '{}' is defined both inline and in a template file", name);
            }
        }
        self.definition()?;
        Ok(())
    }

    /// All job template configurations, inline and included
    pub fn job_template_configs(&self) -> impl Iterator<Item = (&String, &JobTemplateConfig)> {
        self.job_templates.iter().chain(self.included.iter())
    }

    /// Convert to the domain model
    pub fn definition(&self) -> ExpansionResult<PipelineDefinition> {
        let trigger = TriggerPolicy::new(
            self.trigger
                .iter()
                .map(TriggerConfig::to_trigger)
                .collect::<ExpansionResult<_>>()?,
        )?;

        let templates: TemplateRegistry = self
            .job_template_configs()
            .map(|(key, template)| Ok((key.clone(), template.to_template(key)?)))
            .collect::<ExpansionResult<_>>()?;

        let stages = self
            .stages
            .iter()
            .map(StageConfig::to_definition)
            .collect::<ExpansionResult<Vec<_>>>()?;

        for stage in &stages {
            for job in &stage.jobs {
                if !templates.contains_key(&job.template) {
                    return Err(ExpansionError::InvalidTemplate(format!(
                        "stage '{}' references unknown job template '{}'",
                        stage.name, job.template
                    )));
                }
            }
        }

        Ok(PipelineDefinition {
            name: self.name.clone(),
            trigger,
            parameters: defaults_from_yaml(&self.parameters, &format!("pipeline '{}'", self.name))?,
            variables: self
                .variables
                .iter()
                .map(VariableConfig::to_variable)
                .collect::<ExpansionResult<_>>()?,
            templates,
            stages,
        })
    }

    /// Expand into a plan for the given invocation parameters
    pub fn expand(&self, invocation: &ParameterLayer) -> ExpansionResult<Pipeline> {
        self.definition()?.expand(invocation)
    }
}
