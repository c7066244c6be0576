//! Step templates and placeholder interpolation

use crate::core::condition::Condition;
use crate::core::error::{ExpansionError, ExpansionResult};
use crate::core::params::ParameterSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Namespace under which matrix axis values are bound
pub const MATRIX_PREFIX: &str = "matrix.";

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}").expect("placeholder regex is valid")
    })
}

/// Names referenced by `{{ name }}` placeholders, in order of appearance
pub fn placeholders(text: &str) -> Vec<String> {
    placeholder_regex()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Replace every `{{ name }}` placeholder using `lookup`
///
/// Any placeholder `lookup` cannot resolve fails with `UnboundPlaceholder`.
pub fn interpolate_with<F>(text: &str, lookup: F, location: &str) -> ExpansionResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut rendered = String::with_capacity(text.len());
    let mut last = 0;

    for caps in placeholder_regex().captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = name.as_str();
        let value = lookup(name).ok_or_else(|| ExpansionError::UnboundPlaceholder {
            placeholder: name.to_string(),
            location: location.to_string(),
        })?;
        rendered.push_str(&text[last..whole.start()]);
        rendered.push_str(&value);
        last = whole.end();
    }

    rendered.push_str(&text[last..]);
    Ok(rendered)
}

/// Interpolate against a resolved parameter set
pub fn interpolate(text: &str, params: &ParameterSet, location: &str) -> ExpansionResult<String> {
    interpolate_with(text, |name| params.render(name), location)
}

/// What a step does when the external executor runs it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Run a shell script
    Script,
    /// Install a tool (e.g. a python version) on the agent
    InstallTool,
    /// Publish a result or artifact
    Publish,
    /// Fetch an artifact published by an earlier stage
    Download,
    /// Opaque external task
    Task,
    /// Unconditionally fail the job
    Fail,
}

/// One unit of work inside a job template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTemplate {
    pub kind: StepKind,

    /// Display label (interpolatable)
    pub label: String,

    /// Step is dropped from the job when this evaluates false
    pub condition: Option<Condition>,

    /// Argument name -> interpolatable value
    pub args: BTreeMap<String, String>,

    /// Artifacts this step makes available to later steps of the same job
    pub produces: Vec<String>,

    /// Artifacts that must be produced by an earlier step of the same job
    pub consumes: Vec<String>,
}

impl StepTemplate {
    pub fn new(kind: StepKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            condition: None,
            args: BTreeMap::new(),
            produces: Vec::new(),
            consumes: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn producing(mut self, artifact: impl Into<String>) -> Self {
        self.produces.push(artifact.into());
        self
    }

    pub fn consuming(mut self, artifact: impl Into<String>) -> Self {
        self.consumes.push(artifact.into());
        self
    }

    /// Whether the step survives expansion for these parameters
    pub fn is_included(&self, params: &ParameterSet) -> ExpansionResult<bool> {
        match &self.condition {
            Some(condition) => condition.evaluate(params),
            None => Ok(true),
        }
    }

    /// Every name referenced by placeholders or the condition
    pub fn referenced_names(&self) -> Vec<String> {
        let mut names = placeholders(&self.label);
        for value in self.args.values() {
            names.extend(placeholders(value));
        }
        for artifact in self.produces.iter().chain(self.consumes.iter()) {
            names.extend(placeholders(artifact));
        }
        if let Some(condition) = &self.condition {
            names.extend(condition.referenced_names().into_iter().map(str::to_string));
        }
        names
    }
}
