//! Trigger policy - when a pipeline runs

use crate::core::error::{ExpansionError, ExpansionResult};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One way a pipeline can be started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Pull requests targeting a matching branch
    PullRequest { branches: Vec<String> },
    /// Cron schedule, optionally restricted to branches
    Schedule {
        cron: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        branches: Vec<String>,
    },
    /// Explicit invocation with required parameters
    Manual {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        required: Vec<String>,
    },
}

impl Trigger {
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::PullRequest { .. } => "pull_request",
            Trigger::Schedule { .. } => "schedule",
            Trigger::Manual { .. } => "manual",
        }
    }

    fn validate(&self) -> ExpansionResult<()> {
        let branches = match self {
            Trigger::PullRequest { branches } => branches,
            Trigger::Schedule { cron, branches } => {
                validate_cron(cron).map_err(|reason| {
                    ExpansionError::InvalidTemplate(format!("schedule trigger cron '{}': {}", cron, reason))
                })?;
                branches
            }
            Trigger::Manual { .. } => return Ok(()),
        };
        for branch in branches {
            Pattern::new(branch).map_err(|e| {
                ExpansionError::InvalidTemplate(format!("invalid branch pattern '{}': {}", branch, e))
            })?;
        }
        Ok(())
    }

    fn accepts(&self, event: &TriggerEvent) -> bool {
        match (self, event) {
            (Trigger::PullRequest { branches }, TriggerEvent::PullRequest { target_branch }) => {
                branch_matches(branches, target_branch)
            }
            (Trigger::Schedule { branches, .. }, TriggerEvent::Schedule { branch }) => {
                branches.is_empty() || branch_matches(branches, branch)
            }
            (Trigger::Manual { .. }, TriggerEvent::Manual) => true,
            _ => false,
        }
    }
}

/// Name and inclusive bounds of each cron field
const CRON_FIELDS: [(&str, u32, u32); 5] = [
    ("minute", 0, 59),
    ("hour", 0, 23),
    ("day of month", 1, 31),
    ("month", 1, 12),
    ("day of week", 0, 7),
];

/// Five numeric fields, each a comma list of `*`, `N` or `N-M` with an optional `/step`
fn validate_cron(cron: &str) -> Result<(), String> {
    let fields: Vec<&str> = cron.split_whitespace().collect();
    if fields.len() != CRON_FIELDS.len() {
        return Err(format!("expected 5 fields, found {}", fields.len()));
    }
    for (field, (name, min, max)) in fields.iter().zip(CRON_FIELDS) {
        for item in field.split(',') {
            cron_item(item, min, max).map_err(|reason| format!("{} field '{}': {}", name, field, reason))?;
        }
    }
    Ok(())
}

fn cron_item(item: &str, min: u32, max: u32) -> Result<(), String> {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (item, None),
    };
    if let Some(step) = step {
        match step.parse::<u32>() {
            Ok(n) if n > 0 => {}
            _ => return Err(format!("step '{}' is not a positive number", step)),
        }
    }
    if range == "*" {
        return Ok(());
    }
    let (low, high) = range.split_once('-').unwrap_or((range, range));
    let low = cron_number(low, min, max)?;
    let high = cron_number(high, min, max)?;
    if low > high {
        return Err(format!("range '{}' runs backwards", range));
    }
    Ok(())
}

fn cron_number(raw: &str, min: u32, max: u32) -> Result<u32, String> {
    let n: u32 = raw.parse().map_err(|_| format!("'{}' is not a number", raw))?;
    if n < min || n > max {
        return Err(format!("{} is outside {}-{}", n, min, max));
    }
    Ok(n)
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::PullRequest { branches } => write!(f, "pull_request [{}]", branches.join(", ")),
            Trigger::Schedule { cron, branches } if branches.is_empty() => write!(f, "schedule '{}'", cron),
            Trigger::Schedule { cron, branches } => write!(f, "schedule '{}' [{}]", cron, branches.join(", ")),
            Trigger::Manual { required } if required.is_empty() => write!(f, "manual"),
            Trigger::Manual { required } => write!(f, "manual (requires {})", required.join(", ")),
        }
    }
}

fn normalize_branch(branch: &str) -> &str {
    branch.strip_prefix("refs/heads/").unwrap_or(branch)
}

fn branch_matches(patterns: &[String], branch: &str) -> bool {
    let branch = normalize_branch(branch);
    patterns
        .iter()
        .filter_map(|p| Pattern::new(normalize_branch(p)).ok())
        .any(|p| p.matches(branch))
}

/// Something that happened and may start the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    PullRequest { target_branch: String },
    Schedule { branch: String },
    Manual,
}

/// Ordered triggers of a pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerPolicy {
    triggers: Vec<Trigger>,
}

impl TriggerPolicy {
    pub fn new(triggers: Vec<Trigger>) -> ExpansionResult<Self> {
        for trigger in &triggers {
            trigger.validate()?;
        }
        Ok(Self { triggers })
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// First trigger satisfied by the event, in declaration order
    pub fn matching(&self, event: &TriggerEvent) -> Option<&Trigger> {
        self.triggers.iter().find(|t| t.accepts(event))
    }

    /// Whether the event starts the pipeline
    ///
    /// Manual invocation is always possible, even with no manual trigger declared.
    pub fn fires(&self, event: &TriggerEvent) -> bool {
        matches!(event, TriggerEvent::Manual) || self.matching(event).is_some()
    }

    /// Parameters that every invocation must supply
    pub fn required_parameters(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for trigger in &self.triggers {
            if let Trigger::Manual { required } = trigger {
                for name in required {
                    if !names.contains(&name.as_str()) {
                        names.push(name);
                    }
                }
            }
        }
        names
    }
}
