//! Parameter resolution
//!
//! A [`ParameterSet`] is built once per job instance from three ordered
//! layers: template defaults, caller overrides, and runtime (per matrix
//! element) values. Later layers win. The set is immutable once built.

use crate::core::domain;
use crate::core::error::{ExpansionError, ExpansionResult};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A single parameter value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Str(String),
    List(Vec<String>),
}

impl ParamValue {
    /// Convert a YAML value. `null` means "no value".
    pub fn from_yaml(value: &Value) -> Result<Option<Self>, String> {
        match value {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(ParamValue::Bool(*b))),
            Value::String(s) => Ok(Some(ParamValue::Str(s.clone()))),
            Value::Number(n) => Ok(Some(ParamValue::Str(n.to_string()))),
            Value::Sequence(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    Value::Number(n) => Ok(n.to_string()),
                    Value::Bool(b) => Ok(b.to_string()),
                    other => Err(format!("sequence items must be scalars, got {:?}", other)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(|list| Some(ParamValue::List(list))),
            Value::Mapping(_) => Err("mappings are not valid parameter values".to_string()),
            Value::Tagged(tagged) => Self::from_yaml(&tagged.value),
        }
    }

    /// Parse a command-line value: `true`/`false` become booleans and
    /// `[a,b]` becomes a list.
    pub fn from_cli(raw: &str) -> Self {
        match raw {
            "true" => ParamValue::Bool(true),
            "false" => ParamValue::Bool(false),
            _ if raw.starts_with('[') && raw.ends_with(']') => {
                let inner = &raw[1..raw.len() - 1];
                ParamValue::List(
                    inner
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect(),
                )
            }
            _ => ParamValue::Str(raw.to_string()),
        }
    }

    /// Render for string interpolation
    pub fn render(&self) -> String {
        match self {
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Str(s) => s.clone(),
            ParamValue::List(items) => items.join(","),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            ParamValue::Str(s) if s == "true" => Some(true),
            ParamValue::Str(s) if s == "false" => Some(false),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            ParamValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::List(items) => write!(f, "[{}]", items.join(", ")),
            other => f.write_str(&other.render()),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

/// One override layer: name -> value
pub type ParameterLayer = BTreeMap<String, ParamValue>;

/// Declared parameters: name -> default (`None` = must be supplied)
pub type ParameterDefaults = BTreeMap<String, Option<ParamValue>>;

/// Merge layers in increasing precedence
pub fn merge_layers<'a, I>(layers: I) -> ParameterLayer
where
    I: IntoIterator<Item = &'a ParameterLayer>,
{
    let mut merged = ParameterLayer::new();
    for layer in layers {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Immutable, fully resolved parameter bindings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    values: BTreeMap<String, ParamValue>,
}

impl ParameterSet {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Rendered string form of a binding
    pub fn render(&self, name: &str) -> Option<String> {
        self.values.get(name).map(ParamValue::render)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// A new set with additional bindings; existing names are never replaced
    pub fn with_additions(&self, additions: ParameterLayer) -> ExpansionResult<ParameterSet> {
        let mut values = self.values.clone();
        for (key, value) in additions {
            if values.contains_key(&key) {
                return Err(ExpansionError::InvalidTemplate(format!(
                    "variable '{}' shadows a parameter of the same name",
                    key
                )));
            }
            values.insert(key, value);
        }
        Ok(ParameterSet { values })
    }

    /// Copy of the bindings as a plain layer
    pub fn to_layer(&self) -> ParameterLayer {
        self.values.clone()
    }
}

/// Resolve the three layers into a parameter set
///
/// `scope` names the template or pipeline being resolved and only appears in
/// error messages.
pub fn resolve(
    defaults: &ParameterDefaults,
    overrides: &ParameterLayer,
    runtime: &ParameterLayer,
    scope: &str,
) -> ExpansionResult<ParameterSet> {
    let mut values: BTreeMap<String, ParamValue> = defaults
        .iter()
        .filter_map(|(k, v)| v.clone().map(|v| (k.clone(), v)))
        .collect();

    for layer in [overrides, runtime] {
        for (key, value) in layer {
            values.insert(key.clone(), value.clone());
        }
    }

    for (name, default) in defaults {
        if default.is_none() && !values.contains_key(name) {
            return Err(ExpansionError::UnresolvedParameter {
                name: name.clone(),
                scope: scope.to_string(),
            });
        }
    }

    for (name, value) in values.iter_mut() {
        if name == domain::PIN_REQUIREMENTS {
            let flag = value.as_bool().ok_or_else(|| ExpansionError::InvalidParameterValue {
                name: name.clone(),
                value: value.render(),
                expected: "true, false".to_string(),
            })?;
            *value = ParamValue::Bool(flag);
        } else {
            domain::validate_value(name, value)?;
        }
    }

    Ok(ParameterSet { values })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(pairs: &[(&str, &str)]) -> ParameterLayer {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ParamValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_layer_precedence() {
        let mut defaults = ParameterDefaults::new();
        defaults.insert("platform".to_string(), Some("Linux".into()));
        defaults.insert("testRunType".to_string(), Some("Unit".into()));
        defaults.insert("vmImage".to_string(), Some("ubuntu-latest".into()));

        let overrides = layer(&[("platform", "Windows"), ("testRunType", "Notebooks")]);
        let runtime = layer(&[("testRunType", "Unit")]);

        let params = resolve(&defaults, &overrides, &runtime, "job 'test'").unwrap();
        assert_eq!(params.render("platform").as_deref(), Some("Windows"));
        assert_eq!(params.render("testRunType").as_deref(), Some("Unit"));
        assert_eq!(params.render("vmImage").as_deref(), Some("ubuntu-latest"));
    }

    #[test]
    fn test_missing_required_parameter() {
        let mut defaults = ParameterDefaults::new();
        defaults.insert("devVersion".to_string(), None);

        let err = resolve(&defaults, &ParameterLayer::new(), &ParameterLayer::new(), "pipeline 'release'")
            .unwrap_err();
        assert_eq!(
            err,
            ExpansionError::UnresolvedParameter {
                name: "devVersion".to_string(),
                scope: "pipeline 'release'".to_string(),
            }
        );
    }

    #[test]
    fn test_required_parameter_satisfied_by_runtime_layer() {
        let mut defaults = ParameterDefaults::new();
        defaults.insert("devVersion".to_string(), None);
        let runtime = layer(&[("devVersion", "7")]);

        let params = resolve(&defaults, &ParameterLayer::new(), &runtime, "pipeline").unwrap();
        assert_eq!(params.render("devVersion").as_deref(), Some("7"));
    }

    #[test]
    fn test_target_type_outside_domain_is_rejected() {
        let overrides = layer(&[("targetType", "Staging")]);
        let err = resolve(&ParameterDefaults::new(), &overrides, &ParameterLayer::new(), "stage")
            .unwrap_err();
        assert!(matches!(err, ExpansionError::InvalidParameterValue { ref name, .. } if name == "targetType"));
    }

    #[test]
    fn test_closed_domains_reject_bool_and_list_values() {
        let mut overrides = ParameterLayer::new();
        overrides.insert("targetType".to_string(), ParamValue::Bool(true));
        let err = resolve(&ParameterDefaults::new(), &overrides, &ParameterLayer::new(), "stage").unwrap_err();
        assert!(matches!(err, ExpansionError::InvalidParameterValue { ref name, ref value, .. }
            if name == "targetType" && value == "true"));

        let mut overrides = ParameterLayer::new();
        overrides.insert("installationType".to_string(), ParamValue::List(vec!["Conda".to_string()]));
        let err = resolve(&ParameterDefaults::new(), &overrides, &ParameterLayer::new(), "stage").unwrap_err();
        assert!(matches!(err, ExpansionError::InvalidParameterValue { ref name, .. } if name == "installationType"));
    }

    #[test]
    fn test_pin_requirements_normalized_to_bool() {
        let overrides = layer(&[("pinRequirements", "true")]);
        let params = resolve(&ParameterDefaults::new(), &overrides, &ParameterLayer::new(), "job").unwrap();
        assert_eq!(params.get("pinRequirements"), Some(&ParamValue::Bool(true)));

        let overrides = layer(&[("pinRequirements", "yes")]);
        assert!(resolve(&ParameterDefaults::new(), &overrides, &ParameterLayer::new(), "job").is_err());
    }

    #[test]
    fn test_yaml_conversion() {
        let value: Value = serde_yaml::from_str(r#"["3.8", 3.9, "3.10"]"#).unwrap();
        assert_eq!(
            ParamValue::from_yaml(&value).unwrap(),
            Some(ParamValue::List(vec!["3.8".into(), "3.9".into(), "3.10".into()]))
        );
        assert_eq!(ParamValue::from_yaml(&Value::Null).unwrap(), None);
        assert!(ParamValue::from_yaml(&serde_yaml::from_str::<Value>("{a: 1}").unwrap()).is_err());
    }

    #[test]
    fn test_cli_values() {
        assert_eq!(ParamValue::from_cli("true"), ParamValue::Bool(true));
        assert_eq!(
            ParamValue::from_cli("[3.8, 3.9]"),
            ParamValue::List(vec!["3.8".into(), "3.9".into()])
        );
        assert_eq!(ParamValue::from_cli("Linux"), ParamValue::Str("Linux".into()));
    }

    #[test]
    fn test_additions_cannot_shadow() {
        let params = resolve(&ParameterDefaults::new(), &layer(&[("a", "1")]), &ParameterLayer::new(), "job").unwrap();
        assert!(params.with_additions(layer(&[("a", "2")])).is_err());
        let extended = params.with_additions(layer(&[("b", "2")])).unwrap();
        assert_eq!(extended.len(), 2);
        assert_eq!(params.len(), 1);
    }
}
