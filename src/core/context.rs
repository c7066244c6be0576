//! Expansion context - pipeline and stage scope shared by job references

use crate::core::condition::ConditionalVariable;
use crate::core::error::ExpansionResult;
use crate::core::params::{merge_layers, resolve, ParamValue, ParameterDefaults, ParameterLayer, ParameterSet};
use crate::core::step::interpolate_with;
use tracing::debug;

/// Select and interpolate variables in declaration order
///
/// Each variable sees the parameters plus every variable bound before it.
/// Variables with no matching branch and no default stay unbound.
pub fn bind_variables(
    params: &ParameterSet,
    variables: &[ConditionalVariable],
    location: &str,
) -> ExpansionResult<ParameterSet> {
    let mut current = params.clone();
    for variable in variables {
        let Some(raw) = variable.select(&current)? else {
            debug!(variable = %variable.name, %location, "no branch matched, variable left unbound");
            continue;
        };
        let var_location = format!("{}, variable '{}'", location, variable.name);
        let value = interpolate_with(&raw, |name| current.render(name), &var_location)?;
        let mut addition = ParameterLayer::new();
        addition.insert(variable.name.clone(), ParamValue::Str(value));
        current = current.with_additions(addition)?;
    }
    Ok(current)
}

/// Interpolate the string parts of a layer against a scope layer
pub fn render_layer(layer: &ParameterLayer, scope: &ParameterLayer, location: &str) -> ExpansionResult<ParameterLayer> {
    let lookup = |name: &str| scope.get(name).map(ParamValue::render);
    layer
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                ParamValue::Str(s) => ParamValue::Str(interpolate_with(s, lookup, location)?),
                ParamValue::List(items) => ParamValue::List(
                    items
                        .iter()
                        .map(|item| interpolate_with(item, lookup, location))
                        .collect::<ExpansionResult<Vec<_>>>()?,
                ),
                ParamValue::Bool(b) => ParamValue::Bool(*b),
            };
            Ok((key.clone(), rendered))
        })
        .collect()
}

/// Pipeline-wide bindings visible to every stage and job
#[derive(Debug, Clone)]
pub struct ExpansionContext {
    pipeline_name: String,
    scope: ParameterSet,
}

impl ExpansionContext {
    /// Resolve the invocation against the pipeline's declared parameters and
    /// bind pipeline variables
    pub fn new(
        pipeline_name: &str,
        declared: &ParameterDefaults,
        invocation: &ParameterLayer,
        variables: &[ConditionalVariable],
    ) -> ExpansionResult<Self> {
        let location = format!("pipeline '{}'", pipeline_name);
        let params = resolve(declared, invocation, &ParameterLayer::new(), &location)?;
        let scope = bind_variables(&params, variables, &location)?;
        Ok(Self {
            pipeline_name: pipeline_name.to_string(),
            scope,
        })
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    /// Pipeline parameters and variables
    pub fn scope(&self) -> &ParameterSet {
        &self.scope
    }

    /// Stage parameters interpolated against the pipeline scope
    pub fn stage_parameters(&self, stage_name: &str, stage_params: &ParameterLayer) -> ExpansionResult<ParameterLayer> {
        let pipeline = self.scope.to_layer();
        let location = format!("stage '{}' parameters", stage_name);
        let stage = render_layer(stage_params, &pipeline, &location)?;
        // validates closed domains of stage-level values even when no job uses them
        resolve(&ParameterDefaults::new(), &stage, &ParameterLayer::new(), &location)?;
        Ok(stage)
    }

    /// The pipeline scope with an already rendered stage layer on top
    pub fn layered(&self, stage: &ParameterLayer) -> ParameterLayer {
        merge_layers([&self.scope.to_layer(), stage])
    }
}
