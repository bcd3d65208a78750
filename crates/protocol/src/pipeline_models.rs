//! Pipeline definition models.
//!
//! A pipeline definition names the components it depends on and the ordered
//! steps that invoke them. Definitions are plain data: they can be loaded
//! from JSON or YAML, edited programmatically, and handed to an execution
//! agent.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use crate::error::PipelineError;
use crate::payload::{Payload, PayloadMap};

/// Where to find a component and which versions of it are acceptable.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ComponentDependency {
    /// Path (or other locator) of the component directory.
    pub src: String,

    /// Semantic version constraint, e.g. `^1.0.0` or `>=0.3, <0.5`.
    pub version: String,
}

/// A single invocation of a component within a pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Step {
    /// Local name of the component, a key of `PipelineDefinition::components`.
    pub component: String,

    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,

    /// Renames applied to this step's output before it feeds the next step
    /// (old key -> new key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remap: Option<BTreeMap<String, String>>,
}

impl Step {
    /// A step with empty parameters and no remap.
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            parameters: BTreeMap::new(),
            remap: None,
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_remap(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.remap
            .get_or_insert_with(BTreeMap::new)
            .insert(from.into(), to.into());
        self
    }

    /// Parameters as a wire payload mapping.
    pub fn parameters_payload(&self) -> PayloadMap {
        self.parameters
            .iter()
            .map(|(k, v)| (k.clone(), Payload::from(v.clone())))
            .collect()
    }
}

/// A full pipeline definition.
///
/// # Example
///
/// ```json
/// {
///   "components": {
///     "loader": { "src": "./components/fileloader", "version": "^1.0.0" },
///     "dumper": { "src": "./components/filedumper", "version": "^1.0.0" }
///   },
///   "pipeline": [
///     { "component": "loader", "parameters": { "path": "in.txt" } },
///     { "component": "dumper", "parameters": { "path": "out.txt" },
///       "remap": { "text": "content" } }
///   ]
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PipelineDefinition {
    #[serde(default)]
    pub components: BTreeMap<String, ComponentDependency>,

    #[serde(default)]
    pub pipeline: Vec<Step>,
}

impl PipelineDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that every step references a loaded component.
    pub fn validate(&self) -> Result<(), PipelineError> {
        match self
            .pipeline
            .iter()
            .find(|step| !self.components.contains_key(&step.component))
        {
            Some(step) => Err(PipelineError::ComponentNotLoaded(step.component.clone())),
            None => Ok(()),
        }
    }

    /// The current step order, `0..len`.
    pub fn order(&self) -> Range<usize> {
        0..self.pipeline.len()
    }

    /// Reorder the steps. `order[i]` is the old index of the step that
    /// ends up at position `i`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOrder` unless `order` is a permutation of `0..len`.
    pub fn set_order(&mut self, order: &[usize]) -> Result<(), PipelineError> {
        let unique: BTreeSet<usize> = order.iter().copied().collect();
        if unique.len() != order.len() || unique != self.order().collect::<BTreeSet<usize>>() {
            return Err(PipelineError::InvalidOrder(order.to_vec()));
        }

        let reordered = order.iter().map(|&idx| self.pipeline[idx].clone()).collect();
        self.pipeline = reordered;
        Ok(())
    }

    /// Insert a step with empty parameters, at `index` or at the end.
    pub fn step_add(&mut self, component: &str, index: Option<usize>) -> Result<(), PipelineError> {
        if !self.components.contains_key(component) {
            return Err(PipelineError::ComponentNotLoaded(component.to_string()));
        }

        let len = self.pipeline.len();
        let index = index.unwrap_or(len);
        if index > len {
            return Err(PipelineError::StepOutOfRange { index, len });
        }

        self.pipeline.insert(index, Step::new(component));
        Ok(())
    }

    pub fn step_remove(&mut self, index: usize) -> Result<Step, PipelineError> {
        self.check_index(index)?;
        Ok(self.pipeline.remove(index))
    }

    /// Replace the step at `index`.
    pub fn step_config(&mut self, index: usize, step: Step) -> Result<(), PipelineError> {
        self.check_index(index)?;
        self.pipeline[index] = step;
        Ok(())
    }

    pub fn component_load(
        &mut self,
        name: &str,
        src: &str,
        version: &str,
    ) -> Result<(), PipelineError> {
        if self.components.contains_key(name) {
            return Err(PipelineError::ComponentAlreadyLoaded(name.to_string()));
        }

        self.components.insert(
            name.to_string(),
            ComponentDependency {
                src: src.to_string(),
                version: version.to_string(),
            },
        );
        Ok(())
    }

    /// Remove a component. Rejected while any step still uses it.
    pub fn component_unload(&mut self, name: &str) -> Result<ComponentDependency, PipelineError> {
        if let Some(step) = self.pipeline.iter().position(|s| s.component == name) {
            return Err(PipelineError::ComponentInUse {
                component: name.to_string(),
                step,
            });
        }

        self.components
            .remove(name)
            .ok_or_else(|| PipelineError::ComponentNotLoaded(name.to_string()))
    }

    fn check_index(&self, index: usize) -> Result<(), PipelineError> {
        if index >= self.pipeline.len() {
            return Err(PipelineError::StepOutOfRange {
                index,
                len: self.pipeline.len(),
            });
        }
        Ok(())
    }
}
