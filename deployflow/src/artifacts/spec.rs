use super::builder::{ArtifactBuilder, ParamValue};
use crate::core::ExUnits;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A parameter position in an artifact spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ParamSlot {
    /// A fixed value.
    Literal(ParamValue),
    /// The identity of another artifact in the same plan.
    Ref(String),
    /// A value supplied at resolution time, looked up in [`Bindings`].
    Binding(String),
}

/// Declarative description of one artifact to instantiate.
#[derive(Clone)]
pub struct ArtifactSpec {
    /// Unique artifact name.
    pub name: String,
    /// Ordered parameter slots.
    pub params: Vec<ParamSlot>,
    /// Code generator.
    pub builder: Arc<dyn ArtifactBuilder>,
    /// Execution budget estimate.
    pub cost: ExUnits,
}

impl fmt::Debug for ArtifactSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactSpec")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("cost", &self.cost)
            .finish_non_exhaustive()
    }
}

impl ArtifactSpec {
    /// Creates a spec with no parameters and the default cost.
    #[must_use]
    pub fn new(name: impl Into<String>, builder: Arc<dyn ArtifactBuilder>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            builder,
            cost: ExUnits::default(),
        }
    }

    /// Appends a literal parameter.
    #[must_use]
    pub fn literal(mut self, value: ParamValue) -> Self {
        self.params.push(ParamSlot::Literal(value));
        self
    }

    /// Appends a reference to another artifact's identity.
    #[must_use]
    pub fn reference(mut self, artifact: impl Into<String>) -> Self {
        self.params.push(ParamSlot::Ref(artifact.into()));
        self
    }

    /// Appends an externally bound parameter.
    #[must_use]
    pub fn binding(mut self, key: impl Into<String>) -> Self {
        self.params.push(ParamSlot::Binding(key.into()));
        self
    }

    /// Overrides the execution budget estimate.
    #[must_use]
    pub const fn with_cost(mut self, cost: ExUnits) -> Self {
        self.cost = cost;
        self
    }

    /// Names of artifacts this spec references, in slot order.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.params.iter().filter_map(|slot| match slot {
            ParamSlot::Ref(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

/// Externally supplied parameter values, keyed by binding name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bindings(BTreeMap<String, ParamValue>);

impl Bindings {
    /// Creates an empty binding set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding, replacing any previous value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds a binding, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: ParamValue) {
        self.0.insert(key.into(), value);
    }

    /// Looks up a binding.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Copies every binding from `other`, which wins on conflicts.
    pub fn extend(&mut self, other: &Self) {
        self.0
            .extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no bindings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::TemplateBuilder;
    use crate::core::Integer;

    #[test]
    fn test_references_in_slot_order() {
        let spec = ArtifactSpec::new("e", Arc::new(TemplateBuilder::new(vec![1])))
            .reference("c")
            .literal(ParamValue::Int(Integer::new(3)))
            .binding("gt.policy")
            .reference("d");
        assert_eq!(spec.references().collect::<Vec<_>>(), vec!["c", "d"]);
    }

    #[test]
    fn test_bindings_extend_overrides() {
        let mut a = Bindings::new().with("x", ParamValue::Int(Integer::new(1)));
        let b = Bindings::new().with("x", ParamValue::Int(Integer::new(2)));
        a.extend(&b);
        assert_eq!(a.get("x"), Some(&ParamValue::Int(Integer::new(2))));
        assert_eq!(a.len(), 1);
    }
}
