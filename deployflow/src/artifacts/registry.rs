use super::builder::ParamValue;
use crate::core::identity::hex_serde;
use crate::core::{ExUnits, ScriptHash};
use crate::errors::DeployError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An instantiated artifact. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedArtifact {
    /// Artifact name.
    pub name: String,
    /// Content-derived identity.
    pub identity: ScriptHash,
    /// Parameter-applied code.
    #[serde(with = "hex_serde")]
    pub code: Vec<u8>,
    /// Execution budget estimate.
    pub cost: ExUnits,
    /// Parameters the builder was invoked with.
    pub params: Vec<ParamValue>,
}

/// Resolved artifacts keyed by name, iterated in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ArtifactRegistry {
    artifacts: HashMap<String, ResolvedArtifact>,
    order: Vec<String>,
}

impl ArtifactRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an artifact; fails if the name is taken.
    pub fn insert(&mut self, artifact: ResolvedArtifact) -> Result<(), DeployError> {
        if self.artifacts.contains_key(&artifact.name) {
            return Err(DeployError::DuplicateArtifact(artifact.name));
        }
        self.order.push(artifact.name.clone());
        self.artifacts.insert(artifact.name.clone(), artifact);
        Ok(())
    }

    /// Looks up an artifact by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResolvedArtifact> {
        self.artifacts.get(name)
    }

    /// Looks up an artifact's identity by name.
    #[must_use]
    pub fn identity(&self, name: &str) -> Option<ScriptHash> {
        self.get(name).map(|a| a.identity)
    }

    /// Returns true if the name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.artifacts.contains_key(name)
    }

    /// Iterates artifacts in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedArtifact> {
        self.order.iter().filter_map(|name| self.artifacts.get(name))
    }

    /// Names in insertion order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Number of artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Sums the budget estimates; `None` on overflow.
    #[must_use]
    pub fn total_cost(&self) -> Option<ExUnits> {
        self.iter()
            .try_fold(ExUnits::new(0, 0), |acc, a| acc.checked_add(a.cost))
    }

    /// Artifacts in insertion order.
    #[must_use]
    pub fn into_vec(mut self) -> Vec<ResolvedArtifact> {
        self.order
            .iter()
            .filter_map(|name| self.artifacts.remove(name))
            .collect()
    }

    /// Rebuilds a registry from an ordered list, e.g. a checkpoint.
    pub fn from_vec(artifacts: Vec<ResolvedArtifact>) -> Result<Self, DeployError> {
        let mut registry = Self::new();
        for artifact in artifacts {
            registry.insert(artifact)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Quantity;
    use pretty_assertions::assert_eq;

    fn artifact(name: &str) -> ResolvedArtifact {
        ResolvedArtifact {
            name: name.into(),
            identity: ScriptHash::digest(name.as_bytes()),
            code: name.as_bytes().to_vec(),
            cost: ExUnits::default(),
            params: Vec::new(),
        }
    }

    #[test]
    fn test_preserves_insertion_order() {
        let registry =
            ArtifactRegistry::from_vec(vec![artifact("z"), artifact("a"), artifact("m")]).unwrap();
        let names: Vec<_> = registry.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
        assert_eq!(registry.identity("a"), Some(ScriptHash::digest(b"a")));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = ArtifactRegistry::new();
        registry.insert(artifact("a")).unwrap();
        let err = registry.insert(artifact("a")).unwrap_err();
        assert!(matches!(err, DeployError::DuplicateArtifact(name) if name == "a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_total_cost_is_exact() {
        let registry = ArtifactRegistry::from_vec((0..11).map(|i| artifact(&i.to_string())).collect()).unwrap();
        let total = registry.total_cost().unwrap();
        assert_eq!(total.mem, Quantity::new(5_500_000));
        assert_eq!(total.steps, Quantity::new(2_200_000_000));
    }

    #[test]
    fn test_into_vec_roundtrip() {
        let list = vec![artifact("b"), artifact("a")];
        let registry = ArtifactRegistry::from_vec(list.clone()).unwrap();
        assert_eq!(registry.into_vec(), list);
    }
}
