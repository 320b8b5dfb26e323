//! Dependency resolution for artifact specs.
//!
//! Specs live in an arena indexed by declaration position; references become
//! index edges. Ordering uses Kahn's algorithm with a sorted ready set, so
//! among specs that are ready at the same time the earliest declared goes
//! first and the output is deterministic. The whole order is computed before
//! any builder runs: a cyclic or dangling graph never invokes a builder.

use crate::artifacts::{
    ArtifactRegistry, ArtifactSpec, Bindings, ParamSlot, ParamValue, ResolvedArtifact,
};
use crate::errors::DeployError;
use crate::utils::find_cycle;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Arena view of a spec list with index-based edges.
struct ArtifactGraph<'a> {
    specs: &'a [ArtifactSpec],
    index: HashMap<&'a str, usize>,
    /// `deps[i]`: specs that `i` references.
    deps: Vec<Vec<usize>>,
    /// `dependents[i]`: specs that reference `i`.
    dependents: Vec<Vec<usize>>,
}

impl<'a> ArtifactGraph<'a> {
    fn build(specs: &'a [ArtifactSpec], bindings: Option<&Bindings>) -> Result<Self, DeployError> {
        let mut index = HashMap::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            if index.insert(spec.name.as_str(), i).is_some() {
                return Err(DeployError::DuplicateArtifact(spec.name.clone()));
            }
        }

        let mut deps = vec![Vec::new(); specs.len()];
        let mut dependents = vec![Vec::new(); specs.len()];
        for (i, spec) in specs.iter().enumerate() {
            for slot in &spec.params {
                match slot {
                    ParamSlot::Ref(name) => {
                        let j = *index
                            .get(name.as_str())
                            .ok_or_else(|| DeployError::unresolved(&spec.name, name))?;
                        if !deps[i].contains(&j) {
                            deps[i].push(j);
                            dependents[j].push(i);
                        }
                    }
                    ParamSlot::Binding(key) => {
                        if let Some(bindings) = bindings {
                            if bindings.get(key).is_none() {
                                return Err(DeployError::unresolved(&spec.name, key));
                            }
                        }
                    }
                    ParamSlot::Literal(_) => {}
                }
            }
        }

        Ok(Self {
            specs,
            index,
            deps,
            dependents,
        })
    }

    fn topological_order(&self) -> Result<Vec<usize>, DeployError> {
        let mut in_degree: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = (0..self.specs.len())
            .filter(|i| in_degree[*i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.specs.len());

        while let Some(next) = ready.pop_first() {
            order.push(next);
            for dependent in &self.dependents[next] {
                in_degree[*dependent] -= 1;
                if in_degree[*dependent] == 0 {
                    ready.insert(*dependent);
                }
            }
        }

        if order.len() < self.specs.len() {
            let remaining: Vec<usize> = (0..self.specs.len())
                .filter(|i| in_degree[*i] > 0)
                .collect();
            let cycle = find_cycle(&self.deps, &remaining).unwrap_or(remaining);
            return Err(DeployError::CyclicDependency {
                cycle_path: cycle
                    .into_iter()
                    .map(|i| self.specs[i].name.clone())
                    .collect(),
            });
        }
        Ok(order)
    }
}

/// Computes the instantiation order, as spec names, without building anything.
pub fn resolve_order(specs: &[ArtifactSpec]) -> Result<Vec<String>, DeployError> {
    let graph = ArtifactGraph::build(specs, None)?;
    Ok(graph
        .topological_order()?
        .into_iter()
        .map(|i| specs[i].name.clone())
        .collect())
}

/// Resolves specs into artifacts, dependencies first.
///
/// Each builder sees its spec's slots with references replaced by the
/// identities of already-resolved artifacts and bindings replaced by their
/// values.
pub fn resolve(specs: &[ArtifactSpec], bindings: &Bindings) -> Result<Vec<ResolvedArtifact>, DeployError> {
    let graph = ArtifactGraph::build(specs, Some(bindings))?;
    let order = graph.topological_order()?;
    instantiate(specs, &order, bindings)
}

/// Resolves specs in a fixed, caller-supplied order after checking it.
pub fn resolve_in_order<S: AsRef<str>>(
    specs: &[ArtifactSpec],
    bindings: &Bindings,
    names: &[S],
) -> Result<Vec<ResolvedArtifact>, DeployError> {
    verify_order(specs, names)?;
    let graph = ArtifactGraph::build(specs, Some(bindings))?;
    let order: Vec<usize> = names
        .iter()
        .filter_map(|n| graph.index.get(n.as_ref()).copied())
        .collect();
    instantiate(specs, &order, bindings)
}

/// Checks that a fixed order places every artifact after its dependencies.
///
/// Fails with `OrderViolation` when an artifact comes before one of its
/// dependencies or a dependency is missing from the order altogether.
pub fn verify_order<S: AsRef<str>>(specs: &[ArtifactSpec], names: &[S]) -> Result<(), DeployError> {
    let graph = ArtifactGraph::build(specs, None)?;

    let mut position: HashMap<&str, usize> = HashMap::with_capacity(names.len());
    for (pos, name) in names.iter().enumerate() {
        let name = name.as_ref();
        if !graph.index.contains_key(name) {
            return Err(DeployError::unresolved("<order>", name));
        }
        if position.insert(name, pos).is_some() {
            return Err(DeployError::DuplicateArtifact(name.to_string()));
        }
    }

    for name in names {
        let name = name.as_ref();
        let i = graph.index[name];
        for dep in &graph.deps[i] {
            let dep_name = graph.specs[*dep].name.as_str();
            let ordered_after = position.get(dep_name).map_or(true, |p| *p > position[name]);
            if ordered_after {
                return Err(DeployError::OrderViolation {
                    artifact: name.to_string(),
                    dependency: dep_name.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn instantiate(
    specs: &[ArtifactSpec],
    order: &[usize],
    bindings: &Bindings,
) -> Result<Vec<ResolvedArtifact>, DeployError> {
    let mut registry = ArtifactRegistry::new();

    for &i in order {
        let spec = &specs[i];
        let params = spec
            .params
            .iter()
            .map(|slot| match slot {
                ParamSlot::Literal(value) => Ok(value.clone()),
                ParamSlot::Ref(name) => registry
                    .identity(name)
                    .map(ParamValue::Identity)
                    .ok_or_else(|| DeployError::unresolved(&spec.name, name)),
                ParamSlot::Binding(key) => bindings
                    .get(key)
                    .cloned()
                    .ok_or_else(|| DeployError::unresolved(&spec.name, key)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let compiled = spec
            .builder
            .instantiate(&params)
            .map_err(|e| DeployError::build(&spec.name, e.0))?;
        debug!(artifact = %spec.name, identity = %compiled.identity, "Artifact instantiated");

        registry.insert(ResolvedArtifact {
            name: spec.name.clone(),
            identity: compiled.identity,
            code: compiled.code,
            cost: spec.cost,
            params,
        })?;
    }

    match registry.total_cost() {
        Some(cost) => info!(artifacts = registry.len(), mem = %cost.mem, steps = %cost.steps, "Artifacts resolved"),
        None => info!(artifacts = registry.len(), "Artifacts resolved"),
    }
    Ok(registry.into_vec())
}
