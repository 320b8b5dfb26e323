//! Artifact declarations, code builders and the resolved-artifact registry.

mod builder;
mod registry;
mod spec;

pub use builder::{
    ArtifactBuilder, Blueprint, BlueprintValidator, BuildError, CompiledArtifact,
    OneShotPolicyBuilder, ParamValue, TemplateBuilder,
};
pub use registry::{ArtifactRegistry, ResolvedArtifact};
pub use spec::{ArtifactSpec, Bindings, ParamSlot};
