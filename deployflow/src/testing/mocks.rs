//! Instrumented builders for tests.

use crate::artifacts::{ArtifactBuilder, BuildError, CompiledArtifact, ParamValue};
use parking_lot::Mutex;

/// A builder that records every invocation.
///
/// Code is a fixed prefix followed by the encoded parameters, so identities
/// are distinct whenever parameters are.
#[derive(Debug, Default)]
pub struct CountingBuilder {
    calls: Mutex<Vec<Vec<ParamValue>>>,
}

impl CountingBuilder {
    /// Creates a new counting builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the parameters of every invocation, in order.
    #[must_use]
    pub fn recorded_params(&self) -> Vec<Vec<ParamValue>> {
        self.calls.lock().clone()
    }
}

impl ArtifactBuilder for CountingBuilder {
    fn instantiate(&self, params: &[ParamValue]) -> Result<CompiledArtifact, BuildError> {
        let index = {
            let mut calls = self.calls.lock();
            calls.push(params.to_vec());
            calls.len()
        };
        let mut code = format!("counting-builder:{index}:").into_bytes();
        for param in params {
            code.extend(param.encode()?);
        }
        Ok(CompiledArtifact::from_code(code))
    }
}

/// A builder that always fails with a fixed message.
#[derive(Debug, Clone)]
pub struct FailingBuilder {
    message: String,
}

impl FailingBuilder {
    /// Creates a failing builder.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl ArtifactBuilder for FailingBuilder {
    fn instantiate(&self, _params: &[ParamValue]) -> Result<CompiledArtifact, BuildError> {
        Err(BuildError(self.message.clone()))
    }
}
