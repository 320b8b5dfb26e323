//! Code generation boundary: turning templates plus parameters into code.

use crate::core::identity::hex_serde;
use crate::core::{Integer, OutputRef, ScriptHash};
use crate::errors::DeployError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// A concrete parameter applied to an artifact template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    /// Raw bytes (asset names, opaque constants).
    Bytes(#[serde(with = "hex_serde")] Vec<u8>),
    /// Exact integer.
    Int(Integer),
    /// An output reference, as used by one-shot policies.
    OutputRef(OutputRef),
    /// Identity of another artifact or policy.
    Identity(ScriptHash),
}

impl ParamValue {
    /// Canonical encoding appended to a template: a tag byte then the payload.
    ///
    /// Byte strings carry a 4-byte big-endian length, so longer ones are refused.
    pub fn encode(&self) -> Result<Vec<u8>, BuildError> {
        let out = match self {
            Self::Bytes(bytes) => {
                let mut out = Vec::with_capacity(5 + bytes.len());
                out.push(0x01);
                out.extend_from_slice(&length_prefix(bytes.len())?);
                out.extend_from_slice(bytes);
                out
            }
            Self::Int(i) => {
                let mut out = vec![0x02];
                out.extend_from_slice(&i.get().to_be_bytes());
                out
            }
            Self::OutputRef(r) => {
                let mut out = vec![0x03];
                out.extend(r.to_bytes());
                out
            }
            Self::Identity(hash) => {
                let mut out = vec![0x04];
                out.extend_from_slice(hash.as_bytes());
                out
            }
        };
        Ok(out)
    }
}

fn length_prefix(len: usize) -> Result<[u8; 4], BuildError> {
    u32::try_from(len)
        .map(u32::to_be_bytes)
        .map_err(|_| BuildError(format!("byte parameter of {len} bytes exceeds the 4-byte length prefix")))
}

/// Output of a builder: code plus the identity derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledArtifact {
    /// Compiled, parameter-applied code.
    #[serde(with = "hex_serde")]
    pub code: Vec<u8>,
    /// Content-derived identity.
    pub identity: ScriptHash,
}

impl CompiledArtifact {
    /// Wraps code and derives its identity.
    #[must_use]
    pub fn from_code(code: Vec<u8>) -> Self {
        let identity = ScriptHash::digest(&code);
        Self { code, identity }
    }
}

/// Builder failure message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct BuildError(pub String);

/// Instantiates an artifact from its resolved parameters.
pub trait ArtifactBuilder: Send + Sync {
    /// Produces code and identity from concrete parameters.
    fn instantiate(&self, params: &[ParamValue]) -> Result<CompiledArtifact, BuildError>;
}

/// Applies parameters to a compiled template by appending their encoding.
#[derive(Debug, Clone)]
pub struct TemplateBuilder {
    template: Vec<u8>,
    arity: Option<usize>,
}

impl TemplateBuilder {
    /// Creates a builder over template code.
    #[must_use]
    pub fn new(template: impl Into<Vec<u8>>) -> Self {
        Self {
            template: template.into(),
            arity: None,
        }
    }

    /// Requires exactly `arity` parameters.
    #[must_use]
    pub const fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    /// The unparameterized template.
    #[must_use]
    pub fn template(&self) -> &[u8] {
        &self.template
    }
}

impl ArtifactBuilder for TemplateBuilder {
    fn instantiate(&self, params: &[ParamValue]) -> Result<CompiledArtifact, BuildError> {
        if let Some(arity) = self.arity {
            if params.len() != arity {
                return Err(BuildError(format!(
                    "template takes {arity} parameters, got {}",
                    params.len()
                )));
            }
        }
        let mut code = self.template.clone();
        for param in params {
            code.extend(param.encode()?);
        }
        Ok(CompiledArtifact::from_code(code))
    }
}

const ONE_SHOT_TEMPLATE: &[u8] = b"deployflow:one-shot-policy:v1";

/// Builds the minting policy for one bootstrap token.
///
/// The policy is parameterized by the seed it consumes, the token's
/// position in the mint, and the minted quantity. Spending the seed can only
/// happen once, so each policy can mint only once.
#[derive(Debug, Clone)]
pub struct OneShotPolicyBuilder {
    inner: TemplateBuilder,
}

impl Default for OneShotPolicyBuilder {
    fn default() -> Self {
        Self {
            inner: TemplateBuilder::new(ONE_SHOT_TEMPLATE).with_arity(3),
        }
    }
}

impl OneShotPolicyBuilder {
    /// Creates the default one-shot policy builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a custom policy template, for example from a blueprint.
    #[must_use]
    pub fn with_template(template: TemplateBuilder) -> Self {
        Self {
            inner: template.with_arity(3),
        }
    }

    /// Builds the policy for token `index` minted from `seed`.
    pub fn policy(&self, seed: OutputRef, index: u64, quantity: Integer) -> Result<CompiledArtifact, BuildError> {
        self.instantiate(&[
            ParamValue::OutputRef(seed),
            ParamValue::Int(Integer::from(index)),
            ParamValue::Int(quantity),
        ])
    }
}

impl ArtifactBuilder for OneShotPolicyBuilder {
    fn instantiate(&self, params: &[ParamValue]) -> Result<CompiledArtifact, BuildError> {
        self.inner.instantiate(params)
    }
}

/// A validator entry in a compiled blueprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintValidator {
    /// Validator title.
    pub title: String,
    /// Unparameterized compiled code.
    #[serde(rename = "compiledCode", with = "hex_serde")]
    pub compiled_code: Vec<u8>,
}

/// Compiled validator templates, as emitted by the contract toolchain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Blueprint {
    /// Validators in blueprint order.
    pub validators: Vec<BlueprintValidator>,
}

impl Blueprint {
    /// Parses a blueprint document.
    pub fn from_json(json: &str) -> Result<Self, DeployError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a blueprint file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DeployError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Builds a blueprint from `(title, code)` pairs.
    #[must_use]
    pub fn from_templates<I, S>(templates: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: Into<String>,
    {
        Self {
            validators: templates
                .into_iter()
                .map(|(title, compiled_code)| BlueprintValidator {
                    title: title.into(),
                    compiled_code,
                })
                .collect(),
        }
    }

    /// Returns a template builder for a validator by title.
    pub fn template(&self, title: &str) -> Result<TemplateBuilder, DeployError> {
        self.validators
            .iter()
            .find(|v| v.title == title)
            .map(|v| TemplateBuilder::new(v.compiled_code.clone()))
            .ok_or_else(|| DeployError::InvalidConfig(format!("blueprint has no validator '{title}'")))
    }

    /// Title to code map.
    #[must_use]
    pub fn index(&self) -> BTreeMap<&str, &[u8]> {
        self.validators
            .iter()
            .map(|v| (v.title.as_str(), v.compiled_code.as_slice()))
            .collect()
    }
}
