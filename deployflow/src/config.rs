//! Deployment configuration.

use crate::errors::DeployError;
use crate::ledger::ConfirmationPolicy;
use crate::utils::validate_run_id;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for one deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Run suffix, appended to token names and checkpoint keys.
    pub run_id: String,
    /// Directory for file checkpoints.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    /// Artifacts per publication transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Upper bound on code bytes attached to one publication transaction.
    #[serde(default = "default_max_batch_code_bytes")]
    pub max_batch_code_bytes: usize,
    /// Bounded confirmation wait, in seconds.
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    /// Confirmation polling interval, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Pause after each confirmation, in milliseconds.
    #[serde(default)]
    pub settle_delay_ms: u64,
    /// Coin locked with each reference-script output.
    #[serde(default = "default_reference_output_coin")]
    pub reference_output_coin: u64,
    /// Coin placed in a freshly prepared seed output.
    #[serde(default = "default_seed_output_coin")]
    pub seed_output_coin: u64,
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

const fn default_batch_size() -> usize {
    6
}

const fn default_max_batch_code_bytes() -> usize {
    14_000
}

const fn default_confirmation_timeout_secs() -> u64 {
    120
}

const fn default_poll_interval_ms() -> u64 {
    2_000
}

const fn default_reference_output_coin() -> u64 {
    15_000_000
}

const fn default_seed_output_coin() -> u64 {
    20_000_000
}

impl DeployConfig {
    /// Creates a config with defaults for everything but the run id.
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            checkpoint_dir: default_checkpoint_dir(),
            batch_size: default_batch_size(),
            max_batch_code_bytes: default_max_batch_code_bytes(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_delay_ms: 0,
            reference_output_coin: default_reference_output_coin(),
            seed_output_coin: default_seed_output_coin(),
        }
    }

    /// Loads and validates a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DeployError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the publication batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the checkpoint directory.
    #[must_use]
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    /// Sets the confirmation timeout and polling interval.
    #[must_use]
    pub const fn with_confirmation(mut self, timeout_secs: u64, poll_interval_ms: u64) -> Self {
        self.confirmation_timeout_secs = timeout_secs;
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Checks field ranges.
    pub fn validate(&self) -> Result<(), DeployError> {
        validate_run_id(&self.run_id)?;
        if self.batch_size == 0 {
            return Err(DeployError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.max_batch_code_bytes == 0 {
            return Err(DeployError::InvalidConfig(
                "max_batch_code_bytes must be positive".into(),
            ));
        }
        if self.confirmation_timeout_secs == 0 {
            return Err(DeployError::InvalidConfig(
                "confirmation_timeout_secs must be positive".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(DeployError::InvalidConfig("poll_interval_ms must be positive".into()));
        }
        Ok(())
    }

    /// Confirmation wait derived from this config.
    #[must_use]
    pub const fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            timeout: Duration::from_secs(self.confirmation_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: DeployConfig = serde_json::from_str(r#"{"run_id": "testnet7"}"#).unwrap();
        assert_eq!(config, DeployConfig::new("testnet7"));
        assert_eq!(config.batch_size, 6);
        assert_eq!(config.reference_output_coin, 15_000_000);
        config.validate().unwrap();
    }

    #[test]
    fn test_policy_from_config() {
        let policy = DeployConfig::new("r").confirmation_policy();
        assert_eq!(policy.timeout, Duration::from_secs(120));
        assert_eq!(policy.poll_interval, Duration::from_secs(2));
        assert_eq!(policy.settle_delay, Duration::ZERO);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(DeployConfig::new("bad id").validate().is_err());
        assert!(DeployConfig::new("r").with_batch_size(0).validate().is_err());
        assert!(DeployConfig::new("r").with_confirmation(1, 0).validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"run_id": "f1", "batch_size": 5, "settle_delay_ms": 120000}}"#).unwrap();

        let config = DeployConfig::from_file(file.path()).unwrap();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.confirmation_policy().settle_delay, Duration::from_secs(120));
    }

    #[test]
    fn test_from_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"run_id": "../x"}}"#).unwrap();
        assert!(matches!(
            DeployConfig::from_file(file.path()),
            Err(DeployError::InvalidConfig(_))
        ));
    }
}
