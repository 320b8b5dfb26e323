//! Run identity for correlating logs and events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one attempt at a deployment run.
///
/// `run_id` is the operator-chosen suffix shared by every attempt at the
/// same deployment; `attempt_id` is fresh for each invocation, so a resumed
/// run can be told apart from the attempt that was interrupted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    /// Deployment run suffix.
    pub run_id: String,
    /// Unique id of this invocation.
    pub attempt_id: Uuid,
}

impl RunIdentity {
    /// Creates an identity with a generated attempt id.
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            attempt_id: Uuid::new_v4(),
        }
    }

    /// Creates an identity with a specific attempt id.
    #[must_use]
    pub fn with_attempt_id(run_id: impl Into<String>, attempt_id: Uuid) -> Self {
        Self {
            run_id: run_id.into(),
            attempt_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_differ_for_same_run() {
        let a = RunIdentity::new("mainnet1");
        let b = RunIdentity::new("mainnet1");
        assert_eq!(a.run_id, b.run_id);
        assert_ne!(a.attempt_id, b.attempt_id);
        assert_eq!(a.attempt_id.get_version_num(), 4);
    }

    #[test]
    fn test_serde_roundtrip() {
        let id = RunIdentity::with_attempt_id("r", Uuid::nil());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#"{"run_id":"r","attempt_id":"00000000-0000-0000-0000-000000000000"}"#);
        let back: RunIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
