//! Release and application status types

use crate::ids::DeploymentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of a release version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Unknown,
    Deploying,
    Deployed,
    Deleting,
    Deleted,
    Failed,
}

impl StatusCode {
    /// Whether moving from `self` to `next` is a legal status change.
    ///
    /// Re-asserting the same code is always allowed so descriptions can be
    /// refreshed without changing state.
    pub fn can_transition_to(&self, next: StatusCode) -> bool {
        use StatusCode::*;

        if *self == next {
            return *self != Deleted;
        }

        matches!(
            (self, next),
            (Unknown, Deploying | Deployed | Failed | Deleting)
                | (Deploying, Deployed | Failed)
                | (Deployed, Deleting | Failed)
                | (Failed, Deleting)
                | (Deleting, Deleted | Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusCode::Deployed | StatusCode::Deleted | StatusCode::Failed)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::Deploying => "DEPLOYING",
            StatusCode::Deployed => "DEPLOYED",
            StatusCode::Deleting => "DELETING",
            StatusCode::Deleted => "DELETED",
            StatusCode::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Mutable status of a release version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseStatus {
    pub code: StatusCode,
    /// Summary of the last deployer status refresh
    #[serde(default)]
    pub platform_status: String,
    pub description: String,
}

impl ReleaseStatus {
    pub fn new(code: StatusCode, description: impl Into<String>) -> Self {
        Self {
            code,
            platform_status: String::new(),
            description: description.into(),
        }
    }
}

/// State of one deployed application as reported by its deployer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Deploying,
    Deployed,
    Undeployed,
    Partial,
    Failed,
    Error,
    Unknown,
}

impl DeploymentState {
    pub fn is_healthy(&self) -> bool {
        matches!(self, DeploymentState::Deployed)
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeploymentState::Deploying => "deploying",
            DeploymentState::Deployed => "deployed",
            DeploymentState::Undeployed => "undeployed",
            DeploymentState::Partial => "partial",
            DeploymentState::Failed => "failed",
            DeploymentState::Error => "error",
            DeploymentState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Live status of one application instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStatus {
    pub deployment_id: DeploymentId,
    pub state: DeploymentState,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl AppStatus {
    pub fn new(deployment_id: DeploymentId, state: DeploymentState) -> Self {
        Self {
            deployment_id,
            state,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploying_resolves_to_deployed_or_failed() {
        assert!(StatusCode::Deploying.can_transition_to(StatusCode::Deployed));
        assert!(StatusCode::Deploying.can_transition_to(StatusCode::Failed));
        assert!(!StatusCode::Deploying.can_transition_to(StatusCode::Deleted));
    }

    #[test]
    fn test_deleted_is_final() {
        for next in [
            StatusCode::Unknown,
            StatusCode::Deploying,
            StatusCode::Deployed,
            StatusCode::Deleting,
            StatusCode::Deleted,
            StatusCode::Failed,
        ] {
            assert!(!StatusCode::Deleted.can_transition_to(next), "{next}");
        }
    }

    #[test]
    fn test_terminal_states_do_not_revert() {
        assert!(!StatusCode::Deployed.can_transition_to(StatusCode::Deploying));
        assert!(!StatusCode::Failed.can_transition_to(StatusCode::Deployed));
        assert!(StatusCode::Failed.can_transition_to(StatusCode::Deleting));
        assert!(StatusCode::Deleting.can_transition_to(StatusCode::Failed));
    }

    #[test]
    fn test_status_code_wire_format() {
        let json = serde_json::to_string(&StatusCode::Deployed).unwrap();
        assert_eq!(json, "\"DEPLOYED\"");
    }
}
