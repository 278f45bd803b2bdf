//! Registry error types

use skipper_types::{DeploymentId, PackageRef};
use thiserror::Error;

/// Registry and deployer errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Package not found: {0}")]
    PackageNotFound(PackageRef),

    #[error("No deployer registered for platform: {0}")]
    DeployerNotFound(String),

    #[error("Deploy of '{application}' failed: {reason}")]
    DeployFailed { application: String, reason: String },

    #[error("Undeploy of {deployment_id} failed: {reason}")]
    UndeployFailed {
        deployment_id: DeploymentId,
        reason: String,
    },

    #[error("Unknown deployment: {0}")]
    UnknownDeployment(DeploymentId),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
