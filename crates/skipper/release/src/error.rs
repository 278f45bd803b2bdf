//! Release service error types

use skipper_manifest::ManifestError;
use skipper_registry::RegistryError;
use skipper_state::RepositoryError;
use thiserror::Error;

/// Release errors
///
/// Request validation problems are returned synchronously. Deployment and
/// health-check failures happen after the call has returned and are recorded
/// in the release's status description instead.
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Release not found: {0}")]
    ReleaseNotFound(String),

    #[error("Release already exists: {0}")]
    ReleaseAlreadyExists(String),

    #[error("Invalid version {0}: release versions start at 1")]
    InvalidVersion(u32),

    #[error("Another operation is in progress for release {0}")]
    UpgradeInProgress(String),

    #[error("Deployment of '{application}' failed: {reason}")]
    DeploymentFailed { application: String, reason: String },

    #[error("Did not detect apps in replacing release as healthy after {timeout_ms} ms")]
    HealthCheckTimeout { timeout_ms: u64 },

    #[error("No changes between deployed release {0} and the requested upgrade")]
    NoChanges(String),

    #[error("No deployer registered for platform: {0}")]
    DeployerNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Deployer error: {0}")]
    Deployer(RegistryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RegistryError> for ReleaseError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::PackageNotFound(reference) => {
                ReleaseError::PackageNotFound(reference.to_string())
            }
            RegistryError::DeployerNotFound(platform) => ReleaseError::DeployerNotFound(platform),
            RegistryError::DeployFailed {
                application,
                reason,
            } => ReleaseError::DeploymentFailed {
                application,
                reason,
            },
            other => ReleaseError::Deployer(other),
        }
    }
}

impl From<config::ConfigError> for ReleaseError {
    fn from(err: config::ConfigError) -> Self {
        ReleaseError::Config(err.to_string())
    }
}

/// Result type for release operations
pub type Result<T> = std::result::Result<T, ReleaseError>;
