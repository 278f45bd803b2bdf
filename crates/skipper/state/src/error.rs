//! Repository error types

use skipper_types::StatusCode;
use thiserror::Error;

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("release {name} v{version} not found")]
    NotFound { name: String, version: u32 },

    #[error("release {name}: expected next version {expected}, got {actual}")]
    VersionConflict {
        name: String,
        expected: u32,
        actual: u32,
    },

    #[error("release {name} v{version}: manifest cannot change after creation")]
    ManifestImmutable { name: String, version: u32 },

    #[error("release {name} v{version}: illegal status change {from} -> {to}")]
    InvalidTransition {
        name: String,
        version: u32,
        from: StatusCode,
        to: StatusCode,
    },

    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;
