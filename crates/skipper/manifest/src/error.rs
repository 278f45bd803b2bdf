//! Manifest error types

use skipper_types::UnknownKind;
use thiserror::Error;

/// Rendering and parsing errors
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Template render error in '{template}': {reason}")]
    TemplateRender { template: String, reason: String },

    #[error("Cyclic package dependency: {cycle}")]
    CyclicPackageDependency { cycle: String },

    #[error("Invalid config values: {0}")]
    InvalidValues(String),

    #[error(transparent)]
    UnknownKind(#[from] UnknownKind),

    #[error("Invalid application '{application}': {reason}")]
    InvalidAppSpec { application: String, reason: String },

    #[error("Duplicate application name in manifest: {0}")]
    DuplicateApplication(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ManifestError {
    pub(crate) fn render(template: &str, reason: impl Into<String>) -> Self {
        Self::TemplateRender {
            template: template.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ManifestError>;
