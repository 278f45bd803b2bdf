//! Release types
//!
//! A [`Release`] is one version of a named installation. Its manifest never
//! changes after creation; only its status does. Changing what runs always
//! means creating a new version.

use crate::ids::DeploymentId;
use crate::manifest::Manifest;
use crate::package::{ConfigValues, PackageMetadata, PackageRef};
use crate::status::{AppStatus, ReleaseStatus, StatusCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One version of a named release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub name: String,
    /// Starts at 1, strictly increasing and gap-free per name
    pub version: u32,
    pub package: PackageRef,
    pub package_metadata: PackageMetadata,
    #[serde(default)]
    pub config_values: ConfigValues,
    pub manifest: Manifest,
    pub status: ReleaseStatus,
    pub platform_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Release {
    pub fn code(&self) -> StatusCode {
        self.status.code
    }

    pub fn is_deleted(&self) -> bool {
        self.status.code == StatusCode::Deleted
    }
}

/// Mapping from application name to the deployer instance backing it, for
/// one release version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDeployerData {
    pub release_name: String,
    pub release_version: u32,
    #[serde(default)]
    pub deployment_data: BTreeMap<String, DeploymentId>,
}

impl AppDeployerData {
    pub fn new(release_name: impl Into<String>, release_version: u32) -> Self {
        Self {
            release_name: release_name.into(),
            release_version,
            deployment_data: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, application_name: impl Into<String>, id: DeploymentId) {
        self.deployment_data.insert(application_name.into(), id);
    }

    pub fn get(&self, application_name: &str) -> Option<&DeploymentId> {
        self.deployment_data.get(application_name)
    }

    pub fn deployment_ids(&self) -> impl Iterator<Item = &DeploymentId> {
        self.deployment_data.values()
    }

    pub fn is_empty(&self) -> bool {
        self.deployment_data.is_empty()
    }
}

/// Snapshot returned by a status query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub release_name: String,
    pub version: u32,
    pub status: ReleaseStatus,
    /// Live status per application name; empty once deleted
    #[serde(default)]
    pub applications: BTreeMap<String, AppStatus>,
    pub first_deployed: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Info {
    /// True when every application reports a healthy state
    pub fn all_healthy(&self) -> bool {
        !self.applications.is_empty()
            && self
                .applications
                .values()
                .all(|status| status.state.is_healthy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::DeploymentState;

    #[test]
    fn test_deployer_data_lookup() {
        let mut data = AppDeployerData::new("logger", 1);
        assert!(data.is_empty());

        data.insert("logger-app", DeploymentId::new("logger.logger-app-v1"));
        assert_eq!(
            data.get("logger-app").map(DeploymentId::as_str),
            Some("logger.logger-app-v1")
        );
        assert_eq!(data.deployment_ids().count(), 1);
    }

    #[test]
    fn test_info_health_requires_applications() {
        let now = Utc::now();
        let mut info = Info {
            release_name: "logger".into(),
            version: 1,
            status: ReleaseStatus::new(StatusCode::Deployed, "Install complete"),
            applications: BTreeMap::new(),
            first_deployed: now,
            last_updated: now,
        };
        assert!(!info.all_healthy());

        info.applications.insert(
            "logger-app".into(),
            AppStatus::new(DeploymentId::new("a"), DeploymentState::Deployed),
        );
        assert!(info.all_healthy());

        info.applications.insert(
            "time-app".into(),
            AppStatus::new(DeploymentId::new("b"), DeploymentState::Deploying),
        );
        assert!(!info.all_healthy());
    }
}
