//! Deployer trait and platform registry
//!
//! A deployer is the platform-specific client that starts and stops
//! application instances. Skipper never looks inside a deployment id; it only
//! hands it back to the deployer that produced it.

use crate::error::{RegistryError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use skipper_types::{AppSpec, AppStatus, DeploymentId};
use std::sync::Arc;
use tracing::info;

/// Everything a deployer needs to start one application
#[derive(Debug, Clone)]
pub struct AppDeploymentRequest {
    pub release_name: String,
    pub release_version: u32,
    pub app: AppSpec,
}

impl AppDeploymentRequest {
    pub fn new(release_name: impl Into<String>, release_version: u32, app: AppSpec) -> Self {
        Self {
            release_name: release_name.into(),
            release_version,
            app,
        }
    }
}

/// Platform client
///
/// Calls are fallible I/O. Callers do not retry; a failure is reported back
/// to the operator.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Start an application instance
    async fn deploy(&self, request: &AppDeploymentRequest) -> Result<DeploymentId>;

    /// Stop an application instance
    async fn undeploy(&self, id: &DeploymentId) -> Result<()>;

    /// Report the live state of an application instance
    async fn status(&self, id: &DeploymentId) -> Result<AppStatus>;

    /// Deployer name, used in logs
    fn name(&self) -> &str;
}

/// Platform name to deployer lookup
#[derive(Default)]
pub struct DeployerRegistry {
    deployers: DashMap<String, Arc<dyn Deployer>>,
}

impl DeployerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `deployer` for `platform`, replacing any previous one
    pub fn register(&self, platform: impl Into<String>, deployer: Arc<dyn Deployer>) {
        let platform = platform.into();
        info!(platform = %platform, deployer = deployer.name(), "Registered deployer");
        self.deployers.insert(platform, deployer);
    }

    pub fn get(&self, platform: &str) -> Result<Arc<dyn Deployer>> {
        self.deployers
            .get(platform)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::DeployerNotFound(platform.to_string()))
    }

    pub fn contains(&self, platform: &str) -> bool {
        self.deployers.contains_key(platform)
    }

    /// Registered platform names, sorted
    pub fn platforms(&self) -> Vec<String> {
        let mut names: Vec<String> = self.deployers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
