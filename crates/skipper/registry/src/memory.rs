//! Simulated deployer
//!
//! Keeps application instances in memory. An instance reports `deploying`
//! until it has been polled a configurable number of times and then reports
//! `deployed`. Failures can be injected per application name.

use crate::deployer::{AppDeploymentRequest, Deployer};
use crate::error::{RegistryError, Result};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use skipper_types::{AppStatus, DeploymentId, DeploymentState};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info};
use uuid::Uuid;

/// One simulated application instance
#[derive(Debug, Clone)]
pub struct SimulatedInstance {
    pub application_name: String,
    pub release_name: String,
    pub release_version: u32,
    pub polls: u32,
    pub undeployed: bool,
}

/// In-memory deployer for development and tests
pub struct InMemoryDeployer {
    name: String,
    instances: DashMap<DeploymentId, SimulatedInstance>,
    /// Deploy order, used to answer ordering questions in tests
    deploy_log: DashMap<u32, DeploymentId>,
    deploy_seq: AtomicU32,
    undeploy_calls: DashMap<DeploymentId, u32>,
    polls_until_ready: AtomicU32,
    failing_deploys: DashMap<String, String>,
    failing_undeploys: DashSet<String>,
    never_ready: DashSet<String>,
}

impl InMemoryDeployer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instances: DashMap::new(),
            deploy_log: DashMap::new(),
            deploy_seq: AtomicU32::new(0),
            undeploy_calls: DashMap::new(),
            polls_until_ready: AtomicU32::new(1),
            failing_deploys: DashMap::new(),
            failing_undeploys: DashSet::new(),
            never_ready: DashSet::new(),
        }
    }

    /// Number of status polls before a new instance reports healthy
    pub fn with_polls_until_ready(self, polls: u32) -> Self {
        self.polls_until_ready.store(polls, Ordering::SeqCst);
        self
    }

    /// Make every deploy of `application` fail with `reason`
    pub fn fail_deploys_of(&self, application: impl Into<String>, reason: impl Into<String>) {
        self.failing_deploys.insert(application.into(), reason.into());
    }

    /// Make every undeploy of an `application` instance fail
    pub fn fail_undeploys_of(&self, application: impl Into<String>) {
        self.failing_undeploys.insert(application.into());
    }

    /// Instances of `application` never become healthy
    pub fn never_ready(&self, application: impl Into<String>) {
        self.never_ready.insert(application.into());
    }

    /// Remove every injected failure
    pub fn heal(&self) {
        self.failing_deploys.clear();
        self.failing_undeploys.clear();
        self.never_ready.clear();
    }

    pub fn instance(&self, id: &DeploymentId) -> Option<SimulatedInstance> {
        self.instances.get(id).map(|entry| entry.clone())
    }

    /// Deployment ids in the order they were deployed
    pub fn deployed(&self) -> Vec<DeploymentId> {
        let mut log: Vec<(u32, DeploymentId)> = self
            .deploy_log
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        log.sort_by_key(|(seq, _)| *seq);
        log.into_iter().map(|(_, id)| id).collect()
    }

    /// Number of undeploy calls made against `id`, successful or not
    pub fn undeploy_calls(&self, id: &DeploymentId) -> u32 {
        self.undeploy_calls.get(id).map_or(0, |count| *count)
    }

    /// Total undeploy calls across all instances
    pub fn total_undeploy_calls(&self) -> u32 {
        self.undeploy_calls.iter().map(|entry| *entry.value()).sum()
    }

    /// Ids of instances that are still running
    pub fn running(&self) -> Vec<DeploymentId> {
        let mut running: Vec<DeploymentId> = self
            .instances
            .iter()
            .filter(|entry| !entry.value().undeployed)
            .map(|entry| entry.key().clone())
            .collect();
        running.sort();
        running
    }
}

#[async_trait]
impl Deployer for InMemoryDeployer {
    async fn deploy(&self, request: &AppDeploymentRequest) -> Result<DeploymentId> {
        let application = &request.app.application_name;
        if let Some(reason) = self.failing_deploys.get(application) {
            return Err(RegistryError::DeployFailed {
                application: application.clone(),
                reason: reason.clone(),
            });
        }

        let suffix = Uuid::new_v4().simple().to_string();
        let id = DeploymentId::new(format!(
            "{}.{}-v{}-{}",
            request.release_name,
            application,
            request.release_version,
            &suffix[..8]
        ));

        self.instances.insert(
            id.clone(),
            SimulatedInstance {
                application_name: application.clone(),
                release_name: request.release_name.clone(),
                release_version: request.release_version,
                polls: 0,
                undeployed: false,
            },
        );
        let seq = self.deploy_seq.fetch_add(1, Ordering::SeqCst);
        self.deploy_log.insert(seq, id.clone());

        info!(deployer = %self.name, deployment_id = %id, "Deployed application");
        Ok(id)
    }

    async fn undeploy(&self, id: &DeploymentId) -> Result<()> {
        *self.undeploy_calls.entry(id.clone()).or_insert(0) += 1;

        let mut instance = self
            .instances
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownDeployment(id.clone()))?;

        if self.failing_undeploys.contains(&instance.application_name) {
            return Err(RegistryError::UndeployFailed {
                deployment_id: id.clone(),
                reason: "simulated undeploy failure".into(),
            });
        }

        instance.undeployed = true;
        info!(deployer = %self.name, deployment_id = %id, "Undeployed application");
        Ok(())
    }

    async fn status(&self, id: &DeploymentId) -> Result<AppStatus> {
        let mut instance = self
            .instances
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownDeployment(id.clone()))?;

        let state = if instance.undeployed {
            DeploymentState::Undeployed
        } else if self.never_ready.contains(&instance.application_name) {
            DeploymentState::Deploying
        } else {
            instance.polls += 1;
            if instance.polls >= self.polls_until_ready.load(Ordering::SeqCst) {
                DeploymentState::Deployed
            } else {
                DeploymentState::Deploying
            }
        };

        debug!(deployment_id = %id, state = %state, "Reported status");
        Ok(AppStatus::new(id.clone(), state).with_attribute("deployer", self.name.clone()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skipper_types::{AppSpec, AppSpecKind};

    fn request(app: &str) -> AppDeploymentRequest {
        AppDeploymentRequest::new(
            "logger",
            1,
            AppSpec::new(app, AppSpecKind::GenericApp, "docker:example/logger"),
        )
    }

    #[tokio::test]
    async fn test_instance_becomes_healthy_after_polls() {
        let deployer = InMemoryDeployer::new("local").with_polls_until_ready(2);
        let id = deployer.deploy(&request("logger-app")).await.unwrap();
        assert!(id.as_str().starts_with("logger.logger-app-v1-"));

        assert_eq!(deployer.status(&id).await.unwrap().state, DeploymentState::Deploying);
        assert_eq!(deployer.status(&id).await.unwrap().state, DeploymentState::Deployed);
    }

    #[tokio::test]
    async fn test_injected_deploy_failure() {
        let deployer = InMemoryDeployer::new("local");
        deployer.fail_deploys_of("logger-app", "image pull failed");

        let err = deployer.deploy(&request("logger-app")).await.unwrap_err();
        assert!(err.to_string().contains("image pull failed"));
        assert!(deployer.deployed().is_empty());
    }

    #[tokio::test]
    async fn test_undeploy_is_counted() {
        let deployer = InMemoryDeployer::new("local");
        let id = deployer.deploy(&request("logger-app")).await.unwrap();
        deployer.undeploy(&id).await.unwrap();

        assert_eq!(deployer.undeploy_calls(&id), 1);
        assert!(deployer.running().is_empty());
        assert_eq!(deployer.status(&id).await.unwrap().state, DeploymentState::Undeployed);

        let unknown = DeploymentId::new("nope");
        assert!(deployer.undeploy(&unknown).await.is_err());
        assert_eq!(deployer.total_undeploy_calls(), 2);
    }
}
