//! Upgrade Context - Execution environment for upgrade strategies
//!
//! Bridges the state machine to the deployer of the release's platform and
//! to the release stores. Every status change and phase change the engine
//! makes goes through here so it is logged and broadcast consistently.

use crate::error::Result;
use crate::lock::OperationPermit;
use futures::future::join_all;
use skipper_registry::{AppDeploymentRequest, Deployer, RegistryError};
use skipper_state::{AppDeployerDataRepository, ReleaseRepository};
use skipper_types::*;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

/// Context provided to upgrade strategies
#[derive(Clone)]
pub struct UpgradeContext {
    deployer: Arc<dyn Deployer>,
    releases: Arc<dyn ReleaseRepository>,
    deployer_data: Arc<dyn AppDeployerDataRepository>,
    events: broadcast::Sender<ReleaseEventEnvelope>,
}

impl UpgradeContext {
    pub fn new(
        deployer: Arc<dyn Deployer>,
        releases: Arc<dyn ReleaseRepository>,
        deployer_data: Arc<dyn AppDeployerDataRepository>,
        events: broadcast::Sender<ReleaseEventEnvelope>,
    ) -> Self {
        Self {
            deployer,
            releases,
            deployer_data,
            events,
        }
    }

    /// Deployer of the platform the release runs on
    pub fn deployer(&self) -> &dyn Deployer {
        self.deployer.as_ref()
    }

    /// Same stores and event channel, another platform's deployer
    pub fn with_deployer(&self, deployer: Arc<dyn Deployer>) -> Self {
        Self {
            deployer,
            ..self.clone()
        }
    }

    /// Start one application of `release`
    #[instrument(skip(self, release, app), fields(release = %release.name, version = release.version, application = %app.application_name))]
    pub async fn deploy_app(
        &self,
        release: &Release,
        app: &AppSpec,
    ) -> std::result::Result<DeploymentId, RegistryError> {
        let request = AppDeploymentRequest::new(release.name.clone(), release.version, app.clone());
        let id = self.deployer.deploy(&request).await?;
        info!(deployment_id = %id, "Application deployed");
        Ok(id)
    }

    pub async fn app_status(
        &self,
        id: &DeploymentId,
    ) -> std::result::Result<AppStatus, RegistryError> {
        self.deployer.status(id).await
    }

    /// Undeploy every instance concurrently.
    ///
    /// Returns the applications whose undeploy failed, with the reason.
    pub async fn undeploy_all(
        &self,
        instances: Vec<(String, DeploymentId)>,
    ) -> Vec<(String, DeploymentId, String)> {
        let calls = instances.into_iter().map(|(application, id)| async move {
            let outcome = self.deployer.undeploy(&id).await;
            (application, id, outcome)
        });

        join_all(calls)
            .await
            .into_iter()
            .filter_map(|(application, id, outcome)| match outcome {
                Ok(()) => {
                    debug!(application = %application, deployment_id = %id, "Undeployed");
                    None
                }
                Err(e) => {
                    warn!(
                        application = %application,
                        deployment_id = %id,
                        error = %e,
                        "Undeploy failed"
                    );
                    Some((application, id, e.to_string()))
                }
            })
            .collect()
    }

    /// Persist a status change of `release`
    pub async fn set_status(
        &self,
        release: &Release,
        code: StatusCode,
        description: impl Into<String>,
    ) -> Result<Release> {
        let description = description.into();
        info!(
            release = %release.name,
            version = release.version,
            status = %code,
            description = %description,
            "Release status changed"
        );
        Ok(self
            .releases
            .update_status(&release.name, release.version, ReleaseStatus::new(code, description))
            .await?)
    }

    pub async fn save_deployer_data(&self, data: &AppDeployerData) -> Result<()> {
        self.deployer_data.save(data).await?;
        Ok(())
    }

    pub fn emit(&self, event: ReleaseEvent) {
        // No subscribers is fine
        let _ = self.events.send(ReleaseEventEnvelope::now(event));
    }

    /// Advance the state machine of `release` and broadcast the change
    pub fn advance(
        &self,
        permit: &OperationPermit,
        release: &Release,
        next: UpgradePhase,
    ) -> Result<()> {
        let from = permit.set_phase(next)?;
        debug!(release = %release.name, version = release.version, from = %from, to = %next, "Phase changed");
        self.emit(ReleaseEvent::PhaseChanged {
            release: release.name.clone(),
            version: release.version,
            from,
            to: next,
        });
        Ok(())
    }

    /// Move `release` to PROMOTING unless a cancel got in first.
    ///
    /// Returns false when the state machine must roll back instead.
    pub fn begin_promotion(&self, permit: &OperationPermit, release: &Release) -> Result<bool> {
        let from = permit.phase();
        if !permit.enter_promotion()? {
            debug!(release = %release.name, version = release.version, "Cancel won over promotion");
            return Ok(false);
        }
        self.emit(ReleaseEvent::PhaseChanged {
            release: release.name.clone(),
            version: release.version,
            from,
            to: UpgradePhase::Promoting,
        });
        Ok(true)
    }
}
