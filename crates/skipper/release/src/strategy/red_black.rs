//! Red/black upgrade strategy
//!
//! New instances are deployed next to the serving ones and health-checked.
//! Only once every new instance is healthy are the replaced instances of
//! the old release undeployed. Applications whose spec did not change keep
//! the instance of the old release.

use super::executor::{ExistingRelease, UpgradeOutcome, UpgradePlan, UpgradeStrategy};
use crate::config::HealthCheckConfig;
use crate::context::UpgradeContext;
use crate::error::{ReleaseError, Result};
use crate::health::{wait_for_healthy, HealthOutcome};
use crate::lock::OperationPermit;
use async_trait::async_trait;
use skipper_registry::RegistryError;
use skipper_types::*;
use std::collections::BTreeMap;
use tokio::time::Instant;
use tracing::{info, warn};

/// Red/black upgrade executor
pub struct RedBlackUpgradeStrategy {
    health_check: HealthCheckConfig,
}

impl RedBlackUpgradeStrategy {
    pub fn new(health_check: HealthCheckConfig) -> Self {
        Self { health_check }
    }

    pub fn health_check(&self) -> &HealthCheckConfig {
        &self.health_check
    }

    async fn fail(
        &self,
        ctx: &UpgradeContext,
        permit: &OperationPermit,
        release: &Release,
        reason: String,
    ) -> Result<UpgradeOutcome> {
        let release = ctx.set_status(release, StatusCode::Failed, reason.clone()).await?;
        ctx.advance(permit, &release, UpgradePhase::Failed)?;
        ctx.emit(ReleaseEvent::ReleaseFailed {
            release: release.name.clone(),
            version: release.version,
            reason: reason.clone(),
        });
        Ok(UpgradeOutcome::Failed { release, reason })
    }

    /// Remove the new instances and mark the new release FAILED
    async fn roll_back(
        &self,
        ctx: &UpgradeContext,
        permit: &OperationPermit,
        release: &Release,
        fresh: &BTreeMap<String, DeploymentId>,
        started: Instant,
    ) -> Result<UpgradeOutcome> {
        ctx.advance(permit, release, UpgradePhase::Cancelling)?;
        warn!(
            release = %release.name,
            version = release.version,
            new_instances = fresh.len(),
            "Cancelling upgrade"
        );

        let failures = ctx
            .undeploy_all(
                fresh
                    .iter()
                    .map(|(application, id)| (application.clone(), id.clone()))
                    .collect(),
            )
            .await;

        // Only instances that could not be removed stay on record
        let mut leftover = AppDeployerData::new(release.name.clone(), release.version);
        for (application, id, _) in failures {
            leftover.insert(application, id);
        }
        ctx.save_deployer_data(&leftover).await?;

        let description = format!("Cancelled after {} ms.", started.elapsed().as_millis());
        let release = ctx.set_status(release, StatusCode::Failed, description).await?;
        ctx.advance(permit, &release, UpgradePhase::RolledBack)?;
        ctx.emit(ReleaseEvent::ReleaseCancelled {
            release: release.name.clone(),
            version: release.version,
        });
        Ok(UpgradeOutcome::RolledBack { release })
    }

    /// Retire replaced instances, then flip the new release to DEPLOYED and
    /// the old one to DELETED. The permit must already be PROMOTING.
    async fn promote(
        &self,
        ctx: &UpgradeContext,
        permit: &OperationPermit,
        plan: &UpgradePlan,
    ) -> Result<UpgradeOutcome> {
        let mut failures = Vec::new();
        if let Some(ExistingRelease {
            release: existing,
            deployer_data,
        }) = &plan.existing
        {
            let retired: Vec<(String, DeploymentId)> = plan
                .redeploy
                .iter()
                .chain(plan.removed.iter())
                .filter_map(|application| {
                    deployer_data
                        .get(application)
                        .map(|id| (application.clone(), id.clone()))
                })
                .collect();

            info!(
                release = %existing.name,
                version = existing.version,
                retired = retired.len(),
                "Retiring replaced instances"
            );
            failures = ctx.undeploy_all(retired).await;
        }

        let release = ctx
            .set_status(&plan.replacing, StatusCode::Deployed, plan.completion_message())
            .await?;

        if let Some(ExistingRelease {
            release: existing, ..
        }) = &plan.existing
        {
            let existing = ctx
                .set_status(existing, StatusCode::Deleting, "Delete underway")
                .await?;
            if failures.is_empty() {
                ctx.set_status(&existing, StatusCode::Deleted, "Delete complete")
                    .await?;
            } else {
                let listed: Vec<String> = failures
                    .iter()
                    .map(|(application, _, reason)| format!("{application} ({reason})"))
                    .collect();
                ctx.set_status(
                    &existing,
                    StatusCode::Failed,
                    format!("Failed to undeploy: {}", listed.join(", ")),
                )
                .await?;
            }
        }

        ctx.advance(permit, &release, UpgradePhase::Completed)?;
        ctx.emit(ReleaseEvent::ReleaseDeployed {
            release: release.name.clone(),
            version: release.version,
        });
        Ok(UpgradeOutcome::Completed { release })
    }
}

fn deploy_failure(application: &str, err: RegistryError, deployed: &BTreeMap<String, DeploymentId>) -> String {
    let err = match err {
        RegistryError::DeployFailed { .. } => ReleaseError::from(err),
        other => ReleaseError::DeploymentFailed {
            application: application.to_string(),
            reason: other.to_string(),
        },
    };
    if deployed.is_empty() {
        format!("{err}. No applications were deployed")
    } else {
        let names: Vec<&str> = deployed.keys().map(String::as_str).collect();
        format!("{err}. Deployed: {}", names.join(", "))
    }
}

#[async_trait]
impl UpgradeStrategy for RedBlackUpgradeStrategy {
    async fn execute(
        &self,
        plan: UpgradePlan,
        ctx: &UpgradeContext,
        permit: &mut OperationPermit,
    ) -> Result<UpgradeOutcome> {
        let started = Instant::now();
        let replacing = plan.replacing.clone();

        info!(
            release = %replacing.name,
            version = replacing.version,
            existing_version = plan.existing.as_ref().map(|e| e.release.version),
            redeploy = plan.redeploy.len(),
            removed = plan.removed.len(),
            "Starting red/black upgrade"
        );

        // Phase 1: Deploy new instances, carry over unchanged ones
        ctx.advance(permit, &replacing, UpgradePhase::DeployingNew)?;

        let mut data = AppDeployerData::new(replacing.name.clone(), replacing.version);
        let mut fresh = BTreeMap::new();
        for app in replacing.manifest.apps() {
            let application = &app.application_name;

            if !plan.redeploy.contains(application) {
                let carried = plan
                    .existing
                    .as_ref()
                    .and_then(|existing| existing.deployer_data.get(application));
                if let Some(id) = carried {
                    data.insert(application.clone(), id.clone());
                    continue;
                }
            }

            if permit.is_cancelled() {
                return self.roll_back(ctx, permit, &replacing, &fresh, started).await;
            }

            match ctx.deploy_app(&replacing, app).await {
                Ok(id) => {
                    data.insert(application.clone(), id.clone());
                    fresh.insert(application.clone(), id);
                }
                Err(e) => {
                    // Record only what this attempt started
                    let mut started_here =
                        AppDeployerData::new(replacing.name.clone(), replacing.version);
                    for (name, id) in &fresh {
                        started_here.insert(name.clone(), id.clone());
                    }
                    ctx.save_deployer_data(&started_here).await?;

                    let reason = deploy_failure(application, e, &fresh);
                    return self.fail(ctx, permit, &replacing, reason).await;
                }
            }
        }
        ctx.save_deployer_data(&data).await?;

        // Phase 2: Wait for the new instances
        let health_check = match plan.health_check_timeout {
            Some(timeout) => self.health_check.with_timeout(timeout),
            None => self.health_check.clone(),
        };
        if !fresh.is_empty() {
            ctx.advance(permit, &replacing, UpgradePhase::HealthCheck)?;

            match wait_for_healthy(ctx, &fresh, &health_check, permit).await {
                HealthOutcome::Healthy => {}
                HealthOutcome::Cancelled => {
                    return self.roll_back(ctx, permit, &replacing, &fresh, started).await;
                }
                HealthOutcome::TimedOut { pending } => {
                    warn!(
                        release = %replacing.name,
                        version = replacing.version,
                        pending = ?pending,
                        "Health check timed out"
                    );
                    let reason = ReleaseError::HealthCheckTimeout {
                        timeout_ms: health_check.timeout_ms,
                    }
                    .to_string();
                    return self.fail(ctx, permit, &replacing, reason).await;
                }
                HealthOutcome::StatusError {
                    application,
                    reason,
                } => {
                    let reason = format!("Status check of '{application}' failed: {reason}");
                    return self.fail(ctx, permit, &replacing, reason).await;
                }
            }
        }

        // Phase 3: Promote, unless a cancel was accepted before this point
        if !ctx.begin_promotion(permit, &replacing)? {
            return self.roll_back(ctx, permit, &replacing, &fresh, started).await;
        }
        let outcome = self.promote(ctx, permit, &plan).await?;

        info!(
            release = %replacing.name,
            version = replacing.version,
            new_instances = fresh.len(),
            carried_over = data.deployment_data.len() - fresh.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Red/black upgrade completed"
        );

        Ok(outcome)
    }

    fn name(&self) -> &str {
        "red-black"
    }
}
