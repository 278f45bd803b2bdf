//! Health check of newly deployed applications

use crate::config::HealthCheckConfig;
use crate::context::UpgradeContext;
use crate::lock::OperationPermit;
use skipper_types::DeploymentId;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// How a health check ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthOutcome {
    /// Every application reported healthy
    Healthy,
    /// Cancellation was requested before every instance was healthy
    Cancelled,
    /// The timeout elapsed with these applications still not healthy
    TimedOut { pending: Vec<String> },
    /// The deployer could not report the status of an application
    StatusError { application: String, reason: String },
}

/// Poll `instances` until all are healthy, the timeout elapses, or the
/// operation is cancelled.
///
/// Sleeps one interval (capped at the remaining time) before every poll.
/// An application that has reported healthy once is not polled again.
pub async fn wait_for_healthy(
    ctx: &UpgradeContext,
    instances: &BTreeMap<String, DeploymentId>,
    config: &HealthCheckConfig,
    permit: &mut OperationPermit,
) -> HealthOutcome {
    let deadline = tokio::time::Instant::now() + config.timeout();
    let mut pending: BTreeMap<&str, &DeploymentId> = instances
        .iter()
        .map(|(application, id)| (application.as_str(), id))
        .collect();

    loop {
        if permit.is_cancelled() {
            return HealthOutcome::Cancelled;
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            return HealthOutcome::TimedOut {
                pending: pending.keys().map(|name| name.to_string()).collect(),
            };
        }

        let pause = config.interval().min(deadline - now);
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = permit.cancelled() => return HealthOutcome::Cancelled,
        }

        let mut healthy = Vec::new();
        for (application, id) in &pending {
            match ctx.app_status(id).await {
                Ok(status) if status.state.is_healthy() => healthy.push(*application),
                Ok(status) => {
                    debug!(application = %application, state = %status.state, "Not healthy yet");
                }
                Err(e) => {
                    return HealthOutcome::StatusError {
                        application: application.to_string(),
                        reason: e.to_string(),
                    };
                }
            }
        }
        for application in healthy {
            pending.remove(application);
        }

        // A cancel that arrived during the polls outranks their result
        if permit.is_cancelled() {
            return HealthOutcome::Cancelled;
        }

        if pending.is_empty() {
            info!(release = %permit.name(), applications = instances.len(), "All new applications healthy");
            return HealthOutcome::Healthy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::{OperationKind, ReleaseLocks};
    use skipper_registry::{AppDeploymentRequest, Deployer, InMemoryDeployer};
    use skipper_state::{InMemoryAppDeployerDataRepository, InMemoryReleaseRepository};
    use skipper_types::{AppSpec, AppSpecKind, UpgradePhase};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::broadcast;

    async fn setup(
        deployer: Arc<InMemoryDeployer>,
        apps: &[&str],
    ) -> (UpgradeContext, BTreeMap<String, DeploymentId>) {
        let (events, _) = broadcast::channel(16);
        let ctx = UpgradeContext::new(
            deployer.clone(),
            Arc::new(InMemoryReleaseRepository::new()),
            Arc::new(InMemoryAppDeployerDataRepository::new()),
            events,
        );
        let mut instances = BTreeMap::new();
        for app in apps {
            let request = AppDeploymentRequest::new(
                "logger",
                1,
                AppSpec::new(*app, AppSpecKind::GenericApp, "docker:example/app"),
            );
            instances.insert(app.to_string(), deployer.deploy(&request).await.unwrap());
        }
        (ctx, instances)
    }

    fn fast() -> HealthCheckConfig {
        HealthCheckConfig::new(Duration::from_millis(10), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_healthy_after_polls() {
        let deployer = Arc::new(InMemoryDeployer::new("local").with_polls_until_ready(3));
        let (ctx, instances) = setup(deployer, &["a", "b"]).await;
        let locks = ReleaseLocks::new();
        let mut permit = locks.try_acquire("logger", OperationKind::Install).unwrap();

        let outcome = wait_for_healthy(&ctx, &instances, &fast(), &mut permit).await;
        assert_eq!(outcome, HealthOutcome::Healthy);
    }

    #[tokio::test]
    async fn test_timeout_reports_pending_apps() {
        let deployer = Arc::new(InMemoryDeployer::new("local"));
        deployer.never_ready("b");
        let (ctx, instances) = setup(deployer, &["a", "b"]).await;
        let locks = ReleaseLocks::new();
        let mut permit = locks.try_acquire("logger", OperationKind::Install).unwrap();

        let config = HealthCheckConfig::new(Duration::from_millis(10), Duration::from_millis(50));
        let outcome = wait_for_healthy(&ctx, &instances, &config, &mut permit).await;
        assert_eq!(
            outcome,
            HealthOutcome::TimedOut {
                pending: vec!["b".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_status_error_stops_polling() {
        let deployer = Arc::new(InMemoryDeployer::new("local"));
        let (ctx, _) = setup(deployer, &[]).await;
        let mut instances = BTreeMap::new();
        instances.insert("ghost".to_string(), DeploymentId::new("missing"));
        let locks = ReleaseLocks::new();
        let mut permit = locks.try_acquire("logger", OperationKind::Install).unwrap();

        let outcome = wait_for_healthy(&ctx, &instances, &fast(), &mut permit).await;
        assert!(matches!(outcome, HealthOutcome::StatusError { ref application, .. } if application == "ghost"));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_sleep() {
        let deployer = Arc::new(InMemoryDeployer::new("local"));
        deployer.never_ready("a");
        let (ctx, instances) = setup(deployer, &["a"]).await;
        let locks = ReleaseLocks::new();
        let mut permit = locks.try_acquire("logger", OperationKind::Upgrade).unwrap();
        permit.set_phase(UpgradePhase::DeployingNew).unwrap();
        permit.set_phase(UpgradePhase::HealthCheck).unwrap();

        let slow = HealthCheckConfig::new(Duration::from_secs(30), Duration::from_secs(60));
        let canceller = locks.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.request_cancel("logger");
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            wait_for_healthy(&ctx, &instances, &slow, &mut permit),
        )
        .await
        .unwrap();
        assert_eq!(outcome, HealthOutcome::Cancelled);
    }
}
