//! Release Service - High-level release operations
//!
//! The ReleaseService is the main entry point. Install, upgrade, rollback and
//! delete validate the request, persist the new release record and return
//! it straight away; the state machine then runs on a background task that
//! owns the release name's operation permit. Status and history reads never
//! wait for an in-flight operation.

use crate::config::SkipperConfig;
use crate::context::UpgradeContext;
use crate::error::{ReleaseError, Result};
use crate::lock::{OperationKind, OperationPermit, ReleaseLocks};
use crate::strategy::{self, ExistingRelease, UpgradePlan, UpgradeStrategy};
use chrono::Utc;
use skipper_manifest::{analyze, ManifestRenderer};
use skipper_registry::{Deployer, DeployerRegistry, PackageSource};
use skipper_state::{AppDeployerDataRepository, ReleaseRepository};
use skipper_types::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

/// Status attribute naming the application an instance belongs to
pub const ATTR_APPLICATION_NAME: &str = "skipper.application.name";
/// Status attribute naming the owning release
pub const ATTR_RELEASE_NAME: &str = "skipper.release.name";
/// Status attribute carrying the owning release version
pub const ATTR_RELEASE_VERSION: &str = "skipper.release.version";

/// Options for upgrade operations
#[derive(Debug, Clone, Default)]
pub struct UpgradeOptions {
    /// Redeploy even when the manifest is unchanged
    pub force: bool,
    /// With `force`, redeploy these applications on top of the changed ones
    /// instead of every application
    pub app_names: Option<BTreeSet<String>>,
    /// Health-check timeout for this upgrade only
    pub timeout: Option<Duration>,
}

impl UpgradeOptions {
    /// Redeploy every application
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    /// Redeploy `app_names` in addition to whatever changed
    pub fn force_apps<I, S>(app_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            force: true,
            app_names: Some(app_names.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Options for rollback operations
#[derive(Debug, Clone, Copy, Default)]
pub struct RollbackOptions {
    /// Health-check timeout for this rollback only
    pub timeout: Option<Duration>,
}

/// Release Service orchestrates release lifecycles
pub struct ReleaseService {
    /// Package lookup
    packages: Arc<dyn PackageSource>,
    /// Deployers by platform name
    deployers: Arc<DeployerRegistry>,
    /// Release records
    releases: Arc<dyn ReleaseRepository>,
    /// Instances backing each release version
    deployer_data: Arc<dyn AppDeployerDataRepository>,
    renderer: ManifestRenderer,
    strategy: Arc<dyn UpgradeStrategy>,
    /// One in-flight operation per release name
    locks: ReleaseLocks,
    /// Event channel
    event_tx: broadcast::Sender<ReleaseEventEnvelope>,
}

impl ReleaseService {
    /// Create a new release service
    pub fn new(
        packages: Arc<dyn PackageSource>,
        deployers: Arc<DeployerRegistry>,
        releases: Arc<dyn ReleaseRepository>,
        deployer_data: Arc<dyn AppDeployerDataRepository>,
        config: &SkipperConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.events.capacity.max(1));

        Self {
            packages,
            deployers,
            releases,
            deployer_data,
            renderer: ManifestRenderer::new().strict(config.renderer.strict),
            strategy: strategy::create_strategy(&config.health_check),
            locks: ReleaseLocks::new(),
            event_tx,
        }
    }

    /// Replace the upgrade strategy
    pub fn with_strategy(mut self, strategy: Arc<dyn UpgradeStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Install a package as a new release
    #[instrument(skip(self, package, values), fields(release = %release_name, package = %package))]
    pub async fn install(
        &self,
        package: &PackageRef,
        release_name: &str,
        platform_name: &str,
        values: ConfigValues,
    ) -> Result<Release> {
        // 1. Validate request
        validate_name("release", release_name)?;
        validate_name("platform", platform_name)?;
        let deployer = self.deployers.get(platform_name)?;

        // 2. Claim the release name
        let permit = self.locks.try_acquire(release_name, OperationKind::Install)?;

        if self.releases.find_current(release_name).await?.is_some() {
            return Err(ReleaseError::ReleaseAlreadyExists(release_name.to_string()));
        }

        // 3. Resolve and render
        let resolved = self.packages.resolve(package).await?;
        let manifest = self.renderer.render(&resolved, &values)?;

        // 4. Persist the new version; a deleted name continues its numbering
        let version = match self.releases.find_latest_by_name(release_name).await? {
            Some(previous) => {
                info!(
                    previous_version = previous.version,
                    "Re-using name of previously deleted release"
                );
                previous.version + 1
            }
            None => 1,
        };
        let release = new_release(
            release_name,
            version,
            &resolved,
            values,
            manifest,
            platform_name,
            "Install underway",
        );
        self.releases.save(&release).await?;

        // 5. Emit event
        self.emit_event(ReleaseEvent::InstallStarted {
            release: release.name.clone(),
            version,
            platform: platform_name.to_string(),
        });

        // 6. Run the state machine
        let redeploy = release.manifest.names().map(str::to_string).collect();
        let plan = UpgradePlan {
            existing: None,
            replacing: release.clone(),
            redeploy,
            removed: BTreeSet::new(),
            kind: OperationKind::Install,
            health_check_timeout: None,
        };
        self.spawn_upgrade(plan, self.context(deployer), permit);

        info!(version, "Release install started");
        Ok(release)
    }

    /// Upgrade a release to a new package version or new values
    pub async fn upgrade(
        &self,
        release_name: &str,
        package: &PackageRef,
        values: ConfigValues,
    ) -> Result<Release> {
        self.upgrade_with_options(release_name, package, values, UpgradeOptions::default())
            .await
    }

    /// Upgrade a release, optionally forcing redeploys or overriding the
    /// health-check timeout
    #[instrument(skip(self, package, values), fields(release = %release_name, package = %package))]
    pub async fn upgrade_with_options(
        &self,
        release_name: &str,
        package: &PackageRef,
        values: ConfigValues,
        options: UpgradeOptions,
    ) -> Result<Release> {
        // 1. Claim the release name
        let permit = self.locks.try_acquire(release_name, OperationKind::Upgrade)?;

        // 2. Get current release
        let current = self
            .releases
            .find_current(release_name)
            .await?
            .ok_or_else(|| ReleaseError::ReleaseNotFound(release_name.to_string()))?;
        let deployer = self.deployers.get(&current.platform_name)?;

        // 3. Render the candidate manifest
        let resolved = self.packages.resolve(package).await?;
        let manifest = self.renderer.render(&resolved, &values)?;

        // 4. Compare with what is serving
        let existing = self.find_serving(release_name).await?;
        let empty = Manifest::new(Vec::new());
        let serving_manifest = existing
            .as_ref()
            .map_or(&empty, |existing| &existing.release.manifest);
        let diff = analyze(serving_manifest, &manifest);

        if diff.are_equal() && !options.force {
            return Err(ReleaseError::NoChanges(format!(
                "{} v{}",
                release_name,
                existing.as_ref().map_or(current.version, |e| e.release.version)
            )));
        }
        debug!(diff = %diff, "Computed manifest difference");

        let mut redeploy = diff.redeploy();
        if options.force {
            match &options.app_names {
                Some(app_names) if !app_names.is_empty() => {
                    if let Some(unknown) = app_names.iter().find(|name| manifest.get(name.as_str()).is_none()) {
                        return Err(ReleaseError::InvalidRequest(format!(
                            "application '{unknown}' is not part of the upgraded release"
                        )));
                    }
                    redeploy.extend(app_names.iter().cloned());
                }
                _ => redeploy.extend(manifest.names().map(str::to_string)),
            }
        }

        // 5. Persist the new version
        let version = self.next_version(release_name).await?;
        let release = new_release(
            release_name,
            version,
            &resolved,
            values,
            manifest,
            &current.platform_name,
            "Upgrade install underway",
        );
        self.releases.save(&release).await?;

        // 6. Emit event
        self.emit_event(ReleaseEvent::UpgradeStarted {
            release: release.name.clone(),
            version,
            redeploy: redeploy.iter().cloned().collect(),
        });

        // 7. Run the state machine
        let plan = UpgradePlan {
            existing,
            replacing: release.clone(),
            redeploy,
            removed: diff.removed(),
            kind: OperationKind::Upgrade,
            health_check_timeout: options.timeout,
        };
        self.spawn_upgrade(plan, self.context(deployer), permit);

        info!(version, "Release upgrade started");
        Ok(release)
    }

    /// Roll back to an earlier version by deploying a copy of it
    pub async fn rollback(&self, release_name: &str, version: u32) -> Result<Release> {
        self.rollback_with_options(release_name, version, RollbackOptions::default())
            .await
    }

    /// Roll back with a health-check timeout for this run only.
    ///
    /// The copy runs on the platform of the serving release, or on the
    /// platform of `version` when nothing is serving.
    #[instrument(skip(self, options), fields(release = %release_name))]
    pub async fn rollback_with_options(
        &self,
        release_name: &str,
        version: u32,
        options: RollbackOptions,
    ) -> Result<Release> {
        // 1. Validate request
        if version == 0 {
            return Err(ReleaseError::InvalidVersion(version));
        }

        // 2. Claim the release name
        let permit = self.locks.try_acquire(release_name, OperationKind::Rollback)?;

        // 3. Get the version to restore
        let target = self
            .releases
            .find_by_name_and_version(release_name, version)
            .await?
            .ok_or_else(|| ReleaseError::ReleaseNotFound(format!("{release_name} v{version}")))?;

        // 4. Compare with what is serving; nothing serving means a fresh install
        let existing = self.find_serving(release_name).await?;
        let platform_name = existing
            .as_ref()
            .map_or(&target.platform_name, |existing| &existing.release.platform_name)
            .clone();
        let deployer = self.deployers.get(&platform_name)?;
        let (redeploy, removed) = match &existing {
            Some(existing) => {
                let diff = analyze(&existing.release.manifest, &target.manifest);
                (diff.redeploy(), diff.removed())
            }
            None => (
                target.manifest.names().map(str::to_string).collect(),
                BTreeSet::new(),
            ),
        };

        // 5. Persist the new version with the copied manifest
        let next = self.next_version(release_name).await?;
        let now = Utc::now();
        let release = Release {
            version: next,
            status: ReleaseStatus::new(StatusCode::Deploying, "Rollback install underway"),
            platform_name,
            created_at: now,
            updated_at: now,
            ..target.clone()
        };
        self.releases.save(&release).await?;

        // 6. Emit event
        self.emit_event(ReleaseEvent::RollbackStarted {
            release: release.name.clone(),
            version: next,
            source_version: version,
        });

        // 7. Run the state machine
        let kind = if existing.is_some() {
            OperationKind::Rollback
        } else {
            OperationKind::Install
        };
        let plan = UpgradePlan {
            existing,
            replacing: release.clone(),
            redeploy,
            removed,
            kind,
            health_check_timeout: options.timeout,
        };
        self.spawn_upgrade(plan, self.context(deployer), permit);

        info!(version = next, source_version = version, "Release rollback started");
        Ok(release)
    }

    /// Delete a release, undeploying every instance of every live version
    #[instrument(skip(self), fields(release = %release_name))]
    pub async fn delete(&self, release_name: &str) -> Result<Release> {
        // 1. Claim the release name
        let permit = self.locks.try_acquire(release_name, OperationKind::Delete)?;

        // 2. Get current release
        let current = self
            .releases
            .find_current(release_name)
            .await?
            .ok_or_else(|| ReleaseError::ReleaseNotFound(release_name.to_string()))?;
        let deployer = self.deployers.get(&current.platform_name)?;

        // 3. Mark it as going away
        let deleting = self
            .releases
            .update_status(
                release_name,
                current.version,
                ReleaseStatus::new(StatusCode::Deleting, "Delete underway"),
            )
            .await?;

        // 4. Emit event
        self.emit_event(ReleaseEvent::DeleteStarted {
            release: deleting.name.clone(),
            version: deleting.version,
        });

        // 5. Tear down in the background
        let ctx = self.context(deployer);
        let deployers = self.deployers.clone();
        let releases = self.releases.clone();
        let deployer_data = self.deployer_data.clone();
        let target = deleting.clone();
        tokio::spawn(async move {
            if let Err(e) = run_delete(&ctx, &deployers, releases, deployer_data, &target).await {
                error!(release = %target.name, version = target.version, error = %e, "Delete aborted");
                mark_failed(&ctx, &target, e.to_string()).await;
            }
            drop(permit);
        });

        info!(version = deleting.version, "Release delete started");
        Ok(deleting)
    }

    /// Live status of a release version, latest when `version` is absent
    #[instrument(skip(self), fields(release = %release_name))]
    pub async fn status(&self, release_name: &str, version: Option<u32>) -> Result<Info> {
        let mut release = self.find_release(release_name, version).await?;
        let mut applications = BTreeMap::new();

        if !release.is_deleted() {
            let data = self
                .deployer_data
                .find(release_name, release.version)
                .await?;
            if let Some(data) = data {
                let deployer = self.deployers.get(&release.platform_name)?;
                for (application, id) in &data.deployment_data {
                    let status = match deployer.status(id).await {
                        Ok(status) => status,
                        Err(e) => {
                            warn!(application = %application, deployment_id = %id, error = %e, "Status lookup failed");
                            AppStatus::new(id.clone(), DeploymentState::Unknown)
                                .with_attribute("error", e.to_string())
                        }
                    };
                    let status = status
                        .with_attribute(ATTR_APPLICATION_NAME, application.clone())
                        .with_attribute(ATTR_RELEASE_NAME, release.name.clone())
                        .with_attribute(ATTR_RELEASE_VERSION, release.version.to_string());
                    applications.insert(application.clone(), status);
                }
            }

            let summary = applications
                .iter()
                .map(|(application, status)| format!("{application}: {}", status.state))
                .collect::<Vec<_>>()
                .join(", ");
            self.releases
                .update_platform_status(release_name, release.version, summary.clone())
                .await?;
            release.status.platform_status = summary;
        }

        Ok(Info {
            release_name: release.name,
            version: release.version,
            status: release.status,
            applications,
            first_deployed: release.created_at,
            last_updated: release.updated_at,
        })
    }

    /// Up to `max_revisions` most recent versions, newest first. Zero means all.
    pub async fn history(&self, release_name: &str, max_revisions: usize) -> Result<Vec<Release>> {
        let revisions = self
            .releases
            .find_revisions(release_name, max_revisions)
            .await?;
        if revisions.is_empty() {
            return Err(ReleaseError::ReleaseNotFound(release_name.to_string()));
        }
        Ok(revisions)
    }

    /// Manifest of a release version, latest when `version` is absent
    pub async fn manifest(&self, release_name: &str, version: Option<u32>) -> Result<Manifest> {
        Ok(self.find_release(release_name, version).await?.manifest)
    }

    /// Latest DEPLOYED or FAILED release per name, optionally filtered by name
    pub async fn list(&self, name_filter: Option<&str>) -> Result<Vec<Release>> {
        Ok(self
            .releases
            .find_latest_deployed_or_failed(name_filter)
            .await?)
    }

    /// Request cancellation of the in-flight upgrade of `release_name`.
    ///
    /// Returns false when there is nothing to cancel.
    pub fn cancel(&self, release_name: &str) -> bool {
        if !self.strategy.supports_cancel() {
            return false;
        }
        let requested = self.locks.request_cancel(release_name);
        if requested {
            info!(release = %release_name, "Cancellation requested");
        }
        requested
    }

    /// Phase of the in-flight state machine, if any
    pub fn phase(&self, release_name: &str) -> Option<UpgradePhase> {
        self.locks.phase(release_name)
    }

    /// Whether an install, upgrade, rollback or delete holds `release_name`
    pub fn is_busy(&self, release_name: &str) -> bool {
        self.locks.is_active(release_name)
    }

    /// Resolve once no operation is running for `release_name`
    pub async fn wait_until_settled(&self, release_name: &str) {
        self.locks.wait_until_released(release_name).await;
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<ReleaseEventEnvelope> {
        self.event_tx.subscribe()
    }

    // Internal helpers

    fn context(&self, deployer: Arc<dyn Deployer>) -> UpgradeContext {
        UpgradeContext::new(
            deployer,
            self.releases.clone(),
            self.deployer_data.clone(),
            self.event_tx.clone(),
        )
    }

    fn spawn_upgrade(&self, plan: UpgradePlan, ctx: UpgradeContext, mut permit: OperationPermit) {
        let strategy = self.strategy.clone();
        let replacing = plan.replacing.clone();

        tokio::spawn(async move {
            match strategy.execute(plan, &ctx, &mut permit).await {
                Ok(outcome) => {
                    debug!(
                        release = %replacing.name,
                        version = replacing.version,
                        strategy = strategy.name(),
                        success = outcome.is_success(),
                        "Upgrade finished"
                    );
                }
                Err(e) => {
                    error!(
                        release = %replacing.name,
                        version = replacing.version,
                        error = %e,
                        "Upgrade aborted"
                    );
                    mark_failed(&ctx, &replacing, e.to_string()).await;
                }
            }
            drop(permit);
        });
    }

    /// Latest DEPLOYED release together with its instances
    async fn find_serving(&self, release_name: &str) -> Result<Option<ExistingRelease>> {
        let Some(release) = self.releases.find_latest_deployed(release_name).await? else {
            return Ok(None);
        };
        let deployer_data = self
            .deployer_data
            .find(release_name, release.version)
            .await?
            .unwrap_or_else(|| AppDeployerData::new(release_name, release.version));
        Ok(Some(ExistingRelease {
            release,
            deployer_data,
        }))
    }

    async fn find_release(&self, release_name: &str, version: Option<u32>) -> Result<Release> {
        match version {
            Some(version) => self
                .releases
                .find_by_name_and_version(release_name, version)
                .await?
                .ok_or_else(|| ReleaseError::ReleaseNotFound(format!("{release_name} v{version}"))),
            None => self
                .releases
                .find_latest_by_name(release_name)
                .await?
                .ok_or_else(|| ReleaseError::ReleaseNotFound(release_name.to_string())),
        }
    }

    async fn next_version(&self, release_name: &str) -> Result<u32> {
        Ok(self
            .releases
            .find_latest_by_name(release_name)
            .await?
            .map_or(1, |latest| latest.version + 1))
    }

    fn emit_event(&self, event: ReleaseEvent) {
        let _ = self.event_tx.send(ReleaseEventEnvelope::now(event));
    }
}

fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ReleaseError::InvalidRequest(format!("{what} name must not be empty")));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(ReleaseError::InvalidRequest(format!(
            "{what} name must not contain whitespace: '{name}'"
        )));
    }
    Ok(())
}

fn new_release(
    name: &str,
    version: u32,
    package: &Package,
    values: ConfigValues,
    manifest: Manifest,
    platform_name: &str,
    description: &str,
) -> Release {
    let now = Utc::now();
    Release {
        name: name.to_string(),
        version,
        package: package.reference(),
        package_metadata: package.metadata.clone(),
        config_values: values,
        manifest,
        status: ReleaseStatus::new(StatusCode::Deploying, description),
        platform_name: platform_name.to_string(),
        created_at: now,
        updated_at: now,
    }
}

/// Undeploy every instance of every live version, then mark them DELETED.
///
/// Each version's instances go through the deployer of that version's
/// platform.
async fn run_delete(
    ctx: &UpgradeContext,
    deployers: &DeployerRegistry,
    releases: Arc<dyn ReleaseRepository>,
    deployer_data: Arc<dyn AppDeployerDataRepository>,
    target: &Release,
) -> Result<()> {
    let live: Vec<Release> = releases
        .find_all_by_name(&target.name)
        .await?
        .into_iter()
        .filter(|release| !release.is_deleted())
        .collect();

    // Carried-over instances are shared between versions
    let mut seen = BTreeSet::new();
    let mut by_platform: BTreeMap<&str, Vec<(String, DeploymentId)>> = BTreeMap::new();
    for release in &live {
        if let Some(data) = deployer_data.find(&release.name, release.version).await? {
            for (application, id) in data.deployment_data {
                if seen.insert(id.clone()) {
                    by_platform
                        .entry(release.platform_name.as_str())
                        .or_default()
                        .push((application, id));
                }
            }
        }
    }

    info!(
        release = %target.name,
        versions = live.len(),
        instances = seen.len(),
        platforms = by_platform.len(),
        "Undeploying release"
    );
    let mut failures = Vec::new();
    for (platform, instances) in by_platform {
        match deployers.get(platform) {
            Ok(deployer) => {
                failures.extend(ctx.with_deployer(deployer).undeploy_all(instances).await);
            }
            Err(e) => {
                warn!(platform = %platform, error = %e, "No deployer for platform");
                failures.extend(
                    instances
                        .into_iter()
                        .map(|(application, id)| (application, id, e.to_string())),
                );
            }
        }
    }

    for release in live.iter().filter(|release| release.version != target.version) {
        let release = ctx
            .set_status(release, StatusCode::Deleting, "Delete underway")
            .await?;
        ctx.set_status(&release, StatusCode::Deleted, "Delete complete")
            .await?;
    }

    if failures.is_empty() {
        ctx.set_status(target, StatusCode::Deleted, "Delete complete")
            .await?;
        ctx.emit(ReleaseEvent::ReleaseDeleted {
            release: target.name.clone(),
            version: target.version,
        });
    } else {
        let listed: Vec<String> = failures
            .iter()
            .map(|(application, id, reason)| format!("{application} [{id}] ({reason})"))
            .collect();
        let reason = format!("Failed to undeploy: {}", listed.join(", "));
        ctx.set_status(target, StatusCode::Failed, reason.clone())
            .await?;
        ctx.emit(ReleaseEvent::ReleaseFailed {
            release: target.name.clone(),
            version: target.version,
            reason,
        });
    }
    Ok(())
}

/// Best effort FAILED marker after a store error interrupted a background task
async fn mark_failed(ctx: &UpgradeContext, release: &Release, reason: String) {
    match ctx.set_status(release, StatusCode::Failed, reason.clone()).await {
        Ok(_) => ctx.emit(ReleaseEvent::ReleaseFailed {
            release: release.name.clone(),
            version: release.version,
            reason,
        }),
        Err(e) => warn!(
            release = %release.name,
            version = release.version,
            error = %e,
            "Could not record failure"
        ),
    }
}
