//! Upgrade strategy trait

use crate::context::UpgradeContext;
use crate::error::Result;
use crate::lock::{OperationKind, OperationPermit};
use async_trait::async_trait;
use skipper_types::{AppDeployerData, Release};
use std::collections::BTreeSet;
use std::time::Duration;

/// The release being replaced together with the instances backing it
#[derive(Debug, Clone)]
pub struct ExistingRelease {
    pub release: Release,
    pub deployer_data: AppDeployerData,
}

/// Everything a strategy needs to move from one release version to the next
#[derive(Debug, Clone)]
pub struct UpgradePlan {
    /// Serving release, absent for installs
    pub existing: Option<ExistingRelease>,
    /// New version, already persisted with status DEPLOYING
    pub replacing: Release,
    /// Applications that get a new instance
    pub redeploy: BTreeSet<String>,
    /// Applications of the existing release that the new one drops
    pub removed: BTreeSet<String>,
    pub kind: OperationKind,
    /// Overrides the configured health-check timeout for this run
    pub health_check_timeout: Option<Duration>,
}

impl UpgradePlan {
    /// Description recorded on the new release once it is serving
    pub fn completion_message(&self) -> &'static str {
        match self.kind {
            OperationKind::Install => "Install complete",
            OperationKind::Rollback => "Rollback complete",
            OperationKind::Upgrade | OperationKind::Delete => "Upgrade complete",
        }
    }
}

/// Result of running a strategy to the end
#[derive(Debug, Clone)]
pub enum UpgradeOutcome {
    /// New release is DEPLOYED and the old one retired
    Completed { release: Release },
    /// New release is FAILED; the old one is untouched
    Failed { release: Release, reason: String },
    /// Cancelled; new instances were removed and the new release is FAILED
    RolledBack { release: Release },
}

impl UpgradeOutcome {
    pub fn release(&self) -> &Release {
        match self {
            UpgradeOutcome::Completed { release }
            | UpgradeOutcome::Failed { release, .. }
            | UpgradeOutcome::RolledBack { release } => release,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UpgradeOutcome::Completed { .. })
    }
}

/// Trait for upgrade strategies
#[async_trait]
pub trait UpgradeStrategy: Send + Sync {
    /// Drive `plan` to a terminal phase.
    ///
    /// Deployer failures end in [`UpgradeOutcome::Failed`]; an `Err` means
    /// the release stores could not be updated.
    async fn execute(
        &self,
        plan: UpgradePlan,
        ctx: &UpgradeContext,
        permit: &mut OperationPermit,
    ) -> Result<UpgradeOutcome>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Check if strategy honours cancellation
    fn supports_cancel(&self) -> bool {
        true
    }
}
