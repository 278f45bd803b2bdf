//! Upgrade strategy implementations

pub mod executor;
pub mod red_black;

pub use executor::{ExistingRelease, UpgradeOutcome, UpgradePlan, UpgradeStrategy};
pub use red_black::RedBlackUpgradeStrategy;

use crate::config::HealthCheckConfig;
use std::sync::Arc;

/// Factory for the default strategy
pub fn create_strategy(health_check: &HealthCheckConfig) -> Arc<dyn UpgradeStrategy> {
    Arc::new(RedBlackUpgradeStrategy::new(health_check.clone()))
}
