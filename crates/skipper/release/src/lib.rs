//! Skipper Release - Release lifecycle orchestration
//!
//! Installs packages as versioned releases and moves them between versions
//! with a red/black rollout:
//!
//! 1. Render the candidate manifest and compare it with the serving one
//! 2. Deploy new instances only for applications that changed
//! 3. Health-check the new instances
//! 4. Undeploy the replaced instances of the old release
//!
//! A failed or cancelled attempt never touches the serving release.
//!
//! ## Usage
//!
//! ```no_run
//! use skipper_registry::{DeployerRegistry, InMemoryDeployer, InMemoryPackageSource};
//! use skipper_release::{ReleaseService, SkipperConfig};
//! use skipper_state::{InMemoryAppDeployerDataRepository, InMemoryReleaseRepository};
//! use skipper_types::{ConfigValues, PackageRef};
//! use std::sync::Arc;
//!
//! # async fn example() -> skipper_release::Result<()> {
//! let config = SkipperConfig::load(Some("skipper.toml"))?;
//! skipper_release::init_tracing(&config.logging)?;
//!
//! let deployers = Arc::new(DeployerRegistry::new());
//! deployers.register("default", Arc::new(InMemoryDeployer::new("default")));
//!
//! let service = ReleaseService::new(
//!     Arc::new(InMemoryPackageSource::new()),
//!     deployers,
//!     Arc::new(InMemoryReleaseRepository::new()),
//!     Arc::new(InMemoryAppDeployerDataRepository::new()),
//!     &config,
//! );
//!
//! let release = service
//!     .install(&PackageRef::latest("logger"), "logger", "default", ConfigValues::empty())
//!     .await?;
//! service.wait_until_settled(&release.name).await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod context;
pub mod error;
pub mod health;
pub mod lock;
pub mod service;
pub mod strategy;
pub mod telemetry;

// Re-exports
pub use crate::config::{EventsConfig, HealthCheckConfig, LoggingConfig, RendererConfig, SkipperConfig};
pub use context::UpgradeContext;
pub use error::{ReleaseError, Result};
pub use health::{wait_for_healthy, HealthOutcome};
pub use lock::{OperationKind, OperationPermit, ReleaseLocks};
pub use service::{ReleaseService, RollbackOptions, UpgradeOptions};
pub use strategy::{
    create_strategy, ExistingRelease, RedBlackUpgradeStrategy, UpgradeOutcome, UpgradePlan,
    UpgradeStrategy,
};
pub use telemetry::init_tracing;
