//! Skipper Types - Core types for release orchestration
//!
//! Skipper installs multi-application packages onto a pluggable platform and
//! upgrades them with a red/black rollout: new instances are deployed and
//! health-checked before the old ones are retired.
//!
//! ## Key Concepts
//!
//! - **Package**: templates plus default values, optionally with dependencies
//! - **Manifest**: the rendered, ordered list of [`AppSpec`]s of one release
//! - **Release**: a versioned, immutable manifest plus a mutable status
//! - **AppDeployerData**: which deployer instance backs each app of a release
//! - **Events**: lifecycle notifications broadcast by the release service

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod events;
pub mod ids;
pub mod manifest;
pub mod package;
pub mod phase;
pub mod release;
pub mod status;

pub use events::{ReleaseEvent, ReleaseEventEnvelope};
pub use ids::DeploymentId;
pub use manifest::{AppSpec, AppSpecKind, Manifest, UnknownKind};
pub use package::{ConfigValues, Package, PackageMetadata, PackageRef, Template};
pub use phase::UpgradePhase;
pub use release::{AppDeployerData, Info, Release};
pub use status::{AppStatus, DeploymentState, ReleaseStatus, StatusCode};
