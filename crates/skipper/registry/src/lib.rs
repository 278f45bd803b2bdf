//! Skipper Registry - Deployers and package sources
//!
//! The two external collaborators of the release service:
//!
//! - [`Deployer`]: platform client that starts, stops, and reports on
//!   application instances, looked up by platform name in a
//!   [`DeployerRegistry`]
//! - [`PackageSource`]: resolves package references to packages
//!
//! In-memory implementations of both are provided for development and tests.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod deployer;
pub mod error;
pub mod memory;
pub mod package;

// Re-exports
pub use deployer::{AppDeploymentRequest, Deployer, DeployerRegistry};
pub use error::{RegistryError, Result};
pub use memory::{InMemoryDeployer, SimulatedInstance};
pub use package::{InMemoryPackageSource, PackageSource};
