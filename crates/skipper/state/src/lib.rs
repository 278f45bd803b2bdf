//! Skipper State - Release persistence
//!
//! Storage traits for release records and deployer data, plus in-memory
//! implementations. Durable backends implement the same traits.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod deployer_data;
pub mod error;
pub mod release;

pub use deployer_data::{AppDeployerDataRepository, InMemoryAppDeployerDataRepository};
pub use error::{RepositoryError, Result};
pub use release::{InMemoryReleaseRepository, ReleaseRepository};
