//! Package source
//!
//! Resolves a package reference to a concrete package. Downloading and
//! indexing package repositories happens behind this trait.

use crate::error::{RegistryError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use skipper_types::{Package, PackageRef};
use tracing::debug;

#[async_trait]
pub trait PackageSource: Send + Sync {
    /// Resolve `reference`; an unpinned reference picks the highest version
    async fn resolve(&self, reference: &PackageRef) -> Result<Package>;
}

/// In-memory package source for development and tests
#[derive(Default)]
pub struct InMemoryPackageSource {
    /// Name to versions, ascending
    packages: DashMap<String, Vec<Package>>,
}

impl InMemoryPackageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package. A package with the same name and version is replaced.
    pub fn register(&self, package: Package) {
        let mut versions = self
            .packages
            .entry(package.metadata.name.clone())
            .or_default();
        versions.retain(|p| p.metadata.version != package.metadata.version);
        versions.push(package);
        versions.sort_by(|a, b| a.metadata.version.cmp(&b.metadata.version));
    }
}

#[async_trait]
impl PackageSource for InMemoryPackageSource {
    async fn resolve(&self, reference: &PackageRef) -> Result<Package> {
        let versions = self
            .packages
            .get(&reference.name)
            .ok_or_else(|| RegistryError::PackageNotFound(reference.clone()))?;

        let package = match &reference.version {
            Some(version) => versions.iter().find(|p| &p.metadata.version == version),
            None => versions.last(),
        };

        let package = package
            .cloned()
            .ok_or_else(|| RegistryError::PackageNotFound(reference.clone()))?;
        debug!(package = %reference, resolved = %package.metadata.version, "Resolved package");
        Ok(package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;
    use skipper_types::PackageMetadata;

    fn package(version: Version) -> Package {
        Package::new(PackageMetadata::new("logger", version))
    }

    #[tokio::test]
    async fn test_latest_is_highest_semver() {
        let source = InMemoryPackageSource::new();
        source.register(package(Version::new(1, 10, 0)));
        source.register(package(Version::new(1, 2, 0)));

        let resolved = source.resolve(&PackageRef::latest("logger")).await.unwrap();
        assert_eq!(resolved.metadata.version, Version::new(1, 10, 0));
    }

    #[tokio::test]
    async fn test_exact_version() {
        let source = InMemoryPackageSource::new();
        source.register(package(Version::new(1, 0, 0)));
        source.register(package(Version::new(1, 1, 0)));

        let resolved = source
            .resolve(&PackageRef::exact("logger", Version::new(1, 0, 0)))
            .await
            .unwrap();
        assert_eq!(resolved.metadata.version, Version::new(1, 0, 0));

        let err = source
            .resolve(&PackageRef::exact("logger", Version::new(2, 0, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::PackageNotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_package() {
        let source = InMemoryPackageSource::new();
        assert!(matches!(
            source.resolve(&PackageRef::latest("missing")).await,
            Err(RegistryError::PackageNotFound(_))
        ));
    }
}
