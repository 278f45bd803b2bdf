//! Release persistence
//!
//! Versions of a release name form a gap-free sequence starting at 1. The
//! store enforces that, keeps manifests immutable once saved, and rejects
//! status changes that would revert a terminal state.

use crate::error::{RepositoryError, Result};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use skipper_types::{Release, ReleaseStatus, StatusCode};
use std::collections::BTreeMap;
use tracing::debug;

/// Versioned store of release records
#[async_trait]
pub trait ReleaseRepository: Send + Sync {
    /// Insert a new version or replace the status of an existing one
    async fn save(&self, release: &Release) -> Result<()>;

    async fn find_by_name_and_version(&self, name: &str, version: u32)
        -> Result<Option<Release>>;

    /// Highest version regardless of status
    async fn find_latest_by_name(&self, name: &str) -> Result<Option<Release>>;

    /// Every version, oldest first
    async fn find_all_by_name(&self, name: &str) -> Result<Vec<Release>>;

    /// Latest release per name whose status is DEPLOYED or FAILED, ordered by
    /// name. `name_filter` keeps names containing the given text.
    async fn find_latest_deployed_or_failed(
        &self,
        name_filter: Option<&str>,
    ) -> Result<Vec<Release>>;

    /// Change the status of an existing version
    async fn update_status(
        &self,
        name: &str,
        version: u32,
        status: ReleaseStatus,
    ) -> Result<Release>;

    /// Record the latest deployer status summary without touching the code
    async fn update_platform_status(
        &self,
        name: &str,
        version: u32,
        platform_status: String,
    ) -> Result<()>;

    async fn delete_all(&self) -> Result<()>;

    /// Highest version whose status is not DELETED
    async fn find_current(&self, name: &str) -> Result<Option<Release>> {
        Ok(self
            .find_all_by_name(name)
            .await?
            .into_iter()
            .rev()
            .find(|release| !release.is_deleted()))
    }

    /// Highest version whose status is DEPLOYED
    async fn find_latest_deployed(&self, name: &str) -> Result<Option<Release>> {
        Ok(self
            .find_all_by_name(name)
            .await?
            .into_iter()
            .rev()
            .find(|release| release.code() == StatusCode::Deployed))
    }

    /// Up to `max` most recent versions, newest first. Zero means all.
    async fn find_revisions(&self, name: &str, max: usize) -> Result<Vec<Release>> {
        let newest_first = self.find_all_by_name(name).await?.into_iter().rev();
        Ok(if max == 0 {
            newest_first.collect()
        } else {
            newest_first.take(max).collect()
        })
    }
}

/// In-memory implementation for development and tests
pub struct InMemoryReleaseRepository {
    releases: DashMap<String, BTreeMap<u32, Release>>,
}

impl InMemoryReleaseRepository {
    pub fn new() -> Self {
        Self {
            releases: DashMap::new(),
        }
    }
}

impl Default for InMemoryReleaseRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn check_transition(release: &Release, next: StatusCode) -> Result<()> {
    if release.code().can_transition_to(next) {
        Ok(())
    } else {
        Err(RepositoryError::InvalidTransition {
            name: release.name.clone(),
            version: release.version,
            from: release.code(),
            to: next,
        })
    }
}

#[async_trait]
impl ReleaseRepository for InMemoryReleaseRepository {
    async fn save(&self, release: &Release) -> Result<()> {
        let mut versions = self.releases.entry(release.name.clone()).or_default();

        match versions.get(&release.version) {
            Some(existing) => {
                if existing.manifest != release.manifest {
                    return Err(RepositoryError::ManifestImmutable {
                        name: release.name.clone(),
                        version: release.version,
                    });
                }
                check_transition(existing, release.code())?;
            }
            None => {
                let expected = versions.keys().next_back().map_or(1, |latest| latest + 1);
                if release.version != expected {
                    return Err(RepositoryError::VersionConflict {
                        name: release.name.clone(),
                        expected,
                        actual: release.version,
                    });
                }
            }
        }

        debug!(
            release = %release.name,
            version = release.version,
            status = %release.code(),
            "Saving release"
        );
        versions.insert(release.version, release.clone());
        Ok(())
    }

    async fn find_by_name_and_version(
        &self,
        name: &str,
        version: u32,
    ) -> Result<Option<Release>> {
        Ok(self
            .releases
            .get(name)
            .and_then(|versions| versions.get(&version).cloned()))
    }

    async fn find_latest_by_name(&self, name: &str) -> Result<Option<Release>> {
        Ok(self
            .releases
            .get(name)
            .and_then(|versions| versions.values().next_back().cloned()))
    }

    async fn find_all_by_name(&self, name: &str) -> Result<Vec<Release>> {
        Ok(self
            .releases
            .get(name)
            .map(|versions| versions.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn find_latest_deployed_or_failed(
        &self,
        name_filter: Option<&str>,
    ) -> Result<Vec<Release>> {
        let mut latest: Vec<Release> = self
            .releases
            .iter()
            .filter(|entry| name_filter.map_or(true, |filter| entry.key().contains(filter)))
            .filter_map(|entry| entry.value().values().next_back().cloned())
            .filter(|release| {
                matches!(release.code(), StatusCode::Deployed | StatusCode::Failed)
            })
            .collect();
        latest.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(latest)
    }

    async fn update_status(
        &self,
        name: &str,
        version: u32,
        status: ReleaseStatus,
    ) -> Result<Release> {
        let mut versions = self
            .releases
            .get_mut(name)
            .ok_or_else(|| RepositoryError::NotFound {
                name: name.to_string(),
                version,
            })?;
        let release = versions
            .get_mut(&version)
            .ok_or_else(|| RepositoryError::NotFound {
                name: name.to_string(),
                version,
            })?;

        check_transition(release, status.code)?;

        debug!(
            release = %name,
            version,
            from = %release.code(),
            to = %status.code,
            "Updating release status"
        );

        let platform_status = std::mem::take(&mut release.status.platform_status);
        release.status = ReleaseStatus {
            platform_status: if status.platform_status.is_empty() {
                platform_status
            } else {
                status.platform_status
            },
            ..status
        };
        release.updated_at = Utc::now();
        Ok(release.clone())
    }

    async fn update_platform_status(
        &self,
        name: &str,
        version: u32,
        platform_status: String,
    ) -> Result<()> {
        let mut versions = self
            .releases
            .get_mut(name)
            .ok_or_else(|| RepositoryError::NotFound {
                name: name.to_string(),
                version,
            })?;
        let release = versions
            .get_mut(&version)
            .ok_or_else(|| RepositoryError::NotFound {
                name: name.to_string(),
                version,
            })?;
        release.status.platform_status = platform_status;
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.releases.clear();
        Ok(())
    }
}
