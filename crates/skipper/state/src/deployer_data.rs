//! Deployer data persistence
//!
//! Records which deployer-assigned instance backs each application of a
//! release version.

use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use skipper_types::AppDeployerData;

#[async_trait]
pub trait AppDeployerDataRepository: Send + Sync {
    /// Insert or replace the data of one release version
    async fn save(&self, data: &AppDeployerData) -> Result<()>;

    async fn find(&self, release_name: &str, release_version: u32)
        -> Result<Option<AppDeployerData>>;

    async fn delete_all(&self) -> Result<()>;
}

/// In-memory implementation for development and tests
#[derive(Default)]
pub struct InMemoryAppDeployerDataRepository {
    data: DashMap<(String, u32), AppDeployerData>,
}

impl InMemoryAppDeployerDataRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppDeployerDataRepository for InMemoryAppDeployerDataRepository {
    async fn save(&self, data: &AppDeployerData) -> Result<()> {
        self.data.insert(
            (data.release_name.clone(), data.release_version),
            data.clone(),
        );
        Ok(())
    }

    async fn find(
        &self,
        release_name: &str,
        release_version: u32,
    ) -> Result<Option<AppDeployerData>> {
        Ok(self
            .data
            .get(&(release_name.to_string(), release_version))
            .map(|entry| entry.clone()))
    }

    async fn delete_all(&self) -> Result<()> {
        self.data.clear();
        Ok(())
    }
}
