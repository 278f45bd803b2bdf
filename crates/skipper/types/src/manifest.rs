//! Manifest types
//!
//! A manifest is the concrete, ordered output of rendering a package. It is
//! produced once per release version and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Discriminator of an application spec document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppSpecKind {
    /// Any application addressed by a resource locator
    GenericApp,
    /// A packaged service artifact (`maven:`, `docker:`, `file:` or `http(s):`)
    BootApp,
}

impl AppSpecKind {
    pub const ALL: [AppSpecKind; 2] = [AppSpecKind::GenericApp, AppSpecKind::BootApp];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppSpecKind::GenericApp => "generic-app",
            AppSpecKind::BootApp => "boot-app",
        }
    }
}

impl fmt::Display for AppSpecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a kind discriminator is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown application kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for AppSpecKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AppSpecKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// One application of a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSpec {
    /// Unique within the manifest
    pub application_name: String,
    pub kind: AppSpecKind,
    pub api_version: String,
    pub resource_locator: String,
    pub resource_version: Option<String>,
    #[serde(default)]
    pub application_properties: BTreeMap<String, String>,
    #[serde(default)]
    pub deployment_properties: BTreeMap<String, String>,
}

impl AppSpec {
    pub const DEFAULT_API_VERSION: &'static str = "skipper.spring.io/v1";

    pub fn new(
        application_name: impl Into<String>,
        kind: AppSpecKind,
        resource_locator: impl Into<String>,
    ) -> Self {
        Self {
            application_name: application_name.into(),
            kind,
            api_version: Self::DEFAULT_API_VERSION.to_string(),
            resource_locator: resource_locator.into(),
            resource_version: None,
            application_properties: BTreeMap::new(),
            deployment_properties: BTreeMap::new(),
        }
    }

    pub fn with_resource_version(mut self, version: impl Into<String>) -> Self {
        self.resource_version = Some(version.into());
        self
    }

    pub fn with_application_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.application_properties.insert(key.into(), value.into());
        self
    }

    pub fn with_deployment_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.deployment_properties.insert(key.into(), value.into());
        self
    }
}

/// Ordered list of application specs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    apps: Vec<AppSpec>,
}

impl Manifest {
    /// Build a manifest. Callers are responsible for name uniqueness; the
    /// renderer enforces it.
    pub fn new(apps: Vec<AppSpec>) -> Self {
        Self { apps }
    }

    pub fn apps(&self) -> &[AppSpec] {
        &self.apps
    }

    pub fn get(&self, application_name: &str) -> Option<&AppSpec> {
        self.apps
            .iter()
            .find(|app| app.application_name == application_name)
    }

    pub fn contains(&self, application_name: &str) -> bool {
        self.get(application_name).is_some()
    }

    /// Application names in manifest order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.apps.iter().map(|app| app.application_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

impl FromIterator<AppSpec> for Manifest {
    fn from_iter<T: IntoIterator<Item = AppSpec>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in AppSpecKind::ALL {
            assert_eq!(kind.as_str().parse::<AppSpecKind>().unwrap(), kind);
        }
        assert_eq!(
            "cron-app".parse::<AppSpecKind>(),
            Err(UnknownKind("cron-app".into()))
        );
    }

    #[test]
    fn test_kind_serializes_as_discriminator() {
        let json = serde_json::to_string(&AppSpecKind::GenericApp).unwrap();
        assert_eq!(json, "\"generic-app\"");
    }

    #[test]
    fn test_manifest_lookup_preserves_order() {
        let manifest: Manifest = vec![
            AppSpec::new("time", AppSpecKind::BootApp, "maven://time"),
            AppSpec::new("log", AppSpecKind::BootApp, "maven://log"),
        ]
        .into_iter()
        .collect();

        assert_eq!(manifest.names().collect::<Vec<_>>(), vec!["time", "log"]);
        assert!(manifest.contains("log"));
        assert!(manifest.get("missing").is_none());
        assert_eq!(manifest.len(), 2);
    }
}
