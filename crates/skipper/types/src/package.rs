//! Package types
//!
//! A package is the unit of distribution: named templates, default values,
//! and nested dependency packages. Packages are immutable once resolved.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Descriptive metadata of a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub version: Version,
    #[serde(default)]
    pub maintainer: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl PackageMetadata {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            maintainer: String::new(),
            description: None,
        }
    }

    pub fn with_maintainer(mut self, maintainer: impl Into<String>) -> Self {
        self.maintainer = maintainer.into();
        self
    }
}

/// A named template body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub data: String,
}

impl Template {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Raw YAML text holding configuration values
///
/// Used both for a package's defaults and for the caller's overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigValues {
    raw: String,
}

impl ConfigValues {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// True when the text carries no values at all
    pub fn is_blank(&self) -> bool {
        self.raw.trim().is_empty() || self.raw.trim() == "{}"
    }
}

/// A resolved package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub metadata: PackageMetadata,
    #[serde(default)]
    pub templates: Vec<Template>,
    #[serde(default)]
    pub dependencies: Vec<Package>,
    #[serde(default)]
    pub values: ConfigValues,
}

impl Package {
    pub fn new(metadata: PackageMetadata) -> Self {
        Self {
            metadata,
            templates: Vec::new(),
            dependencies: Vec::new(),
            values: ConfigValues::empty(),
        }
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.templates.push(template);
        self
    }

    pub fn with_dependency(mut self, dependency: Package) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_values(mut self, values: ConfigValues) -> Self {
        self.values = values;
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn reference(&self) -> PackageRef {
        PackageRef::exact(self.metadata.name.clone(), self.metadata.version.clone())
    }
}

/// Reference to a package by name, optionally pinned to a version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRef {
    pub name: String,
    /// `None` resolves to the latest available version
    #[serde(default)]
    pub version: Option<Version>,
}

impl PackageRef {
    pub fn latest(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn exact(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version: Some(version),
        }
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}:{}", self.name, version),
            None => write!(f, "{}:latest", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_ref_display() {
        let latest = PackageRef::latest("logger");
        assert_eq!(latest.to_string(), "logger:latest");

        let exact = PackageRef::exact("logger", Version::new(1, 0, 0));
        assert_eq!(exact.to_string(), "logger:1.0.0");
    }

    #[test]
    fn test_blank_values() {
        assert!(ConfigValues::empty().is_blank());
        assert!(ConfigValues::new("  {}\n").is_blank());
        assert!(!ConfigValues::new("level: INFO").is_blank());
    }

    #[test]
    fn test_package_reference_pins_version() {
        let package = Package::new(PackageMetadata::new("ticktock", Version::new(1, 2, 0)));
        let reference = package.reference();
        assert_eq!(reference.name, "ticktock");
        assert_eq!(reference.version, Some(Version::new(1, 2, 0)));
    }
}
