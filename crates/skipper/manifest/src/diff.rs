//! Manifest Difference Analyzer
//!
//! Compares the manifest that is currently deployed (left) with a candidate
//! manifest (right). Applications are matched by name, so the order of the
//! two manifests does not matter.
//!
//! Only identity, resource, and application-property changes force a new
//! instance. A change confined to deployment properties is reported but does
//! not put the application into the redeploy set.

use serde::{Deserialize, Serialize};
use skipper_types::{AppSpec, Manifest};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A value present on both sides with different content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueChange {
    pub left: String,
    pub right: String,
}

/// Key-wise comparison of two property maps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertiesDiff {
    /// Only on the right
    pub added: BTreeMap<String, String>,
    /// Only on the left
    pub removed: BTreeMap<String, String>,
    pub changed: BTreeMap<String, ValueChange>,
    pub unchanged: BTreeMap<String, String>,
}

impl PropertiesDiff {
    /// Absent and empty-string values are distinct; no normalisation is done.
    pub fn compute(left: &BTreeMap<String, String>, right: &BTreeMap<String, String>) -> Self {
        let mut diff = PropertiesDiff::default();

        for (key, left_value) in left {
            match right.get(key) {
                None => {
                    diff.removed.insert(key.clone(), left_value.clone());
                }
                Some(right_value) if right_value == left_value => {
                    diff.unchanged.insert(key.clone(), left_value.clone());
                }
                Some(right_value) => {
                    diff.changed.insert(
                        key.clone(),
                        ValueChange {
                            left: left_value.clone(),
                            right: right_value.clone(),
                        },
                    );
                }
            }
        }

        for (key, right_value) in right {
            if !left.contains_key(key) {
                diff.added.insert(key.clone(), right_value.clone());
            }
        }

        diff
    }

    pub fn are_equal(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// One scalar field that differs; `None` means the side has no application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub left: Option<String>,
    pub right: Option<String>,
}

/// How an application differs between the two manifests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppChange {
    Added,
    Removed,
    Modified,
    Unchanged,
}

impl fmt::Display for AppChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppChange::Added => "added",
            AppChange::Removed => "removed",
            AppChange::Modified => "modified",
            AppChange::Unchanged => "unchanged",
        };
        f.write_str(s)
    }
}

/// Combined difference for one application name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDiff {
    pub application_name: String,
    pub change: AppChange,
    /// kind and apiVersion
    pub identity: Vec<FieldChange>,
    /// resource locator and resource version
    pub resource: Vec<FieldChange>,
    pub application_properties: PropertiesDiff,
    pub deployment_properties: PropertiesDiff,
}

impl AppDiff {
    fn compute(name: &str, left: Option<&AppSpec>, right: Option<&AppSpec>) -> Self {
        let field = |label: &str, pick: fn(&AppSpec) -> Option<String>| {
            let l = left.and_then(pick);
            let r = right.and_then(pick);
            (l != r).then(|| FieldChange {
                field: label.to_string(),
                left: l,
                right: r,
            })
        };

        let identity: Vec<FieldChange> = [
            field("kind", |app| Some(app.kind.to_string())),
            field("apiVersion", |app| Some(app.api_version.clone())),
        ]
        .into_iter()
        .flatten()
        .collect();

        let resource: Vec<FieldChange> = [
            field("resource", |app| Some(app.resource_locator.clone())),
            field("resourceVersion", |app| app.resource_version.clone()),
        ]
        .into_iter()
        .flatten()
        .collect();

        let empty = BTreeMap::new();
        let application_properties = PropertiesDiff::compute(
            left.map_or(&empty, |app| &app.application_properties),
            right.map_or(&empty, |app| &app.application_properties),
        );
        let deployment_properties = PropertiesDiff::compute(
            left.map_or(&empty, |app| &app.deployment_properties),
            right.map_or(&empty, |app| &app.deployment_properties),
        );

        let change = match (left, right) {
            (None, _) => AppChange::Added,
            (_, None) => AppChange::Removed,
            _ if identity.is_empty()
                && resource.is_empty()
                && application_properties.are_equal()
                && deployment_properties.are_equal() =>
            {
                AppChange::Unchanged
            }
            _ => AppChange::Modified,
        };

        Self {
            application_name: name.to_string(),
            change,
            identity,
            resource,
            application_properties,
            deployment_properties,
        }
    }

    /// Whether the candidate needs a fresh instance of this application
    pub fn requires_redeploy(&self) -> bool {
        match self.change {
            AppChange::Added => true,
            AppChange::Removed | AppChange::Unchanged => false,
            AppChange::Modified => {
                !self.identity.is_empty()
                    || !self.resource.is_empty()
                    || !self.application_properties.are_equal()
            }
        }
    }
}

/// Difference between two manifests, keyed by application name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDiff {
    pub applications: BTreeMap<String, AppDiff>,
}

impl ManifestDiff {
    /// Names that must get a new instance
    pub fn redeploy(&self) -> BTreeSet<String> {
        self.names_where(AppDiff::requires_redeploy)
    }

    /// Names only present in the candidate
    pub fn added(&self) -> BTreeSet<String> {
        self.names_where(|diff| diff.change == AppChange::Added)
    }

    /// Names only present in the current manifest; always undeployed
    pub fn removed(&self) -> BTreeSet<String> {
        self.names_where(|diff| diff.change == AppChange::Removed)
    }

    pub fn are_equal(&self) -> bool {
        self.applications
            .values()
            .all(|diff| diff.change == AppChange::Unchanged)
    }

    pub fn get(&self, application_name: &str) -> Option<&AppDiff> {
        self.applications.get(application_name)
    }

    fn names_where(&self, predicate: impl Fn(&AppDiff) -> bool) -> BTreeSet<String> {
        self.applications
            .values()
            .filter(|diff| predicate(*diff))
            .map(|diff| diff.application_name.clone())
            .collect()
    }
}

/// Compare `left` (deployed) with `right` (candidate)
pub fn analyze(left: &Manifest, right: &Manifest) -> ManifestDiff {
    let names: BTreeSet<&str> = left.names().chain(right.names()).collect();

    let applications = names
        .into_iter()
        .map(|name| {
            (
                name.to_string(),
                AppDiff::compute(name, left.get(name), right.get(name)),
            )
        })
        .collect();

    ManifestDiff { applications }
}

impl fmt::Display for ManifestDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.are_equal() {
            return writeln!(f, "No differences");
        }

        writeln!(f, "Release Difference Summary")?;
        for diff in self.applications.values() {
            if diff.change == AppChange::Unchanged {
                continue;
            }
            writeln!(f, "  {}: {}", diff.application_name, diff.change)?;
            for change in diff.identity.iter().chain(diff.resource.iter()) {
                writeln!(
                    f,
                    "    {}: {} -> {}",
                    change.field,
                    change.left.as_deref().unwrap_or("<none>"),
                    change.right.as_deref().unwrap_or("<none>")
                )?;
            }
            write_properties(f, "application property", &diff.application_properties)?;
            write_properties(f, "deployment property", &diff.deployment_properties)?;
        }
        Ok(())
    }
}

fn write_properties(f: &mut fmt::Formatter<'_>, label: &str, diff: &PropertiesDiff) -> fmt::Result {
    for (key, value) in &diff.removed {
        writeln!(f, "    - {label} {key}={value}")?;
    }
    for (key, value) in &diff.added {
        writeln!(f, "    + {label} {key}={value}")?;
    }
    for (key, change) in &diff.changed {
        writeln!(f, "    ~ {label} {key}: {} -> {}", change.left, change.right)?;
    }
    Ok(())
}
