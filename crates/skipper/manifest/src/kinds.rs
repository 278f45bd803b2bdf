//! Application kind registry
//!
//! Maps the `kind` discriminator of a template document to an
//! [`AppSpecKind`] and the validator that applies to it. Built once when the
//! renderer is constructed.

use crate::error::{ManifestError, Result};
use skipper_types::{AppSpec, AppSpecKind, UnknownKind};
use std::collections::HashMap;

type Validator = fn(&AppSpec) -> std::result::Result<(), String>;

const BOOT_APP_SCHEMES: [&str; 5] = ["maven", "docker", "file", "http", "https"];

struct KindEntry {
    kind: AppSpecKind,
    validate: Validator,
}

/// Discriminator to kind lookup
pub struct KindRegistry {
    kinds: HashMap<&'static str, KindEntry>,
}

impl KindRegistry {
    /// Registry holding every built-in kind
    pub fn builtin() -> Self {
        let mut kinds = HashMap::new();
        for kind in AppSpecKind::ALL {
            let validate: Validator = match kind {
                AppSpecKind::GenericApp => validate_generic_app,
                AppSpecKind::BootApp => validate_boot_app,
            };
            kinds.insert(kind.as_str(), KindEntry { kind, validate });
        }
        Self { kinds }
    }

    pub fn resolve(&self, discriminator: &str) -> Result<AppSpecKind> {
        self.kinds
            .get(discriminator)
            .map(|entry| entry.kind)
            .ok_or_else(|| UnknownKind(discriminator.to_string()).into())
    }

    pub fn validate(&self, app: &AppSpec) -> Result<()> {
        let entry = self
            .kinds
            .get(app.kind.as_str())
            .ok_or_else(|| UnknownKind(app.kind.to_string()))?;

        (entry.validate)(app).map_err(|reason| ManifestError::InvalidAppSpec {
            application: app.application_name.clone(),
            reason,
        })
    }
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn validate_generic_app(app: &AppSpec) -> std::result::Result<(), String> {
    if app.resource_locator.trim().is_empty() {
        return Err("spec.resource is required".into());
    }
    Ok(())
}

fn validate_boot_app(app: &AppSpec) -> std::result::Result<(), String> {
    validate_generic_app(app)?;

    let scheme = app
        .resource_locator
        .split_once(':')
        .map(|(scheme, _)| scheme)
        .ok_or_else(|| format!("resource '{}' has no scheme", app.resource_locator))?;

    if !BOOT_APP_SCHEMES.contains(&scheme) {
        return Err(format!("unsupported resource scheme '{scheme}'"));
    }

    if scheme == "maven" && app.resource_version.is_none() {
        return Err("maven resources require spec.resourceVersion".into());
    }

    Ok(())
}
