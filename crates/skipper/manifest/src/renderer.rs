//! Manifest Renderer
//!
//! Turns a package plus caller overrides into a [`Manifest`]. Rendering is a
//! pure function of its inputs: the same package and values always produce
//! the same applications in the same order.

use crate::document::parse_documents;
use crate::error::{ManifestError, Result};
use crate::kinds::KindRegistry;
use crate::template::render_template;
use crate::values::{merge, parse_values, scoped, unknown_paths, without_keys};
use serde_yaml::Mapping;
use skipper_types::{AppSpec, ConfigValues, Manifest, Package};
use std::collections::HashSet;
use tracing::debug;

/// Renders packages into manifests
pub struct ManifestRenderer {
    kinds: KindRegistry,
    strict: bool,
}

impl ManifestRenderer {
    pub fn new() -> Self {
        Self {
            kinds: KindRegistry::builtin(),
            strict: false,
        }
    }

    /// Strict rendering rejects override keys and placeholders that the
    /// package does not define
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Render `package` with `overrides` applied on top of its defaults.
    ///
    /// The package's own templates come first in declaration order, followed
    /// by each dependency depth-first.
    pub fn render(&self, package: &Package, overrides: &ConfigValues) -> Result<Manifest> {
        let overrides = parse_values(overrides)?;
        let mut chain = Vec::new();
        let mut apps = Vec::new();

        self.render_package(package, &overrides, &mut chain, &mut apps)?;

        let mut seen = HashSet::new();
        for app in &apps {
            if !seen.insert(app.application_name.as_str()) {
                return Err(ManifestError::DuplicateApplication(
                    app.application_name.clone(),
                ));
            }
        }

        debug!(
            package = %package.metadata.name,
            applications = apps.len(),
            "Rendered manifest"
        );

        Ok(Manifest::new(apps))
    }

    fn render_package(
        &self,
        package: &Package,
        overrides: &Mapping,
        chain: &mut Vec<String>,
        apps: &mut Vec<AppSpec>,
    ) -> Result<()> {
        let name = package.name().to_string();
        if chain.contains(&name) {
            let mut cycle = chain.clone();
            cycle.push(name);
            return Err(ManifestError::CyclicPackageDependency {
                cycle: cycle.join(" -> "),
            });
        }
        chain.push(name);

        let defaults = parse_values(&package.values)?;
        let dependency_names: Vec<&str> =
            package.dependencies.iter().map(Package::name).collect();

        if self.strict {
            let unknown: Vec<String> = unknown_paths(&defaults, overrides)
                .into_iter()
                .filter(|path| !dependency_names.contains(&path.split('.').next().unwrap_or("")))
                .collect();
            if !unknown.is_empty() {
                return Err(ManifestError::render(
                    package.name(),
                    format!("unknown value paths: {}", unknown.join(", ")),
                ));
            }
        }

        // Values scoped to a dependency belong to that dependency only
        let model = merge(
            &without_keys(&defaults, dependency_names.iter().copied()),
            &without_keys(overrides, dependency_names.iter().copied()),
        );

        for template in &package.templates {
            let text = render_template(template, &model, self.strict)?;
            apps.extend(parse_documents(&template.name, &text, &self.kinds)?);
        }

        for dependency in &package.dependencies {
            let dependency_overrides = merge(
                &scoped(&defaults, dependency.name()),
                &scoped(overrides, dependency.name()),
            );
            self.render_package(dependency, &dependency_overrides, chain, apps)?;
        }

        chain.pop();
        Ok(())
    }
}

impl Default for ManifestRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;
    use skipper_types::{PackageMetadata, Template};

    const LOGGER_TEMPLATE: &str = r#"
apiVersion: skipper.spring.io/v1
kind: generic-app
metadata:
  name: logger-app
spec:
  resource: "docker:example/logger"
  resourceVersion: "{{ version }}"
  applicationProperties:
    log.level: "{{ log.level }}"
  deploymentProperties:
    memory: "{{ memory }}"
"#;

    fn logger_package() -> Package {
        Package::new(PackageMetadata::new("logger", Version::new(1, 0, 0)))
            .with_template(Template::new("logger.yml", LOGGER_TEMPLATE))
            .with_values(ConfigValues::new(
                "version: 1.0.0\nlog:\n  level: INFO\nmemory: 512m",
            ))
    }

    fn app_package(name: &str) -> Package {
        let template = format!(
            "kind: generic-app\nmetadata:\n  name: {name}-app\nspec:\n  resource: docker:example/{name}\n  applicationProperties:\n    greeting: \"{{{{ greeting }}}}\"\n"
        );
        Package::new(PackageMetadata::new(name, Version::new(1, 0, 0)))
            .with_template(Template::new(format!("{name}.yml"), template))
            .with_values(ConfigValues::new("greeting: hello"))
    }

    #[test]
    fn test_render_uses_defaults() {
        let manifest = ManifestRenderer::new()
            .render(&logger_package(), &ConfigValues::empty())
            .unwrap();

        let app = manifest.get("logger-app").unwrap();
        assert_eq!(app.application_properties["log.level"], "INFO");
        assert_eq!(app.deployment_properties["memory"], "512m");
        assert_eq!(app.resource_version.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_overrides_win() {
        let manifest = ManifestRenderer::new()
            .render(&logger_package(), &ConfigValues::new("log:\n  level: DEBUG"))
            .unwrap();

        let app = manifest.get("logger-app").unwrap();
        assert_eq!(app.application_properties["log.level"], "DEBUG");
        assert_eq!(app.deployment_properties["memory"], "512m");
    }

    #[test]
    fn test_unknown_override_ignored_unless_strict() {
        let overrides = ConfigValues::new("colour: blue");
        ManifestRenderer::new()
            .render(&logger_package(), &overrides)
            .unwrap();

        let err = ManifestRenderer::new()
            .strict(true)
            .render(&logger_package(), &overrides)
            .unwrap_err();
        assert!(matches!(err, ManifestError::TemplateRender { .. }));
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn test_dependencies_render_depth_first_with_scoped_values() {
        let parent = Package::new(PackageMetadata::new("ticktock", Version::new(1, 0, 0)))
            .with_dependency(app_package("time"))
            .with_dependency(app_package("log"))
            .with_values(ConfigValues::new("time:\n  greeting: tick"));

        let manifest = ManifestRenderer::new()
            .render(&parent, &ConfigValues::new("log:\n  greeting: tock"))
            .unwrap();

        assert_eq!(
            manifest.names().collect::<Vec<_>>(),
            vec!["time-app", "log-app"]
        );
        assert_eq!(
            manifest.get("time-app").unwrap().application_properties["greeting"],
            "tick"
        );
        assert_eq!(
            manifest.get("log-app").unwrap().application_properties["greeting"],
            "tock"
        );
    }

    #[test]
    fn test_strict_accepts_dependency_scoped_overrides() {
        let parent = Package::new(PackageMetadata::new("ticktock", Version::new(1, 0, 0)))
            .with_dependency(app_package("time"));

        ManifestRenderer::new()
            .strict(true)
            .render(&parent, &ConfigValues::new("time:\n  greeting: tick"))
            .unwrap();
    }

    #[test]
    fn test_cyclic_dependency_is_detected() {
        let inner = app_package("a").with_dependency(app_package("b").with_dependency(app_package("a")));

        let err = ManifestRenderer::new()
            .render(&inner, &ConfigValues::empty())
            .unwrap_err();
        match err {
            ManifestError::CyclicPackageDependency { cycle } => assert_eq!(cycle, "a -> b -> a"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_application_names_fail() {
        let parent = Package::new(PackageMetadata::new("twice", Version::new(1, 0, 0)))
            .with_dependency(app_package("time"))
            .with_dependency(
                Package::new(PackageMetadata::new("other", Version::new(1, 0, 0)))
                    .with_dependency(app_package("time")),
            );

        let err = ManifestRenderer::new()
            .render(&parent, &ConfigValues::empty())
            .unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateApplication(name) if name == "time-app"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let renderer = ManifestRenderer::new();
        let values = ConfigValues::new("log:\n  level: WARN");
        let first = renderer.render(&logger_package(), &values).unwrap();
        let second = renderer.render(&logger_package(), &values).unwrap();
        assert_eq!(
            crate::document::to_yaml(&first).unwrap(),
            crate::document::to_yaml(&second).unwrap()
        );
    }
}
