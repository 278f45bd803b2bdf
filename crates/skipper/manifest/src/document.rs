//! Application spec documents
//!
//! Rendered templates are multi-document YAML in which each document
//! describes one application:
//!
//! ```yaml
//! apiVersion: skipper.spring.io/v1
//! kind: boot-app
//! metadata:
//!   name: log
//! spec:
//!   resource: maven://org.example:log-sink
//!   resourceVersion: 1.2.0
//!   applicationProperties:
//!     log.level: INFO
//!   deploymentProperties:
//!     memory: 1024m
//! ```

use crate::error::{ManifestError, Result};
use crate::kinds::KindRegistry;
use crate::values::{join_path, key_to_string, scalar_to_string};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use skipper_types::{AppSpec, Manifest};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    #[serde(default)]
    api_version: Option<String>,
    kind: String,
    metadata: RawMetadata,
    #[serde(default)]
    spec: RawSpec,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSpec {
    #[serde(default)]
    resource: Option<String>,
    #[serde(default)]
    resource_version: Option<Value>,
    #[serde(default)]
    application_properties: Mapping,
    #[serde(default)]
    deployment_properties: Mapping,
}

/// Parse every application document in rendered template text
pub fn parse_documents(
    template_name: &str,
    text: &str,
    kinds: &KindRegistry,
) -> Result<Vec<AppSpec>> {
    let mut apps = Vec::new();

    for document in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }

        let raw: RawDocument = serde_yaml::from_value(value)
            .map_err(|e| ManifestError::render(template_name, e.to_string()))?;
        let app = to_app_spec(raw, kinds)?;
        kinds.validate(&app)?;
        apps.push(app);
    }

    Ok(apps)
}

fn to_app_spec(raw: RawDocument, kinds: &KindRegistry) -> Result<AppSpec> {
    let kind = kinds.resolve(&raw.kind)?;
    let name = raw.metadata.name.trim().to_string();
    if name.is_empty() {
        return Err(ManifestError::InvalidAppSpec {
            application: raw.metadata.name,
            reason: "metadata.name is empty".into(),
        });
    }

    let resource_version = match raw.spec.resource_version {
        None | Some(Value::Null) => None,
        Some(value) => Some(scalar_to_string(&value).ok_or_else(|| {
            ManifestError::InvalidAppSpec {
                application: name.clone(),
                reason: "spec.resourceVersion must be a scalar".into(),
            }
        })?),
    };

    Ok(AppSpec {
        application_name: name,
        kind,
        api_version: raw
            .api_version
            .unwrap_or_else(|| AppSpec::DEFAULT_API_VERSION.to_string()),
        resource_locator: raw.spec.resource.unwrap_or_default(),
        resource_version,
        application_properties: flatten(&raw.spec.application_properties),
        deployment_properties: flatten(&raw.spec.deployment_properties),
    })
}

/// Flatten nested property mappings into dotted keys with string values
pub fn flatten(properties: &Mapping) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    flatten_into("", properties, &mut flat);
    flat
}

fn flatten_into(prefix: &str, properties: &Mapping, out: &mut BTreeMap<String, String>) {
    for (key, value) in properties {
        let path = join_path(prefix, &key_to_string(key));
        flatten_value(path, value, out);
    }
}

fn flatten_value(path: String, value: &Value, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Mapping(nested) => flatten_into(&path, nested, out),
        Value::Sequence(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_value(format!("{path}[{index}]"), item, out);
            }
        }
        Value::Tagged(tagged) => flatten_value(path, &tagged.value, out),
        scalar => {
            out.insert(path, scalar_to_string(scalar).unwrap_or_default());
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutDocument<'a> {
    api_version: &'a str,
    kind: &'a str,
    metadata: OutMetadata<'a>,
    spec: OutSpec<'a>,
}

#[derive(Serialize)]
struct OutMetadata<'a> {
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutSpec<'a> {
    resource: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource_version: Option<&'a str>,
    application_properties: &'a BTreeMap<String, String>,
    deployment_properties: &'a BTreeMap<String, String>,
}

/// Canonical multi-document YAML text of a manifest
pub fn to_yaml(manifest: &Manifest) -> Result<String> {
    let mut out = String::new();
    for app in manifest.apps() {
        let document = OutDocument {
            api_version: &app.api_version,
            kind: app.kind.as_str(),
            metadata: OutMetadata {
                name: &app.application_name,
            },
            spec: OutSpec {
                resource: &app.resource_locator,
                resource_version: app.resource_version.as_deref(),
                application_properties: &app.application_properties,
                deployment_properties: &app.deployment_properties,
            },
        };
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(&document)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skipper_types::AppSpecKind;

    const LOG_APP: &str = r#"
apiVersion: skipper.spring.io/v1
kind: boot-app
metadata:
  name: log
spec:
  resource: maven://org.example:log-sink
  resourceVersion: 1.2
  applicationProperties:
    log:
      level: INFO
    server.port: 8080
  deploymentProperties:
    memory: 1024m
"#;

    #[test]
    fn test_parses_and_flattens_document() {
        let apps = parse_documents("log.yml", LOG_APP, &KindRegistry::builtin()).unwrap();
        assert_eq!(apps.len(), 1);

        let app = &apps[0];
        assert_eq!(app.application_name, "log");
        assert_eq!(app.kind, AppSpecKind::BootApp);
        assert_eq!(app.resource_version.as_deref(), Some("1.2"));
        assert_eq!(app.application_properties["log.level"], "INFO");
        assert_eq!(app.application_properties["server.port"], "8080");
        assert_eq!(app.deployment_properties["memory"], "1024m");
    }

    #[test]
    fn test_multiple_documents_keep_order_and_skip_empty() {
        let text = "---\nkind: generic-app\nmetadata:\n  name: b\nspec:\n  resource: file:///b\n---\n---\nkind: generic-app\nmetadata:\n  name: a\nspec:\n  resource: file:///a\n";
        let apps = parse_documents("apps.yml", text, &KindRegistry::builtin()).unwrap();
        let names: Vec<_> = apps.iter().map(|a| a.application_name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let text = "kind: cron-app\nmetadata:\n  name: c\nspec:\n  resource: file:///c\n";
        let err = parse_documents("c.yml", text, &KindRegistry::builtin()).unwrap_err();
        assert!(matches!(err, ManifestError::UnknownKind(_)));
    }

    #[test]
    fn test_sequences_flatten_with_indices() {
        let props: Mapping = serde_yaml::from_str("hosts: [a, b]").unwrap();
        let flat = flatten(&props);
        assert_eq!(flat["hosts[0]"], "a");
        assert_eq!(flat["hosts[1]"], "b");
    }

    #[test]
    fn test_to_yaml_reparses_to_same_manifest() {
        let apps = parse_documents("log.yml", LOG_APP, &KindRegistry::builtin()).unwrap();
        let manifest = Manifest::new(apps);
        let text = to_yaml(&manifest).unwrap();
        let reparsed = parse_documents("log.yml", &text, &KindRegistry::builtin()).unwrap();
        assert_eq!(Manifest::new(reparsed), manifest);
    }
}
