//! Configuration value handling
//!
//! Values are YAML mappings. Package defaults and caller overrides are deep
//! merged: nested mappings merge key by key, sequences are unioned in order,
//! and any other collision is won by the overlay.

use crate::error::{ManifestError, Result};
use serde_yaml::{Mapping, Value};
use skipper_types::ConfigValues;

/// Parse a values document into a mapping. Blank text is an empty mapping.
pub fn parse_values(values: &ConfigValues) -> Result<Mapping> {
    if values.is_blank() {
        return Ok(Mapping::new());
    }

    match serde_yaml::from_str::<Value>(values.raw())? {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        other => Err(ManifestError::InvalidValues(format!(
            "expected a YAML mapping, found {}",
            type_name(&other)
        ))),
    }
}

/// Deep merge `overlay` on top of `base`
pub fn merge(base: &Mapping, overlay: &Mapping) -> Mapping {
    let mut merged = base.clone();

    for (key, incoming) in overlay {
        let value = match (merged.get(key), incoming) {
            (Some(Value::Mapping(existing)), Value::Mapping(incoming)) => {
                Value::Mapping(merge(existing, incoming))
            }
            (Some(Value::Sequence(existing)), Value::Sequence(incoming)) => {
                let mut union = existing.clone();
                for item in incoming {
                    if !union.contains(item) {
                        union.push(item.clone());
                    }
                }
                Value::Sequence(union)
            }
            _ => incoming.clone(),
        };
        merged.insert(key.clone(), value);
    }

    merged
}

/// The sub-mapping stored under `key`, or an empty mapping
pub fn scoped(values: &Mapping, key: &str) -> Mapping {
    match values.get(key) {
        Some(Value::Mapping(mapping)) => mapping.clone(),
        _ => Mapping::new(),
    }
}

/// A copy of `values` without the given top-level keys
pub fn without_keys<'a>(values: &Mapping, keys: impl IntoIterator<Item = &'a str>) -> Mapping {
    let mut stripped = values.clone();
    for key in keys {
        stripped.remove(key);
    }
    stripped
}

/// Dotted paths present in `overlay` but absent from `base`
pub fn unknown_paths(base: &Mapping, overlay: &Mapping) -> Vec<String> {
    let mut unknown = Vec::new();
    collect_unknown(base, overlay, "", &mut unknown);
    unknown
}

fn collect_unknown(base: &Mapping, overlay: &Mapping, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in overlay {
        let path = join_path(prefix, &key_to_string(key));
        match (base.get(key), value) {
            (None, _) => out.push(path),
            (Some(Value::Mapping(known)), Value::Mapping(nested)) => {
                collect_unknown(known, nested, &path, out)
            }
            _ => {}
        }
    }
}

/// Walk a dotted path through nested mappings
pub fn lookup<'a>(values: &'a Mapping, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = values.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Mapping(mapping) => mapping.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Render a scalar as text; `None` for sequences and mappings
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

pub(crate) fn key_to_string(key: &Value) -> String {
    scalar_to_string(key).unwrap_or_else(|| format!("{key:?}"))
}

pub(crate) fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(text: &str) -> Mapping {
        parse_values(&ConfigValues::new(text)).unwrap()
    }

    #[test]
    fn test_blank_values_are_empty() {
        assert!(values("").is_empty());
        assert!(values("{}").is_empty());
        assert!(values("~").is_empty());
    }

    #[test]
    fn test_non_mapping_values_are_rejected() {
        let err = parse_values(&ConfigValues::new("- a\n- b")).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidValues(_)));
    }

    #[test]
    fn test_merge_is_deep_and_overlay_wins() {
        let base = values("log:\n  level: INFO\n  format: plain\ncount: 1");
        let overlay = values("log:\n  level: DEBUG\ncount: 3");
        let merged = merge(&base, &overlay);

        assert_eq!(lookup(&merged, "log.level"), Some(&Value::from("DEBUG")));
        assert_eq!(lookup(&merged, "log.format"), Some(&Value::from("plain")));
        assert_eq!(lookup(&merged, "count").and_then(scalar_to_string).as_deref(), Some("3"));
    }

    #[test]
    fn test_merge_unions_sequences() {
        let merged = merge(&values("tags: [a, b]"), &values("tags: [b, c]"));
        let tags: Vec<_> = match lookup(&merged, "tags") {
            Some(Value::Sequence(seq)) => seq.iter().filter_map(scalar_to_string).collect(),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unknown_paths_are_dotted() {
        let base = values("log:\n  level: INFO");
        let overlay = values("log:\n  level: DEBUG\n  colour: true\nextra: 1");
        assert_eq!(unknown_paths(&base, &overlay), vec!["log.colour", "extra"]);
    }

    #[test]
    fn test_scoped_and_without_keys() {
        let parent = values("own: 1\ntime:\n  trigger: 5s");
        assert_eq!(lookup(&scoped(&parent, "time"), "trigger"), Some(&Value::from("5s")));
        assert!(scoped(&parent, "missing").is_empty());

        let stripped = without_keys(&parent, ["time"]);
        assert!(lookup(&stripped, "time").is_none());
        assert!(lookup(&stripped, "own").is_some());
    }
}
