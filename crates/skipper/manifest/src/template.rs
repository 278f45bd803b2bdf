//! Placeholder substitution for package templates
//!
//! Templates are plain YAML text containing `{{ dotted.path }}` placeholders
//! that are resolved against the merged values of the owning package.

use crate::error::{ManifestError, Result};
use crate::values::{lookup, scalar_to_string};
use serde_yaml::Mapping;
use skipper_types::Template;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Substitute every placeholder of `template` from `model`.
///
/// A placeholder whose path is missing renders as an empty string unless
/// `strict` is set, in which case rendering fails.
pub fn render_template(template: &Template, model: &Mapping, strict: bool) -> Result<String> {
    let mut rendered = String::with_capacity(template.data.len());
    let mut rest = template.data.as_str();

    while let Some(start) = rest.find(OPEN) {
        rendered.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let end = after_open
            .find(CLOSE)
            .ok_or_else(|| ManifestError::render(&template.name, "unterminated placeholder"))?;

        let path = after_open[..end].trim();
        if path.is_empty() {
            return Err(ManifestError::render(&template.name, "empty placeholder"));
        }

        match lookup(model, path) {
            Some(value) => {
                let text = scalar_to_string(value).ok_or_else(|| {
                    ManifestError::render(
                        &template.name,
                        format!("placeholder '{path}' does not resolve to a scalar"),
                    )
                })?;
                rendered.push_str(&text);
            }
            None if strict => {
                return Err(ManifestError::render(
                    &template.name,
                    format!("no value for placeholder '{path}'"),
                ));
            }
            None => {}
        }

        rest = &after_open[end + CLOSE.len()..];
    }

    rendered.push_str(rest);
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::parse_values;
    use skipper_types::ConfigValues;

    fn model(text: &str) -> Mapping {
        parse_values(&ConfigValues::new(text)).unwrap()
    }

    #[test]
    fn test_placeholders_are_substituted() {
        let template = Template::new("log.yml", "level: {{ log.level }}\nport: {{port}}");
        let out = render_template(&template, &model("log:\n  level: INFO\nport: 8080"), false)
            .unwrap();
        assert_eq!(out, "level: INFO\nport: 8080");
    }

    #[test]
    fn test_missing_placeholder_is_empty_unless_strict() {
        let template = Template::new("log.yml", "level: '{{ log.level }}'");
        assert_eq!(
            render_template(&template, &Mapping::new(), false).unwrap(),
            "level: ''"
        );

        let err = render_template(&template, &Mapping::new(), true).unwrap_err();
        assert!(matches!(err, ManifestError::TemplateRender { .. }));
    }

    #[test]
    fn test_non_scalar_placeholder_fails() {
        let template = Template::new("log.yml", "level: {{ log }}");
        let err = render_template(&template, &model("log:\n  level: INFO"), false).unwrap_err();
        assert!(err.to_string().contains("does not resolve to a scalar"));
    }

    #[test]
    fn test_unterminated_placeholder_fails() {
        let template = Template::new("log.yml", "level: {{ log.level");
        assert!(render_template(&template, &Mapping::new(), false).is_err());
    }
}
