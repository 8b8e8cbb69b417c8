//! `{{ path }}` substitution over JSON values.
//!
//! Paths are dotted (`case.severity`); numeric segments and `[n]` suffixes
//! index into arrays (`alerts.0.source`, `alerts[0].source`). A placeholder
//! whose path is missing or null is left in the output exactly as written.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

const PLACEHOLDER_PATTERN: &str = r"\{\{\s*([A-Za-z0-9_\-.\[\]]+)\s*\}\}";

fn placeholder() -> Option<&'static Regex> {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(PLACEHOLDER_PATTERN).ok())
        .as_ref()
}

/// Returns a copy of `value` with every placeholder in its strings resolved.
pub fn resolve(value: &Value, context: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(resolve_str(s, context)),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, context)).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), resolve(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

pub fn resolve_str(template: &str, context: &Value) -> String {
    let Some(re) = placeholder() else {
        return template.to_string();
    };

    re.replace_all(template, |caps: &Captures| {
        match lookup(context, &caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => caps[0].to_string(),
            Some(other) => other.to_string(),
        }
    })
    .into_owned()
}

/// Walks `path` through objects and arrays.
pub fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let normalized = path.replace('[', ".").replace(']', "");
    normalized
        .split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(context, |current, segment| match current {
            Value::Object(fields) => fields.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolves_known_path() {
        let context = json!({"case": {"severity": "critical"}});
        assert_eq!(
            resolve(&json!("{{case.severity}}"), &context),
            json!("critical")
        );
    }

    #[test]
    fn test_unresolved_path_is_left_verbatim() {
        assert_eq!(
            resolve(&json!("{{missing.path}}"), &json!({})),
            json!("{{missing.path}}")
        );
        assert_eq!(
            resolve_str("host={{ alert.payload.host }}", &json!({"alert": null})),
            "host={{ alert.payload.host }}"
        );
    }

    #[test]
    fn test_null_value_is_left_verbatim() {
        let context = json!({"case": {"owner": null}});
        assert_eq!(resolve_str("{{case.owner}}", &context), "{{case.owner}}");
    }

    #[test]
    fn test_mixed_text_and_non_string_values() {
        let context = json!({
            "case": {"priority": 3, "contained": false, "tags": ["apt", "lateral"]}
        });
        assert_eq!(
            resolve_str(
                "p{{case.priority}} contained={{case.contained}} tags={{case.tags}}",
                &context
            ),
            r#"p3 contained=false tags=["apt","lateral"]"#
        );
    }

    #[test]
    fn test_array_indexing() {
        let context = json!({"alerts": [{"source": "edr"}, {"source": "email"}]});
        assert_eq!(resolve_str("{{alerts.1.source}}", &context), "email");
        assert_eq!(resolve_str("{{alerts[0].source}}", &context), "edr");
        assert_eq!(resolve_str("{{alerts.7.source}}", &context), "{{alerts.7.source}}");
    }

    #[test]
    fn test_walks_nested_values_without_touching_input() {
        let config = json!({
            "target": {"host": "{{alert.host}}", "ports": ["{{alert.port}}", 22]},
            "force": true,
            "retries": 2
        });
        let context = json!({"alert": {"host": "10.0.0.5", "port": "443"}});
        let original = config.clone();

        let resolved = resolve(&config, &context);

        assert_eq!(
            resolved,
            json!({
                "target": {"host": "10.0.0.5", "ports": ["443", 22]},
                "force": true,
                "retries": 2
            })
        );
        assert_eq!(config, original);
    }

    #[test]
    fn test_lookup_on_scalar_fails() {
        let context = json!({"case": "plain"});
        assert!(lookup(&context, "case.severity").is_none());
        assert_eq!(lookup(&context, "case"), Some(&json!("plain")));
    }
}
