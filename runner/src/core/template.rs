//! `{{name}}` placeholder substitution over strings and JSON trees.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::core::json::to_text;
use crate::core::types::Vars;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}").expect("placeholder regex")
});

/// Replace every `{{name}}` in `text` with the bound value (empty if unbound).
///
/// Strings without placeholders are returned borrowed and untouched.
pub fn resolve_str<'a>(text: &'a str, vars: &Vars) -> Cow<'a, str> {
    if !text.contains("{{") {
        return Cow::Borrowed(text);
    }
    PLACEHOLDER_RE.replace_all(text, |caps: &Captures<'_>| {
        lookup(vars, &caps[1]).map(to_text).unwrap_or_default()
    })
}

/// Recursively resolve placeholders in every string leaf of `value`.
pub fn resolve(value: &Value, vars: &Vars) -> Value {
    match value {
        Value::String(s) => Value::String(resolve_str(s, vars).into_owned()),
        Value::Array(items) => Value::Array(items.iter().map(|item| resolve(item, vars)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), resolve(item, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Names referenced by placeholders in `text`, in order of appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    PLACEHOLDER_RE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Look a placeholder name up; `vars.` prefixed names are accepted too.
pub fn lookup<'a>(vars: &'a Vars, name: &str) -> Option<&'a Value> {
    vars.get(name)
        .or_else(|| name.strip_prefix("vars.").and_then(|rest| vars.get(rest)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> Vars {
        Vars::from([
            ("bucket".to_string(), json!("acme")),
            ("port".to_string(), json!(8080)),
        ])
    }

    #[test]
    fn resolve_str_replaces_bound_and_blanks_unbound() {
        let out = resolve_str("s3://{{bucket}}:{{ port }}/{{missing}}", &vars());
        assert_eq!(out, "s3://acme:8080/");
    }

    #[test]
    fn resolve_str_without_placeholders_is_borrowed() {
        let out = resolve_str("plain text {not a placeholder}", &vars());
        assert!(matches!(out, Cow::Borrowed("plain text {not a placeholder}")));
    }

    #[test]
    fn resolve_walks_nested_containers_and_keeps_other_leaves() {
        let input = json!({"a": ["{{bucket}}", 3, true], "b": {"c": "x-{{vars.port}}"}, "d": null});
        let out = resolve(&input, &vars());
        assert_eq!(out, json!({"a": ["acme", 3, true], "b": {"c": "x-8080"}, "d": null}));
    }

    #[test]
    fn resolve_is_idempotent_once_resolved() {
        let once = resolve(&json!("{{bucket}}"), &vars());
        assert_eq!(resolve(&once, &vars()), once);
    }

    #[test]
    fn placeholders_lists_names() {
        assert_eq!(placeholders("{{a}} and {{ b_2 }}"), vec!["a", "b_2"]);
    }
}
