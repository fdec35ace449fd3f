//! Path-addressed mutable JSON tree ("world") and its patch operations.
//!
//! Paths are dot-separated (`net.routers.0.name`); `[n]` is accepted as a
//! synonym for `.n`. Patch operations are best-effort: a path that cannot be
//! resolved is reported as [`PatchOutcome::NoOp`] and never raises.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::json::{json_eq, str_field, to_text};
use crate::core::template::{resolve, resolve_str};
use crate::core::types::{PatchOutcome, Vars};

/// One declarative world mutation. Paths and values are templated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    /// Create intermediate mappings as needed and overwrite the leaf.
    Set { path: String, value: Value },
    /// Remove the leaf; on a sequence, by index or by `id`/`key` field.
    Unset { path: String },
    /// Coerce the target into a sequence and append (arrays are spread).
    Push { path: String, value: Value },
    /// Remove a matching element from a sequence, or pop when no value is given.
    Remove {
        path: String,
        #[serde(default)]
        value: Option<Value>,
    },
}

impl PatchOp {
    pub fn path(&self) -> &str {
        match self {
            Self::Set { path, .. }
            | Self::Unset { path }
            | Self::Push { path, .. }
            | Self::Remove { path, .. } => path,
        }
    }
}

/// The mutable simulated-environment tree of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct World {
    root: Value,
}

impl Default for World {
    fn default() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// Read the value at `path`; the empty path addresses the root.
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.root, path)
    }

    /// Apply templated operations in order, reporting one outcome per op.
    pub fn apply_patch(&mut self, ops: &[PatchOp], vars: &Vars) -> Vec<PatchOutcome> {
        ops.iter()
            .map(|op| {
                let path = resolve_str(op.path(), vars).into_owned();
                let outcome = match op {
                    PatchOp::Set { value, .. } => self.set(&path, resolve(value, vars)),
                    PatchOp::Unset { .. } => self.unset(&path),
                    PatchOp::Push { value, .. } => self.push(&path, resolve(value, vars)),
                    PatchOp::Remove { value, .. } => {
                        self.remove(&path, value.as_ref().map(|v| resolve(v, vars)))
                    }
                };
                if let PatchOutcome::NoOp { reason } = &outcome {
                    debug!(path = %path, reason = %reason, "patch op skipped");
                }
                outcome
            })
            .collect()
    }

    pub fn set(&mut self, path: &str, value: Value) -> PatchOutcome {
        let segments = split_path(path);
        if segments.is_empty() {
            return PatchOutcome::noop("empty path");
        }
        *entry_mut(&mut self.root, &segments) = value;
        PatchOutcome::Applied
    }

    pub fn unset(&mut self, path: &str) -> PatchOutcome {
        let segments = split_path(path);
        let Some((last, parents)) = segments.split_last() else {
            return PatchOutcome::noop("empty path");
        };
        let Some(parent) = get_mut(&mut self.root, parents) else {
            return PatchOutcome::noop("parent not found");
        };
        if remove_child(parent, last) {
            PatchOutcome::Applied
        } else {
            PatchOutcome::noop("leaf not found")
        }
    }

    pub fn push(&mut self, path: &str, value: Value) -> PatchOutcome {
        let segments = split_path(path);
        if segments.is_empty() {
            return PatchOutcome::noop("empty path");
        }
        let target = entry_mut(&mut self.root, &segments);
        let items = match target.take() {
            Value::Null => Vec::new(),
            Value::Array(items) => items,
            other => vec![other],
        };
        *target = Value::Array(items);
        if let Value::Array(items) = target {
            match value {
                Value::Array(spread) => items.extend(spread),
                single => items.push(single),
            }
        }
        PatchOutcome::Applied
    }

    pub fn remove(&mut self, path: &str, value: Option<Value>) -> PatchOutcome {
        let segments = split_path(path);
        let Some(target) = get_mut(&mut self.root, &segments) else {
            return PatchOutcome::noop("path not found");
        };
        let Value::Array(items) = target else {
            return self.unset(path);
        };
        let position = match &value {
            None => items.len().checked_sub(1),
            Some(wanted) => find_removal(items, wanted),
        };
        match position {
            Some(index) => {
                items.remove(index);
                PatchOutcome::Applied
            }
            None => PatchOutcome::noop("no matching element"),
        }
    }
}

/// Read `path` from any JSON tree using world path syntax.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = root;
    for segment in split_path(path) {
        node = match node {
            Value::Object(map) => map.get(&segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

/// Split a world path into segments, treating `[n]` like `.n`.
pub fn split_path(path: &str) -> Vec<String> {
    path.replace('[', ".")
        .replace(']', "")
        .split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

fn get_mut<'a>(root: &'a mut Value, segments: &[String]) -> Option<&'a mut Value> {
    let mut node = root;
    for segment in segments {
        node = match node {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

/// Walk to `segments`, creating mappings for missing or scalar intermediates.
fn entry_mut<'a>(root: &'a mut Value, segments: &[String]) -> &'a mut Value {
    let mut node = root;
    for (index, segment) in segments.iter().enumerate() {
        let child = slot(node, segment);
        if index + 1 < segments.len() && !(child.is_object() || child.is_array()) {
            *child = Value::Object(Map::new());
        }
        node = child;
    }
    node
}

fn slot<'a>(node: &'a mut Value, segment: &str) -> &'a mut Value {
    let index = match node {
        Value::Array(_) => segment.parse::<usize>().ok(),
        _ => None,
    };
    if let Some(index) = index {
        let Value::Array(items) = node else {
            unreachable!("index only parsed for arrays")
        };
        if index >= items.len() {
            items.resize(index + 1, Value::Null);
        }
        return &mut items[index];
    }
    ensure_object(node)
        .entry(segment.to_string())
        .or_insert(Value::Null)
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced by an object"),
    }
}

fn remove_child(parent: &mut Value, segment: &str) -> bool {
    match parent {
        Value::Object(map) => map.remove(segment).is_some(),
        Value::Array(items) => {
            let position = match segment.parse::<usize>() {
                Ok(index) => (index < items.len()).then_some(index),
                Err(_) => items.iter().position(|item| {
                    ["id", "key"]
                        .iter()
                        .any(|field| item.get(field).is_some_and(|v| to_text(v) == segment))
                }),
            };
            position.map(|index| items.remove(index)).is_some()
        }
        _ => false,
    }
}

/// Deep-equal first, then an `id` match, then a string against `id`/`name`.
fn find_removal(items: &[Value], wanted: &Value) -> Option<usize> {
    if let Some(index) = items.iter().position(|item| json_eq(item, wanted)) {
        return Some(index);
    }
    if let Some(id) = wanted.get("id")
        && let Some(index) = items
            .iter()
            .position(|item| item.get("id").is_some_and(|other| json_eq(other, id)))
    {
        return Some(index);
    }
    let text = wanted.as_str()?;
    items.iter().position(|item| {
        str_field(item, "id") == Some(text) || str_field(item, "name") == Some(text)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn world(value: Value) -> World {
        World::from_value(value)
    }

    #[test]
    fn set_then_get_returns_written_value() {
        let mut w = World::new();
        for path in ["a", "a.b.c", "x[2].y", "deep.0.list", "s3.buckets.acme.region"] {
            assert!(w.set(path, json!({"p": path})).is_applied());
            assert_eq!(w.get(path), Some(&json!({"p": path})), "path {path}");
        }
    }

    #[test]
    fn set_overwrites_scalar_intermediates() {
        let mut w = world(json!({"a": 5}));
        w.set("a.b", json!(true));
        assert_eq!(w.as_value(), &json!({"a": {"b": true}}));
    }

    #[test]
    fn set_pads_arrays_for_out_of_range_index() {
        let mut w = world(json!({"xs": [1]}));
        w.set("xs.3", json!(4));
        assert_eq!(w.get("xs"), Some(&json!([1, null, null, 4])));
    }

    #[test]
    fn unset_removes_by_key_index_and_id() {
        let mut w = world(json!({
            "a": {"b": 1, "c": 2},
            "xs": [10, 20, 30],
            "users": [{"id": "u1"}, {"key": "u2"}]
        }));
        assert!(w.unset("a.b").is_applied());
        assert!(w.unset("xs.1").is_applied());
        assert!(w.unset("users.u2").is_applied());
        assert!(w.unset("users.u1").is_applied());
        assert_eq!(w.as_value(), &json!({"a": {"c": 2}, "xs": [10, 30], "users": []}));
    }

    #[test]
    fn unset_unresolved_is_noop() {
        let mut w = world(json!({"a": 1}));
        assert!(!w.unset("missing.leaf").is_applied());
        assert!(!w.unset("a.b").is_applied());
        assert!(!w.unset("").is_applied());
        assert_eq!(w.as_value(), &json!({"a": 1}));
    }

    #[test]
    fn push_creates_coerces_and_spreads() {
        let mut w = world(json!({"one": "x"}));
        w.push("list", json!(1));
        w.push("list", json!([2, 3]));
        w.push("one", json!("y"));
        assert_eq!(w.get("list"), Some(&json!([1, 2, 3])));
        assert_eq!(w.get("one"), Some(&json!(["x", "y"])));
    }

    #[test]
    fn remove_prefers_deep_equal_then_id_then_name() {
        let mut w = world(json!({"xs": [
            {"id": "a", "name": "alpha"},
            {"id": "b", "name": "beta", "v": 1},
            {"id": "c", "name": "gamma"}
        ]}));
        assert!(w.remove("xs", Some(json!({"id": "b", "name": "other"}))).is_applied());
        assert!(w.remove("xs", Some(json!("gamma"))).is_applied());
        assert_eq!(w.get("xs"), Some(&json!([{"id": "a", "name": "alpha"}])));
        assert!(!w.remove("xs", Some(json!("zeta"))).is_applied());
    }

    #[test]
    fn remove_without_value_pops_and_on_scalar_unsets() {
        let mut w = world(json!({"xs": [1, 2], "flag": true}));
        assert!(w.remove("xs", None).is_applied());
        assert!(w.remove("flag", None).is_applied());
        assert_eq!(w.as_value(), &json!({"xs": [1]}));
        let mut empty = world(json!({"xs": []}));
        assert!(!empty.remove("xs", None).is_applied());
    }

    #[test]
    fn apply_patch_templates_paths_and_values() {
        let vars = Vars::from([("bucket".to_string(), json!("acme"))]);
        let ops: Vec<PatchOp> = serde_json::from_value(json!([
            {"op": "set", "path": "s3.buckets.{{bucket}}", "value": {"name": "{{bucket}}"}},
            {"op": "push", "path": "log", "value": "created {{bucket}}"},
            {"op": "unset", "path": "nothing.here"}
        ]))
        .expect("ops");
        let mut w = World::new();
        let outcomes = w.apply_patch(&ops, &vars);
        assert_eq!(outcomes[0], PatchOutcome::Applied);
        assert_eq!(outcomes[1], PatchOutcome::Applied);
        assert!(!outcomes[2].is_applied());
        assert_eq!(w.get("s3.buckets.acme.name"), Some(&json!("acme")));
        assert_eq!(w.get("log"), Some(&json!(["created acme"])));
    }
}
