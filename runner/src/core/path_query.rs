//! Minimal path-with-wildcard addressing for shape/presence rules.
//!
//! Only `.key` and `.key[*]` segments are supported, with an optional leading
//! `$`. This is deliberately not a JSONPath implementation.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Wildcard,
}

/// Parse a query such as `$.buckets[*].name`.
pub fn parse_query(query: &str) -> Result<Vec<Segment>, String> {
    let trimmed = query.trim();
    let body = trimmed.strip_prefix('$').unwrap_or(trimmed);
    let mut segments = Vec::new();
    for part in body.split('.').filter(|part| !part.is_empty()) {
        let (key, wildcard) = match part.strip_suffix("[*]") {
            Some(key) => (key, true),
            None => (part, false),
        };
        if key.contains(['[', ']', '*']) {
            return Err(format!("unsupported path segment '{part}' in '{query}'"));
        }
        if !key.is_empty() {
            segments.push(Segment::Key(key.to_string()));
        }
        if wildcard {
            segments.push(Segment::Wildcard);
        }
    }
    Ok(segments)
}

/// Resolve a parsed query into one entry per branch.
///
/// A wildcard over an empty sequence contributes no branch; a missing key
/// contributes `None`.
pub fn resolve_query<'a>(root: &'a Value, segments: &[Segment]) -> Vec<Option<&'a Value>> {
    let mut branches = vec![Some(root)];
    for segment in segments {
        let mut next = Vec::with_capacity(branches.len());
        for branch in branches {
            match (branch, segment) {
                (None, _) => next.push(None),
                (Some(value), Segment::Key(key)) => next.push(value.get(key.as_str())),
                (Some(Value::Array(items)), Segment::Wildcard) => next.extend(items.iter().map(Some)),
                (Some(Value::Object(map)), Segment::Wildcard) => next.extend(map.values().map(Some)),
                (Some(_), Segment::Wildcard) => next.push(None),
            }
        }
        branches = next;
    }
    branches
}

/// A branch counts as present when it resolved to a non-null value.
pub fn is_present(branch: Option<&Value>) -> bool {
    branch.is_some_and(|value| !value.is_null())
}
