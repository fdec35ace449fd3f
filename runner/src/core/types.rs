//! Shared deterministic types for the lab interpreter core.
//!
//! These types define stable contracts between core components. They must not
//! depend on external state or I/O and must remain deterministic across runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-session variable bindings (name -> value), fixed once drawn.
pub type Vars = BTreeMap<String, Value>;

/// Authoring convenience: a single item or a list of items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            Self::One(item) => std::slice::from_ref(item),
            Self::Many(items) => items,
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

/// Result of a single patch operation.
///
/// Patches never fail; a path that does not resolve is reported as `NoOp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    NoOp { reason: String },
}

impl PatchOutcome {
    pub fn noop(reason: impl Into<String>) -> Self {
        Self::NoOp {
            reason: reason.into(),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Outcome of validating a submission, used to pick a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}
