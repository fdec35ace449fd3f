//! Validator engine: dispatches a submission to the matcher for each rule kind.
//!
//! Every rule is evaluated; nothing short-circuits, so a single pass reports
//! every violation. Rules run against a staged world that the caller commits
//! only when the whole submission succeeds.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::command::{CommandPattern, match_command, parse_command};
use crate::core::expr::{self, Limits};
use crate::core::json::{is_truthy, json_eq, to_text};
use crate::core::path_query::{is_present, parse_query, resolve_query};
use crate::core::template::{resolve, resolve_str};
use crate::core::types::Vars;
use crate::core::world::{PatchOp, World, lookup};

/// Expected command plus what happens when it matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRule {
    #[serde(rename = "match")]
    pub pattern: CommandPattern,
    /// Templated text shown on a match.
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default, alias = "patch")]
    pub world_patch: Vec<PatchOp>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Which tree a path rule addresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    #[default]
    World,
    Payload,
}

/// A declarative check, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidatorRule {
    Command(CommandRule),
    /// Value at a world path equals `equals`, or is merely present.
    World {
        path: String,
        #[serde(default, alias = "value", alias = "expected")]
        equals: Option<Value>,
        #[serde(default)]
        message: Option<String>,
    },
    /// Same as `World`, against the submitted payload.
    Payload {
        #[serde(default)]
        path: String,
        #[serde(default, alias = "value", alias = "expected")]
        equals: Option<Value>,
        #[serde(default)]
        message: Option<String>,
    },
    Expression {
        #[serde(alias = "expression")]
        expr: String,
        #[serde(default)]
        message: Option<String>,
    },
    Exists {
        path: String,
        #[serde(default)]
        target: Target,
        #[serde(default)]
        message: Option<String>,
    },
    Absent {
        path: String,
        #[serde(default)]
        target: Target,
        #[serde(default)]
        message: Option<String>,
    },
    Schema {
        path: String,
        #[serde(default)]
        target: Target,
        schema: Value,
        #[serde(default)]
        message: Option<String>,
    },
}

impl ValidatorRule {
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Command(rule) => rule.message.as_deref(),
            Self::World { message, .. }
            | Self::Payload { message, .. }
            | Self::Expression { message, .. }
            | Self::Exists { message, .. }
            | Self::Absent { message, .. }
            | Self::Schema { message, .. } => message.as_deref(),
        }
    }
}

/// Inputs shared by every rule of one submission.
#[derive(Debug, Clone, Copy)]
pub struct RuleEnv<'a> {
    pub vars: &'a Vars,
    pub limits: &'a Limits,
}

/// Outcome of checking a submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Verdict {
    pub ok: bool,
    pub errors: Vec<String>,
    /// Response texts from matched command rules.
    pub responses: Vec<String>,
}

impl Verdict {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            ok: errors.is_empty(),
            errors,
            responses: Vec::new(),
        }
    }

    /// Fold another verdict into this one.
    pub fn merge(&mut self, other: Verdict) {
        self.errors.extend(other.errors);
        self.responses.extend(other.responses);
        self.ok = self.errors.is_empty();
    }
}

/// Evaluate every rule against `payload` and the staged `world`.
///
/// Only the first `command` rule is evaluated; later ones are ignored. A
/// matched command's patch is applied to `world` so later rules observe it.
pub fn validate(rules: &[ValidatorRule], payload: &Value, world: &mut World, env: RuleEnv<'_>) -> Verdict {
    validate_rules(rules, payload, world, env, false)
}

/// Like [`validate`], but with `command_seen` set every `command` rule is skipped
/// because the step already evaluated its command.
pub fn validate_rules(
    rules: &[ValidatorRule],
    payload: &Value,
    world: &mut World,
    env: RuleEnv<'_>,
    mut command_seen: bool,
) -> Verdict {
    let mut verdict = Verdict::default();
    for rule in rules {
        let result = match rule {
            ValidatorRule::Command(command) => {
                if command_seen {
                    debug!("ignoring additional command rule");
                    continue;
                }
                command_seen = true;
                check_command(command, payload, world, env)
            }
            other => check_rule(other, payload, world.as_value(), env),
        };
        verdict.merge(result);
    }
    verdict.ok = verdict.errors.is_empty();
    verdict
}

/// Match a command line payload; on success stage the rule's patch.
pub fn check_command(rule: &CommandRule, payload: &Value, world: &mut World, env: RuleEnv<'_>) -> Verdict {
    let line = match payload {
        Value::String(line) => line.as_str(),
        _ => return Verdict::from_errors(vec!["Enter a command.".to_string()]),
    };
    let Some(parsed) = parse_command(line) else {
        return Verdict::from_errors(vec!["Enter a command.".to_string()]);
    };
    let matched = match_command(&rule.pattern, &parsed, env.vars);
    if !matched.ok {
        let errors = match &rule.message {
            Some(message) => vec![resolve_str(message, env.vars).into_owned()],
            None => matched.errors,
        };
        return Verdict::from_errors(errors);
    }
    world.apply_patch(&rule.world_patch, env.vars);
    Verdict {
        ok: true,
        errors: Vec::new(),
        responses: rule
            .response
            .iter()
            .map(|text| resolve_str(text, env.vars).into_owned())
            .collect(),
    }
}

fn check_rule(rule: &ValidatorRule, payload: &Value, world: &Value, env: RuleEnv<'_>) -> Verdict {
    let failure = match rule {
        ValidatorRule::Command(_) => None,
        ValidatorRule::World { path, equals, .. } => compare(world, path, equals.as_ref(), env.vars, "world"),
        ValidatorRule::Payload { path, equals, .. } => compare(payload, path, equals.as_ref(), env.vars, "answer"),
        ValidatorRule::Expression { expr: source, .. } => {
            let context = expr::context(world, env.vars, payload);
            match expr::evaluate(source, &context, env.limits) {
                Ok(value) if is_truthy(&value) => None,
                Ok(_) => Some(format!("Check failed: `{source}`.")),
                Err(err) => {
                    debug!(expr = %source, error = %err, "expression fault");
                    Some(format!("Check failed: `{source}`."))
                }
            }
        }
        ValidatorRule::Exists { path, target, .. } => match query(pick(*target, world, payload), path, env.vars) {
            Ok(branches) if !branches.is_empty() && branches.iter().all(|branch| is_present(*branch)) => None,
            Ok(_) => Some(format!("Expected `{path}` to exist.")),
            Err(message) => Some(message),
        },
        ValidatorRule::Absent { path, target, .. } => match query(pick(*target, world, payload), path, env.vars) {
            Ok(branches) if branches.iter().any(|branch| is_present(*branch)) => {
                Some(format!("Expected `{path}` to be absent."))
            }
            Ok(_) => None,
            Err(message) => Some(message),
        },
        ValidatorRule::Schema { path, target, schema, .. } => {
            check_schema(pick(*target, world, payload), path, schema, env.vars)
        }
    };
    match failure {
        None => Verdict::from_errors(Vec::new()),
        Some(default) => {
            let message = rule
                .message()
                .map(|message| resolve_str(message, env.vars).into_owned())
                .unwrap_or(default);
            Verdict::from_errors(vec![message])
        }
    }
}

fn pick<'a>(target: Target, world: &'a Value, payload: &'a Value) -> &'a Value {
    match target {
        Target::World => world,
        Target::Payload => payload,
    }
}

fn compare(root: &Value, path: &str, expected: Option<&Value>, vars: &Vars, subject: &str) -> Option<String> {
    let path = resolve_str(path, vars);
    let actual = lookup(root, &path);
    match expected {
        None if is_present(actual) => None,
        None => Some(format!("Expected {subject} value `{path}` to be set.")),
        Some(expected) => {
            let expected = resolve(expected, vars);
            if actual.is_some_and(|actual| json_eq(actual, &expected)) {
                None
            } else {
                Some(format!(
                    "Expected {subject} value `{path}` to be `{}`.",
                    to_text(&expected)
                ))
            }
        }
    }
}

fn query<'a>(root: &'a Value, path: &str, vars: &Vars) -> Result<Vec<Option<&'a Value>>, String> {
    let path = resolve_str(path, vars);
    let segments = parse_query(&path).map_err(|err| {
        debug!(path = %path, error = %err, "unsupported path query");
        format!("Cannot check `{path}`.")
    })?;
    Ok(resolve_query(root, &segments))
}

fn check_schema(root: &Value, path: &str, schema: &Value, vars: &Vars) -> Option<String> {
    let branches = match query(root, path, vars) {
        Ok(branches) => branches,
        Err(message) => return Some(message),
    };
    let validator = match jsonschema::validator_for(schema) {
        Ok(validator) => validator,
        Err(err) => {
            debug!(path = %path, error = %err, "invalid rule schema");
            return Some(format!("Cannot check `{path}`."));
        }
    };
    let valid = !branches.is_empty()
        && branches
            .iter()
            .all(|branch| branch.is_some_and(|value| !value.is_null() && validator.is_valid(value)));
    if valid {
        None
    } else {
        Some(format!("`{path}` does not have the expected shape."))
    }
}
