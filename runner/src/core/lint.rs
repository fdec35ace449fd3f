//! Soft authoring checks over a lab document.
//!
//! Nothing here is fatal at runtime: the interpreter tolerates every defect
//! reported below, but the lab will not behave as its author intended.

use std::collections::HashSet;

use regex::Regex;
use serde_json::Value;

use crate::core::expr::{self, Limits};
use crate::core::template::placeholders;
use crate::core::topology::NodeMatcher;
use crate::core::validator::ValidatorRule;
use crate::core::vars::VariableSpec;
use crate::core::world::PatchOp;
use crate::lab::{END, LabDocument, STAY, Step, StepKind};

/// Defects (`errors`) and informational `notes`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintReport {
    pub errors: Vec<String>,
    pub notes: Vec<String>,
}

impl LintReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check a lab for authoring defects.
pub fn lint_lab(doc: &LabDocument, limits: &Limits) -> LintReport {
    let mut report = LintReport::default();
    let lab = &doc.lab;

    if lab.steps.is_empty() {
        report.errors.push("lab has no steps".to_string());
    }

    for (name, spec) in &lab.variables {
        if matches!(spec, VariableSpec::Unknown) {
            report
                .errors
                .push(format!("variable '{name}': unknown kind, it will never be bound"));
        }
    }

    let mut seen = HashSet::new();
    for step in &lab.steps {
        if !seen.insert(step.id.as_str()) {
            report.errors.push(format!("duplicate step id '{}'", step.id));
        }
    }

    for step in &lab.steps {
        lint_step(doc, step, limits, &mut report);
    }

    let mut undeclared = Vec::new();
    if let Ok(tree) = serde_json::to_value(lab) {
        collect_placeholders(&tree, &mut undeclared);
    }
    let mut reported = HashSet::new();
    for name in undeclared {
        let bare = name.strip_prefix("vars.").unwrap_or(&name);
        if !lab.variables.contains_key(bare) && reported.insert(name.clone()) {
            report
                .errors
                .push(format!("placeholder '{{{{{name}}}}}' refers to an undeclared variable"));
        }
    }

    report
}

fn lint_step(doc: &LabDocument, step: &Step, limits: &Limits, report: &mut LintReport) {
    let lab = &doc.lab;
    let at = format!("step '{}'", step.id);

    for (label, target) in [
        ("on_success", &step.transitions.on_success),
        ("on_failure", &step.transitions.on_failure),
    ] {
        if let Some(target) = target
            && target != END
            && target != STAY
            && !lab.has_step(target)
        {
            report
                .errors
                .push(format!("{at}: {label} target '{target}' is not a step id, {END} or {STAY}"));
        }
    }

    let mut patches: Vec<&PatchOp> = step.world_patch.iter().collect();
    let mut expressions: Vec<&str> = Vec::new();
    let mut command_rules = 0;
    for rule in &step.validators {
        match rule {
            ValidatorRule::Command(command) => {
                command_rules += 1;
                patches.extend(&command.world_patch);
            }
            ValidatorRule::Expression { expr, .. } => expressions.push(expr),
            _ => {}
        }
    }

    match &step.kind {
        StepKind::Terminal { terminal } => {
            command_rules += terminal.validators.len();
            for rule in &terminal.validators {
                patches.extend(&rule.world_patch);
            }
            if command_rules == 0 {
                report.errors.push(format!("{at}: terminal step has no command rule"));
            } else if command_rules > 1 {
                report.errors.push(format!(
                    "{at}: {command_rules} command rules declared, only the first is evaluated"
                ));
            }
        }
        StepKind::ConsoleForm { form } => {
            if form.model_path.trim().is_empty() {
                report.errors.push(format!("{at}: form model_path is empty"));
            }
        }
        StepKind::InspectFile { file_ref, .. } => {
            if !lab.assets.iter().any(|asset| &asset.id == file_ref) {
                report
                    .errors
                    .push(format!("{at}: file_ref '{file_ref}' names no declared asset"));
            }
        }
        StepKind::Architecture { architecture } => {
            let expected = &architecture.expected_world;
            expressions.extend(expected.expressions.iter().map(|rule| rule.expr.as_str()));
            let matchers = expected
                .nodes
                .iter()
                .map(|rule| &rule.matcher)
                .chain(expected.links.iter().flat_map(|rule| [&rule.from, &rule.to]));
            for matcher in matchers {
                lint_matcher(matcher, &at, report);
            }
            if !architecture.palette.is_empty() && !architecture.palette.iter().any(|entry| entry.decoy) {
                report
                    .notes
                    .push(format!("{at}: palette has no decoy, one will be synthesized"));
            }
        }
        StepKind::Quiz {
            choices, correct, ..
        } => {
            if correct.as_slice().is_empty() {
                report.errors.push(format!("{at}: quiz declares no correct choice"));
            }
            for id in correct.as_slice() {
                if !choices.iter().any(|choice| &choice.id == id) {
                    report
                        .errors
                        .push(format!("{at}: correct choice '{id}' is not among the choices"));
                }
            }
        }
    }

    for op in patches {
        if op.path().trim().is_empty() {
            report.errors.push(format!("{at}: patch operation with an empty path"));
        }
    }

    for source in expressions {
        if let Err(err) = expr::compile(source, limits) {
            report
                .errors
                .push(format!("{at}: expression `{source}` does not parse: {err}"));
        }
    }
}

fn lint_matcher(matcher: &NodeMatcher, at: &str, report: &mut LintReport) {
    match matcher {
        NodeMatcher::Text(_) => {}
        NodeMatcher::Any(options) => {
            for option in options {
                lint_matcher(option, at, report);
            }
        }
        NodeMatcher::Fields(fields) => {
            if let Some(pattern) = &fields.config_regex
                && let Err(err) = Regex::new(pattern)
            {
                report
                    .errors
                    .push(format!("{at}: config_regex '{pattern}' does not compile: {err}"));
            }
            if let Some(negated) = &fields.not {
                lint_matcher(negated, at, report);
            }
        }
    }
}

fn collect_placeholders(value: &Value, names: &mut Vec<String>) {
    match value {
        Value::String(text) => names.extend(placeholders(text)),
        Value::Array(items) => items.iter().for_each(|item| collect_placeholders(item, names)),
        Value::Object(map) => map.values().for_each(|item| collect_placeholders(item, names)),
        _ => {}
    }
}
