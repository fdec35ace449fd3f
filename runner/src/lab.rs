//! Serde model of a lab document.
//!
//! The JSON authoring surface is modelled as tagged variants: steps by `type`,
//! validator rules by `kind`, patch operations by `op`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::topology::{ArchLink, ArchNode, ExpectedWorld, PaletteEntry};
use crate::core::types::OneOrMany;
use crate::core::validator::{CommandRule, ValidatorRule};
use crate::core::vars::VariableSpec;
use crate::core::world::PatchOp;

/// Transition target that finishes the lab.
pub const END: &str = "#end";
/// Transition target that keeps the learner on the current step.
pub const STAY: &str = "#stay";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LabDocument {
    #[serde(default)]
    pub schema_version: Option<Value>,
    pub lab: Lab,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Lab {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub variables: BTreeMap<String, VariableSpec>,
    #[serde(default)]
    pub scoring: Scoring,
    #[serde(default)]
    pub timer: Timer,
    #[serde(default)]
    pub assets: Vec<Asset>,
    pub steps: Vec<Step>,
}

impl Lab {
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn has_step(&self, id: &str) -> bool {
        self.step(id).is_some()
    }

    /// Declared target score, else the sum of step points.
    pub fn max_points(&self) -> u32 {
        self.scoring
            .max_points
            .unwrap_or_else(|| {
                self.steps
                    .iter()
                    .fold(0u32, |total, step| total.saturating_add(step.points))
            })
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scoring {
    #[serde(default)]
    pub max_points: Option<u32>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    #[default]
    None,
    Countdown,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timer {
    #[serde(default)]
    pub mode: TimerMode,
    #[serde(default)]
    pub seconds: u64,
}

/// Opaque asset reference; bytes are owned by the host.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Asset {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transitions {
    #[serde(default)]
    pub on_success: Option<String>,
    #[serde(default)]
    pub on_failure: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub id: String,
    #[serde(flatten)]
    pub kind: StepKind,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "instructions_md")]
    pub instructions: String,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub transitions: Transitions,
    #[serde(default)]
    pub validators: Vec<ValidatorRule>,
    /// Applied to the world when the step succeeds.
    #[serde(default)]
    pub world_patch: Vec<PatchOp>,
}

impl Step {
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            StepKind::Terminal { .. } => "terminal",
            StepKind::ConsoleForm { .. } => "console_form",
            StepKind::InspectFile { .. } => "inspect_file",
            StepKind::Architecture { .. } => "architecture",
            StepKind::Quiz { .. } => "quiz",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    Terminal {
        #[serde(default)]
        terminal: TerminalBlock,
    },
    ConsoleForm {
        form: FormBlock,
    },
    InspectFile {
        file_ref: String,
        #[serde(default)]
        input: InputSpec,
    },
    Architecture {
        architecture: ArchitectureBlock,
    },
    Quiz {
        #[serde(default)]
        question_md: String,
        choices: Vec<QuizChoice>,
        correct: OneOrMany<String>,
    },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TerminalBlock {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub validators: Vec<CommandRule>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FormBlock {
    /// World path the submitted form is stored at.
    pub model_path: String,
    #[serde(default)]
    pub schema: FormSchema,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FormSchema {
    #[serde(default)]
    pub fields: Vec<FormField>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FormField {
    #[serde(alias = "key")]
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<Value>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputSpec {
    #[serde(default)]
    pub mode: InputMode,
    #[serde(default)]
    pub placeholder: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ArchitectureBlock {
    #[serde(default)]
    pub palette: Vec<PaletteEntry>,
    #[serde(default)]
    pub initial_nodes: Vec<ArchNode>,
    #[serde(default)]
    pub initial_links: Vec<ArchLink>,
    #[serde(default)]
    pub expected_world: ExpectedWorld,
    /// World path the accepted graph is stored at.
    #[serde(default)]
    pub world_path: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizChoice {
    pub id: String,
    #[serde(default, alias = "text")]
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn steps_deserialize_by_type_tag() {
        let doc: LabDocument = serde_json::from_value(json!({
            "schema_version": "1.0",
            "lab": {
                "id": "s3-basics",
                "title": "S3 basics",
                "variables": {"bucket": {"type": "choice", "choices": ["acme", "zenith"]}},
                "scoring": {"max_points": 20},
                "timer": {"mode": "countdown", "seconds": 600},
                "assets": [{"id": "policy", "name": "policy.json"}],
                "steps": [
                    {"id": "create", "type": "terminal", "points": 10,
                     "terminal": {"validators": [{"match": {"program": "aws"}, "response": "ok"}]},
                     "transitions": {"on_success": "quiz"}},
                    {"id": "form", "type": "console_form",
                     "form": {"model_path": "bucket", "schema": {"fields": [{"key": "name", "required": true}]}}},
                    {"id": "inspect", "type": "inspect_file", "file_ref": "policy", "input": {"mode": "json"}},
                    {"id": "arch", "type": "architecture", "architecture": {"palette": [{"id": "router"}]}},
                    {"id": "quiz", "type": "quiz", "instructions_md": "Pick one",
                     "choices": [{"id": "a", "text": "A"}], "correct": "a"}
                ]
            }
        }))
        .expect("lab document");

        let types: Vec<_> = doc.lab.steps.iter().map(Step::type_name).collect();
        assert_eq!(types, ["terminal", "console_form", "inspect_file", "architecture", "quiz"]);
        assert_eq!(doc.lab.timer.mode, TimerMode::Countdown);
        assert_eq!(doc.lab.max_points(), 20);
        let quiz = doc.lab.step("quiz").expect("quiz step");
        assert_eq!(quiz.instructions, "Pick one");
        match &quiz.kind {
            StepKind::Quiz { correct, choices, .. } => {
                assert_eq!(correct.as_slice(), ["a".to_string()]);
                assert_eq!(choices[0].label, "A");
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn max_points_defaults_to_step_sum() {
        let lab: Lab = serde_json::from_value(json!({
            "id": "x",
            "steps": [
                {"id": "a", "type": "terminal", "points": 10},
                {"id": "b", "type": "quiz", "points": 5, "choices": [], "correct": []}
            ]
        }))
        .expect("lab");
        assert_eq!(lab.max_points(), 15);
    }

    #[test]
    fn max_points_saturates_instead_of_overflowing() {
        let lab: Lab = serde_json::from_value(json!({
            "id": "x",
            "steps": [
                {"id": "a", "type": "quiz", "points": 3_000_000_000u32, "choices": [], "correct": []},
                {"id": "b", "type": "quiz", "points": 3_000_000_000u32, "choices": [], "correct": []}
            ]
        }))
        .expect("lab");
        assert_eq!(lab.max_points(), u32::MAX);
    }
}
