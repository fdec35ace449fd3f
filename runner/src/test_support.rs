//! Test-only helpers for constructing labs and steps.

use crate::core::command::CommandPattern;
use crate::core::types::OneOrMany;
use crate::core::validator::CommandRule;
use crate::lab::{Lab, LabDocument, QuizChoice, Step, StepKind, TerminalBlock, Transitions};

/// Wrap steps into a minimal lab document with deterministic defaults.
pub fn lab_doc(steps: Vec<Step>) -> LabDocument {
    LabDocument {
        schema_version: None,
        lab: Lab {
            id: "test-lab".to_string(),
            title: "Test lab".to_string(),
            variables: Default::default(),
            scoring: Default::default(),
            timer: Default::default(),
            assets: Vec::new(),
            steps,
        },
    }
}

fn step(id: &str, kind: StepKind, points: u32) -> Step {
    Step {
        id: id.to_string(),
        kind,
        title: format!("{id} title"),
        instructions: String::new(),
        points,
        hints: Vec::new(),
        transitions: Transitions::default(),
        validators: Vec::new(),
        world_patch: Vec::new(),
    }
}

/// Terminal step expecting `command` (program plus subcommand tokens).
pub fn terminal_step(id: &str, command: &str, points: u32) -> Step {
    let mut tokens = command.split_whitespace().map(str::to_string);
    let program = tokens.next().unwrap_or_default();
    let rule = CommandRule {
        pattern: CommandPattern {
            program,
            subcommand: OneOrMany::Many(tokens.collect()),
            ..CommandPattern::default()
        },
        response: None,
        world_patch: Vec::new(),
        message: None,
    };
    step(
        id,
        StepKind::Terminal {
            terminal: TerminalBlock {
                prompt: "$".to_string(),
                validators: vec![rule],
            },
        },
        points,
    )
}

/// Quiz step over `choices` with a single correct id.
pub fn quiz_step(id: &str, choices: &[&str], correct: &str, points: u32) -> Step {
    step(
        id,
        StepKind::Quiz {
            question_md: format!("{id} question"),
            choices: choices
                .iter()
                .map(|choice| QuizChoice {
                    id: choice.to_string(),
                    label: choice.to_uppercase(),
                })
                .collect(),
            correct: OneOrMany::One(correct.to_string()),
        },
        points,
    )
}
