//! One learner's isolated runtime instance of a lab.
//!
//! A [`Session`] owns the world, the drawn variables, the score and per-step
//! progress. Nothing is shared between sessions, so hosts may run as many as
//! they like on separate threads.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::expr;
use crate::core::machine::{Countdown, Transition, next};
use crate::core::template::resolve;
use crate::core::topology::{ArchitecturePayload, TopologyEnv, check_topology, ensure_decoy, summarize};
use crate::core::types::{Outcome, Vars};
use crate::core::validator::{RuleEnv, Verdict, check_command, validate_rules};
use crate::core::vars::draw;
use crate::core::world::World;
use crate::io::config::PlayerConfig;
use crate::lab::{END, FormField, InputMode, Lab, LabDocument, Step, StepKind};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown step '{0}'")]
    UnknownStep(String),
    #[error("step '{0}' is locked until the current step is completed")]
    Locked(String),
    #[error("the lab is already finished")]
    Finished,
}

/// Per-step progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepProgress {
    pub completed: bool,
    pub attempts: u32,
    pub last_errors: Vec<String>,
}

/// What a single submission produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitResult {
    pub step: String,
    pub ok: bool,
    pub errors: Vec<String>,
    pub responses: Vec<String>,
    /// Points awarded by this submission (0 when already completed).
    pub awarded: u32,
    pub score: u32,
    /// Step the learner is on afterwards, or `#end`.
    pub current_step: String,
}

/// Serializable view of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub lab_id: String,
    pub current_step: String,
    pub finished: bool,
    pub score: u32,
    pub max_score: u32,
    pub completed_steps: Vec<String>,
    pub last_errors: BTreeMap<String, Vec<String>>,
    pub world: Value,
    pub vars: Vars,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Session {
    lab: Lab,
    vars: Vars,
    config: PlayerConfig,
    world: World,
    score: u32,
    current: Option<usize>,
    progress: Vec<StepProgress>,
    countdown: Option<Countdown>,
}

impl Session {
    /// Draw variables from `seed`, resolve every step's templates and start
    /// on the first step with an empty world.
    pub fn new(doc: &LabDocument, seed: &str, config: PlayerConfig) -> Self {
        let vars = draw(&doc.lab.variables, seed);
        let mut lab = doc.lab.clone();
        lab.steps = doc
            .lab
            .steps
            .iter()
            .map(|step| resolve_step(step, &vars))
            .collect();
        if config.synthesize_decoys {
            for step in &mut lab.steps {
                if let StepKind::Architecture { architecture } = &mut step.kind {
                    ensure_decoy(&mut architecture.palette);
                }
            }
        }
        debug!(lab = %lab.id, seed = %seed, vars = vars.len(), "session created");
        Self {
            progress: vec![StepProgress::default(); lab.steps.len()],
            current: (!lab.steps.is_empty()).then_some(0),
            countdown: Countdown::from_timer(&lab.timer),
            world: World::new(),
            score: 0,
            lab,
            vars,
            config,
        }
    }

    /// The lab with templates resolved for this session.
    pub fn lab(&self) -> &Lab {
        &self.lab
    }

    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn max_score(&self) -> u32 {
        self.lab.max_points()
    }

    pub fn is_finished(&self) -> bool {
        self.current.is_none()
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.current.map(|index| &self.lab.steps[index])
    }

    /// Current step id, or `#end` once finished.
    pub fn current_step_id(&self) -> &str {
        self.current_step().map_or(END, |step| step.id.as_str())
    }

    pub fn progress(&self, step_id: &str) -> Option<&StepProgress> {
        self.index_of(step_id).map(|index| &self.progress[index])
    }

    pub fn countdown(&self) -> Option<&Countdown> {
        self.countdown.as_ref()
    }

    /// Move to `step_id` if it is current or already completed.
    pub fn select(&mut self, step_id: &str) -> Result<&Step, SessionError> {
        let index = self
            .index_of(step_id)
            .ok_or_else(|| SessionError::UnknownStep(step_id.to_string()))?;
        if self.current != Some(index) && !self.progress[index].completed {
            return Err(SessionError::Locked(step_id.to_string()));
        }
        self.current = Some(index);
        Ok(&self.lab.steps[index])
    }

    /// Validate `payload` against the current step and advance on success.
    pub fn submit(&mut self, payload: Value) -> Result<SubmitResult, SessionError> {
        let index = self.current.ok_or(SessionError::Finished)?;

        if self.config.block_on_expiry && self.countdown.is_some_and(|countdown| countdown.is_expired()) {
            let errors = vec!["Time is up.".to_string()];
            self.progress[index].last_errors = errors.clone();
            return Ok(self.result(index, Verdict::from_errors(errors), 0));
        }

        let (verdict, staged, points, transition) = {
            let step = &self.lab.steps[index];
            let (verdict, staged) = self.evaluate(step, payload);
            let outcome = if verdict.ok {
                Outcome::Success
            } else {
                Outcome::Failure
            };
            (verdict, staged, step.points, next(step, outcome))
        };

        let progress = &mut self.progress[index];
        progress.attempts += 1;
        let mut awarded = 0;
        if verdict.ok {
            self.world = staged;
            if !progress.completed {
                progress.completed = true;
                awarded = points;
                self.score = self.score.saturating_add(points);
            }
            progress.last_errors.clear();
            info!(step = %self.lab.steps[index].id, awarded, score = self.score, "step passed");
            self.follow(index, transition);
        } else {
            progress.last_errors = verdict.errors.clone();
            debug!(step = %self.lab.steps[index].id, errors = verdict.errors.len(), "step failed");
            if self.config.auto_navigate_on_failure {
                self.follow(index, transition);
            }
        }
        Ok(self.result(index, verdict, awarded))
    }

    /// Return world, score, progress and timer to their initial state.
    ///
    /// Variables stay bound for the life of the session.
    pub fn reset(&mut self) {
        self.world = World::new();
        self.score = 0;
        self.current = (!self.lab.steps.is_empty()).then_some(0);
        self.progress.fill(StepProgress::default());
        if let Some(countdown) = &mut self.countdown {
            countdown.reset();
        }
        info!(lab = %self.lab.id, "session reset");
    }

    /// Advance the countdown; true only on the tick that expires it.
    pub fn tick(&mut self, seconds: u64) -> bool {
        let expired = self
            .countdown
            .as_mut()
            .is_some_and(|countdown| countdown.tick(seconds));
        if expired {
            info!(lab = %self.lab.id, "countdown expired");
        }
        expired
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            lab_id: self.lab.id.clone(),
            current_step: self.current_step_id().to_string(),
            finished: self.is_finished(),
            score: self.score,
            max_score: self.max_score(),
            completed_steps: self
                .lab
                .steps
                .iter()
                .zip(&self.progress)
                .filter(|(_, progress)| progress.completed)
                .map(|(step, _)| step.id.clone())
                .collect(),
            last_errors: self
                .lab
                .steps
                .iter()
                .zip(&self.progress)
                .filter(|(_, progress)| !progress.last_errors.is_empty())
                .map(|(step, progress)| (step.id.clone(), progress.last_errors.clone()))
                .collect(),
            world: self.world.as_value().clone(),
            vars: self.vars.clone(),
            remaining_seconds: self.countdown.map(|countdown| countdown.remaining),
        }
    }

    fn index_of(&self, step_id: &str) -> Option<usize> {
        self.lab.steps.iter().position(|step| step.id == step_id)
    }

    fn follow(&mut self, from: usize, transition: Transition) {
        match transition {
            Transition::Stay => {}
            Transition::End => {
                info!(from = %self.lab.steps[from].id, "lab finished");
                self.current = None;
            }
            Transition::Goto(target) => match self.index_of(&target) {
                Some(index) => {
                    info!(from = %self.lab.steps[from].id, to = %target, "transition");
                    self.current = Some(index);
                }
                None => warn!(from = %self.lab.steps[from].id, target = %target, "unknown transition target, staying"),
            },
        }
    }

    fn result(&self, index: usize, verdict: Verdict, awarded: u32) -> SubmitResult {
        SubmitResult {
            step: self.lab.steps[index].id.clone(),
            ok: verdict.ok,
            errors: verdict.errors,
            responses: verdict.responses,
            awarded,
            score: self.score,
            current_step: self.current_step_id().to_string(),
        }
    }

    /// Run the step's built-in checks and declared rules against a staged world.
    fn evaluate(&self, step: &Step, payload: Value) -> (Verdict, World) {
        let mut staged = self.world.clone();
        let env = RuleEnv {
            vars: &self.vars,
            limits: &self.config.expression,
        };
        let mut command_seen = false;
        let (mut verdict, payload) = match &step.kind {
            StepKind::Terminal { terminal } => match terminal.validators.first() {
                Some(rule) => {
                    command_seen = true;
                    (check_command(rule, &payload, &mut staged, env), payload)
                }
                None => (Verdict::from_errors(Vec::new()), payload),
            },
            StepKind::ConsoleForm { form } => {
                let errors = check_form(&form.schema.fields, &payload);
                if payload.is_object() {
                    staged.set(&form.model_path, payload.clone());
                }
                (Verdict::from_errors(errors), payload)
            }
            StepKind::InspectFile { input, .. } => match read_inspection(input.mode, payload) {
                Ok(payload) => (Verdict::from_errors(Vec::new()), payload),
                Err((error, payload)) => (Verdict::from_errors(vec![error]), payload),
            },
            StepKind::Architecture { architecture } => {
                match serde_json::from_value::<ArchitecturePayload>(payload.clone()) {
                    Ok(graph) => {
                        let payload = with_summary(&graph, payload);
                        let context = expr::context(staged.as_value(), &self.vars, &payload);
                        let errors = check_topology(
                            &architecture.expected_world,
                            &graph,
                            &TopologyEnv {
                                palette: &architecture.palette,
                                context: &context,
                                limits: &self.config.expression,
                            },
                        );
                        if let Some(path) = &architecture.world_path {
                            staged.set(path, payload.clone());
                        }
                        (Verdict::from_errors(errors), payload)
                    }
                    Err(err) => {
                        debug!(error = %err, "unreadable architecture payload");
                        (
                            Verdict::from_errors(vec!["The submitted diagram could not be read.".to_string()]),
                            payload,
                        )
                    }
                }
            }
            StepKind::Quiz { correct, .. } => {
                let errors = check_quiz(correct.as_slice(), &payload);
                (Verdict::from_errors(errors), payload)
            }
        };

        verdict.merge(validate_rules(&step.validators, &payload, &mut staged, env, command_seen));
        if verdict.ok {
            staged.apply_patch(&step.world_patch, &self.vars);
        }
        (verdict, staged)
    }
}

/// Resolve every template in a step; on a shape change keep the step as authored.
fn resolve_step(step: &Step, vars: &Vars) -> Step {
    let resolved = serde_json::to_value(step)
        .map(|value| resolve(&value, vars))
        .and_then(serde_json::from_value);
    match resolved {
        Ok(step) => step,
        Err(err) => {
            warn!(step = %step.id, error = %err, "templates left unresolved");
            step.clone()
        }
    }
}

fn check_form(fields: &[FormField], payload: &Value) -> Vec<String> {
    let Value::Object(values) = payload else {
        return vec!["Fill in the form before submitting.".to_string()];
    };
    fields
        .iter()
        .filter(|field| field.required)
        .filter(|field| match values.get(&field.name) {
            None | Some(Value::Null) => true,
            Some(Value::String(text)) => text.trim().is_empty(),
            Some(Value::Array(items)) => items.is_empty(),
            Some(_) => false,
        })
        .map(|field| {
            let name = if field.label.is_empty() {
                &field.name
            } else {
                &field.label
            };
            format!("{name} is required.")
        })
        .collect()
}

/// Interpret an inspect-file answer; on error the original payload is handed back.
fn read_inspection(mode: InputMode, payload: Value) -> Result<Value, (String, Value)> {
    match (mode, payload) {
        (InputMode::Text, Value::String(text)) => Ok(Value::String(text.trim().to_string())),
        (InputMode::Json, Value::String(text)) => serde_json::from_str(&text)
            .map_err(|err| (format!("The answer is not valid JSON: {err}."), Value::String(text))),
        (_, other) => Ok(other),
    }
}

fn with_summary(graph: &ArchitecturePayload, payload: Value) -> Value {
    let mut map = match payload {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    match serde_json::to_value(summarize(graph)) {
        Ok(summary) => {
            map.insert("summary".to_string(), summary);
        }
        Err(err) => warn!(error = %err, "topology summary not attached"),
    }
    Value::Object(map)
}

fn check_quiz(correct: &[String], payload: &Value) -> Vec<String> {
    let chosen: Option<Vec<&str>> = match payload {
        Value::String(id) => Some(vec![id.trim()]),
        Value::Array(items) => items.iter().map(|item| item.as_str().map(str::trim)).collect(),
        _ => None,
    };
    let Some(mut chosen) = chosen else {
        return vec!["Choose an answer.".to_string()];
    };
    chosen.sort_unstable();
    chosen.dedup();
    let mut expected: Vec<&str> = correct.iter().map(String::as_str).collect();
    expected.sort_unstable();
    expected.dedup();
    if chosen == expected {
        Vec::new()
    } else {
        vec!["That answer is not correct.".to_string()]
    }
}
