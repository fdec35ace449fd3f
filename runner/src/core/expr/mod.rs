//! Restricted expression sandbox.
//!
//! Expressions are parsed by a small dedicated grammar (comparisons, boolean
//! connectives, arithmetic, array predicates) and evaluated against one
//! context tree `{world, vars, payload}`. The only way to read state is
//! `get(path)`; any other free identifier is an [`ExprError`].

pub mod ast;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub use ast::Expr;
pub use error::ExprError;

use crate::core::types::Vars;

/// Resource limits applied to every parse and evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum nesting depth of sub-expressions.
    pub max_depth: usize,
    /// Maximum evaluation steps (nodes visited, including lambda bodies).
    pub max_steps: usize,
    /// Maximum source length in bytes.
    pub max_length: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_steps: 10_000,
            max_length: 4_096,
        }
    }
}

/// Parse `source` without evaluating it (used by lint).
pub fn compile(source: &str, limits: &Limits) -> Result<Expr, ExprError> {
    if source.len() > limits.max_length {
        return Err(ExprError::TooLong(limits.max_length));
    }
    let tokens = lexer::tokenize(source)?;
    parser::Parser::new(tokens, limits.max_depth).parse()
}

/// Parse and evaluate `source` against `context`.
pub fn evaluate(source: &str, context: &Value, limits: &Limits) -> Result<Value, ExprError> {
    let expr = compile(source, limits)?;
    eval::Evaluator::new(context, limits.max_steps).eval(&expr)
}

/// Build the `{world, vars, payload}` context tree.
pub fn context(world: &Value, vars: &Vars, payload: &Value) -> Value {
    json!({
        "world": world,
        "vars": vars,
        "payload": payload,
    })
}
