//! Faults raised while parsing or evaluating a sandboxed expression.

use thiserror::Error;

/// Expression fault. Callers downgrade every variant to a failed rule.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("syntax error at offset {pos}: {message}")]
    Syntax { pos: usize, message: String },
    #[error("undefined identifier `{0}` (only get(path) may read state)")]
    UndefinedIdentifier(String),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("arithmetic trap: {0}")]
    ArithmeticTrap(String),
    #[error("maximum expression nesting depth is {0}")]
    TooDeep(usize),
    #[error("expression exceeds {0} bytes")]
    TooLong(usize),
    #[error("evaluation step budget exhausted")]
    BudgetExhausted,
}

impl ExprError {
    pub fn syntax(pos: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            pos,
            message: message.into(),
        }
    }

    pub fn mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch(message.into())
    }
}
